pub mod basic;
pub mod decode;
pub mod ssr;

#[cfg(test)]
mod tests {
    use crate::basic::bits::setbitu;
    use crate::basic::time::{gpst2time, timediff};
    use crate::basic::var::*;
    use crate::decode::ppp::{parse_ppp, PppFrame};
    use crate::decode::sbf::build_frame;
    use crate::decode::{B2bDecoder, DecodeEvent};
    use crate::ssr::emit::CorrSink;

    #[derive(Default)]
    struct MemSink {
        orb: Vec<Vec<OrbCorr>>,
        clk: Vec<Vec<ClkCorr>>,
    }

    impl CorrSink for MemSink {
        fn publish_orb(&mut self, corrs: Vec<OrbCorr>) {
            self.orb.push(corrs);
        }
        fn publish_clk(&mut self, corrs: Vec<ClkCorr>) {
            self.clk.push(corrs);
        }
    }

    fn header(buf: &mut [u8], mestype: u8, sod: u32, ssr: u8) {
        setbitu(buf, 0, 6, mestype as u32);
        setbitu(buf, 6, 17, sod);
        setbitu(buf, 23, 4, 2);
        setbitu(buf, 27, 2, ssr as u32);
    }

    fn mask_frame(ssr: u8, iodp: u8, slots: &[usize]) -> PppFrame {
        let mut buf = [0u8; 61];
        header(&mut buf, 1, 3600, ssr);
        setbitu(&mut buf, 29, 4, iodp as u32);
        for &slot in slots {
            setbitu(&mut buf, 33 + slot - 1, 1, 1);
        }
        parse_ppp(&buf).unwrap()
    }

    fn orbit_frame(ssr: u8, slots: &[(u16, u16, u8)]) -> PppFrame {
        // (satslot, iodn, iodcorr) triples; ura class/value fixed non-zero
        let mut buf = [0u8; 61];
        header(&mut buf, 2, 3600, ssr);
        let mut r = 29;
        for &(slot, iodn, iodcorr) in slots.iter().take(6) {
            setbitu(&mut buf, r, 9, slot as u32);
            r += 9;
            setbitu(&mut buf, r, 10, iodn as u32);
            r += 10;
            setbitu(&mut buf, r, 3, iodcorr as u32);
            r += 3;
            setbitu(&mut buf, r, 15, 100);
            r += 15;
            setbitu(&mut buf, r, 13, 50);
            r += 13;
            setbitu(&mut buf, r, 13, 25);
            r += 13;
            setbitu(&mut buf, r, 3, 1); // URA class
            r += 3;
            setbitu(&mut buf, r, 3, 2); // URA value
            r += 3;
        }
        parse_ppp(&buf).unwrap()
    }

    fn clock_frame(ssr: u8, iodp: u8, recs: &[(u8, f64)]) -> PppFrame {
        // (iodcorr, c0 meters) for the first records, rest carry the
        // unavailable sentinel
        let mut buf = [0u8; 61];
        header(&mut buf, 4, 3610, ssr);
        let mut r = 29;
        setbitu(&mut buf, r, 4, iodp as u32);
        r += 4;
        setbitu(&mut buf, r, 5, 0); // subtype1
        r += 5;
        for a in 0..23 {
            let (iodcorr, c0) = recs.get(a).copied().unwrap_or((0, CLK_UNAVAIL));
            setbitu(&mut buf, r, 3, iodcorr as u32);
            r += 3;
            let raw = (c0 / 0.0016).round() as i32;
            setbitu(&mut buf, r, 15, (raw as u32) & 0x7FFF);
            r += 15;
        }
        parse_ppp(&buf).unwrap()
    }

    fn b2b_payload(navbits: &[u8; B2B_NAV_BYTES]) -> Vec<u8> {
        let mut p = vec![0u8; 12 + B2B_NAV_BYTES];
        p[0..4].copy_from_slice(&449_235_000u32.to_le_bytes());
        p[4..6].copy_from_slice(&2270u16.to_le_bytes());
        p[6] = 241; // SVID of C59
        p[7] = 1;
        p[12..].copy_from_slice(navbits);
        p
    }

    /// S1: a mask page creates exactly one entry and emits nothing.
    #[test]
    fn scenario_mask_ingestion() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.ingest_ppp(mask_frame(1, 3, &[1, 2, 5]), 2270, 449_235.0, &mut sink);
        assert_eq!(
            events,
            vec![DecodeEvent::MaskIngested { ssr: 1, iodp: 3 }]
        );
        assert_eq!(dec.store().nmask(), 1);
        let mask = dec.store().mask_by_iodp(3).unwrap();
        assert_eq!(mask.ssr, 1);
        assert_eq!(mask.cmake[0], 1);
        assert_eq!(mask.cmake[4], 1);
        assert_eq!(mask.cmake[3], 0);
        assert!(sink.orb.is_empty() && sink.clk.is_empty());
    }

    /// S2: a six-record orbit page populates one set; nothing is published
    /// before the cadence elapses.
    #[test]
    fn scenario_orbit_ingestion() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        dec.ingest_ppp(mask_frame(1, 3, &[1, 2, 3, 4, 5, 6]), 2270, 449_235.0, &mut sink);
        let slots: Vec<(u16, u16, u8)> =
            (1..=6).map(|s| (s as u16, 500 + s as u16, (s % 8) as u8)).collect();
        let events = dec.ingest_ppp(orbit_frame(1, &slots), 2270, 449_236.0, &mut sink);
        assert!(events.contains(&DecodeEvent::OrbitIngested { ssr: 1, nsat: 6 }));
        assert!(!events.iter().any(|e| matches!(e, DecodeEvent::Emitted { .. })));
        assert_eq!(dec.store().norbit(), 1);
        let set = dec.store().orbit(0);
        for s in 0..6 {
            assert_eq!(set.iode[s], 501 + s as i32);
        }
        assert!(sink.orb.is_empty());
    }

    /// S3: clock records cross-reference the orbit IODCorr; unmatched slots
    /// stay at IODE −1 and are not published when the cadence fires.
    #[test]
    fn scenario_clock_crossref_and_emission() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        dec.ingest_ppp(mask_frame(1, 3, &[1, 2, 3]), 2270, 449_235.0, &mut sink);
        // orbit: slots 1 and 2 with iodcorr 2 and 4
        dec.ingest_ppp(
            orbit_frame(1, &[(1, 501, 2), (2, 502, 4)]),
            2270,
            449_236.0,
            &mut sink,
        );
        // clocks: records address mask slots 1,2,3; first two match
        let events = dec.ingest_ppp(
            clock_frame(1, 3, &[(2, 0.5), (4, -0.3), (7, 0.1)]),
            2270,
            449_237.0,
            &mut sink,
        );
        assert!(events.contains(&DecodeEvent::ClockIngested {
            ssr: 1,
            nsat: 3,
            mask_found: true
        }));
        let set = dec.store().clock(0);
        assert_eq!(set.iode[0], 501);
        assert_eq!(set.iode[1], 502);
        assert_eq!(set.iode[2], -1); // iodcorr 7 has no orbit match

        // next page past the cadence triggers the flush
        let events = dec.ingest_ppp(
            clock_frame(1, 3, &[(2, 0.5)]),
            2270,
            449_242.0,
            &mut sink,
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, DecodeEvent::Emitted { .. })));
        assert_eq!(sink.clk.len(), 1);
        // the unmatched third slot is not part of the batch
        let prns: Vec<u8> = sink.clk[0].iter().map(|c| c.prn.num).collect();
        assert!(prns.contains(&1) && prns.contains(&2));
        assert!(!prns.contains(&3));
        // every published item is stamped with the trigger page time
        let t_trigger = gpst2time(2270, 449_242.0);
        assert!(sink.clk[0]
            .iter()
            .all(|c| timediff(c.time, t_trigger) == 0.0));
        // orbit batch flushed in the same emission
        assert_eq!(sink.orb.len(), 1);
    }

    /// S4: the ±26.2128 m sentinel never yields a clock output.
    #[test]
    fn scenario_clock_sentinel() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        dec.ingest_ppp(mask_frame(1, 3, &[1]), 2270, 449_235.0, &mut sink);
        dec.ingest_ppp(orbit_frame(1, &[(1, 501, 2)]), 2270, 449_236.0, &mut sink);
        dec.ingest_ppp(
            clock_frame(1, 3, &[(2, CLK_UNAVAIL)]),
            2270,
            449_237.0,
            &mut sink,
        );
        let set = dec.store().clock(0);
        assert_eq!(set.iode[0], -1);
        assert_eq!(set.iodcorr[0], -1);
        // advance past the cadence: no clock batch appears
        dec.ingest_ppp(
            clock_frame(1, 3, &[(2, CLK_UNAVAIL)]),
            2270,
            449_243.0,
            &mut sink,
        );
        assert!(sink.clk.is_empty());
    }

    /// S5: a corrupted frame is reported and the following frame decodes.
    #[test]
    fn scenario_crc_error_recovery() {
        let nav = [0u8; B2B_NAV_BYTES];
        let mut bad = build_frame(SBF_ID_BDSRAWB2B, 0, &b2b_payload(&nav));
        bad[20] ^= 0xFF;
        let mut idle = [0u8; B2B_NAV_BYTES];
        idle[0..4].copy_from_slice(&[0x00, 0xC0, 0x0F, 0xEC]); // "EC0FC..." page
        let good = build_frame(SBF_ID_BDSRAWB2B, 0, &b2b_payload(&idle));

        let mut stream = bad;
        stream.extend_from_slice(&good);
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.input(&stream, &mut sink);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            DecodeEvent::SbfCrcError {
                block_type: SBF_ID_BDSRAWB2B
            }
        ));
        assert_eq!(events[1], DecodeEvent::IdlePage);
        assert_eq!(dec.stats().crc_errors, 1);
        assert_eq!(dec.stats().frames, 1);
    }

    /// S6: an EC0FC page is dropped before the LDPC stage.
    #[test]
    fn scenario_idle_page_dropped() {
        let mut idle = [0u8; B2B_NAV_BYTES];
        idle[0..4].copy_from_slice(&[0x00, 0xC0, 0x0F, 0xEC]);
        let frame = build_frame(SBF_ID_BDSRAWB2B, 0, &b2b_payload(&idle));
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.input(&frame, &mut sink);
        assert_eq!(events, vec![DecodeEvent::IdlePage]);
        assert_eq!(dec.stats().idle_pages, 1);
        assert_eq!(dec.stats().ldpc_ok + dec.stats().ldpc_fail, 0);
        assert_eq!(dec.store().nmask(), 0);
    }

    /// Full chain: framer, gate and LDPC run on an all-zero codeword page;
    /// the corrected payload then fails subtype parsing (type 0).
    #[test]
    fn end_to_end_ldpc_zero_page() {
        let nav = [0u8; B2B_NAV_BYTES];
        let frame = build_frame(SBF_ID_BDSRAWB2B, 0, &b2b_payload(&nav));
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        dec.input(&frame, &mut sink);
        assert_eq!(dec.stats().ldpc_ok, 1);
        assert_eq!(dec.stats().parse_fail, 1);
    }

    /// Unknown block types are counted and skipped.
    #[test]
    fn unknown_block_skipped() {
        let frame = build_frame(4007, 0, &[0u8; 32]);
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.input(&frame, &mut sink);
        assert_eq!(events, vec![DecodeEvent::UnknownBlock { block_type: 4007 }]);
        assert_eq!(dec.stats().unknown_blocks, 1);
    }

    /// A clock arriving before its mask is skipped and cannot be resolved
    /// retroactively.
    #[test]
    fn clock_before_mask_skipped() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.ingest_ppp(
            clock_frame(1, 3, &[(2, 0.5)]),
            2270,
            449_237.0,
            &mut sink,
        );
        assert!(events.contains(&DecodeEvent::ClockIngested {
            ssr: 1,
            nsat: 0,
            mask_found: false
        }));
        assert_eq!(dec.stats().mask_missing, 1);
        // the mask arriving later does not resurrect the old clock set
        dec.ingest_ppp(mask_frame(1, 3, &[1]), 2270, 449_238.0, &mut sink);
        assert!(dec.store().clock(0).iode.iter().all(|&e| e == -1));
    }

    /// Reserved subtypes pass through without touching state.
    #[test]
    fn reserved_subtype_passthrough() {
        let mut buf = [0u8; 61];
        header(&mut buf, 40, 0, 0);
        let frame = parse_ppp(&buf).unwrap();
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        let events = dec.ingest_ppp(frame, 2270, 100.0, &mut sink);
        assert_eq!(events, vec![DecodeEvent::ReservedSubtype(40)]);
        assert_eq!(dec.store().nmask() + dec.store().norbit() + dec.store().nclock(), 0);
    }

    /// Emission cadence: page time between consecutive emissions always
    /// advances by at least the cadence.
    #[test]
    fn emission_cadence_respected() {
        let mut dec = B2bDecoder::new(Config::default());
        let mut sink = MemSink::default();
        dec.ingest_ppp(mask_frame(0, 1, &[1]), 2270, 1000.0, &mut sink);

        let mut emit_times = Vec::new();
        for step in 0..30 {
            let tow = 1000.0 + step as f64; // one page per second
            let events = dec.ingest_ppp(orbit_frame(0, &[(1, 600, 1)]), 2270, tow, &mut sink);
            if events.iter().any(|e| matches!(e, DecodeEvent::Emitted { .. })) {
                emit_times.push(tow);
            }
        }
        assert!(emit_times.len() >= 4);
        for w in emit_times.windows(2) {
            assert!(w[1] - w[0] >= EMIT_CADENCE);
        }
    }
}
