//! Decoding pipeline: SBF framing, B2b page dispatch, LDPC error
//! correction, PPP-B2b subtype parsing and correction-store ingestion.

pub mod b2b;
pub mod ldpc;
pub mod ppp;
pub mod sbf;

use std::time::{Duration, Instant};

use crate::basic::time::{gpst2time, mjd2wksow, wksow2mjd};
use crate::basic::var::*;
use crate::ssr::emit::{CorrSink, Emitter};
use crate::ssr::store::CorrectionStore;
use b2b::{decode_b2b_page, gate_page, navbits_hex, PageGate};
use log::{debug, info, warn};
use ppp::{parse_ppp, PppBody};
use sbf::{SbfEvent, SbfFramer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("frame too short: want {want}, got {got}")]
    ShortFrame { want: usize, got: usize },
    #[error("bad SBF block length")]
    BadSbfLength,
    #[error("SBF CRC mismatch on block type {0}")]
    SbfCrcError(u16),
    #[error("unknown SBF block type {0}")]
    UnknownBlockType(u16),
    #[error("idle navigation frame")]
    NavFrameIdle,
    #[error("LDPC decoder did not converge")]
    LdpcUnconverged,
    #[error("unknown PPP-B2b subtype {0}")]
    UnknownSubtype(u8),
    #[error("no mask for IODP {0}")]
    MaskNotFound(u8),
    #[error("clock magnitude sentinel")]
    InvalidClockMagnitude,
    #[error("invalid hex character '{0}'")]
    BadHexChar(char),
}

/// Observable outcome of one ingestion step.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    SbfCrcError { block_type: u16 },
    UnknownBlock { block_type: u16 },
    IdlePage,
    LdpcUnconverged,
    MaskIngested { ssr: u8, iodp: u8 },
    OrbitIngested { ssr: u8, nsat: usize },
    ClockIngested { ssr: u8, nsat: usize, mask_found: bool },
    ReservedSubtype(u8),
    Emitted { norb: usize, nclk: usize },
}

/// Per-taxon counters; every error is recovered locally and counted here.
#[derive(Debug, Clone, Default)]
pub struct DecodeStats {
    pub frames: u64,
    pub crc_errors: u64,
    pub unknown_blocks: u64,
    pub other_svid: u64,
    pub idle_pages: u64,
    pub ldpc_ok: u64,
    pub ldpc_fail: u64,
    pub parse_fail: u64,
    pub masks: u64,
    pub orbits: u64,
    pub clocks: u64,
    pub cbias: u64,
    pub ura: u64,
    pub combined: u64,
    pub reserved: u64,
    pub mask_missing: u64,
    pub sentinels: u64,
    pub ldpc_time: Duration,
}

impl DecodeStats {
    /// Mean LDPC decode latency over all pages that reached the decoder.
    pub fn mean_ldpc_time(&self) -> Option<Duration> {
        let n = self.ldpc_ok + self.ldpc_fail;
        if n == 0 {
            None
        } else {
            Some(self.ldpc_time / n as u32)
        }
    }
}

/// Streaming decoder from raw SBF bytes to emitted SSR corrections.
pub struct B2bDecoder {
    cfg: Config,
    framer: SbfFramer,
    store: CorrectionStore,
    emitter: Emitter,
    stats: DecodeStats,
    last_time: GTime,
}

impl B2bDecoder {
    pub fn new(cfg: Config) -> Self {
        let emitter = Emitter::new(&cfg.sta_id, cfg.cadence);
        B2bDecoder {
            cfg,
            framer: SbfFramer::new(),
            store: CorrectionStore::new(),
            emitter,
            stats: DecodeStats::default(),
            last_time: GTime::default(),
        }
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    pub fn store(&self) -> &CorrectionStore {
        &self.store
    }

    pub fn framer(&self) -> &SbfFramer {
        &self.framer
    }

    pub fn last_time(&self) -> GTime {
        self.last_time
    }

    /// Feed raw stream bytes; decodes every complete SBF frame and returns
    /// the events they produced. Corrections are delivered through `sink`
    /// whenever the emission cadence elapses.
    pub fn input(&mut self, buff: &[u8], sink: &mut dyn CorrSink) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        for ev in self.framer.feed(buff) {
            match ev {
                SbfEvent::CrcError { block_type } => {
                    self.stats.crc_errors += 1;
                    events.push(DecodeEvent::SbfCrcError { block_type });
                }
                SbfEvent::Block(blk) => {
                    self.stats.frames += 1;
                    self.process_block(&blk, sink, &mut events);
                }
            }
        }
        events
    }

    fn process_block(&mut self, blk: &SbfBlock, sink: &mut dyn CorrSink, events: &mut Vec<DecodeEvent>) {
        if blk.block_type != SBF_ID_BDSRAWB2B {
            self.stats.unknown_blocks += 1;
            debug!("skipping SBF block type {}", blk.block_type);
            events.push(DecodeEvent::UnknownBlock {
                block_type: blk.block_type,
            });
            return;
        }
        let page = match decode_b2b_page(&blk.payload) {
            Ok(p) => p,
            Err(e) => {
                self.stats.parse_fail += 1;
                warn!("bad B2b payload: {}", e);
                return;
            }
        };
        match gate_page(&page) {
            PageGate::OtherSvid(prn) => {
                self.stats.other_svid += 1;
                debug!("skipping B2b page from {}", prn);
            }
            PageGate::Idle => {
                self.stats.idle_pages += 1;
                events.push(DecodeEvent::IdlePage);
            }
            PageGate::Ppp => self.process_page(&page, sink, events),
        }
    }

    fn process_page(&mut self, page: &B2bPage, sink: &mut dyn CorrSink, events: &mut Vec<DecodeEvent>) {
        info!(
            "PPPB2b: TOW={} WNc={} PRN={} CRCPassed={} Src={} RxCh={}",
            page.tow(),
            page.week,
            B2B_PPP_PRN,
            page.crc_passed,
            page.source,
            page.rx_channel
        );
        self.last_time = gpst2time(page.week as i32, page.tow() as f64);

        let t0 = Instant::now();
        let decoded = ldpc::decode_navbits(&navbits_hex(page), &self.cfg);
        self.stats.ldpc_time += t0.elapsed();

        let decoded = match decoded {
            Ok(bytes) => {
                self.stats.ldpc_ok += 1;
                debug!("C59 NAVBits decoded ({} bytes)", bytes.len());
                bytes
            }
            Err(DecodeError::LdpcUnconverged) => {
                self.stats.ldpc_fail += 1;
                warn!("LDPC decode failed for page at TOW={}", page.tow());
                events.push(DecodeEvent::LdpcUnconverged);
                return;
            }
            Err(e) => {
                self.stats.parse_fail += 1;
                warn!("nav bits rejected: {}", e);
                return;
            }
        };

        let frame = match parse_ppp(&decoded) {
            Ok(f) => f,
            Err(e) => {
                self.stats.parse_fail += 1;
                warn!("PPP frame rejected: {}", e);
                return;
            }
        };

        let evs = self.ingest_ppp(frame, page.week as i32, page.tow() as f64, sink);
        events.extend(evs);
    }

    /// Apply one parsed PPP-B2b frame stamped with its page epoch. This is
    /// the entry point for hosts that receive frames already
    /// error-corrected.
    pub fn ingest_ppp(
        &mut self,
        frame: ppp::PppFrame,
        week: i32,
        tow: f64,
        sink: &mut dyn CorrSink,
    ) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        self.last_time = gpst2time(week, tow);

        // page epoch with the half-week consistency adjustment
        let (bweek, bsow) = adjust_page_epoch(week, tow);

        match frame.body {
            PppBody::Mask { iodp, cmake } => {
                if self.store.ingest_mask(frame.ssr, iodp, cmake) {
                    self.stats.masks += 1;
                }
                events.push(DecodeEvent::MaskIngested {
                    ssr: frame.ssr,
                    iodp,
                });
            }
            PppBody::Orbit { subs } => {
                let idx = self.store.ingest_orbit(frame.ssr, bweek, bsow, &subs);
                self.stats.orbits += 1;
                let nsat = subs.iter().filter(|s| s.ura != 0.0).count();
                self.emitter.push_orbit(self.store.orbit(idx), self.last_time);
                events.push(DecodeEvent::OrbitIngested {
                    ssr: frame.ssr,
                    nsat,
                });
                self.try_emit(sink, &mut events);
            }
            PppBody::Clock {
                iodp,
                subtype1,
                iodcorr,
                c0,
                ..
            } => {
                let (idx, summary) = self
                    .store
                    .ingest_clock(frame.ssr, iodp, bweek, bsow, subtype1, &iodcorr, &c0);
                self.stats.clocks += 1;
                self.stats.sentinels += summary.nsentinel as u64;
                if !summary.mask_found {
                    self.stats.mask_missing += 1;
                    warn!("clock before mask: no entry for IODP {}", iodp);
                }
                self.emitter.push_clock(self.store.clock(idx), self.last_time);
                events.push(DecodeEvent::ClockIngested {
                    ssr: frame.ssr,
                    nsat: summary.nslots,
                    mask_found: summary.mask_found,
                });
                self.try_emit(sink, &mut events);
            }
            PppBody::Cbias { .. } => {
                self.stats.cbias += 1;
            }
            PppBody::Ura { .. } => {
                self.stats.ura += 1;
            }
            PppBody::Combined {
                clock,
                orbit,
                slot_explicit,
                ..
            } => {
                self.stats.combined += 1;
                if self.cfg.experimental_combined {
                    let idx = self.store.ingest_orbit(frame.ssr, bweek, bsow, &orbit.subs);
                    self.emitter.push_orbit(self.store.orbit(idx), self.last_time);
                    if slot_explicit {
                        let records: Vec<(u16, u8, f64)> = clock
                            .satslot
                            .iter()
                            .zip(clock.iodcorr.iter())
                            .zip(clock.c0.iter())
                            .map(|((&s, &i), &c)| (s, i, c))
                            .collect();
                        let (cidx, summary) = self.store.ingest_clock_explicit(
                            frame.ssr,
                            clock.iodp,
                            bweek,
                            bsow,
                            &records,
                        );
                        self.stats.sentinels += summary.nsentinel as u64;
                        self.emitter.push_clock(self.store.clock(cidx), self.last_time);
                    }
                    self.try_emit(sink, &mut events);
                }
            }
            PppBody::Reserved => {
                self.stats.reserved += 1;
                events.push(DecodeEvent::ReservedSubtype(frame.mestype));
            }
        }
        events
    }

    fn try_emit(&mut self, sink: &mut dyn CorrSink, events: &mut Vec<DecodeEvent>) {
        let (norb, nclk) = self.emitter.check_emit(self.last_time, sink);
        if norb > 0 || nclk > 0 {
            events.push(DecodeEvent::Emitted { norb, nclk });
        }
    }
}

/// Resolve the page (week, sow) against the day boundary: shift the derived
/// MJD by one day either way and take the first candidate within half a
/// week of the page epoch; when none qualifies the day-ahead candidate is
/// kept.
fn adjust_page_epoch(week: i32, sow: f64) -> (i32, f64) {
    let (mjd, sod) = wksow2mjd(week, sow);
    let mut cand = (week, sow);
    for shift in [-1i32, 0, 1] {
        let (w, s) = mjd2wksow(mjd + shift, sod);
        cand = (w, s);
        let ddif = (w - week) as f64 * 604800.0 + s - sow;
        if ddif.abs() < 43200.0 {
            break;
        }
    }
    cand
}
