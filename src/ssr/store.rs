//! Rolling state of PPP-B2b masks, orbit sets and clock sets, with the
//! IODCorr-to-IODE cross-reference between them.

use std::collections::VecDeque;

use crate::basic::sat::{satslot_prn, satslot_sys};
use crate::basic::time::{mjd2date, wksow2mjd, BDS2GPS_WEEK};
use crate::basic::var::*;
use crate::decode::ppp::OrbitSub;
use log::{debug, info};

/// Result summary of one clock ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockIngest {
    pub mask_found: bool,
    pub nslots: usize,
    pub nsentinel: usize,
}

/// Owner of the mask/orbit/clock tables. All three are bounded rings:
/// push-back, evict-front.
pub struct CorrectionStore {
    masks: VecDeque<MaskEntry>,
    orbits: VecDeque<OrbitSet>,
    clocks: VecDeque<ClockSet>,
}

impl CorrectionStore {
    pub fn new() -> Self {
        CorrectionStore {
            masks: VecDeque::with_capacity(MAXMASK),
            orbits: VecDeque::with_capacity(MAXSSR),
            clocks: VecDeque::with_capacity(MAXSSR),
        }
    }

    pub fn nmask(&self) -> usize {
        self.masks.len()
    }

    pub fn norbit(&self) -> usize {
        self.orbits.len()
    }

    pub fn nclock(&self) -> usize {
        self.clocks.len()
    }

    pub fn orbit(&self, idx: usize) -> &OrbitSet {
        &self.orbits[idx]
    }

    pub fn clock(&self, idx: usize) -> &ClockSet {
        &self.clocks[idx]
    }

    pub fn mask_by_iodp(&self, iodp: u8) -> Option<&MaskEntry> {
        self.masks.iter().find(|m| m.iodp == iodp)
    }

    /// Subtype-1 ingestion. Re-ingestion of a known (SSR, IODP) is a no-op.
    pub fn ingest_mask(&mut self, ssr: u8, iodp: u8, cmake: [u8; MAXSAT_SLOT]) -> bool {
        if self.masks.iter().any(|m| m.ssr == ssr && m.iodp == iodp) {
            return false;
        }
        if self.masks.len() >= MAXMASK {
            self.masks.pop_front();
        }
        self.masks.push_back(MaskEntry { ssr, iodp, cmake });
        let nsat = cmake.iter().filter(|&&b| b == 1).count();
        info!("MT1 MASK: SSR={} IODP={} nsat={}", ssr, iodp, nsat);
        true
    }

    /// Subtype-2 ingestion: merge the six sub-records into the set keyed by
    /// (SSR, week, sow), allocating it first if needed. Returns the index of
    /// the updated set.
    pub fn ingest_orbit(&mut self, ssr: u8, bweek: i32, bsow: f64, subs: &[OrbitSub]) -> usize {
        let ipos = self
            .orbits
            .iter()
            .position(|o| o.ssr == ssr && o.bweek == bweek && o.bsow as i64 == bsow as i64);

        let ipos = match ipos {
            Some(i) => i,
            None => {
                if self.orbits.len() >= MAXSSR {
                    self.orbits.pop_front();
                }
                self.orbits.push_back(OrbitSet::new(ssr, bweek, bsow));

                // the second fresh set for an issuer means the previous one
                // is complete; write it to the log
                let mut nsum = 0;
                let mut older = None;
                for (i, o) in self.orbits.iter().enumerate().rev() {
                    if o.ssr == ssr {
                        nsum += 1;
                        if nsum == 2 {
                            older = Some(i);
                        }
                    }
                }
                if let Some(i) = older {
                    self.log_orbit(i);
                }
                self.orbits.len() - 1
            }
        };

        let set = &mut self.orbits[ipos];
        for sub in subs {
            if sub.ura == 0.0 {
                continue;
            }
            let slot = sub.satslot as usize;
            if !(1..=MAXSAT_SLOT).contains(&slot) {
                continue;
            }
            set.rac[slot - 1] = [sub.radial, sub.along, sub.cross];
            set.iodcorr[slot - 1] = sub.iodcorr as i32;
            set.iode[slot - 1] = sub.iodn as i32;
            set.ura[slot - 1] = sub.ura;
        }
        debug!("MT2 ORBIT processed for SSR={}", ssr);
        ipos
    }

    /// Subtype-4 ingestion: mask-addressed clock records merged into the set
    /// keyed by (SSR, week, sow). Returns the set index and a summary.
    pub fn ingest_clock(
        &mut self,
        ssr: u8,
        iodp: u8,
        bweek: i32,
        bsow: f64,
        subtype1: u8,
        iodcorr: &[u8; 23],
        c0: &[f64; 23],
    ) -> (usize, ClockIngest) {
        let ipos = self
            .clocks
            .iter()
            .position(|c| c.ssr == ssr && c.bweek == bweek && c.bsow as i64 == bsow as i64);
        let ipos = match ipos {
            Some(i) => i,
            None => {
                if self.clocks.len() >= MAXSSR {
                    self.clocks.pop_front();
                }
                self.clocks.push_back(ClockSet::new(ssr, iodp, bweek, bsow));
                self.clocks.len() - 1
            }
        };

        let mask = self
            .masks
            .iter()
            .find(|m| m.iodp == self.clocks[ipos].iodp)
            .cloned();
        let mut summary = ClockIngest {
            mask_found: mask.is_some(),
            ..Default::default()
        };

        if let Some(mask) = mask {
            // collect the IODE lookups first: the orbit ring is read-only
            // here while the clock set is being written
            let mut updates: Vec<(usize, f64, Option<(i32, i32)>)> = Vec::new();
            for i in 0..23 {
                let slot = match subtype_prn(&mask.cmake, subtype1, i + 1) {
                    Some(s) => s,
                    None => continue,
                };
                if (c0[i].abs() - CLK_UNAVAIL).abs() < CLK_UNAVAIL_TOL {
                    summary.nsentinel += 1;
                    updates.push((slot, c0[i], None));
                    continue;
                }
                let iodc = iodcorr[i] as i32;
                let iode = self.lookup_iode(ssr, slot, iodc);
                updates.push((slot, c0[i], Some((iodc, iode))));
            }
            let set = &mut self.clocks[ipos];
            for (slot, c, iods) in updates {
                set.c0[slot] = c;
                if let Some((iodc, iode)) = iods {
                    set.iodcorr[slot] = iodc;
                    set.iode[slot] = iode;
                    summary.nslots += 1;
                }
            }
        }

        self.log_clock(ipos);
        debug!("MT4 CLOCK processed for SSR={}", ssr);
        (ipos, summary)
    }

    /// Clock ingestion with explicit satellite slots (combined subtype 7,
    /// experimental). Same sentinel and cross-reference rules as the
    /// mask-addressed path.
    pub fn ingest_clock_explicit(
        &mut self,
        ssr: u8,
        iodp: u8,
        bweek: i32,
        bsow: f64,
        records: &[(u16, u8, f64)],
    ) -> (usize, ClockIngest) {
        let ipos = self
            .clocks
            .iter()
            .position(|c| c.ssr == ssr && c.bweek == bweek && c.bsow as i64 == bsow as i64);
        let ipos = match ipos {
            Some(i) => i,
            None => {
                if self.clocks.len() >= MAXSSR {
                    self.clocks.pop_front();
                }
                self.clocks.push_back(ClockSet::new(ssr, iodp, bweek, bsow));
                self.clocks.len() - 1
            }
        };

        let mut summary = ClockIngest {
            mask_found: true,
            ..Default::default()
        };
        let mut updates: Vec<(usize, f64, Option<(i32, i32)>)> = Vec::new();
        for &(satslot, iodcorr, c0) in records {
            let slot = satslot as usize;
            if !(1..=MAXSAT_SLOT).contains(&slot) {
                continue;
            }
            if (c0.abs() - CLK_UNAVAIL).abs() < CLK_UNAVAIL_TOL {
                summary.nsentinel += 1;
                updates.push((slot - 1, c0, None));
                continue;
            }
            let iodc = iodcorr as i32;
            let iode = self.lookup_iode(ssr, slot - 1, iodc);
            updates.push((slot - 1, c0, Some((iodc, iode))));
        }
        let set = &mut self.clocks[ipos];
        for (slot, c, iods) in updates {
            set.c0[slot] = c;
            if let Some((iodc, iode)) = iods {
                set.iodcorr[slot] = iodc;
                set.iode[slot] = iode;
                summary.nslots += 1;
            }
        }
        (ipos, summary)
    }

    /// Find the IODE recorded by a recent orbit set of the same issuer whose
    /// IODCorr at this slot matches; the scan covers the newest entries of
    /// the orbit ring, at most `IODE_LOOKUP_DEPTH` of this issuer.
    pub fn lookup_iode(&self, ssr: u8, slot: usize, iodcorr: i32) -> i32 {
        let mut seen = 0;
        for o in self.orbits.iter().rev() {
            if o.ssr != ssr {
                continue;
            }
            if o.iodcorr[slot] == iodcorr {
                return o.iode[slot];
            }
            seen += 1;
            if seen >= IODE_LOOKUP_DEPTH {
                break;
            }
        }
        -1
    }

    fn log_orbit(&self, idx: usize) {
        let set = &self.orbits[idx];
        let (mjd, sod) = wksow2mjd(set.bweek + BDS2GPS_WEEK, set.bsow);
        let (y, mo, d, h, mi, s) = mjd2date(mjd, sod);
        let nsat = set.iode.iter().filter(|&&e| e != -1).count();
        info!(
            "> ORBIT {:04} {:02} {:02} {:02} {:02} {:4.1} {} {} CLK01",
            y, mo, d, h, mi, s, 2, nsat
        );
        for isat in 0..MAXSAT_SLOT {
            if set.iode[isat] == -1 {
                continue;
            }
            let (sys, prn) = match (satslot_sys(isat + 1), satslot_prn(isat + 1)) {
                (Some(sys), Some(prn)) => (sys, prn),
                _ => continue,
            };
            info!(
                "{}{:02} {:10} {:11.4} {:11.4} {:11.4} {:11.4} {:11.4} {:11.4}",
                sys,
                prn,
                set.iode[isat],
                set.rac[isat][0],
                set.rac[isat][1],
                set.rac[isat][2],
                0.0,
                0.0,
                0.0
            );
        }
    }

    fn log_clock(&self, idx: usize) {
        let set = &self.clocks[idx];
        let (mjd, sod) = wksow2mjd(set.bweek + BDS2GPS_WEEK, set.bsow);
        let (y, mo, d, h, mi, s) = mjd2date(mjd, sod);
        let nsat = set.iode.iter().filter(|&&e| e != -1).count();
        debug!(
            "> CLOCK {:04} {:02} {:02} {:02} {:02} {:4.1} {} {} CLK01",
            y, mo, d, h, mi, s, 2, nsat
        );
        for isat in 0..MAXSAT_SLOT {
            if set.iode[isat] == -1 {
                continue;
            }
            let (sys, prn) = match (satslot_sys(isat + 1), satslot_prn(isat + 1)) {
                (Some(sys), Some(prn)) => (sys, prn),
                _ => continue,
            };
            debug!(
                "{}{:02} {:10} {:11.4} {:11.4} {:11.4}",
                sys, prn, set.iode[isat], set.c0[isat], 0.0, 0.0
            );
        }
    }
}

impl Default for CorrectionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of the `(subtype1 * 23 + ix)`-th set bit of the mask, 0-based.
pub fn subtype_prn(cmake: &[u8; MAXSAT_SLOT], subtype1: u8, ix: usize) -> Option<usize> {
    let want = subtype1 as usize * 23 + ix;
    let mut count = 0;
    for (i, &m) in cmake.iter().enumerate() {
        if m == 1 {
            count += 1;
        }
        if count == want && m == 1 {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(slots: &[usize]) -> [u8; MAXSAT_SLOT] {
        let mut cmake = [0u8; MAXSAT_SLOT];
        for &s in slots {
            cmake[s - 1] = 1;
        }
        cmake
    }

    fn orbit_sub(slot: u16, iodn: u16, iodcorr: u8) -> OrbitSub {
        OrbitSub {
            satslot: slot,
            iodn,
            iodcorr,
            radial: 0.1,
            along: 0.2,
            cross: 0.3,
            ura_class: 1,
            ura_value: 0,
            ura: 2.0,
        }
    }

    #[test]
    fn test_subtype_prn_search() {
        let cmake = mask_with(&[1, 2, 5, 9, 60]);
        // first set bit is slot 1 (index 0)
        assert_eq!(subtype_prn(&cmake, 0, 1), Some(0));
        assert_eq!(subtype_prn(&cmake, 0, 2), Some(1));
        assert_eq!(subtype_prn(&cmake, 0, 3), Some(4));
        assert_eq!(subtype_prn(&cmake, 0, 5), Some(59));
        assert_eq!(subtype_prn(&cmake, 0, 6), None);
        // subtype1 offsets by 23 set bits; only 5 set, so nothing resolves
        assert_eq!(subtype_prn(&cmake, 1, 1), None);
    }

    #[test]
    fn test_mask_dedup_and_fifo() {
        let mut store = CorrectionStore::new();
        assert!(store.ingest_mask(1, 3, mask_with(&[1, 2])));
        // same (SSR, IODP) again: no-op
        assert!(!store.ingest_mask(1, 3, mask_with(&[1, 2])));
        assert_eq!(store.nmask(), 1);
        // fill to capacity and one beyond
        for i in 0..MAXMASK as u8 {
            store.ingest_mask(2, i, mask_with(&[1]));
        }
        assert_eq!(store.nmask(), MAXMASK);
        // oldest (1,3) was displaced
        assert!(!store.masks.iter().any(|m| m.ssr == 1 && m.iodp == 3));
    }

    #[test]
    fn test_orbit_merge_by_key() {
        let mut store = CorrectionStore::new();
        let i1 = store.ingest_orbit(0, 900, 100.0, &[orbit_sub(5, 77, 2)]);
        let i2 = store.ingest_orbit(0, 900, 100.0, &[orbit_sub(6, 78, 3)]);
        assert_eq!(i1, i2);
        assert_eq!(store.norbit(), 1);
        let set = store.orbit(i1);
        assert_eq!(set.iode[4], 77);
        assert_eq!(set.iode[5], 78);
        // different sow allocates a fresh set
        store.ingest_orbit(0, 900, 105.0, &[orbit_sub(5, 79, 3)]);
        assert_eq!(store.norbit(), 2);
    }

    #[test]
    fn test_orbit_empty_sub_skipped() {
        let mut store = CorrectionStore::new();
        let mut sub = orbit_sub(5, 77, 2);
        sub.ura = 0.0;
        let idx = store.ingest_orbit(0, 900, 100.0, &[sub]);
        assert_eq!(store.orbit(idx).iode[4], -1);
    }

    #[test]
    fn test_orbit_ring_fifo() {
        let mut store = CorrectionStore::new();
        for i in 0..MAXSSR + 1 {
            store.ingest_orbit(0, 900, i as f64, &[orbit_sub(1, i as u16, 1)]);
        }
        assert_eq!(store.norbit(), MAXSSR);
        // the sow=0 set was displaced by the 121st insertion
        assert!(store.orbits.iter().all(|o| o.bsow as i64 != 0));
    }

    #[test]
    fn test_clock_iode_crossref() {
        let mut store = CorrectionStore::new();
        store.ingest_mask(0, 3, mask_with(&[1, 2, 3]));
        store.ingest_orbit(0, 900, 100.0, &[orbit_sub(1, 501, 2), orbit_sub(2, 502, 4)]);

        let mut iodcorr = [0u8; 23];
        let mut c0 = [0.0f64; 23];
        iodcorr[0] = 2; // slot 1, matches orbit iodcorr 2
        iodcorr[1] = 4; // slot 2, matches orbit iodcorr 4
        iodcorr[2] = 7; // slot 3, no orbit entry
        c0[0] = 0.5;
        c0[1] = -0.3;
        c0[2] = 0.1;
        let (idx, summary) = store.ingest_clock(0, 3, 900, 100.0, 0, &iodcorr, &c0);
        assert!(summary.mask_found);
        // only the three mask slots resolve; records 4..23 fall off the mask
        assert_eq!(summary.nslots, 3);
        let set = store.clock(idx);
        assert_eq!(set.iode[0], 501);
        assert_eq!(set.iode[1], 502);
        assert_eq!(set.iode[2], -1);
        assert!((set.c0[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_clock_without_mask_is_skipped() {
        let mut store = CorrectionStore::new();
        let iodcorr = [0u8; 23];
        let c0 = [0.1f64; 23];
        let (idx, summary) = store.ingest_clock(0, 9, 900, 100.0, 0, &iodcorr, &c0);
        assert!(!summary.mask_found);
        assert_eq!(summary.nslots, 0);
        assert!(store.clock(idx).iode.iter().all(|&e| e == -1));
    }

    #[test]
    fn test_clock_sentinel_suppression() {
        let mut store = CorrectionStore::new();
        store.ingest_mask(0, 3, mask_with(&[1, 2]));
        store.ingest_orbit(0, 900, 100.0, &[orbit_sub(1, 501, 2), orbit_sub(2, 502, 4)]);
        let mut iodcorr = [0u8; 23];
        iodcorr[0] = 2;
        iodcorr[1] = 4;
        let mut c0 = [0.0f64; 23];
        c0[0] = CLK_UNAVAIL; // unavailable
        c0[1] = -CLK_UNAVAIL; // negative form of the sentinel
        let (idx, summary) = store.ingest_clock(0, 3, 900, 100.0, 0, &iodcorr, &c0);
        assert_eq!(summary.nsentinel, 2);
        let set = store.clock(idx);
        // C0 recorded but IODs untouched
        assert_eq!(set.iodcorr[0], -1);
        assert_eq!(set.iode[0], -1);
        assert_eq!(set.iodcorr[1], -1);
    }

    #[test]
    fn test_iode_lookup_depth() {
        let mut store = CorrectionStore::new();
        // oldest set has the matching iodcorr at slot 1
        store.ingest_orbit(0, 900, 0.0, &[orbit_sub(1, 400, 5)]);
        // bury it under IODE_LOOKUP_DEPTH newer sets without a match
        for i in 1..=IODE_LOOKUP_DEPTH {
            store.ingest_orbit(0, 900, i as f64, &[orbit_sub(2, 400 + i as u16, 1)]);
        }
        assert_eq!(store.lookup_iode(0, 0, 5), -1);
        // within the window it resolves
        let mut store = CorrectionStore::new();
        store.ingest_orbit(0, 900, 0.0, &[orbit_sub(1, 400, 5)]);
        for i in 1..IODE_LOOKUP_DEPTH {
            store.ingest_orbit(0, 900, i as f64, &[orbit_sub(2, 400 + i as u16, 1)]);
        }
        assert_eq!(store.lookup_iode(0, 0, 5), 400);
    }

    #[test]
    fn test_iode_lookup_other_ssr_ignored() {
        let mut store = CorrectionStore::new();
        store.ingest_orbit(1, 900, 0.0, &[orbit_sub(1, 400, 5)]);
        assert_eq!(store.lookup_iode(0, 0, 5), -1);
        assert_eq!(store.lookup_iode(1, 0, 5), 400);
    }
}
