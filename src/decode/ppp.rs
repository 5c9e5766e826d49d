//! Bit-field parser for PPP-B2b message subtypes 1-7.

use crate::basic::bits::{getbits, getbitu};
use crate::basic::var::*;
use crate::decode::DecodeError;

// field scale factors (m)
const SCALE_RADIAL: f64 = 0.0016;
const SCALE_TANGENTIAL: f64 = 0.0064;
const SCALE_C0: f64 = 0.0016;
const SCALE_CBIAS: f64 = 0.017;

/// One orbit sub-record (subtypes 2, 6, 7).
#[derive(Debug, Clone, Copy, Default)]
pub struct OrbitSub {
    pub satslot: u16,
    pub iodn: u16,
    pub iodcorr: u8,
    pub radial: f64,
    pub along: f64,
    pub cross: f64,
    pub ura_class: u8,
    pub ura_value: u8,
    pub ura: f64,
}

/// One code-bias record (subtype 3).
#[derive(Debug, Clone, Default)]
pub struct CbiasRec {
    pub satslot: u16,
    pub pattern: Vec<u8>,
    pub deviation: Vec<f64>,
}

/// Clock sub-block shared by subtypes 6 and 7.
#[derive(Debug, Clone)]
pub struct CombinedClock {
    pub toc: u32,
    pub dev: u8,
    pub iod_ssr: u8,
    pub iodp: u8,
    pub slot_s: u16,
    pub satslot: Vec<u16>,
    pub iodcorr: Vec<u8>,
    pub c0: Vec<f64>,
}

/// Orbit sub-block shared by subtypes 6 and 7.
#[derive(Debug, Clone)]
pub struct CombinedOrbit {
    pub tot: u32,
    pub dev: u8,
    pub iod_ssr: u8,
    pub subs: Vec<OrbitSub>,
}

/// Message body, discriminated by the 6-bit subtype.
#[derive(Debug, Clone)]
pub enum PppBody {
    /// subtype 1: satellite mask
    Mask { iodp: u8, cmake: [u8; MAXSAT_SLOT] },
    /// subtype 2: orbit corrections, six fixed sub-records
    Orbit { subs: [OrbitSub; 6] },
    /// subtype 3: differential code biases
    Cbias { recs: Vec<CbiasRec> },
    /// subtype 4: clock corrections, 23 mask-addressed records
    Clock {
        iodp: u8,
        subtype1: u8,
        iodcorr: [u8; 23],
        c0: [f64; 23],
        rev: u16,
    },
    /// subtype 5: user range accuracy, 70 mask-addressed records
    Ura {
        iodp: u8,
        subtype2: u8,
        ura_class: [u8; 70],
        ura_value: [u8; 70],
    },
    /// subtypes 6/7: combined clock+orbit (experimental ingestion)
    Combined {
        numc: u8,
        numo: u8,
        clock: CombinedClock,
        orbit: CombinedOrbit,
        slot_explicit: bool,
    },
    /// subtypes 8..=63: reserved, passed through silently
    Reserved,
}

/// Parsed PPP-B2b frame: common envelope plus the subtype body.
#[derive(Debug, Clone)]
pub struct PppFrame {
    pub mestype: u8,
    pub bdssod: u32,
    pub nudata: u8,
    pub ssr: u8,
    pub crc: u32,
    pub body: PppBody,
}

fn parse_orbit_sub(buf: &[u8], r: &mut usize) -> OrbitSub {
    let satslot = getbitu(buf, *r, 9) as u16;
    *r += 9;
    let iodn = getbitu(buf, *r, 10) as u16;
    *r += 10;
    let iodcorr = getbitu(buf, *r, 3) as u8;
    *r += 3;
    let radial = getbits(buf, *r, 15) as f64 * SCALE_RADIAL;
    *r += 15;
    let along = getbits(buf, *r, 13) as f64 * SCALE_TANGENTIAL;
    *r += 13;
    let cross = getbits(buf, *r, 13) as f64 * SCALE_TANGENTIAL;
    *r += 13;
    let ura_class = getbitu(buf, *r, 3) as u8;
    *r += 3;
    let ura_value = getbitu(buf, *r, 3) as u8;
    *r += 3;
    let ura = 3f64.powi(ura_class as i32) * (1.0 + 0.25 * ura_value as f64) - 1.0;
    OrbitSub {
        satslot,
        iodn,
        iodcorr,
        radial,
        along,
        cross,
        ura_class,
        ura_value,
        ura,
    }
}

fn parse_combined(buf: &[u8], slot_explicit: bool) -> PppBody {
    let mut r = 29usize;
    let numc = getbitu(buf, r, 5) as u8;
    r += 5;
    let numo = getbitu(buf, r, 3) as u8;
    r += 3;

    let toc = getbitu(buf, r, 17);
    r += 17;
    let dev = getbitu(buf, r, 4) as u8;
    r += 4;
    let iod_ssr = getbitu(buf, r, 2) as u8;
    r += 2;
    let (iodp, slot_s) = if slot_explicit {
        (0, 0)
    } else {
        let iodp = getbitu(buf, r, 4) as u8;
        r += 4;
        let slot_s = getbitu(buf, r, 9) as u16;
        r += 9;
        (iodp, slot_s)
    };

    let nclk = (numc as usize).min(22);
    let mut satslot = Vec::with_capacity(nclk);
    let mut iodcorr = Vec::with_capacity(nclk);
    let mut c0 = Vec::with_capacity(nclk);
    for _ in 0..nclk {
        if slot_explicit {
            satslot.push(getbitu(buf, r, 9) as u16);
            r += 9;
        }
        iodcorr.push(getbitu(buf, r, 3) as u8);
        r += 3;
        c0.push(getbits(buf, r, 15) as f64 * SCALE_C0);
        r += 15;
    }
    let clock = CombinedClock {
        toc,
        dev,
        iod_ssr,
        iodp,
        slot_s,
        satslot,
        iodcorr,
        c0,
    };

    let tot = getbitu(buf, r, 17);
    r += 17;
    let odev = getbitu(buf, r, 4) as u8;
    r += 4;
    let oiod_ssr = getbitu(buf, r, 2) as u8;
    r += 2;
    let norb = (numo as usize).min(6);
    let mut subs = Vec::with_capacity(norb);
    for _ in 0..norb {
        subs.push(parse_orbit_sub(buf, &mut r));
    }
    let orbit = CombinedOrbit {
        tot,
        dev: odev,
        iod_ssr: oiod_ssr,
        subs,
    };

    PppBody::Combined {
        numc,
        numo,
        clock,
        orbit,
        slot_explicit,
    }
}

/// Parse the first 486 bits (462 message + 24 CRC) of a decoded page.
pub fn parse_ppp(buf: &[u8]) -> Result<PppFrame, DecodeError> {
    if buf.len() * 8 < PPP_MSG_BITS + PPP_CRC_BITS {
        return Err(DecodeError::ShortFrame {
            want: (PPP_MSG_BITS + PPP_CRC_BITS + 7) / 8,
            got: buf.len(),
        });
    }

    // zero-padded scratch: count fields may send the cursor past the
    // message end, and those reads must yield zeros
    let mut data = [0u8; 1024];
    let n = buf.len().min(data.len());
    data[..n].copy_from_slice(&buf[..n]);
    let buf = &data[..];

    let mestype = getbitu(buf, 0, 6) as u8;
    let bdssod = getbitu(buf, 6, 17);
    let nudata = getbitu(buf, 23, 4) as u8;
    let ssr = getbitu(buf, 27, 2) as u8;
    let crc = getbitu(buf, PPP_MSG_BITS, PPP_CRC_BITS);

    let body = match mestype {
        1 => {
            let iodp = getbitu(buf, 29, 4) as u8;
            let mut cmake = [0u8; MAXSAT_SLOT];
            for (a, m) in cmake.iter_mut().enumerate() {
                *m = getbitu(buf, 33 + a, 1) as u8;
            }
            PppBody::Mask { iodp, cmake }
        }
        2 => {
            let mut r = 29usize;
            let mut subs = [OrbitSub::default(); 6];
            for sub in subs.iter_mut() {
                *sub = parse_orbit_sub(buf, &mut r);
            }
            PppBody::Orbit { subs }
        }
        3 => {
            let mut r = 29usize;
            let num = getbitu(buf, r, 5) as usize;
            r += 5;
            let mut recs = Vec::with_capacity(num.min(31));
            for _ in 0..num.min(31) {
                let satslot = getbitu(buf, r, 9) as u16;
                r += 9;
                let num4 = getbitu(buf, r, 4) as usize;
                r += 4;
                let mut pattern = Vec::with_capacity(num4);
                let mut deviation = Vec::with_capacity(num4);
                for _ in 0..num4 {
                    pattern.push(getbitu(buf, r, 4) as u8);
                    r += 4;
                    deviation.push(getbits(buf, r, 12) as f64 * SCALE_CBIAS);
                    r += 12;
                }
                recs.push(CbiasRec {
                    satslot,
                    pattern,
                    deviation,
                });
            }
            PppBody::Cbias { recs }
        }
        4 => {
            let mut r = 29usize;
            let iodp = getbitu(buf, r, 4) as u8;
            r += 4;
            let subtype1 = getbitu(buf, r, 5) as u8;
            r += 5;
            let mut iodcorr = [0u8; 23];
            let mut c0 = [0.0f64; 23];
            for a in 0..23 {
                iodcorr[a] = getbitu(buf, r, 3) as u8;
                r += 3;
                c0[a] = getbits(buf, r, 15) as f64 * SCALE_C0;
                r += 15;
            }
            let rev = getbitu(buf, r, 10) as u16;
            PppBody::Clock {
                iodp,
                subtype1,
                iodcorr,
                c0,
                rev,
            }
        }
        5 => {
            let mut r = 29usize;
            let iodp = getbitu(buf, r, 4) as u8;
            r += 4;
            let subtype2 = getbitu(buf, r, 3) as u8;
            r += 3;
            let mut ura_class = [0u8; 70];
            let mut ura_value = [0u8; 70];
            for a in 0..70 {
                ura_class[a] = getbitu(buf, r, 3) as u8;
                r += 3;
                ura_value[a] = getbitu(buf, r, 3) as u8;
                r += 3;
            }
            PppBody::Ura {
                iodp,
                subtype2,
                ura_class,
                ura_value,
            }
        }
        6 => parse_combined(buf, false),
        7 => parse_combined(buf, true),
        8..=63 => PppBody::Reserved,
        _ => return Err(DecodeError::UnknownSubtype(mestype)),
    };

    Ok(PppFrame {
        mestype,
        bdssod,
        nudata,
        ssr,
        crc,
        body,
    })
}
