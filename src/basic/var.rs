//! Shared constants and record types for the B2b PPP-SSR decoder.

// satellite slot table size (PPP-B2b mask width)
pub const MAXSAT_SLOT: usize = 255;
// correction ring capacities
pub const MAXSSR: usize = 120;
pub const MAXMASK: usize = 16;

pub const CLIGHT: f64 = 299792458.0; // speed of light (m/s)

pub const SBF_SYNC1: u8 = 0x24; // '$'
pub const SBF_SYNC2: u8 = 0x40; // '@'
pub const SBF_HDR_LEN: usize = 8;
pub const SBF_ID_BDSRAWB2B: u16 = 4242;
// PRN of the BeiDou B2b PPP service satellite
pub const B2B_PPP_PRN: &str = "C59";
// receiver-internal idle/filler page prefix (hex of the nav words)
pub const NAVBITS_IDLE_PREFIX: &str = "EC0FC";
// nav payload: 31 big-endian 32-bit words
pub const B2B_NAV_WORDS: usize = 31;
pub const B2B_NAV_BYTES: usize = B2B_NAV_WORDS * 4;

// LDPC(162,81) over GF(64)
pub const LDPC_MAX_ITER: usize = 15;
pub const LDPC_NM_EMS: usize = 4;
pub const LDPC_ERR_PROB: f64 = 1e-5;

// PPP-B2b message body: 462 message bits + 24 CRC bits
pub const PPP_MSG_BITS: usize = 462;
pub const PPP_CRC_BITS: usize = 24;

// clock "correction unavailable" sentinel magnitude (m) and its tolerance
pub const CLK_UNAVAIL: f64 = 26.2128;
pub const CLK_UNAVAIL_TOL: f64 = 0.01;

// depth of the orbit-ring scan when cross-referencing clock IODCorr
pub const IODE_LOOKUP_DEPTH: usize = 7;

// emission cadence (s); 30 s in earlier deployments
pub const EMIT_CADENCE: f64 = 5.0;

// consecutive SBF CRC failures that force a resync from the buffer head
pub const MAX_CRC_RUN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GTime {
    pub time: i64,
    pub sec: f64,
}

/// One validated SBF frame.
#[derive(Debug, Clone)]
pub struct SbfBlock {
    pub block_type: u16,
    pub rev: u8,
    pub len: u16,
    pub payload: Vec<u8>,
}

/// One BDS Raw B2b navigation page (block 4242 payload).
#[derive(Debug, Clone)]
pub struct B2bPage {
    pub tow_ms: u32,
    pub week: u16,
    pub svid: u16,
    pub crc_passed: u8,
    pub source: u8,
    pub rx_channel: u8,
    pub navbits: [u8; B2B_NAV_BYTES],
}

impl B2bPage {
    /// TOW in whole seconds.
    pub fn tow(&self) -> u32 {
        self.tow_ms / 1000
    }
}

/// Satellite-mask table entry, keyed by (SSR, IODP).
#[derive(Debug, Clone)]
pub struct MaskEntry {
    pub ssr: u8,
    pub iodp: u8,
    pub cmake: [u8; MAXSAT_SLOT],
}

/// Orbit corrections for one (SSR, week, sow) epoch.
#[derive(Debug, Clone)]
pub struct OrbitSet {
    pub ssr: u8,
    pub bweek: i32,
    pub bsow: f64,
    pub rac: [[f64; 3]; MAXSAT_SLOT],
    pub ura: [f64; MAXSAT_SLOT],
    pub iode: [i32; MAXSAT_SLOT],
    pub iodcorr: [i32; MAXSAT_SLOT],
}

impl OrbitSet {
    pub fn new(ssr: u8, bweek: i32, bsow: f64) -> Self {
        OrbitSet {
            ssr,
            bweek,
            bsow,
            rac: [[0.0; 3]; MAXSAT_SLOT],
            ura: [0.0; MAXSAT_SLOT],
            iode: [-1; MAXSAT_SLOT],
            iodcorr: [-1; MAXSAT_SLOT],
        }
    }
}

/// Clock corrections for one (SSR, week, sow) epoch.
#[derive(Debug, Clone)]
pub struct ClockSet {
    pub ssr: u8,
    pub iodp: u8,
    pub bweek: i32,
    pub bsow: f64,
    pub c0: [f64; MAXSAT_SLOT],
    pub iode: [i32; MAXSAT_SLOT],
    pub iodcorr: [i32; MAXSAT_SLOT],
}

impl ClockSet {
    pub fn new(ssr: u8, iodp: u8, bweek: i32, bsow: f64) -> Self {
        ClockSet {
            ssr,
            iodp,
            bweek,
            bsow,
            c0: [0.0; MAXSAT_SLOT],
            iode: [-1; MAXSAT_SLOT],
            iodcorr: [-1; MAXSAT_SLOT],
        }
    }
}

/// Satellite identity in standard GNSS naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prn {
    pub sys: char,
    pub num: u8,
}

impl std::fmt::Display for Prn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.sys, self.num)
    }
}

/// Outbound orbit correction (radial/along/cross, satellite frame).
#[derive(Debug, Clone)]
pub struct OrbCorr {
    pub sta_id: String,
    pub prn: Prn,
    pub iod: i32,
    pub time: GTime,
    pub update_int: f64,
    pub xr: [f64; 3],
    pub dot_xr: [f64; 3],
}

/// Outbound clock correction (dClk in seconds).
#[derive(Debug, Clone)]
pub struct ClkCorr {
    pub sta_id: String,
    pub prn: Prn,
    pub iod: i32,
    pub time: GTime,
    pub update_int: f64,
    pub dclk: f64,
    pub dot_dclk: f64,
    pub dot_dot_dclk: f64,
}

/// Decoder tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    pub sta_id: String,
    pub cadence: f64,
    pub max_iter: usize,
    pub nm_ems: usize,
    pub err_prob: f64,
    pub experimental_combined: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sta_id: "B2B_SSR".to_string(),
            cadence: EMIT_CADENCE,
            max_iter: LDPC_MAX_ITER,
            nm_ems: LDPC_NM_EMS,
            err_prob: LDPC_ERR_PROB,
            experimental_combined: false,
        }
    }
}
