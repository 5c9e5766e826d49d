use crate::basic::sat::svid2prn;
use crate::basic::var::*;
use crate::decode::DecodeError;
use log::debug;

/// Extract a navigation page from a BDS Raw B2b (4242) block payload.
///
/// Multi-byte header fields are little-endian; the 31 nav words are carried
/// as 32-bit values starting at offset 12.
pub fn decode_b2b_page(payload: &[u8]) -> Result<B2bPage, DecodeError> {
    if payload.len() < 12 + B2B_NAV_BYTES {
        return Err(DecodeError::ShortFrame {
            want: 12 + B2B_NAV_BYTES,
            got: payload.len(),
        });
    }
    let mut navbits = [0u8; B2B_NAV_BYTES];
    navbits.copy_from_slice(&payload[12..12 + B2B_NAV_BYTES]);
    Ok(B2bPage {
        tow_ms: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        week: u16::from_le_bytes([payload[4], payload[5]]),
        svid: payload[6] as u16,
        crc_passed: payload[7],
        source: payload[9],
        rx_channel: payload[11],
        navbits,
    })
}

/// Hex rendering of the nav words: each 32-bit word is read little-endian
/// from the wire and printed as 8 uppercase digits, exactly as the receiver
/// view presents it. This string is the LDPC decoder input.
pub fn navbits_hex(page: &B2bPage) -> String {
    let mut hex = String::with_capacity(B2B_NAV_BYTES * 2);
    for w in page.navbits.chunks_exact(4) {
        let word = u32::from_le_bytes([w[0], w[1], w[2], w[3]]);
        hex.push_str(&format!("{:08X}", word));
    }
    hex
}

/// Page classification ahead of the LDPC stage.
pub enum PageGate {
    /// C59 page carrying PPP corrections.
    Ppp,
    /// Receiver idle/filler page, dropped silently.
    Idle,
    /// Some other satellite's page.
    OtherSvid(String),
}

pub fn gate_page(page: &B2bPage) -> PageGate {
    let prn = svid2prn(page.svid);
    if prn != B2B_PPP_PRN {
        return PageGate::OtherSvid(prn);
    }
    if navbits_hex(page)
        .to_ascii_uppercase()
        .starts_with(NAVBITS_IDLE_PREFIX)
    {
        debug!("skipping idle frame (EC0FC prefix)");
        return PageGate::Idle;
    }
    PageGate::Ppp
}
