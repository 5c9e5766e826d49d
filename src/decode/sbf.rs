use crate::basic::bits::crc16_ccit;
use crate::basic::var::*;
use log::{debug, warn};

/// Outcome of one framing step.
#[derive(Debug, Clone)]
pub enum SbfEvent {
    Block(SbfBlock),
    CrcError { block_type: u16 },
}

/// Resynchronizing framer for the Septentrio Binary Format byte stream.
///
/// Frames are `$@ | crc(u16le) | id(u16le) | len(u16le) | payload`, with the
/// CRC computed over bytes `[4..len]`. Bytes that cannot start a valid frame
/// are discarded one at a time until the sync pair is found again.
pub struct SbfFramer {
    acc: Vec<u8>,
    crc_run: usize,
    pub frames_ok: u64,
    pub crc_errors: u64,
    pub bad_lengths: u64,
    pub sync_skipped: u64,
}

impl SbfFramer {
    pub fn new() -> Self {
        SbfFramer {
            acc: Vec::new(),
            crc_run: 0,
            frames_ok: 0,
            crc_errors: 0,
            bad_lengths: 0,
            sync_skipped: 0,
        }
    }

    /// Append raw bytes and return every complete frame now available.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SbfEvent> {
        self.acc.extend_from_slice(bytes);
        let mut events = Vec::new();
        let mut pos = 0usize;

        loop {
            // align to the sync pair
            while self.acc.len() - pos >= 2
                && !(self.acc[pos] == SBF_SYNC1 && self.acc[pos + 1] == SBF_SYNC2)
            {
                pos += 1;
                self.sync_skipped += 1;
            }
            if self.acc.len() - pos < SBF_HDR_LEN {
                break;
            }

            let buf = &self.acc[pos..];
            let len = u16::from_le_bytes([buf[6], buf[7]]) as usize;
            if len < SBF_HDR_LEN {
                // impossible length, the sync pair was a false hit
                self.bad_lengths += 1;
                pos += 2;
                continue;
            }
            if self.acc.len() - pos < len {
                break;
            }

            let frame = &self.acc[pos..pos + len];
            let id_rev = u16::from_le_bytes([frame[4], frame[5]]);
            let block_type = id_rev & 0x1FFF;
            let crc_field = u16::from_le_bytes([frame[2], frame[3]]);

            if crc16_ccit(&frame[4..len]) != crc_field {
                self.crc_errors += 1;
                self.crc_run += 1;
                warn!("SBF CRC error type={} len={}", block_type, len);
                events.push(SbfEvent::CrcError { block_type });
                if self.crc_run >= MAX_CRC_RUN {
                    // framing is lost: drop the sync pair and rescan instead
                    // of trusting the declared length
                    debug!("{} consecutive CRC failures, resyncing", self.crc_run);
                    self.crc_run = 0;
                    pos += 2;
                } else {
                    pos += len;
                }
                continue;
            }

            self.crc_run = 0;
            self.frames_ok += 1;
            events.push(SbfEvent::Block(SbfBlock {
                block_type,
                rev: (id_rev >> 13) as u8,
                len: len as u16,
                payload: frame[SBF_HDR_LEN..len].to_vec(),
            }));
            pos += len;
        }

        self.acc.drain(..pos);
        events
    }
}

impl Default for SbfFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one well-formed SBF frame around a payload (used by the offline
/// tooling and the test suite).
pub fn build_frame(block_type: u16, rev: u8, payload: &[u8]) -> Vec<u8> {
    let len = SBF_HDR_LEN + payload.len();
    let mut frame = vec![0u8; len];
    frame[0] = SBF_SYNC1;
    frame[1] = SBF_SYNC2;
    let id_rev = (block_type & 0x1FFF) | ((rev as u16) << 13);
    frame[4..6].copy_from_slice(&id_rev.to_le_bytes());
    frame[6..8].copy_from_slice(&(len as u16).to_le_bytes());
    frame[8..].copy_from_slice(payload);
    let crc = crc16_ccit(&frame[4..len]);
    frame[2..4].copy_from_slice(&crc.to_le_bytes());
    frame
}
