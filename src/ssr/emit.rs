//! Cadence-based publication of accumulated corrections.

use crate::basic::sat::satslot2prn;
use crate::basic::time::{time2str, timediff};
use crate::basic::var::*;
use log::info;
use std::io::Write;
use tokio::sync::mpsc;

/// Downstream consumer of emitted correction batches.
pub trait CorrSink {
    fn publish_orb(&mut self, corrs: Vec<OrbCorr>);
    fn publish_clk(&mut self, corrs: Vec<ClkCorr>);
}

/// Accumulates per-satellite corrections between emissions and flushes both
/// lists whenever the page time has advanced by at least the cadence.
pub struct Emitter {
    sta_id: String,
    cadence: f64,
    pending_orb: Vec<OrbCorr>,
    pending_clk: Vec<ClkCorr>,
    last_emit: Option<GTime>,
    pub nemit: u64,
}

impl Emitter {
    pub fn new(sta_id: &str, cadence: f64) -> Self {
        Emitter {
            sta_id: sta_id.to_string(),
            cadence,
            pending_orb: Vec::new(),
            pending_clk: Vec::new(),
            last_emit: None,
            nemit: 0,
        }
    }

    pub fn npending(&self) -> (usize, usize) {
        (self.pending_orb.len(), self.pending_clk.len())
    }

    /// Queue one orbit correction per populated slot of the set.
    pub fn push_orbit(&mut self, set: &OrbitSet, time: GTime) {
        for isat in 0..MAXSAT_SLOT {
            if set.iode[isat] == -1 {
                continue;
            }
            let prn = match satslot2prn(isat + 1) {
                Some(p) => p,
                None => continue,
            };
            self.pending_orb.push(OrbCorr {
                sta_id: self.sta_id.clone(),
                prn,
                iod: set.iode[isat],
                time,
                update_int: 0.0,
                xr: set.rac[isat],
                dot_xr: [0.0; 3],
            });
        }
    }

    /// Queue one clock correction per resolved slot of the set.
    pub fn push_clock(&mut self, set: &ClockSet, time: GTime) {
        for isat in 0..MAXSAT_SLOT {
            if set.iode[isat] == -1 {
                continue;
            }
            let prn = match satslot2prn(isat + 1) {
                Some(p) => p,
                None => continue,
            };
            self.pending_clk.push(ClkCorr {
                sta_id: self.sta_id.clone(),
                prn,
                iod: set.iode[isat],
                time,
                update_int: 0.0,
                dclk: set.c0[isat] / CLIGHT,
                dot_dclk: 0.0,
                dot_dot_dclk: 0.0,
            });
        }
    }

    /// Emit when the page time has moved a full cadence past the last
    /// emission. The first call only arms the timer. Returns the number of
    /// (orbit, clock) items published.
    pub fn check_emit(&mut self, time: GTime, sink: &mut dyn CorrSink) -> (usize, usize) {
        let last = match self.last_emit {
            Some(t) => t,
            None => {
                self.last_emit = Some(time);
                return (0, 0);
            }
        };
        if timediff(time, last).abs() < self.cadence {
            return (0, 0);
        }

        let mut counts = (0, 0);
        if !self.pending_orb.is_empty() {
            let mut batch = std::mem::take(&mut self.pending_orb);
            for c in batch.iter_mut() {
                c.time = time;
            }
            counts.0 = batch.len();
            info!("newOrbCorrections: {} items at {}", batch.len(), time2str(time));
            sink.publish_orb(batch);
        }
        if !self.pending_clk.is_empty() {
            let mut batch = std::mem::take(&mut self.pending_clk);
            for c in batch.iter_mut() {
                c.time = time;
            }
            counts.1 = batch.len();
            info!("newClkCorrections: {} items at {}", batch.len(), time2str(time));
            sink.publish_clk(batch);
        }
        self.last_emit = Some(time);
        self.nemit += 1;
        counts
    }
}

/// Sink handing batches to tokio channels, for a host that consumes
/// corrections on another task.
pub struct ChannelSink {
    pub orb_tx: mpsc::UnboundedSender<Vec<OrbCorr>>,
    pub clk_tx: mpsc::UnboundedSender<Vec<ClkCorr>>,
}

impl ChannelSink {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<Vec<OrbCorr>>,
        mpsc::UnboundedReceiver<Vec<ClkCorr>>,
    ) {
        let (orb_tx, orb_rx) = mpsc::unbounded_channel();
        let (clk_tx, clk_rx) = mpsc::unbounded_channel();
        (ChannelSink { orb_tx, clk_tx }, orb_rx, clk_rx)
    }
}

impl CorrSink for ChannelSink {
    fn publish_orb(&mut self, corrs: Vec<OrbCorr>) {
        let _ = self.orb_tx.send(corrs);
    }

    fn publish_clk(&mut self, corrs: Vec<ClkCorr>) {
        let _ = self.clk_tx.send(corrs);
    }
}

/// Sink writing epoch blocks as text, used by the offline CLI.
pub struct WriterSink<W: Write> {
    pub out: W,
}

impl<W: Write> CorrSink for WriterSink<W> {
    fn publish_orb(&mut self, corrs: Vec<OrbCorr>) {
        if corrs.is_empty() {
            return;
        }
        let _ = writeln!(
            self.out,
            "> ORBIT {} {}",
            time2str(corrs[0].time),
            corrs.len()
        );
        for c in &corrs {
            let _ = writeln!(
                self.out,
                "{} {:10} {:11.4} {:11.4} {:11.4}",
                c.prn, c.iod, c.xr[0], c.xr[1], c.xr[2]
            );
        }
    }

    fn publish_clk(&mut self, corrs: Vec<ClkCorr>) {
        if corrs.is_empty() {
            return;
        }
        let _ = writeln!(
            self.out,
            "> CLOCK {} {}",
            time2str(corrs[0].time),
            corrs.len()
        );
        for c in &corrs {
            let _ = writeln!(self.out, "{} {:10} {:14.6e}", c.prn, c.iod, c.dclk);
        }
    }
}
