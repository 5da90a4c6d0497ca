//! PPS health monitoring.
//!
//! Tracks the drift of the concentrator counter against the GPS PPS edge,
//! rejects implausible latches, widens the tolerance once under sustained
//! rejection, and escalates to process exit when the time domain cannot be
//! trusted. Also drives the PPS-loss recovery sequence (GPS toggle, bounded
//! retries).

use crate::constants::{
    DRIFT_FATAL_AT, DRIFT_TOLERANCE_PPM, DRIFT_TOLERANCE_WIDE_PPM, DRIFT_WIDEN_AT,
    PPS_INTERVAL_US, PPS_LOSS_TIMEOUT, PPS_MAX_RESETS, PPS_RESET_RETRY,
};
use std::time::Instant;

/// Outcome of one PPS latch observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PpsVerdict {
    /// First latch of this session; no drift computable yet.
    First,
    /// Latch did not advance since the last poll.
    Unchanged,
    Accepted { drift_ppm: f64 },
    Rejected { drift_ppm: f64 },
    /// Drift rejections exceeded the fatal threshold.
    Fatal,
}

/// What the caller must do about PPS loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpsAction {
    None,
    /// Toggle the HAL GPS enable (off, then on).
    ToggleGps,
    /// Recovery failed too often; exit the process.
    Fatal,
}

#[derive(Debug)]
pub struct PpsMonitor {
    last_latch_ext_us: Option<i64>,
    ema_ppm: Option<f64>,
    tolerance_ppm: f64,
    widened: bool,
    consec_rejects: u32,
    last_valid: Instant,
    resets: u32,
    last_reset: Option<Instant>,
}

impl PpsMonitor {
    pub fn new(now: Instant) -> Self {
        PpsMonitor {
            last_latch_ext_us: None,
            ema_ppm: None,
            tolerance_ppm: DRIFT_TOLERANCE_PPM,
            widened: false,
            consec_rejects: 0,
            last_valid: now,
            resets: 0,
            last_reset: None,
        }
    }

    /// Clears all drift statistics (slave restart).
    pub fn reset_stats(&mut self, now: Instant) {
        *self = PpsMonitor::new(now);
    }

    pub fn drift_ppm(&self) -> Option<f64> {
        self.ema_ppm
    }

    /// Feeds one latched counter value (extended to 64-bit, session-local).
    pub fn observe(&mut self, latch_ext_us: i64, now: Instant) -> PpsVerdict {
        let Some(prev) = self.last_latch_ext_us else {
            self.last_latch_ext_us = Some(latch_ext_us);
            self.last_valid = now;
            self.resets = 0;
            self.last_reset = None;
            return PpsVerdict::First;
        };
        if latch_ext_us == prev {
            return PpsVerdict::Unchanged;
        }
        let delta = latch_ext_us - prev;
        // One or more whole PPS intervals may have elapsed between polls.
        let intervals = ((delta + PPS_INTERVAL_US / 2) / PPS_INTERVAL_US).max(1);
        let drift_ppm = (delta - intervals * PPS_INTERVAL_US) as f64 / intervals as f64;

        let spread = match self.ema_ppm {
            Some(ema) => (drift_ppm - ema).abs(),
            None => drift_ppm.abs(),
        };
        if spread > self.tolerance_ppm {
            self.consec_rejects += 1;
            self.last_latch_ext_us = Some(latch_ext_us);
            if self.consec_rejects >= DRIFT_FATAL_AT {
                return PpsVerdict::Fatal;
            }
            if self.consec_rejects >= DRIFT_WIDEN_AT && !self.widened {
                self.widened = true;
                self.tolerance_ppm = DRIFT_TOLERANCE_WIDE_PPM;
            }
            return PpsVerdict::Rejected { drift_ppm };
        }

        self.ema_ppm = Some(match self.ema_ppm {
            Some(ema) => ema + (drift_ppm - ema) / 8.0,
            None => drift_ppm,
        });
        self.consec_rejects = 0;
        self.last_latch_ext_us = Some(latch_ext_us);
        self.last_valid = now;
        self.resets = 0;
        self.last_reset = None;
        PpsVerdict::Accepted { drift_ppm }
    }

    /// Called on every poll tick; decides whether the PPS is lost and what
    /// recovery step is due. A station that never saw a PPS (no GPS
    /// attached) has nothing to lose.
    pub fn check_loss(&mut self, now: Instant) -> PpsAction {
        if self.last_latch_ext_us.is_none() {
            return PpsAction::None;
        }
        if now.duration_since(self.last_valid) < PPS_LOSS_TIMEOUT {
            return PpsAction::None;
        }
        if self.resets >= PPS_MAX_RESETS {
            return PpsAction::Fatal;
        }
        match self.last_reset {
            Some(t) if now.duration_since(t) < PPS_RESET_RETRY => PpsAction::None,
            _ => {
                self.resets += 1;
                self.last_reset = Some(now);
                PpsAction::ToggleGps
            }
        }
    }
}
