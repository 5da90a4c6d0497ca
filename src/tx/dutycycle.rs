//! Duty-cycle ledger.
//!
//! Tracks, per EU868-style band or per channel, the UTC instant before
//! which no further transmission may start. A transmission of airtime `A`
//! on a band with divisor `d` blocks that band until `start + A * d`,
//! which bounds the on-air fraction over any window to `1/d`.

use crate::region::{DutyCycleBand, DutyCycleModel, Region};
use std::collections::HashMap;

/// Result of an admission check against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcVerdict {
    Ok,
    BlockedUntil(i64),
    /// The frequency lies in no duty-cycle band; transmission is not
    /// permitted there.
    NoBand,
}

#[derive(Debug)]
enum Model {
    Disabled,
    Bands {
        bands: &'static [DutyCycleBand],
        next_allowed_us: Vec<i64>,
    },
    PerChannel {
        divisor: u32,
        next_allowed_us: HashMap<u32, i64>,
    },
}

#[derive(Debug)]
pub struct DutyCycleLedger {
    model: Model,
}

impl DutyCycleLedger {
    pub fn disabled() -> Self {
        DutyCycleLedger {
            model: Model::Disabled,
        }
    }

    pub fn new(region: &'static Region, enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let model = match region.duty_cycle {
            DutyCycleModel::None => Model::Disabled,
            DutyCycleModel::Bands(bands) => Model::Bands {
                bands,
                next_allowed_us: vec![i64::MIN; bands.len()],
            },
            DutyCycleModel::PerChannel { divisor } => Model::PerChannel {
                divisor,
                next_allowed_us: HashMap::new(),
            },
        };
        DutyCycleLedger { model }
    }

    /// May a transmission start on `freq_hz` at `now_utc_us`?
    pub fn check(&self, freq_hz: u32, now_utc_us: i64) -> DcVerdict {
        match &self.model {
            Model::Disabled => DcVerdict::Ok,
            Model::Bands {
                bands,
                next_allowed_us,
            } => {
                let Some(idx) = bands
                    .iter()
                    .position(|b| b.lo_hz <= freq_hz && freq_hz < b.hi_hz)
                else {
                    return DcVerdict::NoBand;
                };
                if now_utc_us < next_allowed_us[idx] {
                    DcVerdict::BlockedUntil(next_allowed_us[idx])
                } else {
                    DcVerdict::Ok
                }
            }
            Model::PerChannel {
                next_allowed_us, ..
            } => match next_allowed_us.get(&freq_hz) {
                Some(&t) if now_utc_us < t => DcVerdict::BlockedUntil(t),
                _ => DcVerdict::Ok,
            },
        }
    }

    /// Records a transmission that started at `start_utc_us`.
    pub fn commit(&mut self, freq_hz: u32, start_utc_us: i64, airtime_us: u64) {
        match &mut self.model {
            Model::Disabled => {}
            Model::Bands {
                bands,
                next_allowed_us,
            } => {
                if let Some(idx) = bands
                    .iter()
                    .position(|b| b.lo_hz <= freq_hz && freq_hz < b.hi_hz)
                {
                    next_allowed_us[idx] =
                        start_utc_us + airtime_us as i64 * bands[idx].divisor as i64;
                }
            }
            Model::PerChannel {
                divisor,
                next_allowed_us,
            } => {
                next_allowed_us.insert(
                    freq_hz,
                    start_utc_us + airtime_us as i64 * *divisor as i64,
                );
            }
        }
    }
}
