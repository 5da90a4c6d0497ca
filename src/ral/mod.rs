//! # Radio Abstraction Layer
//!
//! Exclusively owns the concentrator HAL. Applies the session's channel
//! plan, polls for received packets (producing [`RxJob`]s with resolved
//! uplink DRs and extended timestamps), executes downlinks at requested
//! counter values, and maintains the time-domain state including the PPS
//! health loop. Everything else reaches the hardware through this type.

pub mod chanplan;
pub mod hal;
pub mod sim;

use crate::error::StationError;
use crate::logging::{self, RAL, SYN};
use crate::s2e::drtable::DrDef;
use crate::s2e::router_config::SessionContext;
use crate::timesync::pps::{PpsAction, PpsVerdict};
use crate::timesync::{compose_xtime, TimeDomain};
use crate::tx::dutycycle::DutyCycleLedger;
use self::hal::{Concentrator, Modulation, TxPacket, TxStatus};
use std::time::Instant;

/// A received uplink, ready for the session engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RxJob {
    pub payload: Vec<u8>,
    /// Resolved against the session's uplink DR table.
    pub dr: u8,
    pub freq_hz: u32,
    pub rctx: i64,
    pub xtime: i64,
    pub rssi: f32,
    pub snr: f32,
    /// Fine timestamp in nanoseconds; -1 when unavailable.
    pub fts_ns: i64,
    /// GPS-epoch microseconds; 0 when no mapping exists.
    pub gpstime: i64,
    /// Host UTC seconds at reception.
    pub rxtime: f64,
}

pub struct Ral {
    hal: Box<dyn Concentrator>,
    txunit: u8,
    primary: bool,
    session: u16,
    last_ext_us: u64,
    started: bool,
    pub timesync: TimeDomain,
    pub duty_cycle: DutyCycleLedger,
}

impl Ral {
    pub fn new(
        mut hal: Box<dyn Concentrator>,
        txunit: u8,
        primary: bool,
        now: Instant,
    ) -> Result<Self, StationError> {
        let session = hal.session_id()?;
        Ok(Ral {
            hal,
            txunit,
            primary,
            session,
            last_ext_us: 0,
            started: false,
            timesync: TimeDomain::new(session, now),
            duty_cycle: DutyCycleLedger::disabled(),
        })
    }

    pub fn txunit(&self) -> u8 {
        self.txunit
    }

    pub fn session(&self) -> u16 {
        self.session
    }

    /// Applies a freshly materialized session context: allocates the
    /// channel plan, starts the radio and rebuilds the duty-cycle ledger.
    pub fn apply_session(&mut self, ctx: &SessionContext) -> Result<(), StationError> {
        let chip = chanplan::allocate(ctx)?;
        self.hal.start(&chip)?;
        self.started = true;
        self.duty_cycle = DutyCycleLedger::new(ctx.region, ctx.duty_cycle_enabled);
        logging::log_info(
            RAL,
            &format!(
                "txunit {} up: {} multi-SF chains, fast-LoRa {}, FSK {}",
                self.txunit,
                chip.multisf.len(),
                chip.fast_lora.is_some(),
                chip.fsk.is_some()
            ),
        );
        Ok(())
    }

    /// Stops the radio and drops per-session state.
    pub fn teardown(&mut self) {
        if self.started {
            if let Err(e) = self.hal.stop() {
                logging::log_warn(RAL, &format!("stop failed: {e}"));
            }
            self.started = false;
        }
        self.duty_cycle = DutyCycleLedger::disabled();
    }

    /// Extends a 32-bit counter value near the current extension window.
    fn extend(&mut self, count_us: u32) -> u64 {
        let last = self.last_ext_us;
        let mut ext = (last & !0xFFFF_FFFFu64) | count_us as u64;
        if ext + 0x8000_0000 < last {
            ext += 1u64 << 32;
        } else if ext > last + 0x8000_0000 {
            ext = ext.saturating_sub(1u64 << 32);
        }
        if ext > self.last_ext_us {
            self.last_ext_us = ext;
        }
        ext
    }

    /// Current concentrator time as an xtime.
    pub fn xtime_now(&mut self) -> Result<i64, StationError> {
        let count = self.hal.instcnt()?;
        let ext = self.extend(count);
        Ok(compose_xtime(self.session, ext))
    }

    /// Detects a HAL session restart (slave process restart). Clears
    /// drift statistics, and PPS state on the primary txunit.
    pub fn check_session(&mut self, now: Instant) -> Result<bool, StationError> {
        let sid = self.hal.session_id()?;
        if sid == self.session {
            return Ok(false);
        }
        logging::log_warn(
            RAL,
            &format!(
                "txunit {}: HAL session restarted ({} -> {sid}), timing state cleared",
                self.txunit, self.session
            ),
        );
        self.session = sid;
        self.last_ext_us = 0;
        self.timesync.on_session_restart(sid, self.primary, now);
        Ok(true)
    }

    /// Drains received packets into [`RxJob`]s. Frames with bad CRC or a
    /// modulation absent from the uplink DR table are dropped here.
    pub fn poll_rx(
        &mut self,
        ctx: &SessionContext,
        host_utc_us: i64,
        now: Instant,
    ) -> Result<Vec<RxJob>, StationError> {
        self.check_session(now)?;
        let mut jobs = Vec::new();
        for pkt in self.hal.receive()? {
            if !pkt.crc_ok {
                continue;
            }
            let def = match pkt.modulation {
                Modulation::Lora { sf, bw_khz } => DrDef::Lora { sf, bw_khz },
                Modulation::Fsk => DrDef::Fsk,
            };
            let Some(dr) = ctx.drs.find_up(def) else {
                logging::log_debug(
                    RAL,
                    &format!("rx at {} Hz with unmapped modulation {def:?}", pkt.freq_hz),
                );
                continue;
            };
            let ext = self.extend(pkt.count_us);
            let xtime = compose_xtime(self.session, ext);
            jobs.push(RxJob {
                payload: pkt.payload,
                dr,
                freq_hz: pkt.freq_hz,
                rctx: pkt.rf_chain as i64,
                xtime,
                rssi: pkt.rssi,
                snr: pkt.snr,
                fts_ns: pkt.fts_ns.unwrap_or(-1),
                gpstime: self.timesync.xtime_to_gpstime(xtime),
                rxtime: host_utc_us as f64 / 1_000_000.0,
            });
        }
        Ok(jobs)
    }

    /// One 128 ms PPS service tick: feed the latched edge to the drift
    /// monitor, then run loss detection and recovery.
    pub fn pps_tick(&mut self, host_utc_us: i64, now: Instant) -> Result<PpsAction, StationError> {
        if let Some(count) = self.hal.pps_latch()? {
            let ext = self.extend(count);
            let latch_xtime = compose_xtime(self.session, ext);
            match self.timesync.record_pps(latch_xtime, host_utc_us, now) {
                PpsVerdict::Fatal => {
                    logging::log_error(SYN, "persistent excessive PPS drift");
                    return Ok(PpsAction::Fatal);
                }
                PpsVerdict::Rejected { drift_ppm } => {
                    logging::log_warn(SYN, &format!("PPS drift {drift_ppm:.1} ppm rejected"));
                }
                _ => {}
            }
        }
        let action = self.timesync.monitor.check_loss(now);
        match action {
            PpsAction::ToggleGps => {
                logging::log_warn(SYN, "PPS lost, toggling GPS enable");
                self.hal.set_gps_enable(false)?;
                self.hal.set_gps_enable(true)?;
            }
            PpsAction::Fatal => {
                logging::log_error(SYN, "PPS unrecoverable after repeated GPS resets");
            }
            PpsAction::None => {}
        }
        Ok(action)
    }

    /// Schedules a transmission.
    pub fn send(&mut self, pkt: TxPacket) -> Result<(), StationError> {
        Ok(self.hal.send(pkt)?)
    }

    pub fn tx_status(&mut self, rf_chain: u8) -> Result<TxStatus, StationError> {
        Ok(self.hal.tx_status(rf_chain)?)
    }

    pub fn abort_tx(&mut self, rf_chain: u8) -> Result<(), StationError> {
        Ok(self.hal.abort_tx(rf_chain)?)
    }

    pub fn rssi_scan(&mut self, freq_hz: u32, scan_time_us: u32) -> Result<f32, StationError> {
        Ok(self.hal.rssi_scan(freq_hz, scan_time_us)?)
    }

    /// End of the reception in progress, as an xtime (half-duplex gate).
    pub fn rx_busy_until(&mut self) -> Result<Option<i64>, StationError> {
        Ok(self
            .hal
            .rx_busy_until()?
            .map(|count| {
                let ext = self.extend(count);
                compose_xtime(self.session, ext)
            }))
    }
}
