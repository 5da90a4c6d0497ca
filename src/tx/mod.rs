//! # Transmission pipeline
//!
//! Accepts downlink jobs from the session engine, admits them against the
//! regulatory constraints (half-duplex exclusion, duty cycle, CCA, dwell
//! time, EIRP), schedules them on the concentrator at the requested
//! microsecond instant and reports the outcome back as `dntxed` messages.
//!
//! Admission order is fixed: half-duplex gate, duty cycle, CCA, dwell,
//! power clamp. The first failing check determines the reported reason.

pub mod dutycycle;
pub mod queue;

use crate::codec::decode_pdu;
use crate::constants::{HALF_DUPLEX_GUARD_US, TX_SLACK_US};
use crate::logging::{self, TX};
use crate::phy::airtime;
use crate::ral::hal::{Modulation, TxPacket, TxStatus};
use crate::ral::Ral;
use crate::s2e::drtable::DrDef;
use crate::s2e::msg::{DeviceClass, DnMsg, DnSchedItem, DnTxed};
use crate::s2e::router_config::SessionContext;
use crate::timesync::xtime_ext_us;
use self::dutycycle::DcVerdict;
use self::queue::{AltWindow, TxJob, TxQueue};

enum Admit {
    Sent(TxJob),
    Requeue(TxJob),
    Failed(DnTxed),
}

pub struct TxPipeline {
    queue: TxQueue,
    in_flight: Option<TxJob>,
    antenna_gain_dbi: f32,
}

impl TxPipeline {
    pub fn new(antenna_gain_dbi: f32) -> Self {
        TxPipeline {
            queue: TxQueue::new(),
            in_flight: None,
            antenna_gain_dbi,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Cancels every pending and in-flight job (session teardown).
    pub fn cancel_all(&mut self, ral: &mut Ral) -> usize {
        let mut n = self.queue.clear();
        if let Some(job) = self.in_flight.take() {
            let _ = ral.abort_tx(job.rctx as u8);
            n += 1;
        }
        if n > 0 {
            logging::log_info(TX, &format!("cancelled {n} downlink jobs"));
        }
        n
    }

    /// Drops a job the LNS rescinded.
    pub fn drop_diid(&mut self, diid: i64) -> bool {
        self.queue.drop_diid(diid).is_some()
    }

    /// Builds and enqueues a job from a `dnmsg`. Any immediately fatal
    /// problem produces a failure `dntxed` instead of a queue entry.
    pub fn enqueue_dnmsg(
        &mut self,
        dn: &DnMsg,
        ctx: &SessionContext,
        ral: &mut Ral,
    ) -> Vec<DnTxed> {
        let mut out = Vec::new();
        let fail = |error: &str| DnTxed {
            msgtype: "dntxed".into(),
            diid: dn.diid,
            dev_eui: dn.dev_eui,
            rctx: dn.rctx.unwrap_or(0),
            xtime: dn.xtime.unwrap_or(0),
            txtime: 0.0,
            gpstime: 0,
            error: Some(error.into()),
        };

        let class = match dn.device_class() {
            Ok(c) => c,
            Err(e) => {
                logging::log_warn(TX, &format!("dnmsg {}: {e}", dn.diid));
                out.push(fail("unknown device class"));
                return out;
            }
        };
        let payload = match decode_pdu(&dn.pdu, ctx.pdu_encoding) {
            Ok(p) => p,
            Err(_) => {
                out.push(fail("undecodable pdu"));
                return out;
            }
        };

        let (dr, freq_hz, xtime, rx2) = match class {
            DeviceClass::A => {
                let Some(up_xtime) = dn.xtime else {
                    out.push(fail("class A downlink without xtime"));
                    return out;
                };
                let delay_us = dn.rx_delay.max(1) as i64 * 1_000_000;
                let rx2 = dn.rx2dr.zip(dn.rx2freq).map(|(dr, freq_hz)| AltWindow {
                    dr,
                    freq_hz,
                    xtime: up_xtime + delay_us + 1_000_000,
                });
                match dn.rx1dr.zip(dn.rx1freq) {
                    Some((dr, freq)) => (dr, freq, up_xtime + delay_us, rx2),
                    None => match rx2 {
                        Some(w) => (w.dr, w.freq_hz, w.xtime, None),
                        None => {
                            out.push(fail("class A downlink without RX window"));
                            return out;
                        }
                    },
                }
            }
            DeviceClass::B => {
                let Some(gpstime) = dn.gpstime else {
                    out.push(fail("class B downlink without gpstime"));
                    return out;
                };
                let xtime = match ral.timesync.gpstime_to_xtime(gpstime) {
                    Ok(x) => x,
                    Err(_) => {
                        out.push(fail("no GPS time mapping"));
                        return out;
                    }
                };
                match (dn.dr.or(dn.rx2dr), dn.freq.or(dn.rx2freq)) {
                    (Some(dr), Some(freq)) => (dr, freq, xtime, None),
                    _ => {
                        out.push(fail("class B downlink without DR/Freq"));
                        return out;
                    }
                }
            }
            DeviceClass::C => {
                let now = match ral.xtime_now() {
                    Ok(x) => x,
                    Err(e) => {
                        logging::log_warn(TX, &format!("dnmsg {}: {e}", dn.diid));
                        out.push(fail("concentrator unavailable"));
                        return out;
                    }
                };
                match (dn.dr.or(dn.rx2dr), dn.freq.or(dn.rx2freq)) {
                    (Some(dr), Some(freq)) => {
                        (dr, freq, now + 2 * TX_SLACK_US as i64, None)
                    }
                    _ => {
                        out.push(fail("class C downlink without DR/Freq"));
                        return out;
                    }
                }
            }
        };

        if !ctx.drs.dn(dr).is_defined() {
            out.push(fail("undefined downlink DR"));
            return out;
        }

        let job = TxJob {
            diid: dn.diid,
            dev_eui: dn.dev_eui,
            class,
            payload,
            dr,
            freq_hz,
            xtime,
            rx2,
            priority: dn.priority,
            rctx: dn.rctx.unwrap_or(0),
            gpstime: dn.gpstime,
            seq: 0,
        };
        if let Some(evicted) = self.queue.insert(job) {
            logging::log_warn(
                TX,
                &format!("queue overflow, dropping diid {}", evicted.diid),
            );
            out.push(failure_of(&evicted, "queue overflow"));
        }
        out
    }

    /// Enqueues a batch of class-B slots from a `dnsched`.
    pub fn enqueue_dnsched(
        &mut self,
        items: &[DnSchedItem],
        ctx: &SessionContext,
        ral: &mut Ral,
    ) -> Vec<DnTxed> {
        let mut out = Vec::new();
        for item in items {
            let dn = DnMsg {
                dev_eui: item.dev_eui,
                d_c: 1,
                diid: item.diid,
                pdu: item.pdu.clone(),
                priority: item.priority,
                rx_delay: 0,
                rx1dr: None,
                rx1freq: None,
                rx2dr: None,
                rx2freq: None,
                dr: Some(item.dr),
                freq: Some(item.freq),
                xtime: None,
                rctx: item.rctx,
                gpstime: Some(item.gpstime),
                mux_time: None,
            };
            out.extend(self.enqueue_dnmsg(&dn, ctx, ral));
        }
        out
    }

    /// The xtime at which the pipeline next needs service, if any.
    pub fn next_deadline(&self) -> Option<i64> {
        if self.in_flight.is_some() {
            return Some(i64::MIN); // poll status promptly
        }
        self.queue
            .next_xtime()
            .map(|t| t - TX_SLACK_US as i64)
    }

    /// One service pass: settle an in-flight transmission, then admit and
    /// submit every job whose window has opened.
    pub fn service(
        &mut self,
        ctx: &SessionContext,
        ral: &mut Ral,
        host_utc_us: i64,
    ) -> Vec<DnTxed> {
        let mut out = Vec::new();

        if let Some(job) = &self.in_flight {
            match ral.tx_status(job.rctx as u8) {
                Ok(TxStatus::Free) => {
                    let job = self.in_flight.take().unwrap();
                    out.push(success_of(&job, ral));
                }
                Ok(_) => {}
                Err(e) => {
                    let job = self.in_flight.take().unwrap();
                    logging::log_warn(TX, &format!("status poll failed: {e}"));
                    out.push(failure_of(&job, "transmit status lost"));
                }
            }
        }

        while self.in_flight.is_none() {
            let now_xtime = match ral.xtime_now() {
                Ok(x) => x,
                Err(e) => {
                    logging::log_warn(TX, &format!("counter read failed: {e}"));
                    break;
                }
            };
            let Some(job) = self.queue.pop_due(now_xtime, TX_SLACK_US) else {
                break;
            };
            match self.admit_and_send(job, ctx, ral, host_utc_us, now_xtime) {
                Admit::Sent(job) => self.in_flight = Some(job),
                Admit::Requeue(job) => {
                    self.queue.reinsert(job);
                    break;
                }
                Admit::Failed(msg) => out.push(msg),
            }
        }
        out
    }

    fn admit_and_send(
        &mut self,
        job: TxJob,
        ctx: &SessionContext,
        ral: &mut Ral,
        host_utc_us: i64,
        now_xtime: i64,
    ) -> Admit {
        // Window already in the past by more than the handoff slack.
        if job.xtime + (TX_SLACK_US as i64) < now_xtime {
            let late = failure_of(&job, "too late");
            return match job.demote() {
                Some(demoted) => Admit::Requeue(demoted),
                None => Admit::Failed(late),
            };
        }

        // 1. Half-duplex gate.
        match ral.rx_busy_until() {
            Ok(Some(rx_end)) if rx_end + HALF_DUPLEX_GUARD_US as i64 > job.xtime => {
                let deadline = rx_end + HALF_DUPLEX_GUARD_US as i64;
                return match job.class {
                    // A class A window cannot move; fall back to RX2 or
                    // give up.
                    DeviceClass::A => {
                        let busy = failure_of(&job, "rx busy");
                        match job.demote() {
                            Some(d) => Admit::Requeue(d),
                            None => Admit::Failed(busy),
                        }
                    }
                    _ => {
                        let mut deferred = job;
                        deferred.xtime = deadline;
                        Admit::Requeue(deferred)
                    }
                };
            }
            Ok(_) => {}
            Err(e) => {
                logging::log_warn(TX, &format!("rx busy poll failed: {e}"));
            }
        }

        let def = ctx.drs.dn(job.dr);
        let airtime_us = match def {
            DrDef::Lora { sf, bw_khz } => airtime::lora_airtime_us(sf, bw_khz, job.payload.len()),
            DrDef::Fsk => airtime::fsk_airtime_us(job.payload.len()),
            DrDef::Undefined => return Admit::Failed(failure_of(&job, "undefined downlink DR")),
        };

        // 2. Duty cycle.
        let start_utc = ral
            .timesync
            .xtime_to_utc(job.xtime)
            .unwrap_or(host_utc_us);
        match ral.duty_cycle.check(job.freq_hz, start_utc) {
            DcVerdict::Ok => {}
            DcVerdict::BlockedUntil(_) | DcVerdict::NoBand => {
                return match job.class {
                    DeviceClass::A => {
                        let missed = failure_of(&job, "missed");
                        match job.demote() {
                            Some(d) => Admit::Requeue(d),
                            None => Admit::Failed(missed),
                        }
                    }
                    _ => Admit::Failed(failure_of(&job, "duty cycle exhausted")),
                };
            }
        }

        // 3. CCA / listen-before-talk.
        if ctx.cca_enabled {
            if let Some(lbt) = &ctx.lbt {
                let scan_time = lbt
                    .channels
                    .iter()
                    .find(|c| c.freq_hz == job.freq_hz)
                    .map(|c| c.scan_time_us)
                    .unwrap_or(5000);
                match ral.rssi_scan(job.freq_hz, scan_time) {
                    Ok(rssi) if rssi >= lbt.rssi_target_dbm as f32 => {
                        return Admit::Failed(failure_of(&job, "cca busy"));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        logging::log_warn(TX, &format!("cca scan failed: {e}"));
                        return Admit::Failed(failure_of(&job, "cca scan failed"));
                    }
                }
            }
        }

        // 4. Dwell time.
        if ctx.dwell_enabled {
            if let Some(max_dwell) = ctx.region.max_dwell_us {
                if airtime_us > max_dwell {
                    return Admit::Failed(failure_of(&job, "dwell time exceeded"));
                }
            }
        }

        // 5. Power clamp.
        let power_dbm = ctx.max_eirp_dbm - self.antenna_gain_dbi;

        let modulation = match def {
            DrDef::Lora { sf, bw_khz } => Modulation::Lora { sf, bw_khz },
            DrDef::Fsk => Modulation::Fsk,
            DrDef::Undefined => unreachable!(),
        };
        let pkt = TxPacket {
            freq_hz: job.freq_hz,
            modulation,
            power_dbm,
            count_us: xtime_ext_us(job.xtime) as u32,
            payload: job.payload.clone(),
            rf_chain: job.rctx as u8,
            invert_pol: true,
        };
        match ral.send(pkt) {
            Ok(()) => {
                ral.duty_cycle.commit(job.freq_hz, start_utc, airtime_us);
                logging::log_debug(
                    TX,
                    &format!(
                        "diid {} armed at {} Hz DR{} ({} us airtime)",
                        job.diid, job.freq_hz, job.dr, airtime_us
                    ),
                );
                Admit::Sent(job)
            }
            Err(e) => {
                logging::log_warn(TX, &format!("send failed: {e}"));
                Admit::Failed(failure_of(&job, "transmit failed"))
            }
        }
    }
}

fn failure_of(job: &TxJob, error: &str) -> DnTxed {
    DnTxed {
        msgtype: "dntxed".into(),
        diid: job.diid,
        dev_eui: job.dev_eui,
        rctx: job.rctx,
        xtime: job.xtime,
        txtime: 0.0,
        gpstime: 0,
        error: Some(error.into()),
    }
}

fn success_of(job: &TxJob, ral: &Ral) -> DnTxed {
    let txtime = ral
        .timesync
        .xtime_to_utc(job.xtime)
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(0.0);
    DnTxed {
        msgtype: "dntxed".into(),
        diid: job.diid,
        dev_eui: job.dev_eui,
        rctx: job.rctx,
        xtime: job.xtime,
        txtime,
        gpstime: ral.timesync.xtime_to_gpstime(job.xtime),
        error: None,
    }
}
