//! # Station reactor
//!
//! The single event loop tying the transport, the session engine, the RAL
//! and the TX pipeline together. One task selects over transport events,
//! the rx/tx service tick, the 128 ms PPS tick, the periodic timesync
//! exchange, the optional GPS device and the shutdown signal; every
//! reaction runs to completion before the next is taken, so no state is
//! shared across threads.

use crate::config::StationConf;
use crate::error::StationError;
use crate::gps::{self, GpsDevice};
use crate::logging::{self, S2E, SYN, SYS, TC};
use crate::ral::Ral;
use crate::s2e::msg::{OutboundMsg, TimeSyncMsg};
use crate::s2e::router_config::SessionContext;
use crate::s2e::{Session, SessionEvent, StationIdent};
use crate::timesync::utc_us_to_gpstime_us;
use crate::transport::{Transport, TransportEvent};
use crate::tx::TxPipeline;
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Why the reactor returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Graceful shutdown (signal or transport gone for good). Exit code 0.
    Shutdown,
    /// Unrecoverable PPS/drift fault; the supervisor restarts the process.
    TimeFault,
}

/// Executes whitelisted `runcmd` requests. The real implementation lives
/// outside the core; the default only logs.
#[async_trait]
pub trait CommandRunner: Send {
    async fn run(&mut self, command: &str, arguments: &[String]);
}

/// Default no-op runner.
pub struct LogOnlyRunner;

#[async_trait]
impl CommandRunner for LogOnlyRunner {
    async fn run(&mut self, command: &str, arguments: &[String]) {
        logging::log_info(
            SYS,
            &format!("runcmd {command} {arguments:?} (no runner attached)"),
        );
    }
}

pub struct Station {
    pub conf: StationConf,
    pub session: Session,
    pub ral: Ral,
    pub txpipe: TxPipeline,
    pub transport: Box<dyn Transport>,
    pub runner: Box<dyn CommandRunner>,
    pub gps: Option<GpsDevice>,
}

fn utc_now_us() -> i64 {
    Utc::now().timestamp_micros()
}

impl Station {
    pub fn new(
        conf: StationConf,
        ident: StationIdent,
        ral: Ral,
        transport: Box<dyn Transport>,
    ) -> Self {
        let antenna_gain = conf.antenna_gain_dbi;
        Station {
            conf,
            session: Session::new(ident, cfg!(feature = "testflags"), true),
            ral,
            txpipe: TxPipeline::new(antenna_gain),
            transport,
            runner: Box::new(LogOnlyRunner),
            gps: None,
        }
    }

    /// Runs the reactor until shutdown or an unrecoverable fault.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ExitReason, StationError> {
        let mut rx_tick = tokio::time::interval(Duration::from_millis(10));
        let mut pps_tick = tokio::time::interval(crate::constants::PPS_POLL_INTERVAL);
        let mut timesync_tick = tokio::time::interval(crate::constants::TIMESYNC_INTERVAL);

        loop {
            tokio::select! {
                ev = self.transport.next_event() => {
                    match ev {
                        None => {
                            self.teardown_session();
                            return Ok(ExitReason::Shutdown);
                        }
                        Some(TransportEvent::Connected) => {
                            logging::log_info(TC, "muxs connected");
                            let version = self.session.version_msg();
                            self.send_out(OutboundMsg::Version(Box::new(version))).await;
                        }
                        Some(TransportEvent::Text(t)) => {
                            let events = self.session.on_text(&t, utc_now_us());
                            self.handle_events(events).await;
                        }
                        Some(TransportEvent::Binary(b)) => {
                            let events = self.session.on_binary(&b, utc_now_us());
                            self.handle_events(events).await;
                        }
                        Some(TransportEvent::Disconnected) => {
                            logging::log_info(TC, "muxs disconnected");
                            self.teardown_session();
                        }
                    }
                }
                _ = rx_tick.tick() => {
                    if let Err(e) = self.service_radio().await {
                        logging::log_warn(S2E, &format!("radio service failed: {e}"));
                    }
                }
                _ = pps_tick.tick() => {
                    use crate::timesync::pps::PpsAction;
                    match self.ral.pps_tick(utc_now_us(), Instant::now()) {
                        Ok(PpsAction::Fatal) => {
                            self.teardown_session();
                            return Ok(ExitReason::TimeFault);
                        }
                        Ok(_) => {}
                        Err(e) => logging::log_warn(SYS, &format!("pps tick failed: {e}")),
                    }
                }
                _ = timesync_tick.tick() => {
                    if self.session.is_running() {
                        let msg = OutboundMsg::TimeSync(TimeSyncMsg {
                            msgtype: "timesync".into(),
                            txtime: self.ral.xtime_now().ok(),
                            gpstime: None,
                            xtime: None,
                            mux_time: None,
                        });
                        self.send_out(msg).await;
                    }
                }
                fix = next_gps_fix(&mut self.gps) => {
                    let consume = self
                        .session
                        .ctx()
                        .map(|c| c.gps_enable)
                        .unwrap_or(true);
                    if consume {
                        let utc_us = fix.timestamp_micros();
                        let gps_us = utc_us_to_gpstime_us(utc_us, gps::GPS_UTC_LEAP_SECONDS);
                        self.ral.timesync.set_utc_gps_offset(gps_us - utc_us);
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender means nobody can signal us anymore;
                    // treat it like a shutdown request.
                    if changed.is_err() || *shutdown.borrow() {
                        logging::log_info(SYS, "shutting down");
                        self.teardown_session();
                        self.transport.close().await;
                        return Ok(ExitReason::Shutdown);
                    }
                }
            }
        }
    }

    /// One rx/tx service pass.
    async fn service_radio(&mut self) -> Result<(), StationError> {
        let Some(ctx) = self.session.ctx().cloned() else {
            return Ok(());
        };
        let jobs = self
            .ral
            .poll_rx(&ctx, utc_now_us(), Instant::now())?;
        for job in jobs {
            self.session.add_rxjob(job);
        }
        let now_xtime = self.ral.xtime_now()?;
        for msg in self.session.flush_rx(now_xtime) {
            self.send_out(msg).await;
        }
        for dntxed in self.txpipe.service(&ctx, &mut self.ral, utc_now_us()) {
            if dntxed.error.is_some() {
                self.session.stats.dn_failed += 1;
            } else {
                self.session.stats.dn_sent += 1;
            }
            self.send_out(OutboundMsg::DnTxed(dntxed)).await;
        }
        Ok(())
    }

    async fn handle_events(&mut self, events: Vec<SessionEvent>) {
        for ev in events {
            match ev {
                SessionEvent::ConfigReady => {
                    let ctx: SessionContext = self.session.ctx().unwrap().clone();
                    if let Err(e) = self.ral.apply_session(&ctx) {
                        logging::log_error(
                            S2E,
                            &format!("applying router_config failed: {e}"),
                        );
                        self.teardown_session();
                        self.transport.close().await;
                    }
                }
                SessionEvent::EnqueueDn(dn) => {
                    if let Some(ctx) = self.session.ctx().cloned() {
                        for failed in self.txpipe.enqueue_dnmsg(&dn, &ctx, &mut self.ral) {
                            self.session.stats.dn_failed += 1;
                            self.send_out(OutboundMsg::DnTxed(failed)).await;
                        }
                    }
                }
                SessionEvent::EnqueueSched(items) => {
                    if let Some(ctx) = self.session.ctx().cloned() {
                        for failed in self.txpipe.enqueue_dnsched(&items, &ctx, &mut self.ral)
                        {
                            self.session.stats.dn_failed += 1;
                            self.send_out(OutboundMsg::DnTxed(failed)).await;
                        }
                    }
                }
                SessionEvent::TimeSync(ts) => self.handle_timesync(ts),
                SessionEvent::RunCmd(cmd) => {
                    if self.conf.runcmd_allow.iter().any(|c| c == &cmd.command) {
                        self.runner.run(&cmd.command, &cmd.arguments).await;
                    } else {
                        logging::log_warn(
                            SYS,
                            &format!("refusing non-whitelisted runcmd {:?}", cmd.command),
                        );
                    }
                }
                SessionEvent::RmtSh(_) => {
                    logging::log_info(SYS, "rmtsh request (no shell attached)");
                }
                SessionEvent::Terminate(reason) => {
                    logging::log_error(S2E, &format!("terminating session: {reason}"));
                    self.teardown_session();
                    self.transport.close().await;
                }
            }
        }
    }

    fn handle_timesync(&mut self, ts: TimeSyncMsg) {
        match (ts.txtime, ts.xtime, ts.gpstime) {
            // Echo of our own timesync: a round-trip measurement.
            (Some(txtime), _, gpstime) => {
                if let Ok(now) = self.ral.xtime_now() {
                    logging::log_debug(
                        SYN,
                        &format!(
                            "timesync rtt {} us (gpstime {:?})",
                            now.saturating_sub(txtime),
                            gpstime
                        ),
                    );
                }
                if let (Some(x), Some(g)) = (ts.xtime, ts.gpstime) {
                    let _ = self.ral.timesync.set_lns_anchor(x, g);
                }
            }
            // Unsolicited GPS transfer.
            (None, Some(x), Some(g)) => {
                if let Err(e) = self.ral.timesync.set_lns_anchor(x, g) {
                    logging::log_warn(SYN, &format!("timesync anchor rejected: {e}"));
                }
            }
            _ => logging::log_warn(SYN, "timesync without usable fields"),
        }
    }

    async fn send_out(&mut self, msg: OutboundMsg) {
        let result = if self.session.binary_codec() {
            match msg.to_binary() {
                Some(b) => self.transport.send_binary(b).await,
                None => match msg.to_json() {
                    Ok(t) => self.transport.send_text(t).await,
                    Err(e) => {
                        logging::log_error(S2E, &format!("encoding failed: {e}"));
                        return;
                    }
                },
            }
        } else {
            match msg.to_json() {
                Ok(t) => self.transport.send_text(t).await,
                Err(e) => {
                    logging::log_error(S2E, &format!("encoding failed: {e}"));
                    return;
                }
            }
        };
        if result.is_err() {
            logging::log_warn(TC, "send failed, dropping session state");
            self.teardown_session();
        }
    }

    /// Cancels every job and drops the session context. Idempotent.
    fn teardown_session(&mut self) {
        self.txpipe.cancel_all(&mut self.ral);
        self.ral.teardown();
        self.session.reset();
    }
}

/// Resolves to the next NMEA fix, or never when no GPS device is
/// configured.
async fn next_gps_fix(gps: &mut Option<GpsDevice>) -> chrono::DateTime<Utc> {
    match gps {
        Some(dev) => loop {
            if let Some(fix) = dev.next_fix().await {
                return fix;
            }
        },
        None => std::future::pending().await,
    }
}
