//! # Session & Protocol Engine
//!
//! Owns the single active LNS session: emits `version` on connect, awaits
//! and materializes `router_config`, then bridges between the LNS message
//! stream and the radio side. Received PHY payloads are parsed and
//! forwarded per the protocol rules (filters, pdu-only mode, rejoin raw
//! PDU); inbound downlink orders and timesync exchanges are handed to the
//! station as typed events.
//!
//! The session context dies with the session: a disconnect leaves no
//! residue for the next connection.

pub mod drtable;
pub mod filters;
pub mod msg;
pub mod router_config;

use crate::codec::encode_pdu;
use crate::constants::RX_MERGE_WINDOW_US;
use crate::logging::{self, S2E};
use crate::phy::{self, UplinkFrame};
use crate::ral::RxJob;
use crate::stats::SessionStats;
use crate::timesync::xtime_session;
use self::msg::{
    DnMsg, DnSchedItem, Jreq, LnsMessage, OutboundMsg, Propdf, Rejoin, RunCmd, TimeSyncMsg,
    UpInfo, Updf, UpdfPdu, Version,
};
use self::router_config::{materialize, SessionContext};
use serde_json::Value;

/// Station identity advertised in the `version` message.
#[derive(Debug, Clone)]
pub struct StationIdent {
    pub station: String,
    pub firmware: String,
    pub package: String,
    pub model: String,
    pub features: String,
}

/// What the station must do in response to an inbound message.
#[derive(Debug)]
pub enum SessionEvent {
    /// A session context materialized; apply it to the RAL. Failure to
    /// apply terminates the session.
    ConfigReady,
    EnqueueDn(DnMsg),
    EnqueueSched(Vec<DnSchedItem>),
    TimeSync(TimeSyncMsg),
    RunCmd(RunCmd),
    RmtSh(Value),
    /// Unrecoverable protocol violation; tear the session down.
    Terminate(String),
}

pub struct Session {
    ident: StationIdent,
    honor_testflags: bool,
    binary_supported: bool,
    ctx: Option<SessionContext>,
    pub stats: SessionStats,
    last_xtime: Option<i64>,
    /// Short-lived buffer merging mirror frames from multiple modems.
    pending: Vec<RxJob>,
    /// `MuxTime - host UTC`, updated whenever the LNS echoes its clock.
    ref_time_offset: f64,
}

impl Session {
    pub fn new(ident: StationIdent, honor_testflags: bool, binary_supported: bool) -> Self {
        Session {
            ident,
            honor_testflags,
            binary_supported,
            ctx: None,
            stats: SessionStats::default(),
            last_xtime: None,
            pending: Vec::new(),
            ref_time_offset: 0.0,
        }
    }

    pub fn ctx(&self) -> Option<&SessionContext> {
        self.ctx.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_some()
    }

    /// Uses the binary codec for data-plane frames?
    pub fn binary_codec(&self) -> bool {
        self.ctx.as_ref().map(|c| c.binary_codec).unwrap_or(false)
    }

    /// Drops all per-session state (transport disconnect).
    pub fn reset(&mut self) {
        if self.ctx.is_some() {
            logging::log_info(S2E, &format!("session closed: {}", self.stats.summary()));
        }
        self.ctx = None;
        self.stats = SessionStats::default();
        self.last_xtime = None;
        self.pending.clear();
        self.ref_time_offset = 0.0;
    }

    /// The `version` message opening a fresh connection.
    pub fn version_msg(&self) -> Version {
        Version::new(
            self.ident.station.clone(),
            self.ident.firmware.clone(),
            self.ident.package.clone(),
            self.ident.model.clone(),
            self.ident.features.clone(),
        )
    }

    fn note_mux_time(&mut self, mux_time: Option<f64>, host_utc_us: i64) {
        if let Some(mux) = mux_time {
            self.ref_time_offset = mux - host_utc_us as f64 / 1_000_000.0;
        }
    }

    /// Dispatches one inbound JSON text frame.
    pub fn on_text(&mut self, text: &str, host_utc_us: i64) -> Vec<SessionEvent> {
        match msg::parse_inbound(text) {
            Ok(m) => self.dispatch(m, host_utc_us),
            Err(e) => {
                logging::log_warn(S2E, &format!("dropping inbound message: {e}"));
                Vec::new()
            }
        }
    }

    /// Dispatches one inbound binary frame (only valid once the binary
    /// codec is negotiated).
    pub fn on_binary(&mut self, data: &[u8], host_utc_us: i64) -> Vec<SessionEvent> {
        if !self.binary_codec() {
            logging::log_warn(S2E, "binary frame without negotiated binary codec");
            return Vec::new();
        }
        use crate::codec::binary::{decode, BinMessage};
        match decode(data) {
            Ok(BinMessage::DnMsg(dn)) => self.dispatch(LnsMessage::DnMsg(dn), host_utc_us),
            Ok(BinMessage::TimeSync(ts)) => {
                self.dispatch(LnsMessage::TimeSync(ts), host_utc_us)
            }
            Ok(other) => {
                logging::log_warn(S2E, &format!("unexpected binary message: {other:?}"));
                Vec::new()
            }
            Err(e) => {
                logging::log_warn(S2E, &format!("dropping binary frame: {e}"));
                Vec::new()
            }
        }
    }

    fn dispatch(&mut self, m: LnsMessage, host_utc_us: i64) -> Vec<SessionEvent> {
        match m {
            LnsMessage::RouterConfig(rc) => {
                self.note_mux_time(rc.mux_time, host_utc_us);
                match materialize(&rc, self.honor_testflags, self.binary_supported) {
                    Ok(ctx) => {
                        logging::log_info(
                            S2E,
                            &format!(
                                "router_config for {} with {} upchannels{}",
                                ctx.region.id,
                                ctx.upchannels.len(),
                                if ctx.drs.is_asymmetric() {
                                    " (asymmetric DRs)"
                                } else {
                                    ""
                                }
                            ),
                        );
                        self.ctx = Some(ctx);
                        vec![SessionEvent::ConfigReady]
                    }
                    Err(e) => vec![SessionEvent::Terminate(e.to_string())],
                }
            }
            LnsMessage::DnMsg(dn) => {
                self.note_mux_time(dn.mux_time, host_utc_us);
                self.stats.dn_received += 1;
                vec![SessionEvent::EnqueueDn(dn)]
            }
            LnsMessage::DnSched(items) => {
                self.stats.dn_received += items.len() as u64;
                vec![SessionEvent::EnqueueSched(items)]
            }
            LnsMessage::TimeSync(ts) => {
                self.note_mux_time(ts.mux_time, host_utc_us);
                vec![SessionEvent::TimeSync(ts)]
            }
            LnsMessage::RunCmd(cmd) => vec![SessionEvent::RunCmd(cmd)],
            LnsMessage::RmtSh(v) => vec![SessionEvent::RmtSh(v)],
        }
    }

    /// Accepts an rx job from the RAL into the mirror-merge buffer.
    ///
    /// Enforces per-session xtime monotonicity and merges duplicates of
    /// the same transmission seen by different modems, preserving the fine
    /// timestamp from whichever copy carried one.
    pub fn add_rxjob(&mut self, job: RxJob) {
        self.stats.rx_received += 1;
        if let Some(last) = self.last_xtime {
            if xtime_session(last) == xtime_session(job.xtime) && job.xtime < last {
                logging::log_warn(
                    S2E,
                    &format!("non-monotonic rx xtime {} < {last}, dropping", job.xtime),
                );
                return;
            }
        }
        self.last_xtime = Some(job.xtime);

        if let Some(existing) = self.pending.iter_mut().find(|p| {
            p.payload == job.payload
                && (p.xtime - job.xtime).abs() <= RX_MERGE_WINDOW_US
        }) {
            self.stats.rx_merged += 1;
            // Keep the stronger copy, but never lose a fine timestamp.
            let fts = if existing.fts_ns >= 0 {
                existing.fts_ns
            } else {
                job.fts_ns
            };
            if job.rssi > existing.rssi {
                *existing = job;
            }
            existing.fts_ns = fts;
            return;
        }
        self.pending.push(job);
    }

    /// Emits every buffered job whose merge window has closed.
    pub fn flush_rx(&mut self, now_xtime: i64) -> Vec<OutboundMsg> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            let job_xtime = self.pending[i].xtime;
            let closed = if xtime_session(job_xtime) == xtime_session(now_xtime) {
                now_xtime - job_xtime > RX_MERGE_WINDOW_US
            } else {
                // Session changed under the buffer; flush unconditionally.
                true
            };
            if closed {
                let job = self.pending.remove(i);
                if let Some(m) = self.emit_uplink(job) {
                    self.stats.rx_forwarded += 1;
                    out.push(m);
                }
            } else {
                i += 1;
            }
        }
        out
    }

    fn emit_uplink(&mut self, job: RxJob) -> Option<OutboundMsg> {
        let ctx = self.ctx.as_ref()?;
        let upinfo = UpInfo {
            rctx: job.rctx,
            xtime: job.xtime,
            gpstime: job.gpstime,
            fts: job.fts_ns,
            rssi: job.rssi,
            snr: job.snr,
            rxtime: job.rxtime,
        };
        let ref_time = job.rxtime + self.ref_time_offset;

        if ctx.pdu_only {
            return Some(OutboundMsg::UpdfPdu(UpdfPdu {
                msgtype: "updf".into(),
                pdu: encode_pdu(&job.payload, ctx.pdu_encoding),
                ref_time,
                dr: job.dr,
                freq: job.freq_hz,
                upinfo,
            }));
        }

        match phy::parse_uplink(&job.payload) {
            Err(e) => {
                self.stats.rx_parse_dropped += 1;
                logging::log_debug(S2E, &format!("dropping frame: {e}"));
                None
            }
            Ok(UplinkFrame::Join(j)) => {
                if !ctx.joineui_filter.passes(j.join_eui) {
                    self.stats.rx_filtered += 1;
                    return None;
                }
                Some(OutboundMsg::Jreq(Jreq {
                    msgtype: "jreq".into(),
                    mhdr: j.mhdr,
                    join_eui: j.join_eui,
                    dev_eui: j.dev_eui,
                    dev_nonce: j.dev_nonce,
                    mic: j.mic,
                    ref_time,
                    dr: job.dr,
                    freq: job.freq_hz,
                    upinfo,
                }))
            }
            Ok(UplinkFrame::Data(d)) => {
                if !ctx.netid_filter.passes(d.dev_addr) {
                    self.stats.rx_filtered += 1;
                    return None;
                }
                Some(OutboundMsg::Updf(Updf {
                    msgtype: "updf".into(),
                    mhdr: d.mhdr,
                    dev_addr: d.dev_addr as i32,
                    fctrl: d.fctrl,
                    fcnt: d.fcnt,
                    fopts: d.fopts,
                    fport: d.fport.map(i32::from).unwrap_or(-1),
                    frm_payload: d.frm_payload,
                    mic: d.mic,
                    ref_time,
                    dr: job.dr,
                    freq: job.freq_hz,
                    upinfo,
                }))
            }
            // Rejoin requests bypass every filter and go out as a raw hex
            // PDU; the subtype interior is the LNS's business.
            Ok(UplinkFrame::Rejoin(r)) => Some(OutboundMsg::Rejoin(Rejoin {
                msgtype: "rejoin".into(),
                mhdr: r.mhdr,
                pdu: hex::encode_upper(&job.payload),
                mic: r.mic,
                ref_time,
                dr: job.dr,
                freq: job.freq_hz,
                upinfo,
            })),
            Ok(UplinkFrame::Proprietary) => Some(OutboundMsg::Propdf(Propdf {
                msgtype: "propdf".into(),
                frm_payload: job.payload,
                ref_time,
                dr: job.dr,
                freq: job.freq_hz,
                upinfo,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timesync::compose_xtime;

    fn ident() -> StationIdent {
        StationIdent {
            station: "2.0.6".into(),
            firmware: "sim".into(),
            package: "sim".into(),
            model: "sim".into(),
            features: "gps prod".into(),
        }
    }

    const DRS_JSON: &str = "[[12,125,0],[11,125,0],[10,125,0],[9,125,0],[8,125,0],[7,125,0],\
        [7,250,0],[0,50,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0]]";

    fn eu868_config() -> String {
        format!(
            r#"{{"msgtype":"router_config","region":"EU868","DRs":{DRS_JSON},
            "upchannels":[[868100000,0,5],[868300000,0,5],[868500000,0,5]]}}"#
        )
    }

    fn rx(payload: Vec<u8>, xtime: i64) -> RxJob {
        RxJob {
            payload,
            dr: 5,
            freq_hz: 868_100_000,
            rctx: 0,
            xtime,
            rssi: -50.0,
            snr: 9.0,
            fts_ns: -1,
            gpstime: 0,
            rxtime: 100.0,
        }
    }

    fn jreq_payload() -> Vec<u8> {
        let mut p = vec![0x00];
        p.extend_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
        p.extend_from_slice(&[0xF1, 0xE3, 0xF5, 0xE7, 0xF9, 0xEB, 0xFD, 0xEF]);
        p.extend_from_slice(&[0xF0, 0xF1]);
        p.extend_from_slice(&[0xA0, 0xA1, 0xA2, 0xA3]);
        p
    }

    #[test]
    fn config_then_uplink_flows() {
        let mut s = Session::new(ident(), false, false);
        let events = s.on_text(&eu868_config(), 0);
        assert!(matches!(events[0], SessionEvent::ConfigReady));
        assert!(s.is_running());

        let x0 = compose_xtime(1, 1_000_000);
        s.add_rxjob(rx(jreq_payload(), x0));
        let msgs = s.flush_rx(compose_xtime(1, 2_000_000));
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            OutboundMsg::Jreq(j) => {
                assert_eq!(j.join_eui.to_string(), "EF-CD-AB-89-67-45-23-01");
                assert_eq!(j.dev_nonce, 61936);
                assert_eq!(j.mic, -1549622880);
            }
            m => panic!("unexpected {m:?}"),
        }
    }

    #[test]
    fn bad_router_config_terminates() {
        let mut s = Session::new(ident(), false, false);
        let events = s.on_text(r#"{"msgtype":"router_config","region":"XX1"}"#, 0);
        assert!(matches!(events[0], SessionEvent::Terminate(_)));
        assert!(!s.is_running());
    }

    #[test]
    fn mirror_frames_merge_and_keep_fts() {
        let mut s = Session::new(ident(), false, false);
        s.on_text(&eu868_config(), 0);
        let x0 = compose_xtime(1, 1_000_000);
        let mut first = rx(jreq_payload(), x0);
        first.fts_ns = 123_456;
        first.rssi = -90.0;
        s.add_rxjob(first);
        let mut mirror = rx(jreq_payload(), x0 + 5_000);
        mirror.rssi = -40.0; // stronger copy, but no fts
        s.add_rxjob(mirror);

        let msgs = s.flush_rx(compose_xtime(1, 10_000_000));
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            OutboundMsg::Jreq(j) => {
                assert_eq!(j.upinfo.fts, 123_456);
                assert_eq!(j.upinfo.rssi, -40.0);
            }
            m => panic!("unexpected {m:?}"),
        }
        assert_eq!(s.stats.rx_merged, 1);
    }

    #[test]
    fn non_monotonic_xtime_is_dropped() {
        let mut s = Session::new(ident(), false, false);
        s.on_text(&eu868_config(), 0);
        s.add_rxjob(rx(jreq_payload(), compose_xtime(1, 2_000_000)));
        let mut older = rx(vec![0xE0, 1, 2, 3], compose_xtime(1, 1_000_000));
        older.payload = vec![0xE0, 1, 2, 3];
        s.add_rxjob(older);
        let msgs = s.flush_rx(compose_xtime(1, 60_000_000));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn pdu_only_skips_parsing_and_filters() {
        let mut s = Session::new(ident(), false, false);
        let cfg = format!(
            r#"{{"msgtype":"router_config","region":"EU868","pdu_only":true,
            "JoinEui":[[0,0]],"DRs":{DRS_JSON},
            "upchannels":[[868100000,0,5]]}}"#
        );
        s.on_text(&cfg, 0);
        let x0 = compose_xtime(1, 1_000_000);
        s.add_rxjob(rx(jreq_payload(), x0));
        let msgs = s.flush_rx(compose_xtime(1, 2_000_000));
        match &msgs[0] {
            OutboundMsg::UpdfPdu(m) => {
                assert_eq!(m.pdu, hex::encode_upper(jreq_payload()));
            }
            m => panic!("unexpected {m:?}"),
        }
    }

    #[test]
    fn reset_clears_session_state() {
        let mut s = Session::new(ident(), false, false);
        s.on_text(&eu868_config(), 0);
        s.add_rxjob(rx(jreq_payload(), compose_xtime(1, 1_000_000)));
        s.reset();
        assert!(!s.is_running());
        assert!(s.flush_rx(compose_xtime(1, u64::from(u32::MAX))).is_empty());
        assert_eq!(s.stats.rx_received, 0);
    }
}
