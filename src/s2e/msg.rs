//! LNS wire message types.
//!
//! Serde representations of every message exchanged with the network
//! server. Field names and value conventions follow the LNS protocol:
//! EUIs as hyphenated uppercase hex, byte arrays as uppercase hex strings,
//! MIC and DevAddr as signed 32-bit integers, `fts = -1` for "no fine
//! timestamp". Struct field order is the canonical emission order.

use crate::codec::{eui_str, hex_bytes};
use crate::error::StationError;
use crate::phy::Eui;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device class of a downlink job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    A,
    B,
    C,
}

/// Metadata attached to every forwarded uplink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpInfo {
    pub rctx: i64,
    pub xtime: i64,
    pub gpstime: i64,
    /// Fine timestamp in nanoseconds, or -1 when unavailable.
    pub fts: i64,
    pub rssi: f32,
    pub snr: f32,
    /// Host UTC receive time, seconds with fractional part.
    pub rxtime: f64,
}

impl Default for UpInfo {
    fn default() -> Self {
        UpInfo {
            rctx: 0,
            xtime: 0,
            gpstime: 0,
            fts: -1,
            rssi: 0.0,
            snr: 0.0,
            rxtime: 0.0,
        }
    }
}

/// First message on a fresh muxs connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version {
    pub msgtype: &'static str,
    pub station: String,
    pub firmware: String,
    pub package: String,
    pub model: String,
    pub protocol: u32,
    pub features: String,
}

impl Version {
    pub fn new(station: String, firmware: String, package: String, model: String, features: String) -> Self {
        Version {
            msgtype: "version",
            station,
            firmware,
            package,
            model,
            protocol: crate::constants::PROTOCOL_VERSION,
            features,
        }
    }
}

/// A forwarded uplink data frame (parsed form).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Updf {
    pub msgtype: String,
    #[serde(rename = "MHdr")]
    pub mhdr: u8,
    #[serde(rename = "DevAddr")]
    pub dev_addr: i32,
    #[serde(rename = "FCtrl")]
    pub fctrl: u8,
    #[serde(rename = "FCnt")]
    pub fcnt: u16,
    #[serde(rename = "FOpts", with = "hex_bytes")]
    pub fopts: Vec<u8>,
    /// -1 when the frame carries no FPort.
    #[serde(rename = "FPort")]
    pub fport: i32,
    #[serde(rename = "FRMPayload", with = "hex_bytes")]
    pub frm_payload: Vec<u8>,
    #[serde(rename = "MIC")]
    pub mic: i32,
    #[serde(rename = "RefTime")]
    pub ref_time: f64,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub upinfo: UpInfo,
}

/// A forwarded uplink in raw-PDU mode (`pdu_only`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdfPdu {
    pub msgtype: String,
    pub pdu: String,
    #[serde(rename = "RefTime")]
    pub ref_time: f64,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub upinfo: UpInfo,
}

/// A forwarded join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Jreq {
    pub msgtype: String,
    #[serde(rename = "MHdr")]
    pub mhdr: u8,
    #[serde(rename = "JoinEui", with = "eui_str")]
    pub join_eui: Eui,
    #[serde(rename = "DevEui", with = "eui_str")]
    pub dev_eui: Eui,
    #[serde(rename = "DevNonce")]
    pub dev_nonce: u16,
    #[serde(rename = "MIC")]
    pub mic: i32,
    #[serde(rename = "RefTime")]
    pub ref_time: f64,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub upinfo: UpInfo,
}

/// A forwarded rejoin request. Always emitted as a raw hex PDU with only
/// MHdr and MIC copied out; filters do not apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejoin {
    pub msgtype: String,
    #[serde(rename = "MHdr")]
    pub mhdr: u8,
    pub pdu: String,
    #[serde(rename = "MIC")]
    pub mic: i32,
    #[serde(rename = "RefTime")]
    pub ref_time: f64,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub upinfo: UpInfo,
}

/// A forwarded proprietary frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Propdf {
    pub msgtype: String,
    #[serde(rename = "FRMPayload", with = "hex_bytes")]
    pub frm_payload: Vec<u8>,
    #[serde(rename = "RefTime")]
    pub ref_time: f64,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub upinfo: UpInfo,
}

/// Downlink confirmation (success or failure) correlated by `diid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnTxed {
    pub msgtype: String,
    pub diid: i64,
    #[serde(rename = "DevEui", with = "eui_str")]
    pub dev_eui: Eui,
    pub rctx: i64,
    pub xtime: i64,
    /// UTC seconds of the actual emission; 0.0 on failure.
    pub txtime: f64,
    pub gpstime: i64,
    /// Failure reason; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub error: Option<String>,
}

/// Station-initiated or LNS-initiated time synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSyncMsg {
    pub msgtype: String,
    /// Station monotonic microseconds, echoed by the LNS.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub txtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub gpstime: Option<i64>,
    /// GPS-transfer anchor: concentrator xtime paired with `gpstime`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub xtime: Option<i64>,
    #[serde(rename = "MuxTime")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub mux_time: Option<f64>,
}

/// A downlink order from the LNS.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DnMsg {
    #[serde(rename = "DevEui", with = "eui_str")]
    pub dev_eui: Eui,
    /// 0 = class A, 1 = class B, 2 = class C.
    #[serde(rename = "dC", default)]
    pub d_c: u8,
    pub diid: i64,
    pub pdu: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(rename = "RxDelay", default)]
    pub rx_delay: u8,
    #[serde(rename = "RX1DR", default)]
    pub rx1dr: Option<u8>,
    #[serde(rename = "RX1Freq", default)]
    pub rx1freq: Option<u32>,
    #[serde(rename = "RX2DR", default)]
    pub rx2dr: Option<u8>,
    #[serde(rename = "RX2Freq", default)]
    pub rx2freq: Option<u32>,
    /// Explicit DR/Freq for class B and C.
    #[serde(rename = "DR", default)]
    pub dr: Option<u8>,
    #[serde(rename = "Freq", default)]
    pub freq: Option<u32>,
    #[serde(default)]
    pub xtime: Option<i64>,
    #[serde(default)]
    pub rctx: Option<i64>,
    #[serde(default)]
    pub gpstime: Option<i64>,
    #[serde(rename = "MuxTime", default)]
    pub mux_time: Option<f64>,
}

impl DnMsg {
    pub fn device_class(&self) -> Result<DeviceClass, StationError> {
        match self.d_c {
            0 => Ok(DeviceClass::A),
            1 => Ok(DeviceClass::B),
            2 => Ok(DeviceClass::C),
            other => Err(StationError::Protocol(format!(
                "dnmsg with unknown device class {other}"
            ))),
        }
    }
}

/// One class-B slot of a `dnsched` batch.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DnSchedItem {
    #[serde(rename = "DevEui", with = "eui_str")]
    pub dev_eui: Eui,
    pub diid: i64,
    pub pdu: String,
    #[serde(rename = "DR")]
    pub dr: u8,
    #[serde(rename = "Freq")]
    pub freq: u32,
    pub gpstime: i64,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub rctx: Option<i64>,
}

/// A whitelisted remote command request.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunCmd {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Every message the station can emit toward the LNS.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMsg {
    Version(Box<Version>),
    Updf(Updf),
    UpdfPdu(UpdfPdu),
    Jreq(Jreq),
    Rejoin(Rejoin),
    Propdf(Propdf),
    DnTxed(DnTxed),
    TimeSync(TimeSyncMsg),
}

impl OutboundMsg {
    pub fn to_json(&self) -> Result<String, StationError> {
        Ok(match self {
            OutboundMsg::Version(m) => serde_json::to_string(m)?,
            OutboundMsg::Updf(m) => serde_json::to_string(m)?,
            OutboundMsg::UpdfPdu(m) => serde_json::to_string(m)?,
            OutboundMsg::Jreq(m) => serde_json::to_string(m)?,
            OutboundMsg::Rejoin(m) => serde_json::to_string(m)?,
            OutboundMsg::Propdf(m) => serde_json::to_string(m)?,
            OutboundMsg::DnTxed(m) => serde_json::to_string(m)?,
            OutboundMsg::TimeSync(m) => serde_json::to_string(m)?,
        })
    }

    /// The binary-codec form; `None` for messages that always stay JSON
    /// (discovery/version).
    pub fn to_binary(&self) -> Option<Vec<u8>> {
        use crate::codec::binary::{encode, BinMessage};
        let bin = match self {
            OutboundMsg::Version(_) => return None,
            OutboundMsg::Updf(m) => BinMessage::Updf(m.clone()),
            OutboundMsg::UpdfPdu(m) => BinMessage::UpdfPdu(m.clone()),
            OutboundMsg::Jreq(m) => BinMessage::Jreq(m.clone()),
            OutboundMsg::Rejoin(m) => BinMessage::Rejoin(m.clone()),
            OutboundMsg::Propdf(m) => BinMessage::Propdf(m.clone()),
            OutboundMsg::DnTxed(m) => BinMessage::DnTxed(m.clone()),
            OutboundMsg::TimeSync(m) => BinMessage::TimeSync(m.clone()),
        };
        Some(encode(&bin))
    }
}

/// Every inbound LNS message the session engine dispatches on.
#[derive(Debug, Clone)]
pub enum LnsMessage {
    RouterConfig(Box<super::router_config::RouterConfig>),
    DnMsg(DnMsg),
    DnSched(Vec<DnSchedItem>),
    TimeSync(TimeSyncMsg),
    RunCmd(RunCmd),
    RmtSh(Value),
}

#[derive(Debug, Deserialize)]
struct DnSchedEnvelope {
    #[serde(default)]
    schedule: Vec<DnSchedItem>,
}

/// Parses one inbound JSON text frame into a dispatchable message.
///
/// Malformed JSON and unknown `msgtype`s are errors the session logs and
/// survives.
pub fn parse_inbound(text: &str) -> Result<LnsMessage, StationError> {
    let value: Value = serde_json::from_str(text)?;
    let msgtype = value
        .get("msgtype")
        .and_then(Value::as_str)
        .ok_or_else(|| StationError::Protocol("message without msgtype".into()))?
        .to_string();
    match msgtype.as_str() {
        "router_config" => Ok(LnsMessage::RouterConfig(Box::new(serde_json::from_value(
            value,
        )?))),
        "dnmsg" => Ok(LnsMessage::DnMsg(serde_json::from_value(value)?)),
        "dnsched" => {
            let env: DnSchedEnvelope = serde_json::from_value(value)?;
            Ok(LnsMessage::DnSched(env.schedule))
        }
        "timesync" => Ok(LnsMessage::TimeSync(serde_json::from_value(value)?)),
        "runcmd" => Ok(LnsMessage::RunCmd(serde_json::from_value(value)?)),
        "rmtsh" => Ok(LnsMessage::RmtSh(value)),
        other => Err(StationError::UnknownMsgType(other.to_string())),
    }
}
