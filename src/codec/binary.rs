//! Tag-length-value binary codec for the data plane.
//!
//! When the LNS negotiates `protocol_format: "binary"`, the data-plane
//! messages (uplinks, downlinks, tx confirmations, timesync) switch from
//! JSON text frames to this representation; discovery and `router_config`
//! remain JSON.
//!
//! Wire layout: one message-type octet, then a sequence of fields, each
//! `[tag u8][len u16 LE][value]`. Integers are little-endian fixed-width,
//! floats are IEEE-754 bit patterns, byte fields carry their raw contents.
//! Unknown field tags are skipped on decode so either side may extend the
//! schema. Every encode/decode pair is an exact round trip, including
//! signed values and PDUs up to 255 bytes.

use crate::error::StationError;
use crate::phy::Eui;
use crate::s2e::msg::{
    DnMsg, DnTxed, Jreq, Propdf, Rejoin, TimeSyncMsg, UpInfo, Updf, UpdfPdu,
};
use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, le_u16};
use nom::IResult;

// Message type octets
const MSG_UPDF: u8 = 1;
const MSG_JREQ: u8 = 2;
const MSG_REJOIN: u8 = 3;
const MSG_PROPDF: u8 = 4;
const MSG_DNMSG: u8 = 5;
const MSG_DNTXED: u8 = 6;
const MSG_TIMESYNC: u8 = 7;
const MSG_UPDF_PDU: u8 = 8;

// Field tags (one namespace across all messages)
const F_MHDR: u8 = 0x01;
const F_DEVADDR: u8 = 0x02;
const F_FCTRL: u8 = 0x03;
const F_FCNT: u8 = 0x04;
const F_FOPTS: u8 = 0x05;
const F_FPORT: u8 = 0x06;
const F_FRMPAYLOAD: u8 = 0x07;
const F_MIC: u8 = 0x08;
const F_REFTIME: u8 = 0x09;
const F_DR: u8 = 0x0A;
const F_FREQ: u8 = 0x0B;
const F_JOINEUI: u8 = 0x0C;
const F_DEVEUI: u8 = 0x0D;
const F_DEVNONCE: u8 = 0x0E;
const F_PDU: u8 = 0x0F;
const F_RCTX: u8 = 0x10;
const F_XTIME: u8 = 0x11;
const F_GPSTIME: u8 = 0x12;
const F_FTS: u8 = 0x13;
const F_RSSI: u8 = 0x14;
const F_SNR: u8 = 0x15;
const F_RXTIME: u8 = 0x16;
const F_DIID: u8 = 0x17;
const F_TXTIME: u8 = 0x18;
const F_ERROR: u8 = 0x19;
const F_DEVCLASS: u8 = 0x1A;
const F_PRIORITY: u8 = 0x1B;
const F_RXDELAY: u8 = 0x1C;
const F_RX1DR: u8 = 0x1D;
const F_RX1FREQ: u8 = 0x1E;
const F_RX2DR: u8 = 0x1F;
const F_RX2FREQ: u8 = 0x20;
const F_MUXTIME: u8 = 0x21;
const F_TXTIME_REQ: u8 = 0x22;

/// A data-plane message in its binary-codec envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum BinMessage {
    Updf(Updf),
    UpdfPdu(UpdfPdu),
    Jreq(Jreq),
    Rejoin(Rejoin),
    Propdf(Propdf),
    DnMsg(DnMsg),
    DnTxed(DnTxed),
    TimeSync(TimeSyncMsg),
}

struct Enc {
    buf: BytesMut,
}

impl Enc {
    fn new(msg: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(msg);
        Enc { buf }
    }

    fn field(&mut self, tag: u8, value: &[u8]) {
        debug_assert!(value.len() <= u16::MAX as usize);
        self.buf.put_u8(tag);
        self.buf.put_u16_le(value.len() as u16);
        self.buf.put_slice(value);
    }

    fn u8(&mut self, tag: u8, v: u8) {
        self.field(tag, &[v]);
    }

    fn u16(&mut self, tag: u8, v: u16) {
        self.field(tag, &v.to_le_bytes());
    }

    fn u32(&mut self, tag: u8, v: u32) {
        self.field(tag, &v.to_le_bytes());
    }

    fn i32(&mut self, tag: u8, v: i32) {
        self.field(tag, &v.to_le_bytes());
    }

    fn i64(&mut self, tag: u8, v: i64) {
        self.field(tag, &v.to_le_bytes());
    }

    fn u64(&mut self, tag: u8, v: u64) {
        self.field(tag, &v.to_le_bytes());
    }

    fn f32(&mut self, tag: u8, v: f32) {
        self.field(tag, &v.to_le_bytes());
    }

    fn f64(&mut self, tag: u8, v: f64) {
        self.field(tag, &v.to_le_bytes());
    }

    fn upinfo(&mut self, u: &UpInfo) {
        self.i64(F_RCTX, u.rctx);
        self.i64(F_XTIME, u.xtime);
        self.i64(F_GPSTIME, u.gpstime);
        self.i64(F_FTS, u.fts);
        self.f32(F_RSSI, u.rssi);
        self.f32(F_SNR, u.snr);
        self.f64(F_RXTIME, u.rxtime);
    }

    fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Encodes a data-plane message.
pub fn encode(msg: &BinMessage) -> Vec<u8> {
    match msg {
        BinMessage::Updf(m) => {
            let mut e = Enc::new(MSG_UPDF);
            e.u8(F_MHDR, m.mhdr);
            e.i32(F_DEVADDR, m.dev_addr);
            e.u8(F_FCTRL, m.fctrl);
            e.u16(F_FCNT, m.fcnt);
            e.field(F_FOPTS, &m.fopts);
            e.i32(F_FPORT, m.fport);
            e.field(F_FRMPAYLOAD, &m.frm_payload);
            e.i32(F_MIC, m.mic);
            e.f64(F_REFTIME, m.ref_time);
            e.u8(F_DR, m.dr);
            e.u32(F_FREQ, m.freq);
            e.upinfo(&m.upinfo);
            e.finish()
        }
        BinMessage::UpdfPdu(m) => {
            let mut e = Enc::new(MSG_UPDF_PDU);
            e.field(F_PDU, m.pdu.as_bytes());
            e.f64(F_REFTIME, m.ref_time);
            e.u8(F_DR, m.dr);
            e.u32(F_FREQ, m.freq);
            e.upinfo(&m.upinfo);
            e.finish()
        }
        BinMessage::Jreq(m) => {
            let mut e = Enc::new(MSG_JREQ);
            e.u8(F_MHDR, m.mhdr);
            e.u64(F_JOINEUI, m.join_eui.0);
            e.u64(F_DEVEUI, m.dev_eui.0);
            e.u16(F_DEVNONCE, m.dev_nonce);
            e.i32(F_MIC, m.mic);
            e.f64(F_REFTIME, m.ref_time);
            e.u8(F_DR, m.dr);
            e.u32(F_FREQ, m.freq);
            e.upinfo(&m.upinfo);
            e.finish()
        }
        BinMessage::Rejoin(m) => {
            let mut e = Enc::new(MSG_REJOIN);
            e.u8(F_MHDR, m.mhdr);
            e.field(F_PDU, m.pdu.as_bytes());
            e.i32(F_MIC, m.mic);
            e.f64(F_REFTIME, m.ref_time);
            e.u8(F_DR, m.dr);
            e.u32(F_FREQ, m.freq);
            e.upinfo(&m.upinfo);
            e.finish()
        }
        BinMessage::Propdf(m) => {
            let mut e = Enc::new(MSG_PROPDF);
            e.field(F_FRMPAYLOAD, &m.frm_payload);
            e.f64(F_REFTIME, m.ref_time);
            e.u8(F_DR, m.dr);
            e.u32(F_FREQ, m.freq);
            e.upinfo(&m.upinfo);
            e.finish()
        }
        BinMessage::DnMsg(m) => {
            let mut e = Enc::new(MSG_DNMSG);
            e.u64(F_DEVEUI, m.dev_eui.0);
            e.u8(F_DEVCLASS, m.d_c);
            e.i64(F_DIID, m.diid);
            e.field(F_PDU, m.pdu.as_bytes());
            e.u8(F_PRIORITY, m.priority);
            e.u8(F_RXDELAY, m.rx_delay);
            if let Some(v) = m.rx1dr {
                e.u8(F_RX1DR, v);
            }
            if let Some(v) = m.rx1freq {
                e.u32(F_RX1FREQ, v);
            }
            if let Some(v) = m.rx2dr {
                e.u8(F_RX2DR, v);
            }
            if let Some(v) = m.rx2freq {
                e.u32(F_RX2FREQ, v);
            }
            if let Some(v) = m.dr {
                e.u8(F_DR, v);
            }
            if let Some(v) = m.freq {
                e.u32(F_FREQ, v);
            }
            if let Some(v) = m.xtime {
                e.i64(F_XTIME, v);
            }
            if let Some(v) = m.rctx {
                e.i64(F_RCTX, v);
            }
            if let Some(v) = m.gpstime {
                e.i64(F_GPSTIME, v);
            }
            if let Some(v) = m.mux_time {
                e.f64(F_MUXTIME, v);
            }
            e.finish()
        }
        BinMessage::DnTxed(m) => {
            let mut e = Enc::new(MSG_DNTXED);
            e.i64(F_DIID, m.diid);
            e.u64(F_DEVEUI, m.dev_eui.0);
            e.i64(F_RCTX, m.rctx);
            e.i64(F_XTIME, m.xtime);
            e.f64(F_TXTIME, m.txtime);
            e.i64(F_GPSTIME, m.gpstime);
            if let Some(err) = &m.error {
                e.field(F_ERROR, err.as_bytes());
            }
            e.finish()
        }
        BinMessage::TimeSync(m) => {
            let mut e = Enc::new(MSG_TIMESYNC);
            if let Some(v) = m.txtime {
                e.i64(F_TXTIME_REQ, v);
            }
            if let Some(v) = m.gpstime {
                e.i64(F_GPSTIME, v);
            }
            if let Some(v) = m.xtime {
                e.i64(F_XTIME, v);
            }
            if let Some(v) = m.mux_time {
                e.f64(F_MUXTIME, v);
            }
            e.finish()
        }
    }
}

fn parse_field(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (i, tag) = be_u8(input)?;
    let (i, len) = le_u16(i)?;
    let (i, value) = take(len as usize)(i)?;
    Ok((i, (tag, value)))
}

fn codec_err(msg: impl Into<String>) -> StationError {
    StationError::BinaryCodec(msg.into())
}

fn as_u8(v: &[u8]) -> Result<u8, StationError> {
    v.first()
        .copied()
        .filter(|_| v.len() == 1)
        .ok_or_else(|| codec_err("bad u8 field"))
}

fn as_u16(v: &[u8]) -> Result<u16, StationError> {
    Ok(u16::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad u16 field"))?,
    ))
}

fn as_u32(v: &[u8]) -> Result<u32, StationError> {
    Ok(u32::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad u32 field"))?,
    ))
}

fn as_i32(v: &[u8]) -> Result<i32, StationError> {
    Ok(i32::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad i32 field"))?,
    ))
}

fn as_i64(v: &[u8]) -> Result<i64, StationError> {
    Ok(i64::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad i64 field"))?,
    ))
}

fn as_u64(v: &[u8]) -> Result<u64, StationError> {
    Ok(u64::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad u64 field"))?,
    ))
}

fn as_f32(v: &[u8]) -> Result<f32, StationError> {
    Ok(f32::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad f32 field"))?,
    ))
}

fn as_f64(v: &[u8]) -> Result<f64, StationError> {
    Ok(f64::from_le_bytes(
        v.try_into().map_err(|_| codec_err("bad f64 field"))?,
    ))
}

fn as_str(v: &[u8]) -> Result<String, StationError> {
    String::from_utf8(v.to_vec()).map_err(|_| codec_err("bad string field"))
}

#[derive(Default)]
struct Fields {
    upinfo: UpInfo,
    mhdr: u8,
    dev_addr: i32,
    fctrl: u8,
    fcnt: u16,
    fopts: Vec<u8>,
    fport: i32,
    frm_payload: Vec<u8>,
    mic: i32,
    ref_time: f64,
    dr: Option<u8>,
    freq: Option<u32>,
    join_eui: u64,
    dev_eui: u64,
    dev_nonce: u16,
    pdu: String,
    diid: i64,
    txtime: f64,
    error: Option<String>,
    d_c: u8,
    priority: u8,
    rx_delay: u8,
    rx1dr: Option<u8>,
    rx1freq: Option<u32>,
    rx2dr: Option<u8>,
    rx2freq: Option<u32>,
    xtime: Option<i64>,
    rctx: Option<i64>,
    gpstime: Option<i64>,
    mux_time: Option<f64>,
    txtime_req: Option<i64>,
}

fn collect(mut input: &[u8]) -> Result<Fields, StationError> {
    let mut f = Fields::default();
    while !input.is_empty() {
        let (rest, (tag, v)) =
            parse_field(input).map_err(|_| codec_err("truncated field"))?;
        input = rest;
        match tag {
            F_MHDR => f.mhdr = as_u8(v)?,
            F_DEVADDR => f.dev_addr = as_i32(v)?,
            F_FCTRL => f.fctrl = as_u8(v)?,
            F_FCNT => f.fcnt = as_u16(v)?,
            F_FOPTS => f.fopts = v.to_vec(),
            F_FPORT => f.fport = as_i32(v)?,
            F_FRMPAYLOAD => f.frm_payload = v.to_vec(),
            F_MIC => f.mic = as_i32(v)?,
            F_REFTIME => f.ref_time = as_f64(v)?,
            F_DR => f.dr = Some(as_u8(v)?),
            F_FREQ => f.freq = Some(as_u32(v)?),
            F_JOINEUI => f.join_eui = as_u64(v)?,
            F_DEVEUI => f.dev_eui = as_u64(v)?,
            F_DEVNONCE => f.dev_nonce = as_u16(v)?,
            F_PDU => f.pdu = as_str(v)?,
            F_RCTX => {
                let x = as_i64(v)?;
                f.rctx = Some(x);
                f.upinfo.rctx = x;
            }
            F_XTIME => {
                let x = as_i64(v)?;
                f.xtime = Some(x);
                f.upinfo.xtime = x;
            }
            F_GPSTIME => {
                let x = as_i64(v)?;
                f.gpstime = Some(x);
                f.upinfo.gpstime = x;
            }
            F_FTS => f.upinfo.fts = as_i64(v)?,
            F_RSSI => f.upinfo.rssi = as_f32(v)?,
            F_SNR => f.upinfo.snr = as_f32(v)?,
            F_RXTIME => f.upinfo.rxtime = as_f64(v)?,
            F_DIID => f.diid = as_i64(v)?,
            F_TXTIME => f.txtime = as_f64(v)?,
            F_ERROR => f.error = Some(as_str(v)?),
            F_DEVCLASS => f.d_c = as_u8(v)?,
            F_PRIORITY => f.priority = as_u8(v)?,
            F_RXDELAY => f.rx_delay = as_u8(v)?,
            F_RX1DR => f.rx1dr = Some(as_u8(v)?),
            F_RX1FREQ => f.rx1freq = Some(as_u32(v)?),
            F_RX2DR => f.rx2dr = Some(as_u8(v)?),
            F_RX2FREQ => f.rx2freq = Some(as_u32(v)?),
            F_MUXTIME => f.mux_time = Some(as_f64(v)?),
            F_TXTIME_REQ => f.txtime_req = Some(as_i64(v)?),
            _ => {} // forward compatibility: skip unknown tags
        }
    }
    Ok(f)
}

/// Decodes a data-plane message.
pub fn decode(data: &[u8]) -> Result<BinMessage, StationError> {
    let (&msg, rest) = data
        .split_first()
        .ok_or_else(|| codec_err("empty frame"))?;
    let f = collect(rest)?;
    let dr = f.dr.unwrap_or(0);
    let freq = f.freq.unwrap_or(0);
    Ok(match msg {
        MSG_UPDF => BinMessage::Updf(Updf {
            msgtype: "updf".into(),
            mhdr: f.mhdr,
            dev_addr: f.dev_addr,
            fctrl: f.fctrl,
            fcnt: f.fcnt,
            fopts: f.fopts,
            fport: f.fport,
            frm_payload: f.frm_payload,
            mic: f.mic,
            ref_time: f.ref_time,
            dr,
            freq,
            upinfo: f.upinfo,
        }),
        MSG_UPDF_PDU => BinMessage::UpdfPdu(UpdfPdu {
            msgtype: "updf".into(),
            pdu: f.pdu,
            ref_time: f.ref_time,
            dr,
            freq,
            upinfo: f.upinfo,
        }),
        MSG_JREQ => BinMessage::Jreq(Jreq {
            msgtype: "jreq".into(),
            mhdr: f.mhdr,
            join_eui: Eui(f.join_eui),
            dev_eui: Eui(f.dev_eui),
            dev_nonce: f.dev_nonce,
            mic: f.mic,
            ref_time: f.ref_time,
            dr,
            freq,
            upinfo: f.upinfo,
        }),
        MSG_REJOIN => BinMessage::Rejoin(Rejoin {
            msgtype: "rejoin".into(),
            mhdr: f.mhdr,
            pdu: f.pdu,
            mic: f.mic,
            ref_time: f.ref_time,
            dr,
            freq,
            upinfo: f.upinfo,
        }),
        MSG_PROPDF => BinMessage::Propdf(Propdf {
            msgtype: "propdf".into(),
            frm_payload: f.frm_payload,
            ref_time: f.ref_time,
            dr,
            freq,
            upinfo: f.upinfo,
        }),
        MSG_DNMSG => BinMessage::DnMsg(DnMsg {
            dev_eui: Eui(f.dev_eui),
            d_c: f.d_c,
            diid: f.diid,
            pdu: f.pdu,
            priority: f.priority,
            rx_delay: f.rx_delay,
            rx1dr: f.rx1dr,
            rx1freq: f.rx1freq,
            rx2dr: f.rx2dr,
            rx2freq: f.rx2freq,
            dr: f.dr,
            freq: f.freq,
            xtime: f.xtime,
            rctx: f.rctx,
            gpstime: f.gpstime,
            mux_time: f.mux_time,
        }),
        MSG_DNTXED => BinMessage::DnTxed(DnTxed {
            msgtype: "dntxed".into(),
            diid: f.diid,
            dev_eui: Eui(f.dev_eui),
            rctx: f.rctx.unwrap_or(0),
            xtime: f.xtime.unwrap_or(0),
            txtime: f.txtime,
            gpstime: f.gpstime.unwrap_or(0),
            error: f.error,
        }),
        MSG_TIMESYNC => BinMessage::TimeSync(TimeSyncMsg {
            msgtype: "timesync".into(),
            txtime: f.txtime_req,
            gpstime: f.gpstime,
            xtime: f.xtime,
            mux_time: f.mux_time,
        }),
        other => return Err(codec_err(format!("unknown message type {other}"))),
    })
}
