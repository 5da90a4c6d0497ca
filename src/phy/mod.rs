//! # LoRaWAN PHY Frame Layer
//!
//! This module parses uplink PHYPayloads as received from the concentrator,
//! using the `nom` crate for the byte-level work. Only the PHY header is
//! interpreted; MAC-layer semantics (join handling, MIC verification, frame
//! counters) belong to the network server.
//!
//! Frame acceptance rules:
//! - only LoRaWAN major version R1 frames are accepted,
//! - join requests must be exactly 23 bytes,
//! - rejoin requests must be 19..=24 bytes and are never parsed beyond
//!   MHdr and MIC (the subtype layout varies; the LNS gets the raw PDU),
//! - downlink frame types picked up off the air are dropped.

pub mod airtime;

use crate::constants::{
    DATA_MIN_LEN, FCTRL_FOPTSLEN_MASK, FTYPE_DADN, FTYPE_DAUP, FTYPE_DCDN, FTYPE_DCUP,
    FTYPE_JACC, FTYPE_JREQ, FTYPE_PROP, FTYPE_REJOIN, JREQ_LEN, MHDR_FTYPE_MASK,
    MHDR_MAJOR_MASK, MHDR_MAJOR_V1, MIC_LEN, REJOIN_MAX_LEN, REJOIN_MIN_LEN,
};
use crate::error::StationError;
use bitflags::bitflags;
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, le_u16, le_u32};
use nom::IResult;
use std::fmt;
use std::str::FromStr;

/// A 64-bit extended unique identifier (JoinEUI/DevEUI).
///
/// Stored numerically; rendered in the hyphenated uppercase form the LNS
/// protocol uses (`01-02-03-04-05-06-07-08`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Eui(pub u64);

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}-{:02X}-{:02X}-{:02X}-{:02X}-{:02X}-{:02X}-{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl fmt::Debug for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui({self})")
    }
}

impl FromStr for Eui {
    type Err = StationError;

    /// Accepts hyphenated, colon-separated or bare 16-digit hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hexstr: String = s.chars().filter(|c| *c != '-' && *c != ':').collect();
        if hexstr.len() != 16 {
            return Err(StationError::InvalidEui(s.to_string()));
        }
        u64::from_str_radix(&hexstr, 16)
            .map(Eui)
            .map_err(|_| StationError::InvalidEui(s.to_string()))
    }
}

bitflags! {
    /// Uplink FCtrl flag bits. The low nibble (FOptsLen) is masked off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FCtrlFlags: u8 {
        const ADR = 0x80;
        const ADR_ACK_REQ = 0x40;
        const ACK = 0x20;
        const CLASS_B = 0x10;
    }
}

/// A parsed join request (MHdr frame type 000, length exactly 23).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub mhdr: u8,
    pub join_eui: Eui,
    pub dev_eui: Eui,
    pub dev_nonce: u16,
    pub mic: i32,
}

/// A parsed uplink data frame (confirmed or unconfirmed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub mhdr: u8,
    pub dev_addr: u32,
    pub fctrl: u8,
    pub fcnt: u16,
    pub fopts: Vec<u8>,
    pub fport: Option<u8>,
    pub frm_payload: Vec<u8>,
    pub mic: i32,
}

impl DataFrame {
    pub fn flags(&self) -> FCtrlFlags {
        FCtrlFlags::from_bits_truncate(self.fctrl)
    }

    pub fn confirmed(&self) -> bool {
        self.mhdr & MHDR_FTYPE_MASK == FTYPE_DCUP
    }
}

/// A rejoin request. Only MHdr and MIC are extracted; the subtype-specific
/// interior is forwarded raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejoinRequest {
    pub mhdr: u8,
    pub mic: i32,
}

/// The uplink frame classes the station forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkFrame {
    Join(JoinRequest),
    Data(DataFrame),
    Rejoin(RejoinRequest),
    Proprietary,
}

fn frame_err(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
}

fn parse_join_request(pdu: &[u8]) -> IResult<&[u8], JoinRequest> {
    let (i, mhdr) = be_u8(pdu)?;
    let (i, join_eui) = le_u64_eui(i)?;
    let (i, dev_eui) = le_u64_eui(i)?;
    let (i, dev_nonce) = le_u16(i)?;
    let (i, mic) = le_mic(i)?;
    Ok((
        i,
        JoinRequest {
            mhdr,
            join_eui,
            dev_eui,
            dev_nonce,
            mic,
        },
    ))
}

fn le_u64_eui(input: &[u8]) -> IResult<&[u8], Eui> {
    let (i, bytes) = take(8usize)(input)?;
    let mut v: u64 = 0;
    for b in bytes.iter().rev() {
        v = (v << 8) | *b as u64;
    }
    Ok((i, Eui(v)))
}

fn le_mic(input: &[u8]) -> IResult<&[u8], i32> {
    let (i, v) = le_u32(input)?;
    Ok((i, v as i32))
}

fn parse_data_frame(pdu: &[u8]) -> IResult<&[u8], DataFrame> {
    let (i, mhdr) = be_u8(pdu)?;
    let (i, dev_addr) = le_u32(i)?;
    let (i, fctrl) = be_u8(i)?;
    let (i, fcnt) = le_u16(i)?;
    let fopts_len = (fctrl & FCTRL_FOPTSLEN_MASK) as usize;
    if i.len() < fopts_len + MIC_LEN {
        return Err(frame_err(i));
    }
    let (i, fopts) = take(fopts_len)(i)?;
    // Whatever precedes the 4-byte MIC is FPort + FRMPayload (both optional).
    let body_len = i.len() - MIC_LEN;
    let (i, body) = take(body_len)(i)?;
    let (i, mic) = le_mic(i)?;
    let (fport, frm_payload) = match body.split_first() {
        Some((port, rest)) => (Some(*port), rest.to_vec()),
        None => (None, Vec::new()),
    };
    Ok((
        i,
        DataFrame {
            mhdr,
            dev_addr,
            fctrl,
            fcnt,
            fopts: fopts.to_vec(),
            fport,
            frm_payload,
            mic,
        },
    ))
}

/// Parses an uplink PHYPayload, applying the station's acceptance rules.
///
/// Returns `Err` for frames that must be dropped (bad length, unknown major
/// version, downlink frame types). The error never terminates the session;
/// the caller counts and continues.
pub fn parse_uplink(pdu: &[u8]) -> Result<UplinkFrame, StationError> {
    let mhdr = *pdu
        .first()
        .ok_or_else(|| StationError::FrameParse("empty PHYPayload".into()))?;
    if mhdr & MHDR_MAJOR_MASK != MHDR_MAJOR_V1 {
        return Err(StationError::FrameParse(format!(
            "unsupported major version in MHdr 0x{mhdr:02X}"
        )));
    }
    match mhdr & MHDR_FTYPE_MASK {
        FTYPE_JREQ => {
            if pdu.len() != JREQ_LEN {
                return Err(StationError::FrameParse(format!(
                    "join request length {} != {JREQ_LEN}",
                    pdu.len()
                )));
            }
            let (_, jreq) = parse_join_request(pdu)
                .map_err(|e| StationError::FrameParse(format!("join request: {e}")))?;
            Ok(UplinkFrame::Join(jreq))
        }
        FTYPE_DAUP | FTYPE_DCUP => {
            if pdu.len() < DATA_MIN_LEN {
                return Err(StationError::FrameParse(format!(
                    "data frame length {} < {DATA_MIN_LEN}",
                    pdu.len()
                )));
            }
            let (_, frame) = parse_data_frame(pdu)
                .map_err(|e| StationError::FrameParse(format!("data frame: {e}")))?;
            Ok(UplinkFrame::Data(frame))
        }
        FTYPE_REJOIN => {
            if pdu.len() < REJOIN_MIN_LEN || pdu.len() > REJOIN_MAX_LEN {
                return Err(StationError::FrameParse(format!(
                    "rejoin request length {} outside [{REJOIN_MIN_LEN}, {REJOIN_MAX_LEN}]",
                    pdu.len()
                )));
            }
            let mic = i32::from_le_bytes(pdu[pdu.len() - MIC_LEN..].try_into().unwrap());
            Ok(UplinkFrame::Rejoin(RejoinRequest { mhdr, mic }))
        }
        FTYPE_PROP => Ok(UplinkFrame::Proprietary),
        FTYPE_JACC | FTYPE_DADN | FTYPE_DCDN => Err(StationError::FrameParse(format!(
            "not an uplink frame type: MHdr 0x{mhdr:02X}"
        ))),
        _ => unreachable!("3-bit frame type"),
    }
}
