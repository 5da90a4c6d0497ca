//! # Wire codecs
//!
//! JSON is the default representation for every LNS message; the field
//! conventions (hyphenated EUIs, uppercase hex byte strings, signed MIC and
//! DevAddr) live here as serde helper modules so the message structs in
//! [`crate::s2e::msg`] stay declarative. The optional tag-length-value
//! binary representation is in [`binary`].

pub mod binary;

use crate::error::StationError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;

/// PDU string encoding selected by the LNS (`pdu_encoding`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PduEncoding {
    #[default]
    Hex,
    Base64,
}

impl FromStr for PduEncoding {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(PduEncoding::Hex),
            "base64" | "b64" => Ok(PduEncoding::Base64),
            other => Err(StationError::RouterConfig(format!(
                "unknown pdu_encoding {other:?}"
            ))),
        }
    }
}

/// Encodes a PDU per the session encoding.
pub fn encode_pdu(bytes: &[u8], enc: PduEncoding) -> String {
    match enc {
        PduEncoding::Hex => hex::encode_upper(bytes),
        PduEncoding::Base64 => BASE64.encode(bytes),
    }
}

/// Decodes a PDU string per the session encoding. Hex is accepted in
/// either case.
pub fn decode_pdu(s: &str, enc: PduEncoding) -> Result<Vec<u8>, StationError> {
    match enc {
        PduEncoding::Hex => hex::decode(s).map_err(|_| StationError::InvalidHexString),
        PduEncoding::Base64 => BASE64
            .decode(s)
            .map_err(|_| StationError::InvalidBase64String),
    }
}

/// Serde codec for EUIs in the hyphenated uppercase wire form.
pub mod eui_str {
    use super::*;
    use crate::phy::Eui;

    pub fn serialize<S: Serializer>(eui: &Eui, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&eui.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Eui, D::Error> {
        let s = String::deserialize(de)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde codec for byte arrays as uppercase hex strings.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
