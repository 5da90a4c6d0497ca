//! # Station Error Handling
//!
//! This module defines the StationError enum, which represents the different
//! error types that can occur in the lorastation crate.

use crate::ral::hal::HalError;
use thiserror::Error;

/// Represents the different error types that can occur in the station.
#[derive(Debug, Error)]
pub enum StationError {
    /// Indicates an invalid station or slave configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Indicates a protocol violation by the LNS peer.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Indicates a router_config that cannot be applied.
    #[error("Invalid router_config: {0}")]
    RouterConfig(String),

    /// Indicates an error when parsing a PHY frame.
    #[error("Error parsing PHY frame: {0}")]
    FrameParse(String),

    /// Indicates a message type this station does not recognize.
    #[error("Unknown msgtype: {0}")]
    UnknownMsgType(String),

    /// Indicates a concentrator HAL failure.
    #[error("Concentrator error: {0}")]
    Hal(#[from] HalError),

    /// Indicates the channel plan does not fit the concentrator.
    #[error("Channel allocation failed: {0}")]
    ChanPlan(String),

    /// Indicates an operation mixing xtimes from different sessions, or a
    /// time mapping that is not (yet) established.
    #[error("Time domain error: {0}")]
    TimeDomain(String),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// Indicates an invalid base64 string was provided.
    #[error("Invalid base64 string")]
    InvalidBase64String,

    /// Indicates a malformed EUI.
    #[error("Invalid EUI: {0}")]
    InvalidEui(String),

    /// Indicates a binary codec decode failure.
    #[error("Binary codec error: {0}")]
    BinaryCodec(String),

    /// Indicates the LNS transport is gone.
    #[error("Transport closed")]
    TransportClosed,

    /// Indicates a JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Indicates an I/O failure (config files, GPS device).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
