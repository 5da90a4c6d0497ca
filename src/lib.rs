//! # lorastation - A Rust Implementation of a LoRaWAN Gateway Station
//!
//! The lorastation crate mediates between an SX130x-family concentrator
//! radio and a LoRaWAN Network Server (LNS). It forwards uplink LoRa
//! frames from end devices to the LNS and schedules downlink
//! transmissions delivered by the LNS at microsecond-accurate times on
//! the concentrator.
//!
//! ## Architecture
//!
//! - [`s2e`] — the session engine: LNS protocol parsing/emission,
//!   `router_config` materialization, regional DR tables, filters.
//! - [`ral`] — the radio abstraction layer: exclusive HAL ownership,
//!   channel-plan allocation, rx job production, the time domain.
//! - [`tx`] — the transmission pipeline: priority queue, regulatory
//!   admission (duty cycle, CCA, dwell, EIRP), confirmations.
//! - [`codec`] — the JSON field conventions and the optional binary
//!   data-plane codec.
//! - [`station`] — the single-task reactor tying everything together.
//!
//! Hardware back-ends implement [`ral::hal::Concentrator`]; the crate
//! ships a scripted simulator ([`ral::sim`]) used by the test suite and
//! the `--sim` mode. The muxs link implements [`transport::Transport`];
//! the TLS WebSocket transport is an external collaborator.

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod gps;
pub mod logging;
pub mod phy;
pub mod ral;
pub mod region;
pub mod s2e;
pub mod station;
pub mod stats;
pub mod timesync;
pub mod transport;
pub mod tx;

pub use crate::error::StationError;
pub use crate::logging::init_logger;

// Core station types
pub use config::StationConf;
pub use ral::hal::Concentrator;
pub use ral::{Ral, RxJob};
pub use s2e::router_config::SessionContext;
pub use s2e::{Session, StationIdent};
pub use station::{ExitReason, Station};
pub use transport::Transport;
