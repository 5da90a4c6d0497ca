//! # Hardware Abstraction Layer for the Concentrator
//!
//! This module defines the [`Concentrator`] trait the RAL drives. Hardware
//! back-ends (SX1301/SX1302 SPI, picocell, raw USB) implement it out of
//! tree; the in-tree [`crate::ral::sim::SimConcentrator`] implements it for
//! tests and the `--sim` mode. The trait is synchronous: all calls complete
//! in microseconds or report readiness instead of blocking.

use crate::ral::chanplan::ChipConfig;
use thiserror::Error;

/// Errors that can occur during HAL operations
#[derive(Debug, Error)]
pub enum HalError {
    #[error("Concentrator start failed: {0}")]
    Init(String),

    #[error("SPI communication error")]
    Spi,

    #[error("Transmitter busy")]
    TxBusy,

    #[error("Timeout waiting for operation")]
    Timeout,

    #[error("Operation not supported by this concentrator")]
    NotSupported,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Modulation of a packet on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Lora { sf: u8, bw_khz: u32 },
    Fsk,
}

/// A packet delivered by the concentrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    pub freq_hz: u32,
    pub modulation: Modulation,
    /// Radio counter at end of reception (32-bit, wraps).
    pub count_us: u32,
    pub rssi: f32,
    pub snr: f32,
    pub payload: Vec<u8>,
    /// Fine timestamp in nanoseconds, if the hardware produced one.
    pub fts_ns: Option<i64>,
    pub rf_chain: u8,
    pub crc_ok: bool,
}

/// A packet handed to the concentrator for transmission at `count_us`.
#[derive(Debug, Clone, PartialEq)]
pub struct TxPacket {
    pub freq_hz: u32,
    pub modulation: Modulation,
    pub power_dbm: f32,
    pub count_us: u32,
    pub payload: Vec<u8>,
    pub rf_chain: u8,
    /// Downlinks use inverted polarity so other gateways ignore them.
    pub invert_pol: bool,
}

/// Transmit path state of one RF chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Free,
    Scheduled,
    Emitting,
}

/// The concentrator contract consumed by the RAL.
///
/// Exactly one owner (the RAL) holds the implementation; every other
/// component reaches the hardware through the RAL's typed interface.
pub trait Concentrator: Send {
    /// Applies a chip configuration and starts the radio.
    fn start(&mut self, config: &ChipConfig) -> Result<(), HalError>;

    /// Stops the radio and releases the hardware.
    fn stop(&mut self) -> Result<(), HalError>;

    /// Drains packets received since the last poll. Never blocks.
    fn receive(&mut self) -> Result<Vec<RxPacket>, HalError>;

    /// Schedules a transmission for the packet's `count_us`.
    fn send(&mut self, pkt: TxPacket) -> Result<(), HalError>;

    /// Transmit path state of an RF chain.
    fn tx_status(&mut self, rf_chain: u8) -> Result<TxStatus, HalError>;

    /// Aborts a scheduled or ongoing transmission.
    fn abort_tx(&mut self, rf_chain: u8) -> Result<(), HalError>;

    /// Instantaneous value of the free-running microsecond counter.
    fn instcnt(&mut self) -> Result<u32, HalError>;

    /// Counter value latched at the most recent PPS edge, if any.
    fn pps_latch(&mut self) -> Result<Option<u32>, HalError>;

    /// Measures RSSI on `freq_hz` for `scan_time_us` (CCA support).
    fn rssi_scan(&mut self, freq_hz: u32, scan_time_us: u32) -> Result<f32, HalError>;

    /// Toggles the GPS device supply (PPS loss recovery).
    fn set_gps_enable(&mut self, enabled: bool) -> Result<(), HalError>;

    /// Identifier of the current HAL session. Changes when a slave
    /// restarts; xtimes across different sessions are not comparable.
    fn session_id(&mut self) -> Result<u16, HalError>;

    /// If a reception is in progress on single-duplex hardware, the
    /// counter value at which it will end.
    fn rx_busy_until(&mut self) -> Result<Option<u32>, HalError>;
}
