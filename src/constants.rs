//! LoRaWAN PHY and Station Protocol Constants
//!
//! This module defines constants used by the PHY frame layer, the session
//! engine and the time-domain machinery, based on LoRaWAN L2 1.0.4 and
//! RP002 regional parameters.

use std::time::Duration;

/// MHdr mask for the frame type (top 3 bits)
pub const MHDR_FTYPE_MASK: u8 = 0xE0;

/// MHdr mask for the major protocol version (bottom 2 bits)
pub const MHDR_MAJOR_MASK: u8 = 0x03;

/// Major version value for LoRaWAN R1 (the only one accepted)
pub const MHDR_MAJOR_V1: u8 = 0x00;

// Frame types (MHdr & MHDR_FTYPE_MASK)
pub const FTYPE_JREQ: u8 = 0x00;
pub const FTYPE_JACC: u8 = 0x20;
pub const FTYPE_DAUP: u8 = 0x40; // unconfirmed data up
pub const FTYPE_DADN: u8 = 0x60; // unconfirmed data down
pub const FTYPE_DCUP: u8 = 0x80; // confirmed data up
pub const FTYPE_DCDN: u8 = 0xA0; // confirmed data down
pub const FTYPE_REJOIN: u8 = 0xC0;
pub const FTYPE_PROP: u8 = 0xE0;

/// Exact length of a join request PHYPayload
pub const JREQ_LEN: usize = 23;

/// Accepted length range of a rejoin request PHYPayload
pub const REJOIN_MIN_LEN: usize = 19;
pub const REJOIN_MAX_LEN: usize = 24;

/// Minimum length of a data frame: MHdr + DevAddr + FCtrl + FCnt + MIC
pub const DATA_MIN_LEN: usize = 12;

/// Length of the MIC trailer
pub const MIC_LEN: usize = 4;

/// FCtrl mask for the FOpts length
pub const FCTRL_FOPTSLEN_MASK: u8 = 0x0F;

/// Maximum number of uplink channels a session may configure
pub const MAX_UPCHANNELS: usize = 16;

/// Number of entries in a DR table
pub const DR_TABLE_LEN: usize = 16;

/// Number of multi-SF 125 kHz IF chains on an SX130x
pub const MAX_MULTISF_CHAINS: usize = 8;

/// IF offset budget around an RF front-end center frequency (Hz)
pub const IF_OFFSET_MAX_HZ: i64 = 400_000;

/// Bounded capacity of the downlink queue; on exhaustion the oldest
/// lowest-priority job is dropped
pub const MAX_DNQUEUE: usize = 64;

/// Handoff slack subtracted from a job's transmit instant when arming the
/// concentrator (covers HAL latency)
pub const TX_SLACK_US: u64 = 10_000;

/// Guard added after an RX window before a deferred transmission may start
pub const HALF_DUPLEX_GUARD_US: u64 = 2_000;

/// Window within which uplinks seen by two modems count as mirrors of the
/// same transmission and are merged
pub const RX_MERGE_WINDOW_US: i64 = 30_000;

/// PPS latch poll interval
pub const PPS_POLL_INTERVAL: Duration = Duration::from_millis(128);

/// No valid PPS for this long triggers GPS-enable toggling
pub const PPS_LOSS_TIMEOUT: Duration = Duration::from_secs(90);

/// Retry interval between GPS-enable toggles while PPS stays lost
pub const PPS_RESET_RETRY: Duration = Duration::from_secs(5);

/// Failed GPS resets before the process gives up
pub const PPS_MAX_RESETS: u32 = 6;

/// Base count for the drift-rejection escalation thresholds
pub const QUICK_RETRIES: u32 = 3;

/// Consecutive drift rejections after which the tolerance is widened once
pub const DRIFT_WIDEN_AT: u32 = 2 * QUICK_RETRIES;

/// Consecutive drift rejections after which the process must exit
pub const DRIFT_FATAL_AT: u32 = 5 * QUICK_RETRIES;

/// Initial PPS drift spread tolerance (ppm)
pub const DRIFT_TOLERANCE_PPM: f64 = 60.0;

/// Widened PPS drift spread tolerance (ppm)
pub const DRIFT_TOLERANCE_WIDE_PPM: f64 = 200.0;

/// Interval between station-initiated timesync exchanges with the LNS
pub const TIMESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Seconds between the GPS epoch (1980-01-06) and the Unix epoch
pub const GPS_UNIX_OFFSET_S: i64 = 315_964_800;

/// LNS protocol version spoken by this station
pub const PROTOCOL_VERSION: u32 = 2;

/// Nominal microseconds per PPS interval
pub const PPS_INTERVAL_US: i64 = 1_000_000;
