//! Structured logging for the station.
//!
//! Every log line carries a stable subsystem prefix (`S2E`, `RAL`, `SYN`,
//! `TC`, `TX`, `SYS`) so failures can be attributed without parsing free
//! text. Backed by the `log` facade with `env_logger`.

use log::{debug, error, info, log_enabled, warn, Level};

/// Session engine / LNS protocol.
pub const S2E: &str = "S2E";
/// Radio abstraction layer.
pub const RAL: &str = "RAL";
/// Time synchronization (PPS, drift, GPS).
pub const SYN: &str = "SYN";
/// Transport connection (muxs link).
pub const TC: &str = "TC";
/// Transmission pipeline.
pub const TX: &str = "TX";
/// Process-level events (signals, startup, shutdown).
pub const SYS: &str = "SYS";

/// Initializes the logger with the `env_logger` crate.
///
/// Filtering is controlled through `RUST_LOG`, e.g.
/// `RUST_LOG=lorastation=debug`.
pub fn init_logger() {
    env_logger::init();
}

/// Re-opens the log sink. env_logger writes to stderr, so rotation is
/// handled by whoever redirected stderr; the SIGHUP handler still calls
/// this so the event is visible in the stream.
pub fn reopen() {
    info!("{SYS}: log sink re-opened");
}

/// Logs an error message for a subsystem.
pub fn log_error(subsystem: &str, message: &str) {
    if log_enabled!(Level::Error) {
        error!("{subsystem}: {message}");
    }
}

/// Logs a warning message for a subsystem.
pub fn log_warn(subsystem: &str, message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{subsystem}: {message}");
    }
}

/// Logs an informational message for a subsystem.
pub fn log_info(subsystem: &str, message: &str) {
    if log_enabled!(Level::Info) {
        info!("{subsystem}: {message}");
    }
}

/// Logs a debug message for a subsystem.
pub fn log_debug(subsystem: &str, message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{subsystem}: {message}");
    }
}
