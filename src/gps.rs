//! NMEA time-of-day consumption.
//!
//! The concentrator latches the PPS edge; this module supplies the
//! matching time of day by reading `RMC` sentences from a serial GPS
//! device. Only the timestamp is consumed; position fields are ignored.
//! When the LNS sets `gps_enable: false`, the station simply stops
//! consuming fixes; PPS latching continues on its own.

use crate::error::StationError;
use crate::logging::{self, SYN};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// GPS runs ahead of UTC by the accumulated leap seconds.
pub const GPS_UTC_LEAP_SECONDS: i64 = 18;

/// Validates the `*hh` NMEA checksum (XOR of everything between `$` and
/// `*`).
fn checksum_ok(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('$') else {
        return false;
    };
    let Some((body, sum)) = rest.rsplit_once('*') else {
        // Checksum is optional in NMEA; accept its absence.
        return true;
    };
    let computed = body.bytes().fold(0u8, |acc, b| acc ^ b);
    u8::from_str_radix(sum.trim(), 16) == Ok(computed)
}

/// Parses a `$GPRMC`/`$GNRMC` sentence into a UTC instant. Returns `None`
/// for other sentences, void fixes and malformed input.
pub fn parse_rmc(line: &str) -> Option<DateTime<Utc>> {
    if !checksum_ok(line) {
        return None;
    }
    let body = line.strip_prefix('$')?;
    let body = body.split('*').next()?;
    let fields: Vec<&str> = body.split(',').collect();
    if fields.is_empty() || !fields[0].ends_with("RMC") || fields.len() < 10 {
        return None;
    }
    if fields[2] != "A" {
        return None; // void fix
    }
    let time = fields[1];
    let date = fields[9];
    if time.len() < 6 || date.len() != 6 {
        return None;
    }
    let (h, m) = (time[0..2].parse().ok()?, time[2..4].parse().ok()?);
    let s: f64 = time[4..].parse().ok()?;
    let (day, mon) = (date[0..2].parse().ok()?, date[2..4].parse().ok()?);
    let year: i32 = date[4..6].parse::<i32>().ok()? + 2000;

    let nd = NaiveDate::from_ymd_opt(year, mon, day)?;
    let nt = NaiveTime::from_hms_micro_opt(h, m, s as u32, ((s.fract()) * 1e6) as u32)?;
    Some(NaiveDateTime::new(nd, nt).and_utc())
}

/// A serial NMEA source delivering UTC fixes.
pub struct GpsDevice {
    lines: Lines<BufReader<SerialStream>>,
}

impl GpsDevice {
    pub fn open(path: &str, baud: u32) -> Result<Self, StationError> {
        let stream = tokio_serial::new(path, baud)
            .open_native_async()
            .map_err(|e| StationError::Config(format!("GPS device {path}: {e}")))?;
        logging::log_info(SYN, &format!("GPS device {path} at {baud} baud"));
        Ok(GpsDevice {
            lines: BufReader::new(stream).lines(),
        })
    }

    /// The next valid RMC fix, or `None` on a read error / non-RMC line.
    pub async fn next_fix(&mut self) -> Option<DateTime<Utc>> {
        match self.lines.next_line().await {
            Ok(Some(line)) => parse_rmc(&line),
            Ok(None) => None,
            Err(e) => {
                logging::log_warn(SYN, &format!("GPS read error: {e}"));
                None
            }
        }
    }
}
