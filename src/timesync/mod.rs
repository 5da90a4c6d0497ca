//! # Time-domain state
//!
//! Maintains the mapping between the concentrator's free-running
//! microsecond counter (extended to 64 bits and tagged with a session id),
//! host UTC and GPS time. The PPS anchor is the primary source; a
//! GPS-transfer anchor received from the LNS over `timesync` messages is
//! the fallback when no PPS is available.
//!
//! xtime layout: bits 63..48 carry the session id, bits 47..0 the extended
//! counter. xtimes from different sessions are never comparable; the
//! arithmetic helpers return an error instead of a meaningless difference.

pub mod pps;

use crate::constants::GPS_UNIX_OFFSET_S;
use crate::error::StationError;
use self::pps::{PpsMonitor, PpsVerdict};
use std::time::Instant;

const XTIME_EXT_MASK: i64 = 0x0000_FFFF_FFFF_FFFF;

/// Builds an xtime from a session id and an extended counter value.
pub fn compose_xtime(session: u16, ext_us: u64) -> i64 {
    ((session as i64) << 48) | (ext_us as i64 & XTIME_EXT_MASK)
}

/// The session id embedded in an xtime.
pub fn xtime_session(xtime: i64) -> u16 {
    ((xtime >> 48) & 0xFFFF) as u16
}

/// The extended counter part of an xtime, in microseconds.
pub fn xtime_ext_us(xtime: i64) -> i64 {
    xtime & XTIME_EXT_MASK
}

/// `a - b` in microseconds, defined only within one session.
pub fn xtime_diff(a: i64, b: i64) -> Result<i64, StationError> {
    if xtime_session(a) != xtime_session(b) {
        return Err(StationError::TimeDomain(format!(
            "xtimes from different sessions ({} vs {})",
            xtime_session(a),
            xtime_session(b)
        )));
    }
    Ok(xtime_ext_us(a) - xtime_ext_us(b))
}

/// Converts Unix-epoch UTC microseconds to GPS-epoch microseconds.
pub fn utc_us_to_gpstime_us(utc_us: i64, leap_seconds: i64) -> i64 {
    utc_us - GPS_UNIX_OFFSET_S * 1_000_000 + leap_seconds * 1_000_000
}

/// Per-concentrator time-domain record.
#[derive(Debug)]
pub struct TimeDomain {
    session: u16,
    /// Last accepted PPS latch: (xtime, host UTC microseconds).
    pps_anchor: Option<(i64, i64)>,
    /// LNS GPS transfer: (xtime, gpstime microseconds).
    lns_anchor: Option<(i64, i64)>,
    /// `gpstime - utc` in microseconds, once GPS time-of-day is known.
    utc_gps_offset_us: Option<i64>,
    pub monitor: PpsMonitor,
}

impl TimeDomain {
    pub fn new(session: u16, now: Instant) -> Self {
        TimeDomain {
            session,
            pps_anchor: None,
            lns_anchor: None,
            utc_gps_offset_us: None,
            monitor: PpsMonitor::new(now),
        }
    }

    pub fn session(&self) -> u16 {
        self.session
    }

    /// Handles a detected session restart: drift statistics always clear;
    /// on the primary txunit the PPS state clears too.
    pub fn on_session_restart(&mut self, session: u16, primary: bool, now: Instant) {
        self.session = session;
        self.monitor.reset_stats(now);
        self.lns_anchor = None;
        if primary {
            self.pps_anchor = None;
        }
    }

    /// Feeds a latched PPS counter value. `host_utc_us` is the wall clock
    /// at (approximately) the latched edge.
    pub fn record_pps(&mut self, latch_xtime: i64, host_utc_us: i64, now: Instant) -> PpsVerdict {
        debug_assert_eq!(xtime_session(latch_xtime), self.session);
        let verdict = self.monitor.observe(xtime_ext_us(latch_xtime), now);
        if matches!(verdict, PpsVerdict::Accepted { .. } | PpsVerdict::First) {
            self.pps_anchor = Some((latch_xtime, host_utc_us));
        }
        verdict
    }

    /// Sets the GPS-vs-UTC offset learned from the NMEA time of day.
    pub fn set_utc_gps_offset(&mut self, offset_us: i64) {
        self.utc_gps_offset_us = Some(offset_us);
    }

    /// Records a GPS-transfer anchor from an LNS timesync message.
    pub fn set_lns_anchor(&mut self, xtime: i64, gpstime_us: i64) -> Result<(), StationError> {
        if xtime_session(xtime) != self.session {
            return Err(StationError::TimeDomain(
                "timesync anchor for a stale session".into(),
            ));
        }
        self.lns_anchor = Some((xtime, gpstime_us));
        Ok(())
    }

    pub fn has_pps(&self) -> bool {
        self.pps_anchor.is_some()
    }

    /// Maps an xtime to host UTC microseconds.
    pub fn xtime_to_utc(&self, xtime: i64) -> Result<i64, StationError> {
        match self.pps_anchor {
            Some((px, putc)) => Ok(putc + xtime_diff(xtime, px)?),
            None => match (self.lns_anchor, self.utc_gps_offset_us) {
                (Some((ax, ag)), Some(off)) => Ok(ag + xtime_diff(xtime, ax)? - off),
                _ => Err(StationError::TimeDomain("no UTC anchor".into())),
            },
        }
    }

    /// Maps an xtime to GPS-epoch microseconds, 0 when no mapping exists
    /// (the wire convention for "unknown").
    pub fn xtime_to_gpstime(&self, xtime: i64) -> i64 {
        if let (Some((px, putc)), Some(off)) = (self.pps_anchor, self.utc_gps_offset_us) {
            if let Ok(d) = xtime_diff(xtime, px) {
                return putc + d + off;
            }
        }
        if let Some((ax, ag)) = self.lns_anchor {
            if let Ok(d) = xtime_diff(xtime, ax) {
                return ag + d;
            }
        }
        0
    }

    /// Maps a GPS-epoch instant to an xtime (class B scheduling).
    pub fn gpstime_to_xtime(&self, gpstime_us: i64) -> Result<i64, StationError> {
        if let (Some((px, putc)), Some(off)) = (self.pps_anchor, self.utc_gps_offset_us) {
            let ext = xtime_ext_us(px) + (gpstime_us - off - putc);
            return Ok(compose_xtime(self.session, ext as u64));
        }
        if let Some((ax, ag)) = self.lns_anchor {
            let ext = xtime_ext_us(ax) + (gpstime_us - ag);
            return Ok(compose_xtime(self.session, ext as u64));
        }
        Err(StationError::TimeDomain("no GPS time anchor".into()))
    }
}
