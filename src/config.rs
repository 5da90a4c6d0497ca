//! Station configuration loading.
//!
//! `station.conf` holds station-wide settings; an optional `slave-N.conf`
//! overlays per-slave overrides. Both are JSON with the same schema and
//! are read once at startup; the LNS `router_config` layers on top at
//! session time. A missing `station.conf` yields the defaults so the
//! simulator mode can run from an empty directory.

use crate::error::StationError;
use crate::logging::{self, SYS};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConf {
    /// Identifier reported during discovery and in log lines.
    pub routerid: Option<String>,
    pub model: String,
    /// Subtracted from the regulatory EIRP ceiling to get conducted power.
    pub antenna_gain_dbi: f32,
    /// Serial NMEA device, e.g. `/dev/ttyS0`. Absent disables GPS
    /// time-of-day consumption.
    pub gps_device: Option<String>,
    pub gps_baud: u32,
    /// Commands `runcmd` requests may execute.
    pub runcmd_allow: Vec<String>,
    /// muxs endpoint handed to the transport collaborator.
    pub muxs_uri: Option<String>,
    /// Radio settings merged into the `sx130x_conf` passthrough.
    pub radio_conf: Option<Value>,
}

impl Default for StationConf {
    fn default() -> Self {
        StationConf {
            routerid: None,
            model: "sx1302".into(),
            antenna_gain_dbi: 0.0,
            gps_device: None,
            gps_baud: 9600,
            runcmd_allow: Vec::new(),
            muxs_uri: None,
            radio_conf: None,
        }
    }
}

/// Recursively overlays `overlay` onto `base`. Objects merge key-wise;
/// everything else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(slot) => merge(slot, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Loads `station.conf` (and `slave-N.conf` when `slave_idx` is given)
/// from `home`.
pub fn load(home: &Path, slave_idx: Option<u32>) -> Result<StationConf, StationError> {
    let station_path = home.join("station.conf");
    let mut layered = if station_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&station_path)?)?
    } else {
        logging::log_info(
            SYS,
            &format!("no {} found, using defaults", station_path.display()),
        );
        Value::Object(Default::default())
    };
    if let Some(idx) = slave_idx {
        let slave_path = home.join(format!("slave-{idx}.conf"));
        if slave_path.exists() {
            let overlay: Value = serde_json::from_str(&std::fs::read_to_string(&slave_path)?)?;
            merge(&mut layered, overlay);
        }
    }
    Ok(serde_json::from_value(layered)?)
}
