//! `router_config` parsing and session context materialization.
//!
//! The LNS answers the station's `version` message with a `router_config`
//! that overlays the static region descriptor with a concrete channel plan,
//! DR tables, filters and mode flags. Application is atomic: either a full
//! [`SessionContext`] materializes, or the message is rejected and the
//! session terminates.

use crate::codec::PduEncoding;
use crate::constants::MAX_UPCHANNELS;
use crate::error::StationError;
use crate::region::{self, Region};
use crate::s2e::drtable::{table_from_wire, DrTables};
use crate::s2e::filters::{JoinEuiFilter, NetIdFilter};
use serde::Deserialize;
use serde_json::Value;

/// The wire form of `router_config`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "JoinEui", default)]
    pub join_eui: Option<Vec<[u64; 2]>>,
    #[serde(rename = "NetID", default)]
    pub netid: Option<Vec<u32>>,
    #[serde(default)]
    pub freq_range: Option<[u32; 2]>,
    #[serde(default)]
    pub max_eirp: Option<f32>,
    #[serde(rename = "DRs", default)]
    pub drs: Option<Vec<[i64; 3]>>,
    #[serde(rename = "DRs_up", default)]
    pub drs_up: Option<Vec<[i64; 3]>>,
    #[serde(rename = "DRs_dn", default)]
    pub drs_dn: Option<Vec<[i64; 3]>>,
    /// `[freq_hz, min_dr, max_dr]` triples.
    #[serde(default)]
    pub upchannels: Option<Vec<[u64; 3]>>,
    #[serde(rename = "sx130x_conf", default)]
    pub sx130x_conf: Option<Value>,
    #[serde(rename = "sx1301_conf", default)]
    pub sx1301_conf: Option<Value>,
    #[serde(rename = "sx1302_conf", default)]
    pub sx1302_conf: Option<Value>,
    #[serde(default)]
    pub nocca: bool,
    #[serde(default)]
    pub nodc: bool,
    #[serde(default)]
    pub nodwell: bool,
    #[serde(default)]
    pub duty_cycle_enabled: Option<bool>,
    #[serde(default)]
    pub gps_enable: Option<bool>,
    #[serde(default)]
    pub pdu_only: bool,
    #[serde(default)]
    pub pdu_encoding: Option<String>,
    #[serde(default)]
    pub lbt_enabled: Option<bool>,
    #[serde(default)]
    pub lbt_channels: Option<Vec<LbtChannelSpec>>,
    #[serde(default)]
    pub lbt_rssi_target: Option<i8>,
    #[serde(default)]
    pub lbt_scan_time_us: Option<u32>,
    #[serde(default)]
    pub protocol_format: Option<String>,
    #[serde(rename = "MuxTime", default)]
    pub mux_time: Option<f64>,
}

/// Wire form of one explicit LBT channel.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LbtChannelSpec {
    pub freq: u32,
    pub bw: u32,
    #[serde(default)]
    pub scan_time: Option<u32>,
}

/// One configured uplink channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpChannel {
    pub freq_hz: u32,
    pub min_dr: u8,
    pub max_dr: u8,
}

/// One channel the station must sense before transmitting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbtChannel {
    pub freq_hz: u32,
    pub bw_khz: u32,
    pub scan_time_us: u32,
}

/// Listen-before-talk configuration. Per-channel RSSI targets are not
/// supported; one target applies to every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LbtConfig {
    pub channels: Vec<LbtChannel>,
    pub rssi_target_dbm: i8,
}

/// Everything the session engine needs while an LNS session is open.
/// Dropped wholesale on disconnect.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub region: &'static Region,
    pub drs: DrTables,
    pub upchannels: Vec<UpChannel>,
    pub joineui_filter: JoinEuiFilter,
    pub netid_filter: NetIdFilter,
    pub pdu_only: bool,
    pub pdu_encoding: PduEncoding,
    pub duty_cycle_enabled: bool,
    pub gps_enable: bool,
    pub dwell_enabled: bool,
    pub cca_enabled: bool,
    pub lbt: Option<LbtConfig>,
    pub max_eirp_dbm: f32,
    pub freq_range: (u32, u32),
    pub binary_codec: bool,
    pub hal_conf: Option<Value>,
}

fn reject(msg: impl Into<String>) -> StationError {
    StationError::RouterConfig(msg.into())
}

/// Validates a `router_config` and materializes the session context.
///
/// `honor_testflags` reflects the build variant: production builds
/// advertise `prod` and ignore `nocca`/`nodc`/`nodwell`.
/// `binary_supported` reflects whether the station advertised the binary
/// codec; an unsupported `protocol_format` request is ignored, not fatal.
pub fn materialize(
    rc: &RouterConfig,
    honor_testflags: bool,
    binary_supported: bool,
) -> Result<SessionContext, StationError> {
    let region_name = rc
        .region
        .as_deref()
        .ok_or_else(|| reject("missing region"))?;
    let region = region::lookup(region_name)
        .ok_or_else(|| reject(format!("unknown region {region_name:?}")))?;

    let freq_range = match rc.freq_range {
        Some([lo, hi]) if lo < hi => (lo, hi),
        Some([lo, hi]) => return Err(reject(format!("bad freq_range [{lo}, {hi}]"))),
        None => region.freq_range,
    };

    // DRs_up/DRs_dn take precedence; both are required if either appears.
    let drs = match (&rc.drs_up, &rc.drs_dn) {
        (Some(up), Some(dn)) => {
            let up = table_from_wire(up)?;
            let dn = table_from_wire(dn)?;
            if !up.iter().any(|e| e.def.is_defined() && !e.dnonly) {
                return Err(reject("DRs_up has no usable uplink entry"));
            }
            if !dn.iter().any(|e| e.def.is_defined()) {
                return Err(reject("DRs_dn has no defined entry"));
            }
            DrTables::asymmetric(up, dn)
        }
        (None, None) => match &rc.drs {
            Some(t) => DrTables::symmetric(table_from_wire(t)?),
            None => return Err(reject("DRs required when DRs_up/DRs_dn absent")),
        },
        _ => return Err(reject("DRs_up and DRs_dn must both be present")),
    };

    let raw_channels = rc
        .upchannels
        .as_ref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| reject("no upchannels"))?;
    if raw_channels.len() > MAX_UPCHANNELS {
        return Err(reject(format!(
            "{} upchannels exceed the maximum of {MAX_UPCHANNELS}",
            raw_channels.len()
        )));
    }
    let mut upchannels = Vec::with_capacity(raw_channels.len());
    for &[freq, min_dr, max_dr] in raw_channels {
        let freq_hz = u32::try_from(freq)
            .map_err(|_| reject(format!("channel frequency {freq} out of range")))?;
        if freq_hz < freq_range.0 || freq_hz > freq_range.1 {
            return Err(reject(format!(
                "channel {freq_hz} Hz outside freq_range [{}, {}]",
                freq_range.0, freq_range.1
            )));
        }
        if min_dr > max_dr || max_dr > 15 {
            return Err(reject(format!(
                "channel {freq_hz} Hz has bad DR range [{min_dr}, {max_dr}]"
            )));
        }
        let (min_dr, max_dr) = (min_dr as u8, max_dr as u8);
        if !drs.up(max_dr).is_defined() {
            return Err(reject(format!(
                "channel {freq_hz} Hz max_dr {max_dr} is not a defined uplink DR"
            )));
        }
        upchannels.push(UpChannel {
            freq_hz,
            min_dr,
            max_dr,
        });
    }

    let cca_enabled = region.cca_required && !(honor_testflags && rc.nocca);
    let lbt_on = rc.lbt_enabled.unwrap_or(cca_enabled);
    let lbt = if cca_enabled || lbt_on {
        Some(build_lbt(rc, region, &drs, &upchannels)?)
    } else {
        None
    };

    let duty_cycle_enabled = !matches!(region.duty_cycle, region::DutyCycleModel::None)
        && rc.duty_cycle_enabled.unwrap_or(true)
        && !(honor_testflags && rc.nodc);

    let dwell_enabled = region.max_dwell_us.is_some() && !(honor_testflags && rc.nodwell);

    let max_eirp_dbm = match rc.max_eirp {
        Some(e) => e.min(region.max_eirp_dbm),
        None => region.max_eirp_dbm,
    };

    let pdu_encoding = match &rc.pdu_encoding {
        Some(s) => s.parse()?,
        None => PduEncoding::Hex,
    };

    let binary_codec = matches!(rc.protocol_format.as_deref(), Some("binary")) && binary_supported;

    let hal_conf = rc
        .sx130x_conf
        .clone()
        .or_else(|| rc.sx1302_conf.clone())
        .or_else(|| rc.sx1301_conf.clone());

    Ok(SessionContext {
        region,
        drs,
        upchannels,
        joineui_filter: JoinEuiFilter::new(
            rc.join_eui
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|[lo, hi]| (lo, hi))
                .collect(),
        ),
        netid_filter: match &rc.netid {
            Some(ids) => NetIdFilter::allow_only(ids),
            None => NetIdFilter::default(),
        },
        pdu_only: rc.pdu_only,
        pdu_encoding,
        duty_cycle_enabled,
        gps_enable: rc.gps_enable.unwrap_or(true),
        dwell_enabled,
        cca_enabled,
        lbt,
        max_eirp_dbm,
        freq_range,
        binary_codec,
        hal_conf,
    })
}

/// Builds the LBT channel list: explicit from the LNS if provided, else
/// one entry per distinct uplink frequency whose bandwidth is at most
/// 250 kHz.
fn build_lbt(
    rc: &RouterConfig,
    region: &'static Region,
    drs: &DrTables,
    upchannels: &[UpChannel],
) -> Result<LbtConfig, StationError> {
    let defaults = region.lbt_defaults.unwrap_or(crate::region::LbtDefaults {
        rssi_target_dbm: -80,
        scan_time_us: 5000,
    });
    let scan_default = rc.lbt_scan_time_us.unwrap_or(defaults.scan_time_us);
    let channels = match &rc.lbt_channels {
        Some(specs) => specs
            .iter()
            .map(|s| LbtChannel {
                freq_hz: s.freq,
                bw_khz: s.bw,
                scan_time_us: s.scan_time.unwrap_or(scan_default),
            })
            .collect(),
        None => {
            let mut channels: Vec<LbtChannel> = Vec::new();
            for ch in upchannels {
                let Some(bw) = drs.max_bw_in(ch.min_dr, ch.max_dr) else {
                    continue;
                };
                if bw > 250 {
                    continue;
                }
                if channels.iter().any(|c| c.freq_hz == ch.freq_hz) {
                    continue;
                }
                channels.push(LbtChannel {
                    freq_hz: ch.freq_hz,
                    bw_khz: bw,
                    scan_time_us: scan_default,
                });
            }
            channels
        }
    };
    if channels.is_empty() {
        return Err(reject("CCA required but no LBT channel available"));
    }
    Ok(LbtConfig {
        channels,
        rssi_target_dbm: rc.lbt_rssi_target.unwrap_or(defaults.rssi_target_dbm),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eu868_wire_drs() -> Vec<[i64; 3]> {
        let mut drs = vec![[-1i64, 0, 0]; 16];
        for (i, sf) in (7..=12).rev().enumerate() {
            drs[i] = [sf, 125, 0];
        }
        drs[6] = [7, 250, 0];
        drs[7] = [0, 50, 0];
        drs
    }

    fn minimal_eu868() -> RouterConfig {
        RouterConfig {
            region: Some("EU868".into()),
            drs: Some(eu868_wire_drs()),
            upchannels: Some(vec![
                [868_100_000, 0, 5],
                [868_300_000, 0, 5],
                [868_500_000, 0, 5],
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_config_materializes_with_flag_defaults() {
        let ctx = materialize(&minimal_eu868(), false, false).unwrap();
        assert_eq!(ctx.region.id, "EU868");
        assert!(ctx.duty_cycle_enabled);
        assert!(!ctx.cca_enabled);
        assert_eq!(ctx.max_eirp_dbm, 16.0);
        assert_eq!(ctx.pdu_encoding, PduEncoding::Hex);
        assert!(!ctx.drs.is_asymmetric());
    }

    #[test]
    fn config_without_any_dr_table_is_rejected() {
        let mut rc = minimal_eu868();
        rc.drs = None;
        assert!(materialize(&rc, false, false).is_err());
    }

    #[test]
    fn channel_outside_freq_range_is_rejected() {
        let mut rc = minimal_eu868();
        rc.upchannels.as_mut().unwrap().push([902_300_000, 0, 5]);
        assert!(materialize(&rc, false, false).is_err());
    }

    #[test]
    fn lns_max_eirp_cannot_exceed_region() {
        let mut rc = minimal_eu868();
        rc.max_eirp = Some(27.0);
        let ctx = materialize(&rc, false, false).unwrap();
        assert_eq!(ctx.max_eirp_dbm, 16.0);
    }

    #[test]
    fn single_asymmetric_table_is_rejected() {
        let mut rc = minimal_eu868();
        rc.drs_up = Some(vec![[7, 125, 0]; 16]);
        assert!(materialize(&rc, false, false).is_err());
    }

    #[test]
    fn testflag_nodc_ignored_in_prod() {
        let mut rc = minimal_eu868();
        rc.nodc = true;
        assert!(materialize(&rc, false, false).unwrap().duty_cycle_enabled);
        assert!(!materialize(&rc, true, false).unwrap().duty_cycle_enabled);
    }
}
