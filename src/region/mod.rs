//! Regional parameter descriptors.
//!
//! One immutable [`Region`] record per supported regulatory region,
//! carrying the frequency range, EIRP ceiling, duty-cycle structure, CCA
//! requirements and the default (symmetric) DR table. The LNS overlays a
//! concrete channel plan and, optionally, replacement DR tables via
//! `router_config`; nothing here is mutated at runtime.

mod as923;
mod eu868;
mod misc;
mod us915;

use crate::s2e::drtable::DrEntry;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub use as923::{AS923_1, AS923_2, AS923_3, AS923_4, KR920};
pub use eu868::EU868;
pub use misc::{CN470, IL915, IN865};
pub use us915::{AU915, US915};

/// A sub-band with its own duty-cycle divisor (EU868 style).
///
/// `divisor` is the reciprocal of the allowed on-air fraction: 1000 for
/// 0.1 %, 100 for 1 %, 10 for 10 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleBand {
    pub label: char,
    pub lo_hz: u32,
    pub hi_hz: u32,
    pub divisor: u32,
}

/// How a region accounts duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyCycleModel {
    /// No regulatory duty cycle.
    None,
    /// Per-band accounting (EU868 bands K..Q).
    Bands(&'static [DutyCycleBand]),
    /// Per-channel accounting with one divisor for every channel.
    PerChannel { divisor: u32 },
}

/// Region defaults for listen-before-talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbtDefaults {
    pub rssi_target_dbm: i8,
    pub scan_time_us: u32,
}

/// An immutable regional parameter record.
#[derive(Debug)]
pub struct Region {
    pub id: &'static str,
    pub freq_range: (u32, u32),
    pub max_eirp_dbm: f32,
    pub duty_cycle: DutyCycleModel,
    pub cca_required: bool,
    pub lbt_defaults: Option<LbtDefaults>,
    pub max_dwell_us: Option<u64>,
    /// The region's regulatory symmetric DR table (RP002), with
    /// downlink-only slots marked `dnonly` within the same table. The LNS
    /// must still supply concrete tables in `router_config`; this is the
    /// reference they are expected to refine.
    pub default_drs: [DrEntry; 16],
}

impl Region {
    /// The duty-cycle band containing `freq_hz`, for band-model regions.
    pub fn duty_cycle_band(&self, freq_hz: u32) -> Option<&'static DutyCycleBand> {
        match self.duty_cycle {
            DutyCycleModel::Bands(bands) => bands
                .iter()
                .find(|b| b.lo_hz <= freq_hz && freq_hz < b.hi_hz),
            _ => None,
        }
    }

    pub fn contains(&self, freq_hz: u32) -> bool {
        self.freq_range.0 <= freq_hz && freq_hz <= self.freq_range.1
    }
}

static REGISTRY: Lazy<HashMap<&'static str, &'static Region>> = Lazy::new(|| {
    let regions: [&'static Region; 11] = [
        &EU868, &US915, &AU915, &AS923_1, &AS923_2, &AS923_3, &AS923_4, &KR920, &IN865, &IL915,
        &CN470,
    ];
    let mut map = HashMap::new();
    for r in regions {
        map.insert(r.id, r);
    }
    // Legacy aliases still sent by older network servers
    map.insert("EU863", &EU868);
    map.insert("US902", &US915);
    map.insert("AS923", &AS923_1);
    map.insert("AS923JP", &AS923_1);
    map
});

/// Looks up a region by id, honoring legacy aliases.
pub fn lookup(name: &str) -> Option<&'static Region> {
    REGISTRY.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s2e::drtable::{DrDef, DrTables};

    #[test]
    fn aliases_resolve() {
        assert_eq!(lookup("AS923").unwrap().id, "AS923-1");
        assert_eq!(lookup("US902").unwrap().id, "US915");
        assert_eq!(lookup("EU863").unwrap().id, "EU868");
        assert!(lookup("XX000").is_none());
    }

    #[test]
    fn eu868_band_lookup() {
        let r = lookup("EU868").unwrap();
        assert_eq!(r.duty_cycle_band(863_500_000).unwrap().label, 'K');
        assert_eq!(r.duty_cycle_band(863_500_000).unwrap().divisor, 1000);
        assert_eq!(r.duty_cycle_band(869_525_000).unwrap().label, 'P');
        assert_eq!(r.duty_cycle_band(869_525_000).unwrap().divisor, 10);
        // Gap between M and N
        assert!(r.duty_cycle_band(868_650_000).is_none());
    }

    #[test]
    fn cca_regions() {
        for id in ["AS923-1", "AS923-2", "AS923-3", "AS923-4", "KR920"] {
            assert!(lookup(id).unwrap().cca_required, "{id}");
        }
        assert!(!lookup("EU868").unwrap().cca_required);
        assert!(!lookup("US915").unwrap().cca_required);
    }

    #[test]
    fn us915_default_table_marks_downlink_slots() {
        let t = DrTables::symmetric(US915.default_drs);
        assert_eq!(t.up(0), DrDef::Lora { sf: 10, bw_khz: 125 });
        // DR8..13 are downlink-only and must not satisfy uplink predicates
        assert_eq!(t.up(8), DrDef::Undefined);
        assert_eq!(t.dn(13), DrDef::Lora { sf: 7, bw_khz: 500 });
    }

    #[test]
    fn as923_lbt_defaults() {
        let lbt = lookup("AS923-1").unwrap().lbt_defaults.unwrap();
        assert_eq!(lbt.rssi_target_dbm, -80);
        assert_eq!(lbt.scan_time_us, 5000);
    }
}
