//! AS923 group (four frequency-offset variants) and KR920.
//!
//! All five mandate clear channel assessment before transmit. AS923
//! additionally caps per-transmission dwell time at 400 ms and accounts
//! duty cycle per channel.

use super::{DutyCycleModel, LbtDefaults, Region};
use crate::s2e::drtable::DrEntry;

const AS923_DRS: [DrEntry; 16] = [
    DrEntry::lora(12, 125),
    DrEntry::lora(11, 125),
    DrEntry::lora(10, 125),
    DrEntry::lora(9, 125),
    DrEntry::lora(8, 125),
    DrEntry::lora(7, 125),
    DrEntry::lora(7, 250),
    DrEntry::fsk(),
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
];

const AS923_LBT: LbtDefaults = LbtDefaults {
    rssi_target_dbm: -80,
    scan_time_us: 5000,
};

macro_rules! as923_variant {
    ($name:ident, $id:literal, $lo:literal, $hi:literal) => {
        pub static $name: Region = Region {
            id: $id,
            freq_range: ($lo, $hi),
            max_eirp_dbm: 16.0,
            duty_cycle: DutyCycleModel::PerChannel { divisor: 10 },
            cca_required: true,
            lbt_defaults: Some(AS923_LBT),
            max_dwell_us: Some(400_000),
            default_drs: AS923_DRS,
        };
    };
}

as923_variant!(AS923_1, "AS923-1", 915_000_000, 928_000_000);
as923_variant!(AS923_2, "AS923-2", 920_000_000, 923_000_000);
as923_variant!(AS923_3, "AS923-3", 915_000_000, 921_000_000);
as923_variant!(AS923_4, "AS923-4", 917_000_000, 920_000_000);

const KR920_DRS: [DrEntry; 16] = [
    DrEntry::lora(12, 125),
    DrEntry::lora(11, 125),
    DrEntry::lora(10, 125),
    DrEntry::lora(9, 125),
    DrEntry::lora(8, 125),
    DrEntry::lora(7, 125),
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
    DrEntry::UNDEF,
];

pub static KR920: Region = Region {
    id: "KR920",
    freq_range: (920_900_000, 923_300_000),
    max_eirp_dbm: 14.0,
    duty_cycle: DutyCycleModel::None,
    cca_required: true,
    lbt_defaults: Some(LbtDefaults {
        rssi_target_dbm: -67,
        scan_time_us: 5000,
    }),
    max_dwell_us: None,
    default_drs: KR920_DRS,
};
