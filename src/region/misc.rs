//! IN865, IL915 and CN470 bands.

use super::{DutyCycleModel, Region};
use crate::s2e::drtable::DrEntry;

const IN865_DRS: [DrEntry; 16] = [
    DrEntry::lora(12, 125),
    DrEntry::lora(11, 125),
    DrEntry::lora(10, 125),
    DrEntry::lora(9, 125),
    DrEntry::lora(8, 125),
    DrEntry::lora(7, 125),
    DrEntry::UNDEF, // RFU
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

pub static IN865: Region = Region {
    id: "IN865",
    freq_range: (865_000_000, 867_000_000),
    max_eirp_dbm: 30.0,
    duty_cycle: DutyCycleModel::PerChannel { divisor: 10 },
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: IN865_DRS,
};

const IL915_DRS: [DrEntry; 16] = [
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

pub static IL915: Region = Region {
    id: "IL915",
    freq_range: (915_000_000, 917_000_000),
    max_eirp_dbm: 16.0,
    duty_cycle: DutyCycleModel::None,
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: IL915_DRS,
};

const CN470_DRS: [DrEntry; 16] = [
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

pub static CN470: Region = Region {
    id: "CN470",
    freq_range: (470_000_000, 510_000_000),
    max_eirp_dbm: 19.0,
    duty_cycle: DutyCycleModel::None,
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: CN470_DRS,
};
