//! US 902-928 and AU 915-928 MHz bands.
//!
//! The legacy symmetric tables carry the 500 kHz downlink rows as
//! downlink-only slots (DR8..DR13). Under RP002-1.0.5 the LNS replaces
//! them with an asymmetric `DRs_up`/`DRs_dn` pair instead.

use super::{DutyCycleModel, Region};
use crate::s2e::drtable::DrEntry;

const US_DRS: [DrEntry; 16] = [
    DrEntry::lora(10, 125),
    DrEntry::lora(9, 125),
    DrEntry::lora(8, 125),
    DrEntry::lora(7, 125),
    DrEntry::lora(8, 500),
    DrEntry::UNDEF, // LR-FHSS, not supported by SX130x
    DrEntry::UNDEF, // LR-FHSS, not supported by SX130x
    DrEntry::UNDEF,
    DrEntry::lora_dn(12, 500),
    DrEntry::lora_dn(11, 500),
    DrEntry::lora_dn(10, 500),
    DrEntry::lora_dn(9, 500),
    DrEntry::lora_dn(8, 500),
    DrEntry::lora_dn(7, 500),
    DrEntry::UNDEF,
    DrEntry::UNDEF,
];

pub static US915: Region = Region {
    id: "US915",
    freq_range: (902_000_000, 928_000_000),
    max_eirp_dbm: 30.0,
    duty_cycle: DutyCycleModel::None,
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: US_DRS,
};

const AU_DRS: [DrEntry; 16] = [
    DrEntry::lora(12, 125),
    DrEntry::lora(11, 125),
    DrEntry::lora(10, 125),
    DrEntry::lora(9, 125),
    DrEntry::lora(8, 125),
    DrEntry::lora(7, 125),
    DrEntry::lora(8, 500),
    DrEntry::UNDEF, // LR-FHSS
    DrEntry::lora_dn(12, 500),
    DrEntry::lora_dn(11, 500),
    DrEntry::lora_dn(10, 500),
    DrEntry::lora_dn(9, 500),
    DrEntry::lora_dn(8, 500),
    DrEntry::lora_dn(7, 500),
    DrEntry::UNDEF,
    DrEntry::UNDEF,
];

pub static AU915: Region = Region {
    id: "AU915",
    freq_range: (915_000_000, 928_000_000),
    max_eirp_dbm: 30.0,
    duty_cycle: DutyCycleModel::None,
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: AU_DRS,
};
