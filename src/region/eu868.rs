//! EU 863-870 MHz ISM band.

use super::{DutyCycleBand, DutyCycleModel, Region};
use crate::s2e::drtable::DrEntry;

/// ETSI EN 300 220 sub-bands with their duty-cycle divisors.
pub static EU868_BANDS: [DutyCycleBand; 6] = [
    DutyCycleBand {
        label: 'K',
        lo_hz: 863_000_000,
        hi_hz: 865_000_000,
        divisor: 1000,
    },
    DutyCycleBand {
        label: 'L',
        lo_hz: 865_000_000,
        hi_hz: 868_000_000,
        divisor: 100,
    },
    DutyCycleBand {
        label: 'M',
        lo_hz: 868_000_000,
        hi_hz: 868_600_000,
        divisor: 100,
    },
    DutyCycleBand {
        label: 'N',
        lo_hz: 868_700_000,
        hi_hz: 869_200_000,
        divisor: 1000,
    },
    DutyCycleBand {
        label: 'P',
        lo_hz: 869_400_000,
        hi_hz: 869_650_000,
        divisor: 10,
    },
    DutyCycleBand {
        label: 'Q',
        lo_hz: 869_700_000,
        hi_hz: 870_000_000,
        divisor: 100,
    },
];

const DRS: [DrEntry; 16] = [
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

pub static EU868: Region = Region {
    id: "EU868",
    freq_range: (863_000_000, 870_000_000),
    max_eirp_dbm: 16.0,
    duty_cycle: DutyCycleModel::Bands(&EU868_BANDS),
    cca_required: false,
    lbt_defaults: None,
    max_dwell_us: None,
    default_drs: DRS,
};
