//! Data-rate tables.
//!
//! A DR table maps the 16 possible DR indices to a modulation. Two table
//! shapes exist: the legacy symmetric table (one table for both directions)
//! and the RP002-1.0.5 asymmetric pair (`DRs_up`/`DRs_dn`), where the same
//! index means different modulations per direction. US915 and AU915 require
//! the asymmetric pair.
//!
//! Every helper that classifies the channel plan (125 kHz presence, fast
//! LoRa, FSK) consults the *uplink* table. Receive-path DR resolution also
//! goes through the uplink table; only downlink scheduling reads the
//! downlink table.

use crate::constants::DR_TABLE_LEN;
use crate::error::StationError;

/// Modulation bound to one DR index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrDef {
    /// RFU or explicitly undefined entry.
    Undefined,
    Lora { sf: u8, bw_khz: u32 },
    Fsk,
}

impl DrDef {
    pub fn is_defined(&self) -> bool {
        !matches!(self, DrDef::Undefined)
    }

    pub fn bw_khz(&self) -> Option<u32> {
        match self {
            DrDef::Lora { bw_khz, .. } => Some(*bw_khz),
            DrDef::Fsk => Some(125),
            DrDef::Undefined => None,
        }
    }
}

/// One DR table slot: modulation plus the downlink-only marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrEntry {
    pub def: DrDef,
    pub dnonly: bool,
}

impl DrEntry {
    pub const UNDEF: DrEntry = DrEntry {
        def: DrDef::Undefined,
        dnonly: false,
    };

    pub const fn lora(sf: u8, bw_khz: u32) -> DrEntry {
        DrEntry {
            def: DrDef::Lora { sf, bw_khz },
            dnonly: false,
        }
    }

    pub const fn lora_dn(sf: u8, bw_khz: u32) -> DrEntry {
        DrEntry {
            def: DrDef::Lora { sf, bw_khz },
            dnonly: true,
        }
    }

    pub const fn fsk() -> DrEntry {
        DrEntry {
            def: DrDef::Fsk,
            dnonly: false,
        }
    }
}

/// The session's DR tables, symmetric or asymmetric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrTables {
    up: [DrEntry; DR_TABLE_LEN],
    dn: [DrEntry; DR_TABLE_LEN],
    asymmetric: bool,
}

impl DrTables {
    pub fn symmetric(entries: [DrEntry; DR_TABLE_LEN]) -> Self {
        DrTables {
            up: entries,
            dn: entries,
            asymmetric: false,
        }
    }

    pub fn asymmetric(up: [DrEntry; DR_TABLE_LEN], dn: [DrEntry; DR_TABLE_LEN]) -> Self {
        DrTables {
            up,
            dn,
            asymmetric: true,
        }
    }

    pub fn is_asymmetric(&self) -> bool {
        self.asymmetric
    }

    /// Uplink modulation for a DR index. `Undefined` for out-of-range
    /// indices and entries marked downlink-only.
    pub fn up(&self, dr: u8) -> DrDef {
        match self.up.get(dr as usize) {
            Some(e) if !e.dnonly => e.def,
            _ => DrDef::Undefined,
        }
    }

    /// Downlink modulation for a DR index.
    pub fn dn(&self, dr: u8) -> DrDef {
        match self.dn.get(dr as usize) {
            Some(e) => e.def,
            None => DrDef::Undefined,
        }
    }

    /// Maps a received modulation back to its uplink DR index.
    pub fn find_up(&self, def: DrDef) -> Option<u8> {
        (0..DR_TABLE_LEN as u8).find(|dr| self.up(*dr) == def)
    }

    /// True iff some uplink entry in `[min_dr, max_dr]` is LoRa at 125 kHz.
    pub fn has_lora125_in(&self, min_dr: u8, max_dr: u8) -> bool {
        (min_dr..=max_dr).any(|dr| matches!(self.up(dr), DrDef::Lora { bw_khz: 125, .. }))
    }

    /// The fast-LoRa (250/500 kHz) uplink DR in `[min_dr, max_dr]`, if any.
    pub fn fast_lora_in(&self, min_dr: u8, max_dr: u8) -> Option<(u8, u8, u32)> {
        (min_dr..=max_dr).find_map(|dr| match self.up(dr) {
            DrDef::Lora { sf, bw_khz } if bw_khz > 125 => Some((dr, sf, bw_khz)),
            _ => None,
        })
    }

    /// The FSK uplink DR in `[min_dr, max_dr]`, if any.
    pub fn fsk_in(&self, min_dr: u8, max_dr: u8) -> Option<u8> {
        (min_dr..=max_dr).find(|dr| self.up(*dr) == DrDef::Fsk)
    }

    /// Widest uplink bandwidth usable in `[min_dr, max_dr]`, in kHz.
    pub fn max_bw_in(&self, min_dr: u8, max_dr: u8) -> Option<u32> {
        (min_dr..=max_dr)
            .filter_map(|dr| self.up(dr).bw_khz())
            .max()
    }
}

/// Parses one wire-form DR entry `[sf, bw, dnonly]`.
///
/// `sf` 5..=12 with a LoRaWAN bandwidth is LoRa; `sf == 0` with a nonzero
/// bandwidth is FSK; anything else (RFU slots, LR-FHSS placeholders) is
/// undefined.
pub fn entry_from_wire(triple: &[i64; 3]) -> DrEntry {
    let [sf, bw, dnonly] = *triple;
    let dnonly = dnonly != 0;
    match (sf, bw) {
        (5..=12, 125) | (5..=12, 250) | (5..=12, 500) => DrEntry {
            def: DrDef::Lora {
                sf: sf as u8,
                bw_khz: bw as u32,
            },
            dnonly,
        },
        (0, b) if b > 0 => DrEntry {
            def: DrDef::Fsk,
            dnonly,
        },
        _ => DrEntry::UNDEF,
    }
}

/// Parses a full 16-entry wire table, rejecting wrong lengths.
pub fn table_from_wire(entries: &[[i64; 3]]) -> Result<[DrEntry; DR_TABLE_LEN], StationError> {
    if entries.len() != DR_TABLE_LEN {
        return Err(StationError::RouterConfig(format!(
            "DR table must have {DR_TABLE_LEN} entries, got {}",
            entries.len()
        )));
    }
    let mut out = [DrEntry::UNDEF; DR_TABLE_LEN];
    for (slot, triple) in out.iter_mut().zip(entries) {
        *slot = entry_from_wire(triple);
    }
    Ok(out)
}
