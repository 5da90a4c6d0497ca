//! Channel plan allocation.
//!
//! Maps the session's uplink channel list onto the SX130x hardware budget:
//! two RF front-ends (each covering ±400 kHz of IF offset), eight multi-SF
//! 125 kHz IF chains, one fast-LoRa (250/500 kHz) slot and one FSK slot.
//! Channel classification consults the uplink DR table exclusively, so an
//! asymmetric downlink table can never disable an RF chain.

use crate::constants::{IF_OFFSET_MAX_HZ, MAX_MULTISF_CHAINS};
use crate::error::StationError;
use crate::s2e::router_config::SessionContext;
use serde_json::Value;

/// One RF front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RfChainConf {
    pub enabled: bool,
    pub center_hz: u32,
}

/// One multi-SF 125 kHz IF chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiSfChain {
    pub rf_chain: u8,
    pub offset_hz: i32,
    pub freq_hz: u32,
}

/// The dedicated fast-LoRa slot (single SF at 250 or 500 kHz).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastLoraChain {
    pub rf_chain: u8,
    pub offset_hz: i32,
    pub freq_hz: u32,
    pub sf: u8,
    pub bw_khz: u32,
}

/// The dedicated FSK slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FskChain {
    pub rf_chain: u8,
    pub offset_hz: i32,
    pub freq_hz: u32,
}

/// A complete chip configuration ready for [`Concentrator::start`].
///
/// [`Concentrator::start`]: crate::ral::hal::Concentrator::start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChipConfig {
    pub rf: [RfChainConf; 2],
    pub multisf: Vec<MultiSfChain>,
    pub fast_lora: Option<FastLoraChain>,
    pub fsk: Option<FskChain>,
    /// Opaque `sx130x_conf` passthrough from `router_config`.
    pub hal_conf: Option<Value>,
}

/// Allocates the session's channel plan onto the hardware budget.
///
/// Fails with a diagnostic naming the offending channel whenever the plan
/// cannot fit.
pub fn allocate(ctx: &SessionContext) -> Result<ChipConfig, StationError> {
    let drs = &ctx.drs;

    let mut multisf_freqs: Vec<u32> = Vec::new();
    let mut fast: Option<(u32, u8, u32)> = None; // freq, sf, bw
    let mut fast_dedicated = false;
    let mut fsk: Option<u32> = None;
    let mut fsk_dedicated = false;

    for ch in &ctx.upchannels {
        let has_125 = drs.has_lora125_in(ch.min_dr, ch.max_dr);
        let fast_dr = drs.fast_lora_in(ch.min_dr, ch.max_dr);
        let fsk_dr = drs.fsk_in(ch.min_dr, ch.max_dr);
        if !has_125 && fast_dr.is_none() && fsk_dr.is_none() {
            return Err(StationError::ChanPlan(format!(
                "channel {} Hz has no usable uplink DR in [{}, {}]",
                ch.freq_hz, ch.min_dr, ch.max_dr
            )));
        }
        if has_125 && !multisf_freqs.contains(&ch.freq_hz) {
            if multisf_freqs.len() == MAX_MULTISF_CHAINS {
                return Err(StationError::ChanPlan(format!(
                    "channel {} Hz exceeds the {MAX_MULTISF_CHAINS} multi-SF chains",
                    ch.freq_hz
                )));
            }
            multisf_freqs.push(ch.freq_hz);
        }
        // The fast-LoRa and FSK slots each listen on one frequency. A
        // channel whose whole DR range lives on the slot (dedicated)
        // outranks channels that merely include the DR; two dedicated
        // channels on different frequencies cannot both be served.
        if let Some((_, sf, bw)) = fast_dr {
            let dedicated = !has_125 && fsk_dr.is_none();
            match fast {
                Some((freq, _, _)) if freq == ch.freq_hz => {}
                Some(_) if dedicated && fast_dedicated => {
                    return Err(StationError::ChanPlan(format!(
                        "channel {} Hz needs the fast-LoRa slot which is already taken",
                        ch.freq_hz
                    )));
                }
                Some(_) if !dedicated => {}
                _ => {
                    fast = Some((ch.freq_hz, sf, bw));
                    fast_dedicated = dedicated;
                }
            }
        }
        if fsk_dr.is_some() {
            let dedicated = !has_125 && fast_dr.is_none();
            match fsk {
                Some(freq) if freq == ch.freq_hz => {}
                Some(_) if dedicated && fsk_dedicated => {
                    return Err(StationError::ChanPlan(format!(
                        "channel {} Hz needs the FSK slot which is already taken",
                        ch.freq_hz
                    )));
                }
                Some(_) if !dedicated => {}
                _ => {
                    fsk = Some(ch.freq_hz);
                    fsk_dedicated = dedicated;
                }
            }
        }
    }

    // Group every involved frequency onto at most two RF front-ends.
    let mut freqs: Vec<u32> = multisf_freqs.clone();
    if let Some((f, _, _)) = fast {
        freqs.push(f);
    }
    if let Some(f) = fsk {
        freqs.push(f);
    }
    freqs.sort_unstable();
    freqs.dedup();

    let span = 2 * IF_OFFSET_MAX_HZ as u32;
    let mut groups: Vec<(u32, u32)> = Vec::new(); // (lo, hi)
    for &f in &freqs {
        match groups.last_mut() {
            Some((lo, hi)) if f - *lo <= span => *hi = f,
            _ => {
                if groups.len() == 2 {
                    return Err(StationError::ChanPlan(format!(
                        "channel {f} Hz does not fit either RF front-end"
                    )));
                }
                groups.push((f, f));
            }
        }
    }

    let mut rf = [RfChainConf::default(); 2];
    for (i, (lo, hi)) in groups.iter().enumerate() {
        rf[i] = RfChainConf {
            enabled: true,
            center_hz: lo + (hi - lo) / 2,
        };
    }

    let chain_of = |freq: u32| -> (u8, i32) {
        for (i, conf) in rf.iter().enumerate() {
            if !conf.enabled {
                continue;
            }
            let offset = freq as i64 - conf.center_hz as i64;
            if offset.abs() <= IF_OFFSET_MAX_HZ {
                return (i as u8, offset as i32);
            }
        }
        unreachable!("grouping guarantees a front-end for every frequency");
    };

    let multisf = multisf_freqs
        .iter()
        .map(|&freq_hz| {
            let (rf_chain, offset_hz) = chain_of(freq_hz);
            MultiSfChain {
                rf_chain,
                offset_hz,
                freq_hz,
            }
        })
        .collect();

    let fast_lora = fast.map(|(freq_hz, sf, bw_khz)| {
        let (rf_chain, offset_hz) = chain_of(freq_hz);
        FastLoraChain {
            rf_chain,
            offset_hz,
            freq_hz,
            sf,
            bw_khz,
        }
    });

    let fsk = fsk.map(|freq_hz| {
        let (rf_chain, offset_hz) = chain_of(freq_hz);
        FskChain {
            rf_chain,
            offset_hz,
            freq_hz,
        }
    });

    Ok(ChipConfig {
        rf,
        multisf,
        fast_lora,
        fsk,
        hal_conf: ctx.hal_conf.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s2e::router_config::{materialize, RouterConfig};

    fn eu868_wire_drs() -> Vec<[i64; 3]> {
        let mut drs = vec![[-1i64, 0, 0]; 16];
        for (i, sf) in (7..=12).rev().enumerate() {
            drs[i] = [sf, 125, 0];
        }
        drs[6] = [7, 250, 0];
        drs[7] = [0, 50, 0];
        drs
    }

    fn eu868_ctx() -> SessionContext {
        let rc = RouterConfig {
            region: Some("EU868".into()),
            drs: Some(eu868_wire_drs()),
            upchannels: Some(vec![
                [868_100_000, 0, 5],
                [868_300_000, 0, 5],
                [868_500_000, 0, 5],
                [867_100_000, 0, 5],
                [867_300_000, 0, 5],
                [867_500_000, 0, 5],
                [867_700_000, 0, 5],
                [867_900_000, 0, 5],
                // fast LoRa and FSK share 868.3/868.8
                [868_300_000, 6, 6],
                [868_800_000, 7, 7],
            ]),
            ..Default::default()
        };
        materialize(&rc, false, false).unwrap()
    }

    #[test]
    fn eu868_standard_plan_allocates() {
        let chip = allocate(&eu868_ctx()).unwrap();
        assert_eq!(chip.multisf.len(), 8);
        assert!(chip.rf[0].enabled && chip.rf[1].enabled);
        let fast = chip.fast_lora.unwrap();
        assert_eq!(fast.freq_hz, 868_300_000);
        assert_eq!(fast.bw_khz, 250);
        assert_eq!(chip.fsk.unwrap().freq_hz, 868_800_000);
        for c in &chip.multisf {
            assert!(c.offset_hz.unsigned_abs() as i64 <= IF_OFFSET_MAX_HZ);
        }
    }

    #[test]
    fn ninth_multisf_channel_is_named() {
        let rc = RouterConfig {
            region: Some("EU868".into()),
            drs: Some(eu868_wire_drs()),
            upchannels: Some(
                (0..9)
                    .map(|i| [863_100_000 + i * 200_000, 0, 5])
                    .collect(),
            ),
            ..Default::default()
        };
        let ctx = materialize(&rc, false, false).unwrap();
        let err = allocate(&ctx).unwrap_err();
        assert!(err.to_string().contains("864700000"), "{err}");
    }

    #[test]
    fn spread_beyond_two_front_ends_fails() {
        let rc = RouterConfig {
            region: Some("EU868".into()),
            drs: Some(eu868_wire_drs()),
            upchannels: Some(vec![
                [863_100_000, 0, 5],
                [866_000_000, 0, 5],
                [869_500_000, 0, 5],
            ]),
            ..Default::default()
        };
        let ctx = materialize(&rc, false, false).unwrap();
        let err = allocate(&ctx).unwrap_err();
        assert!(err.to_string().contains("869500000"), "{err}");
    }
}
