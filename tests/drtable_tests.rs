//! RP002-1.0.5 asymmetric DR table behavior: uplink-table predicates,
//! RF-chain enablement and downlink scheduling parameters for a US915
//! style plan.

use lorastation::ral::chanplan;
use lorastation::s2e::drtable::DrDef;
use lorastation::s2e::router_config::{materialize, RouterConfig, SessionContext};

/// A US915 sub-band-2 style config with separate up/down tables: the
/// downlink table is all 500 kHz, so any predicate that consulted it
/// would wrongly conclude there are no 125 kHz channels.
fn us915_asymmetric() -> SessionContext {
    let mut drs_up = vec![[-1i64, 0, 0]; 16];
    drs_up[0] = [10, 125, 0];
    drs_up[1] = [9, 125, 0];
    drs_up[2] = [8, 125, 0];
    drs_up[3] = [7, 125, 0];
    drs_up[4] = [8, 500, 0];
    drs_up[7] = [6, 125, 0];
    drs_up[8] = [5, 125, 0];
    let mut drs_dn = vec![[-1i64, 0, 0]; 16];
    drs_dn[0] = [5, 500, 0];
    drs_dn[8] = [12, 500, 0];
    drs_dn[9] = [11, 500, 0];
    drs_dn[10] = [10, 500, 0];
    drs_dn[11] = [9, 500, 0];
    drs_dn[12] = [8, 500, 0];
    drs_dn[13] = [7, 500, 0];
    drs_dn[14] = [6, 500, 0];

    let mut upchannels: Vec<[u64; 3]> = (0..8)
        .map(|i| [902_300_000 + i * 200_000, 0, 8])
        .collect();
    upchannels.push([903_000_000, 4, 4]);

    let rc = RouterConfig {
        region: Some("US915".into()),
        drs_up: Some(drs_up),
        drs_dn: Some(drs_dn),
        upchannels: Some(upchannels),
        ..Default::default()
    };
    materialize(&rc, false, false).unwrap()
}

#[test]
fn asymmetric_mode_is_selected() {
    let ctx = us915_asymmetric();
    assert!(ctx.drs.is_asymmetric());
    assert_eq!(ctx.drs.up(0), DrDef::Lora { sf: 10, bw_khz: 125 });
    assert_eq!(ctx.drs.up(8), DrDef::Lora { sf: 5, bw_khz: 125 });
    assert_eq!(ctx.drs.dn(0), DrDef::Lora { sf: 5, bw_khz: 500 });
}

/// The 125 kHz predicate must consult the uplink table: all 8 multi-SF
/// chains enable even though the downlink table has no 125 kHz entry.
#[test]
fn all_eight_chains_enable_from_uplink_table() {
    let ctx = us915_asymmetric();
    assert!(ctx.drs.has_lora125_in(0, 8));
    let chip = chanplan::allocate(&ctx).unwrap();
    assert_eq!(chip.multisf.len(), 8);
    assert!(chip.rf[0].enabled && chip.rf[1].enabled);
}

/// The fast-LoRa slot binds to the 500 kHz uplink DR4.
#[test]
fn fast_lora_slot_is_500khz() {
    let ctx = us915_asymmetric();
    let chip = chanplan::allocate(&ctx).unwrap();
    let fast = chip.fast_lora.expect("fast-LoRa slot");
    assert_eq!(fast.freq_hz, 903_000_000);
    assert_eq!(fast.bw_khz, 500);
    assert_eq!(fast.sf, 8);
}

/// Downlink DR13 schedules at SF7/BW500 from the downlink table.
#[test]
fn downlink_dr13_is_sf7_bw500() {
    let ctx = us915_asymmetric();
    assert_eq!(ctx.drs.dn(13), DrDef::Lora { sf: 7, bw_khz: 500 });
    // and DR14 per the explicit table entry
    assert_eq!(ctx.drs.dn(14), DrDef::Lora { sf: 6, bw_khz: 500 });
}

/// DRs_up without DRs_dn (or vice versa) must be rejected.
#[test]
fn half_an_asymmetric_pair_is_rejected() {
    let mut drs_up = vec![[-1i64, 0, 0]; 16];
    drs_up[0] = [10, 125, 0];
    let rc = RouterConfig {
        region: Some("US915".into()),
        drs_up: Some(drs_up.clone()),
        upchannels: Some(vec![[902_300_000, 0, 0]]),
        ..Default::default()
    };
    assert!(materialize(&rc, false, false).is_err());

    let rc = RouterConfig {
        region: Some("US915".into()),
        drs_dn: Some(drs_up),
        upchannels: Some(vec![[902_300_000, 0, 0]]),
        ..Default::default()
    };
    assert!(materialize(&rc, false, false).is_err());
}

/// An asymmetric table whose uplink side is empty is undefined behavior
/// per the data model and must be rejected outright.
#[test]
fn empty_uplink_table_is_rejected() {
    let rc = RouterConfig {
        region: Some("US915".into()),
        drs_up: Some(vec![[-1i64, 0, 0]; 16]),
        drs_dn: Some({
            let mut dn = vec![[-1i64, 0, 0]; 16];
            dn[8] = [12, 500, 0];
            dn
        }),
        upchannels: Some(vec![[902_300_000, 0, 0]]),
        ..Default::default()
    };
    assert!(materialize(&rc, false, false).is_err());
}

/// When the LNS sends `DRs` alongside an asymmetric pair, the pair wins.
#[test]
fn symmetric_table_is_ignored_in_asymmetric_mode() {
    let mut drs_up = vec![[-1i64, 0, 0]; 16];
    drs_up[0] = [10, 125, 0];
    let mut drs_dn = vec![[-1i64, 0, 0]; 16];
    drs_dn[0] = [5, 500, 0];
    let rc = RouterConfig {
        region: Some("US915".into()),
        // Legacy table claims DR0 is SF12/125
        drs: Some({
            let mut t = vec![[-1i64, 0, 0]; 16];
            t[0] = [12, 125, 0];
            t
        }),
        drs_up: Some(drs_up),
        drs_dn: Some(drs_dn),
        upchannels: Some(vec![[902_300_000, 0, 0]]),
        ..Default::default()
    };
    let ctx = materialize(&rc, false, false).unwrap();
    assert_eq!(ctx.drs.up(0), DrDef::Lora { sf: 10, bw_khz: 125 });
    assert_eq!(ctx.drs.dn(0), DrDef::Lora { sf: 5, bw_khz: 500 });
}
