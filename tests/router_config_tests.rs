//! router_config validation and session context materialization:
//! aliases, rejection matrix, mode flags, LBT derivation.

use lorastation::codec::PduEncoding;
use lorastation::s2e::msg::{parse_inbound, LnsMessage};
use lorastation::s2e::router_config::{materialize, RouterConfig};

const DRS_JSON: &str = "[[12,125,0],[11,125,0],[10,125,0],[9,125,0],[8,125,0],[7,125,0],\
    [7,250,0],[0,50,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0]]";

/// SF12..SF7 at 125 kHz, SF7/250, FSK, rest RFU.
fn wire_drs() -> Vec<[i64; 3]> {
    let mut drs = vec![[-1i64, 0, 0]; 16];
    for (i, sf) in (7..=12).rev().enumerate() {
        drs[i] = [sf, 125, 0];
    }
    drs[6] = [7, 250, 0];
    drs[7] = [0, 50, 0];
    drs
}

fn from_json(text: &str) -> RouterConfig {
    match parse_inbound(text).unwrap() {
        LnsMessage::RouterConfig(rc) => *rc,
        m => panic!("unexpected {m:?}"),
    }
}

#[test]
fn legacy_region_aliases_are_honored() {
    for (alias, id) in [("AS923", "AS923-1"), ("US902", "US915"), ("EU863", "EU868")] {
        let rc = RouterConfig {
            region: Some(alias.into()),
            drs: Some(wire_drs()),
            upchannels: Some(vec![[lookup_channel(id), 0, 0]]),
            ..Default::default()
        };
        let ctx = materialize(&rc, false, false).unwrap();
        assert_eq!(ctx.region.id, id);
    }
}

fn lookup_channel(region: &str) -> u64 {
    match region {
        "US915" => 902_300_000,
        "AS923-1" => 923_200_000,
        _ => 868_100_000,
    }
}

#[test]
fn wire_form_parses_every_field_family() {
    let rc = from_json(&format!(
        r#"{{"msgtype":"router_config","region":"EU868",
            "freq_range":[863000000,870000000],
            "max_eirp":14.0,
            "JoinEui":[[0,18446744073709551615]],
            "NetID":[1,19],
            "DRs":{DRS_JSON},
            "upchannels":[[868100000,0,5]],
            "pdu_only":true,"pdu_encoding":"base64",
            "duty_cycle_enabled":false,"gps_enable":false,
            "sx130x_conf":{{"clksrc":0}},
            "MuxTime":1690000000.25}}"#
    ));
    let ctx = materialize(&rc, false, false).unwrap();
    assert_eq!(ctx.freq_range, (863_000_000, 870_000_000));
    assert_eq!(ctx.max_eirp_dbm, 14.0);
    assert!(ctx.pdu_only);
    assert_eq!(ctx.pdu_encoding, PduEncoding::Base64);
    assert!(!ctx.duty_cycle_enabled);
    assert!(!ctx.gps_enable);
    assert_eq!(ctx.hal_conf.as_ref().unwrap()["clksrc"], 0);
}

#[test]
fn rejection_matrix() {
    // unknown region
    assert!(materialize(
        &RouterConfig {
            region: Some("ZZ999".into()),
            drs: Some(wire_drs()),
            upchannels: Some(vec![[868_100_000, 0, 5]]),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // no DR table of either shape
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            upchannels: Some(vec![[868_100_000, 0, 5]]),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // missing upchannels
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            drs: Some(wire_drs()),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // channel outside the region frequency range
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            drs: Some(wire_drs()),
            upchannels: Some(vec![[915_000_000, 0, 5]]),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // min_dr above max_dr
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            drs: Some(wire_drs()),
            upchannels: Some(vec![[868_100_000, 5, 2]]),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // max_dr referencing an undefined uplink entry
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            drs: Some(wire_drs()),
            upchannels: Some(vec![[868_100_000, 0, 9]]),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
    // 17 channels
    assert!(materialize(
        &RouterConfig {
            region: Some("EU868".into()),
            drs: Some(wire_drs()),
            upchannels: Some(
                (0..17).map(|i| [863_100_000 + i * 100_000, 0, 5]).collect()
            ),
            ..Default::default()
        },
        false,
        false
    )
    .is_err());
}

/// AS923-1 without explicit LBT channels: derive one entry per distinct
/// uplink frequency with bandwidth at most 250 kHz, target -80 dBm,
/// 5000 us scans.
#[test]
fn as923_lbt_channels_derive_from_uplink_plan() {
    let rc = RouterConfig {
        region: Some("AS923-1".into()),
        drs: Some(wire_drs()),
        upchannels: Some(vec![
            [923_200_000, 0, 5],
            [923_400_000, 0, 5],
            [923_400_000, 0, 5], // duplicate frequency collapses
        ]),
        ..Default::default()
    };
    let ctx = materialize(&rc, false, false).unwrap();
    assert!(ctx.cca_enabled);
    let lbt = ctx.lbt.as_ref().expect("LBT config");
    assert_eq!(lbt.rssi_target_dbm, -80);
    assert_eq!(lbt.channels.len(), 2);
    for c in &lbt.channels {
        assert!(c.bw_khz <= 250);
        assert_eq!(c.scan_time_us, 5000);
    }
}

/// Explicit LBT channels from the LNS override the derivation.
#[test]
fn explicit_lbt_channels_win() {
    let rc = from_json(&format!(
        r#"{{"msgtype":"router_config","region":"AS923-1",
            "DRs":{DRS_JSON},
            "upchannels":[[923200000,0,5]],
            "lbt_channels":[{{"freq":923200000,"bw":125,"scan_time":128}}],
            "lbt_rssi_target":-85}}"#
    ));
    let ctx = materialize(&rc, false, false).unwrap();
    let lbt = ctx.lbt.as_ref().unwrap();
    assert_eq!(lbt.rssi_target_dbm, -85);
    assert_eq!(lbt.channels.len(), 1);
    assert_eq!(lbt.channels[0].scan_time_us, 128);
}

/// nocca/nodc/nodwell are no-ops for production builds and only honored
/// when the build opts into test flags.
#[test]
fn prod_ignores_test_flags() {
    let rc = RouterConfig {
        region: Some("AS923-1".into()),
        drs: Some(wire_drs()),
        upchannels: Some(vec![[923_200_000, 0, 5]]),
        nocca: true,
        nodc: true,
        nodwell: true,
        ..Default::default()
    };
    let prod = materialize(&rc, false, false).unwrap();
    assert!(prod.cca_enabled);
    assert!(prod.duty_cycle_enabled);
    assert!(prod.dwell_enabled);

    let test_build = materialize(&rc, true, false).unwrap();
    assert!(!test_build.cca_enabled);
    assert!(!test_build.duty_cycle_enabled);
    assert!(!test_build.dwell_enabled);
}

/// The binary codec engages only when the station advertised support.
#[test]
fn protocol_format_needs_advertised_support() {
    let rc = RouterConfig {
        region: Some("EU868".into()),
        drs: Some(wire_drs()),
        upchannels: Some(vec![[868_100_000, 0, 5]]),
        protocol_format: Some("binary".into()),
        ..Default::default()
    };
    assert!(!materialize(&rc, false, false).unwrap().binary_codec);
    assert!(materialize(&rc, false, true).unwrap().binary_codec);
}
