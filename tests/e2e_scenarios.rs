//! End-to-end station scenarios against the mock transport and the
//! scripted concentrator simulator: the full connect / version /
//! router_config / uplink / downlink / confirmation loop without
//! hardware.

use lorastation::config::StationConf;
use lorastation::ral::hal::{Modulation, RxPacket};
use lorastation::ral::sim::SharedSim;
use lorastation::ral::Ral;
use lorastation::s2e::StationIdent;
use lorastation::station::{ExitReason, Station};
use lorastation::transport::{mock_pair, MockTransportHandle, OutFrame, TransportEvent};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const JREQ_PHY: [u8; 23] = [
    0x00, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0xF1, 0xE3, 0xF5, 0xE7, 0xF9, 0xEB,
    0xFD, 0xEF, 0xF0, 0xF1, 0xA0, 0xA1, 0xA2, 0xA3,
];

struct Harness {
    sim: SharedSim,
    handle: MockTransportHandle,
    shutdown: watch::Sender<bool>,
    station: JoinHandle<Result<ExitReason, lorastation::StationError>>,
    ticker: JoinHandle<()>,
}

fn ident() -> StationIdent {
    StationIdent {
        station: "2.0.6".into(),
        firmware: "sim".into(),
        package: "lorastation".into(),
        model: "sx1302-sim".into(),
        features: "gps prod gps-conf duty-conf pdu-conf lbt-conf updn-dr".into(),
    }
}

fn start_station() -> Harness {
    let sim = SharedSim::new();
    let ral = Ral::new(Box::new(sim.clone()), 0, true, Instant::now()).unwrap();
    let (transport, handle) = mock_pair();
    let station = Station::new(StationConf::default(), ident(), ral, Box::new(transport));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let station = tokio::spawn(station.run(shutdown_rx));
    // Drive the simulated radio clock at ~2.5x real time.
    let ticker_sim = sim.clone();
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(2)).await;
            ticker_sim.with(|s| s.tick(5_000));
        }
    });
    Harness {
        sim,
        handle,
        shutdown,
        station,
        ticker,
    }
}

async fn next_text(h: &mut Harness) -> String {
    loop {
        match timeout(Duration::from_secs(10), h.handle.out.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport closed")
        {
            OutFrame::Text(t) => return t,
            OutFrame::Binary(_) => panic!("unexpected binary frame"),
        }
    }
}

/// Waits for a text frame containing `needle`, skipping unrelated
/// messages (periodic timesync).
async fn next_text_containing(h: &mut Harness, needle: &str) -> String {
    for _ in 0..16 {
        let t = next_text(h).await;
        if t.contains(needle) {
            return t;
        }
    }
    panic!("no frame containing {needle:?}");
}

const DRS_JSON: &str = "[[12,125,0],[11,125,0],[10,125,0],[9,125,0],[8,125,0],[7,125,0],\
    [7,250,0],[0,50,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0],[-1,0,0]]";

fn eu868_config() -> String {
    format!(
        r#"{{"msgtype":"router_config","region":"EU868","DRs":{DRS_JSON},
    "upchannels":[[868100000,0,5],[868300000,0,5],[868500000,0,5]],
    "MuxTime":1700000000.0}}"#
    )
}

#[tokio::test]
async fn connect_configure_uplink_downlink() {
    let mut h = start_station();

    // Connect: the station must speak first with `version`.
    h.handle
        .events
        .send(TransportEvent::Connected)
        .await
        .unwrap();
    let version = next_text(&mut h).await;
    assert!(version.contains(r#""msgtype":"version""#), "{version}");
    assert!(version.contains(r#""protocol":2"#), "{version}");
    assert!(version.contains("prod"), "{version}");

    // Configure.
    h.handle
        .events
        .send(TransportEvent::Text(eu868_config()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.sim.with(|s| {
        assert!(s.chip_config().is_some(), "router_config not applied");
    });

    // Uplink: a join request through the radio.
    h.sim.with(|s| {
        let now = s.now_us();
        s.push_rx(RxPacket {
            freq_hz: 868_100_000,
            modulation: Modulation::Lora { sf: 7, bw_khz: 125 },
            count_us: now,
            rssi: -48.0,
            snr: 9.0,
            payload: JREQ_PHY.to_vec(),
            fts_ns: None,
            rf_chain: 0,
            crc_ok: true,
        });
    });
    let jreq = next_text_containing(&mut h, r#""msgtype":"jreq""#).await;
    assert!(jreq.contains(r#""JoinEui":"EF-CD-AB-89-67-45-23-01""#), "{jreq}");
    assert!(jreq.contains(r#""MIC":-1549622880"#), "{jreq}");

    // Downlink: class C order, confirmation carries the diid.
    let dnmsg = r#"{"msgtype":"dnmsg","DevEui":"11-22-33-44-55-66-77-88","dC":2,
        "diid":4711,"pdu":"40010203040000002A","priority":0,
        "DR":5,"Freq":869525000,"rctx":0}"#;
    h.handle
        .events
        .send(TransportEvent::Text(dnmsg.into()))
        .await
        .unwrap();
    let dntxed = next_text_containing(&mut h, r#""msgtype":"dntxed""#).await;
    assert!(dntxed.contains(r#""diid":4711"#), "{dntxed}");
    assert!(!dntxed.contains("error"), "{dntxed}");
    h.sim.with(|s| assert_eq!(s.sent().len(), 1));

    // Graceful shutdown.
    h.shutdown.send(true).unwrap();
    let exit = timeout(Duration::from_secs(5), h.station)
        .await
        .expect("station did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(exit, ExitReason::Shutdown);
    h.ticker.abort();
}

#[tokio::test]
async fn disconnect_cancels_pending_downlinks() {
    let mut h = start_station();
    h.handle
        .events
        .send(TransportEvent::Connected)
        .await
        .unwrap();
    let _version = next_text(&mut h).await;
    h.handle
        .events
        .send(TransportEvent::Text(eu868_config()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A class A downlink anchored an hour into the simulated future
    // stays queued... (the sim hands out session id 1)
    let xtime = lorastation::timesync::compose_xtime(1, 3_600_000_000);
    let dnmsg = format!(
        r#"{{"msgtype":"dnmsg","DevEui":"11-22-33-44-55-66-77-88","dC":0,
        "diid":99,"pdu":"40010203040000002A","RxDelay":1,
        "RX1DR":5,"RX1Freq":868100000,
        "xtime":{xtime}}}"#
    );
    h.handle
        .events
        .send(TransportEvent::Text(dnmsg))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ...until the LNS drops the link, which cancels everything.
    h.handle
        .events
        .send(TransportEvent::Disconnected)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Reconnect: a fresh session, no stale dntxed ever arrives.
    h.handle
        .events
        .send(TransportEvent::Connected)
        .await
        .unwrap();
    let version = next_text(&mut h).await;
    assert!(version.contains("version"), "{version}");

    h.shutdown.send(true).unwrap();
    let _ = timeout(Duration::from_secs(5), h.station).await;
    h.ticker.abort();
}

/// gps_enable=false in router_config leaves PPS alone but stops NMEA
/// consumption (observable as the context flag; the sim has no NMEA).
#[tokio::test]
async fn gps_enable_false_is_honored() {
    let mut h = start_station();
    h.handle
        .events
        .send(TransportEvent::Connected)
        .await
        .unwrap();
    let _ = next_text(&mut h).await;
    let cfg = format!(
        r#"{{"msgtype":"router_config","region":"EU868","gps_enable":false,
        "DRs":{DRS_JSON},
        "upchannels":[[868100000,0,5]]}}"#
    );
    h.handle
        .events
        .send(TransportEvent::Text(cfg))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.sim.with(|s| assert!(s.chip_config().is_some()));

    h.shutdown.send(true).unwrap();
    let _ = timeout(Duration::from_secs(5), h.station).await;
    h.ticker.abort();
}
