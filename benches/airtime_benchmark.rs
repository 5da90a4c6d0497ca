use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lorastation::codec::binary::{decode, encode, BinMessage};
use lorastation::phy::airtime::{fsk_airtime_us, lora_airtime_us};
use lorastation::phy::parse_uplink;
use lorastation::s2e::msg::{UpInfo, Updf};
use std::time::Duration;

const JREQ_HEX: &str = "000123456789ABCDEFF1E3F5E7F9EBFDEFF0F1A0A1A2A3";
const UPDF_HEX: &str = "40010203040722002AAABB07DEADBEEFA0A1A2A3";

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex::decode(hex).unwrap()
}

fn benchmark_airtime(c: &mut Criterion) {
    let mut group = c.benchmark_group("airtime");
    group.measurement_time(Duration::from_secs(5));

    for (sf, plen) in [(7u8, 23usize), (9, 51), (12, 51)] {
        group.bench_with_input(
            BenchmarkId::new("lora", format!("sf{sf}_len{plen}")),
            &(sf, plen),
            |b, &(sf, plen)| {
                b.iter(|| lora_airtime_us(black_box(sf), black_box(125), black_box(plen)))
            },
        );
    }
    group.bench_function("fsk_len51", |b| b.iter(|| fsk_airtime_us(black_box(51))));
    group.finish();
}

fn benchmark_phy_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("phy_parsing");
    group.measurement_time(Duration::from_secs(5));

    let jreq = hex_to_bytes(JREQ_HEX);
    group.bench_function("join_request", |b| {
        b.iter(|| {
            let _ = parse_uplink(black_box(&jreq));
        })
    });
    let updf = hex_to_bytes(UPDF_HEX);
    group.bench_function("data_frame", |b| {
        b.iter(|| {
            let _ = parse_uplink(black_box(&updf));
        })
    });
    group.finish();
}

fn benchmark_binary_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary_codec");
    group.measurement_time(Duration::from_secs(5));

    let msg = BinMessage::Updf(Updf {
        msgtype: "updf".into(),
        mhdr: 0x40,
        dev_addr: 0x0403_0201,
        fctrl: 0x22,
        fcnt: 42,
        fopts: vec![0xAA, 0xBB],
        fport: 7,
        frm_payload: vec![0xDE; 51],
        mic: -1549622880,
        ref_time: 1_700_000_000.5,
        dr: 5,
        freq: 868_100_000,
        upinfo: UpInfo {
            rctx: 0,
            xtime: (1i64 << 48) | 123_456,
            gpstime: 1_234_567_890,
            fts: -1,
            rssi: -48.0,
            snr: 9.5,
            rxtime: 1_700_000_000.5,
        },
    });
    group.bench_function("encode_updf", |b| b.iter(|| encode(black_box(&msg))));
    let encoded = encode(&msg);
    group.bench_function("decode_updf", |b| {
        b.iter(|| decode(black_box(&encoded)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_airtime,
    benchmark_phy_parsing,
    benchmark_binary_codec
);
criterion_main!(benches);
