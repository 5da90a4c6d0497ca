#![no_main]

use libfuzzer_sys::fuzz_target;
use lorastation::phy::parse_uplink;

fuzz_target!(|data: &[u8]| {
    let _ = parse_uplink(data);
});
