#![no_main]

use libfuzzer_sys::fuzz_target;
use lorastation::codec::binary::decode;

fuzz_target!(|data: &[u8]| {
    let _ = decode(data);
});
