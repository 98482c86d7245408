#![no_main]

use libfuzzer_sys::fuzz_target;
use parlor_client::codec::decode_frame;
use parlor_client::protocol::Frame;

fuzz_target!(|data: &[u8]| {
    // Binary frames go through the keepalive check and UTF-8 fallback.
    let _ = decode_frame(&Frame::Binary(data.to_vec()));

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decode_frame(&Frame::Text(s.to_string()));
    }
});
