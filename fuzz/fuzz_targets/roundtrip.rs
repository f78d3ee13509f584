#![no_main]
use libfuzzer_sys::fuzz_target;
use alzw::{decode, encode, Policy};

fuzz_target!(|data: &[u8]| {
    for &policy in &[Policy::Freeze, Policy::Reset, Policy::Monitor] {
        let mut encoder = encode::Encoder::new(policy);
        let mut buffer = Vec::with_capacity(2 * data.len() + 40);
        let _ = encoder.into_stream(&mut buffer).encode_all(data);

        let mut decoder = decode::Decoder::new(policy);
        let mut compare = vec![];
        let result = decoder.into_stream(&mut compare).decode_all(buffer.as_slice());
        assert!(result.status.is_ok(), "{:?}", result.status);
        assert!(data == &*compare, "{:?}", policy);
    }
});
