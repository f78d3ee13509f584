use alzw::{decode, encode, Policy};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

const POLICIES: [Policy; 3] = [Policy::Freeze, Policy::Reset, Policy::Monitor];

fn compress(data: &[u8], policy: Policy) -> Vec<u8> {
    let mut encoder = encode::Encoder::new(policy);
    let mut buffer = Vec::with_capacity(2 * data.len() + 40);
    let result = encoder.into_stream(&mut buffer).encode_all(data);
    result.status.expect("encoding failed");
    buffer
}

fn expand(data: &[u8], policy: Policy) -> Vec<u8> {
    let mut decoder = decode::Decoder::new(policy);
    let mut buffer = vec![];
    let result = decoder.into_stream(&mut buffer).decode_all(data);
    result.status.expect("decoding failed");
    buffer
}

fn assert_roundtrips(data: &[u8], policy: Policy) {
    let compressed = compress(data, policy);
    let restored = expand(&compressed, policy);
    assert!(
        restored == data,
        "{:?}: {} bytes in, {} bytes back",
        policy,
        data.len(),
        restored.len()
    );
}

#[test]
fn empty_input() {
    for &policy in &POLICIES {
        let compressed = compress(&[], policy);
        // Nothing but the 9-bit end-of-stream code, zero padded.
        assert_eq!(compressed, vec![0x80, 0x00]);
        assert_eq!(expand(&compressed, policy), b"");
    }
}

#[test]
fn classic_phrase() {
    for &policy in &POLICIES {
        assert_roundtrips(b"TOBEORNOTTOBEORTOBEORNOT", policy);
    }
}

#[test]
fn self_referential_codes() {
    // A run of one byte forces the decoder through the case where a code
    // names the entry being derived from it.
    for &policy in &POLICIES {
        assert_roundtrips(b"aaaa", policy);
        assert_roundtrips(b"aaabbbaaabbb", policy);
        assert_roundtrips(&[0u8; 300], policy);
    }
}

#[test]
fn all_byte_values() {
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    for &policy in &POLICIES {
        assert_roundtrips(&data, policy);
    }
}

#[test]
fn long_single_byte_run() {
    // Long enough that the codebook crosses several width boundaries.
    let data = vec![0x41; 1_000_000];
    for &policy in &POLICIES {
        let compressed = compress(&data, policy);
        assert!(compressed.len() < data.len() / 100);
        assert_eq!(expand(&compressed, policy), data);
    }
}

#[test]
fn all_distinct_bytes_once() {
    // 256 one-byte phrases leave the codebook at exactly 512 entries when
    // the final code is emitted, so the end-of-stream code lands right on
    // the 9-to-10 bit transition.
    let data: Vec<u8> = (0..=255u8).collect();
    for &policy in &POLICIES {
        assert_roundtrips(&data, policy);
    }
}

#[test]
fn stream_ending_at_a_width_boundary() {
    // A single-byte run of n(n+1)/2 bytes is consumed as the phrases a^1
    // through a^n; picking n so the codebook holds exactly a power of two
    // of entries at the final emit puts the end-of-stream code on a width
    // transition.
    for &boundary in &[512usize, 1024, 2048] {
        let phrases = boundary - 256;
        let data = vec![b'a'; phrases * (phrases + 1) / 2];
        for &policy in &POLICIES {
            assert_roundtrips(&data, policy);
        }
    }
}

#[test]
fn random_data_grows_the_width() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut data = vec![0u8; 8 << 10];
    rng.fill_bytes(&mut data);
    for &policy in &POLICIES {
        assert_roundtrips(&data, policy);
    }
}

#[test]
fn random_data_saturates_the_codebook() {
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let mut data = vec![0u8; 600 << 10];
    rng.fill_bytes(&mut data);
    for &policy in &POLICIES {
        assert_roundtrips(&data, policy);
    }
}

#[test]
fn compressible_data_stays_in_sync_past_saturation() {
    // Sixteen distinct byte values; saturates with long phrases in the book.
    let mut rng = StdRng::seed_from_u64(0xabcd);
    let data: Vec<u8> = (0..1_000_000).map(|_| rng.gen::<u8>() & 0x0f).collect();
    for &policy in &POLICIES {
        let compressed = compress(&data, policy);
        assert!(compressed.len() < data.len());
        assert_eq!(expand(&compressed, policy), data);
    }
}

#[test]
fn decoding_in_tiny_steps() {
    let data = b"TOBEORNOTTOBEORTOBEORNOT";
    let compressed = compress(data, Policy::Freeze);

    let mut decoder = decode::Decoder::new(Policy::Freeze);
    let mut restored = vec![];
    let mut inp = compressed.as_slice();
    loop {
        let mut out = [0u8; 1];
        let result = decoder.decode_bytes(inp, &mut out);
        inp = &inp[result.consumed_in..];
        restored.extend_from_slice(&out[..result.consumed_out]);
        match result.status.expect("decoding failed") {
            decode::LzwStatus::Done => break,
            decode::LzwStatus::Ok | decode::LzwStatus::NoProgress => {}
        }
    }
    assert_eq!(restored, data);
}

#[test]
fn encoding_in_tiny_steps() {
    let data = b"TOBEORNOTTOBEORTOBEORNOT";

    let mut encoder = encode::Encoder::new(Policy::Freeze);
    encoder.finish();
    let mut compressed = vec![];
    let mut inp: &[u8] = data;
    loop {
        let mut out = [0u8; 1];
        let result = encoder.encode_bytes(inp, &mut out);
        inp = &inp[result.consumed_in..];
        compressed.extend_from_slice(&out[..result.consumed_out]);
        if let decode::LzwStatus::Done = result.status.expect("encoding failed") {
            break;
        }
    }
    assert_eq!(compressed, compress(data, Policy::Freeze));
}
