//! Behavior of the three codebook saturation policies, observed through the
//! code streams they produce.
use alzw::{decode, encode, Policy};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

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

/// Enough uniformly random bytes to fill all 65536 entries.
fn saturating_data() -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x1501);
    let mut data = vec![0u8; 600 << 10];
    rng.fill_bytes(&mut data);
    data
}

#[test]
fn policies_only_diverge_at_saturation() {
    let data = b"below saturation every policy behaves the same".repeat(64);
    let frozen = compress(&data, Policy::Freeze);
    assert_eq!(frozen, compress(&data, Policy::Reset));
    assert_eq!(frozen, compress(&data, Policy::Monitor));
}

#[test]
fn freeze_and_reset_diverge_past_saturation() {
    let data = saturating_data();
    let frozen = compress(&data, Policy::Freeze);
    let reset = compress(&data, Policy::Reset);

    // A reset restarts the stream at 9-bit codes, a frozen book stays at 16.
    assert_ne!(frozen, reset);

    // Both streams restore the input under their own policy.
    assert_eq!(expand(&frozen, Policy::Freeze), data);
    assert_eq!(expand(&reset, Policy::Reset), data);
}

#[test]
fn monitor_resets_when_the_ratio_degrades() {
    // A compressible prefix saturates the codebook and sets a good baseline;
    // a high-entropy suffix then drags the running ratio down by far more
    // than the 10% trigger.
    let mut rng = StdRng::seed_from_u64(0x2502);
    let mut data: Vec<u8> = (0..700 << 10).map(|_| rng.gen::<u8>() & 0x0f).collect();
    let mut suffix = vec![0u8; 700 << 10];
    rng.fill_bytes(&mut suffix);
    data.extend_from_slice(&suffix);

    let monitored = compress(&data, Policy::Monitor);
    let frozen = compress(&data, Policy::Freeze);

    // Until the trigger fires the monitor stream matches the frozen one
    // byte-for-byte; the reset makes them diverge.
    assert_ne!(monitored, frozen);
    assert_eq!(expand(&monitored, Policy::Monitor), data);
}

#[test]
fn monitor_holds_on_stationary_input() {
    // With a stationary source the ratio only improves after the baseline is
    // taken, so the monitor stream never resets and stays identical to the
    // frozen one.
    let mut rng = StdRng::seed_from_u64(0x2503);
    let data: Vec<u8> = (0..1_400 << 10).map(|_| rng.gen::<u8>() & 0x0f).collect();

    let monitored = compress(&data, Policy::Monitor);
    let frozen = compress(&data, Policy::Freeze);

    assert_eq!(monitored, frozen);
    assert_eq!(expand(&monitored, Policy::Monitor), data);
}

#[test]
fn reset_recovers_on_a_shifted_distribution() {
    // After a hard reset the codebook relearns the new distribution; the
    // stream must stay in sync across the reset boundary and beyond.
    let mut rng = StdRng::seed_from_u64(0x2504);
    let mut data = vec![0u8; 600 << 10];
    rng.fill_bytes(&mut data);
    data.extend(std::iter::repeat(b'z').take(100 << 10));

    let reset = compress(&data, Policy::Reset);
    assert_eq!(expand(&reset, Policy::Reset), data);
}
