//! Binary snapshot round trips.

#![cfg(feature = "serialization")]

use hdrsketch::serialization::DecodeError;
use hdrsketch::Histogram;
use rand::{Rng, SeedableRng};

fn latency_scenario() -> Histogram<u64> {
    let mut h = Histogram::new_with_max(3_600_000_000, 3).unwrap();
    for _ in 0..10_000 {
        h.record_with_expected_interval(1000, 10_000).unwrap();
    }
    h.record_with_expected_interval(100_000_000, 10_000).unwrap();
    h
}

#[test]
fn plain_stream_starts_with_little_endian_cookie() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    let written = h.encode_into(&mut buf).unwrap();
    assert_eq!(written, buf.len());
    assert_eq!(&buf[..4], &[0x03, 0x93, 0x84, 0x1C]);
}

#[test]
fn compressed_stream_starts_with_little_endian_cookie() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_compressed_into(&mut buf).unwrap();
    assert_eq!(&buf[..4], &[0x04, 0x93, 0x84, 0x1C]);
}

#[test]
fn payload_length_field_matches_stream() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();
    let payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    assert_eq!(buf.len(), 40 + payload_len);
}

#[test]
fn plain_round_trip_reproduces_histogram() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();

    let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(back, h);
    assert_eq!(back.highest_trackable_value(), h.highest_trackable_value());
    assert_eq!(back.lowest_discernible_value(), h.lowest_discernible_value());
    assert_eq!(back.significant_value_digits(), h.significant_value_digits());
    assert_eq!(back.total_count(), h.total_count());
    assert_eq!(back.min_non_zero(), h.min_non_zero());
    assert_eq!(back.max(), h.max());
}

#[test]
fn compressed_round_trip_of_empty_histogram() {
    let h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
    let mut buf = Vec::new();
    h.encode_compressed_into(&mut buf).unwrap();

    let back = Histogram::<u64>::decode_compressed_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(back, h);
    assert_eq!(back.total_count(), 0);
}

#[test]
fn compressed_round_trip_reproduces_histogram() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_compressed_into(&mut buf).unwrap();

    // decode_from auto-detects the compressed frame as well
    let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(back, h);
}

#[test]
fn round_trip_scaled_configuration() {
    let mut h = Histogram::<u64>::new_with_bounds(1000, 1_000_000_000, 2).unwrap();
    h.record(1_234_567).unwrap();
    h.record_n(999_999_999, 3).unwrap();

    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();
    let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(back, h);
}

#[test]
fn round_trip_random_counts() {
    let mut rng = rand::rngs::SmallRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let mut h = Histogram::<u64>::new_with_max(1_000_000, 3).unwrap();
        for _ in 0..rng.gen_range(1..500) {
            let value = rng.gen_range(0..=1_000_000);
            let count = rng.gen_range(1..=u64::from(u32::max_value()));
            h.record_n(value, count).unwrap();
        }

        let mut plain = Vec::new();
        h.encode_into(&mut plain).unwrap();
        assert_eq!(Histogram::<u64>::decode_from(&mut plain.as_slice(), 0).unwrap(), h);

        let mut compressed = Vec::new();
        h.encode_compressed_into(&mut compressed).unwrap();
        assert_eq!(
            Histogram::<u64>::decode_from(&mut compressed.as_slice(), 0).unwrap(),
            h
        );
    }
}

#[test]
fn zero_runs_compress_sparse_histograms() {
    let mut h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
    h.record(1).unwrap();
    h.record(3_000_000_000).unwrap();

    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();
    // tens of thousands of empty slots collapse into a handful of run
    // markers
    assert!(buf.len() < 100);

    let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(back, h);
}

#[test]
fn min_highest_trackable_widens_decoded_range() {
    let mut h = Histogram::<u64>::new_with_max(1000, 3).unwrap();
    h.record_n(500, 9).unwrap();
    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();

    let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 3_600_000_000).unwrap();
    assert_eq!(back.highest_trackable_value(), 3_600_000_000);
    assert_eq!(back.count_at_value(500), 9);
    assert_eq!(back.total_count(), 9);
    assert_eq!(back.max(), h.max());
}

#[test]
fn cross_width_decoding() {
    let mut short = Histogram::<u16>::new_with_max(100_000, 3).unwrap();
    short.record_n(777, 30_000).unwrap();
    let mut buf = Vec::new();
    short.encode_into(&mut buf).unwrap();

    // narrow counts decode fine into a wider histogram
    let wide = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
    assert_eq!(wide.count_at_value(777), 30_000);

    // counts beyond the narrow type's range refuse to decode into it
    let mut big = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
    big.record_n(777, 1 << 40).unwrap();
    let mut buf = Vec::new();
    big.encode_into(&mut buf).unwrap();
    assert_eq!(
        Histogram::<u16>::decode_from(&mut buf.as_slice(), 0).unwrap_err(),
        DecodeError::UnsuitableCounterType
    );
}

#[test]
fn decode_rejects_unknown_cookie() {
    let bytes = [0xAA_u8, 0xBB, 0xCC, 0xDD, 0, 0, 0, 0];
    assert_eq!(
        Histogram::<u64>::decode_from(&mut &bytes[..], 0).unwrap_err(),
        DecodeError::InvalidCookie
    );
}

#[test]
fn decode_compressed_rejects_plain_stream() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();
    assert_eq!(
        Histogram::<u64>::decode_compressed_from(&mut buf.as_slice(), 0).unwrap_err(),
        DecodeError::InvalidCookie
    );
}

#[test]
fn decode_rejects_truncated_stream() {
    let h = latency_scenario();
    let mut buf = Vec::new();
    h.encode_into(&mut buf).unwrap();
    buf.truncate(buf.len() - 10);
    match Histogram::<u64>::decode_from(&mut buf.as_slice(), 0) {
        Err(DecodeError::IoError(_)) => {}
        other => panic!("expected i/o error, got {:?}", other),
    }
}

#[test]
fn decoded_histograms_aggregate() {
    let mut total = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
    let mut buf = Vec::new();
    for chunk in 0..4 {
        let mut interval = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        interval.record_n(1000 * (chunk + 1), 100).unwrap();
        buf.clear();
        interval.encode_compressed_into(&mut buf).unwrap();
        let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
        total.add(&back).unwrap();
    }
    assert_eq!(total.total_count(), 400);
    assert_eq!(total.count_at_value(2000), 100);
}
