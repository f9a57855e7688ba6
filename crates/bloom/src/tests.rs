use super::*;
use std::io::Cursor;

// -------------------- Construction --------------------

#[test]
fn for_items_applies_sizing_policy() {
    let bf = BloomFilter::for_items(1000);
    assert_eq!(bf.num_bits(), 1000 * BITS_PER_ITEM);
    assert_eq!(bf.num_hashes(), NUM_HASHES);
}

#[test]
fn tiny_filters_get_a_floor() {
    // A handful of items must not produce a degenerate bit array.
    let bf = BloomFilter::for_items(1);
    assert!(bf.num_bits() >= 64);
}

#[test]
fn with_params_clamps_zero() {
    let bf = BloomFilter::with_params(0, 0);
    assert!(bf.num_bits() >= 1);
    assert!(bf.num_hashes() >= 1);
}

// -------------------- Add / Contains --------------------

#[test]
fn added_key_is_found() {
    let mut bf = BloomFilter::for_items(100);
    bf.add(b"hello");
    assert!(bf.possibly_contains(b"hello"));
}

#[test]
fn missing_key_is_not_found_in_empty_filter() {
    let bf = BloomFilter::for_items(100);
    assert!(!bf.possibly_contains(b"hello"));
}

#[test]
fn no_false_negatives_over_many_keys() {
    let mut bf = BloomFilter::for_items(5000);
    for i in 0..5000u64 {
        bf.add(&i.to_le_bytes());
    }
    for i in 0..5000u64 {
        assert!(
            bf.possibly_contains(&i.to_le_bytes()),
            "key {} must be found",
            i
        );
    }
}

#[test]
fn false_positive_rate_is_about_one_percent() {
    let n = 10_000;
    let mut bf = BloomFilter::for_items(n);
    for i in 0..n as u64 {
        bf.add(&i.to_le_bytes());
    }

    let mut false_positives = 0;
    let probes = 10_000u64;
    for i in (n as u64)..(n as u64 + probes) {
        if bf.possibly_contains(&i.to_le_bytes()) {
            false_positives += 1;
        }
    }

    let fpr = false_positives as f64 / probes as f64;
    // 10 bits/item with 7 hashes targets ~1%; allow generous variance.
    assert!(fpr < 0.03, "false positive rate too high: {:.4}", fpr);
}

#[test]
fn empty_key() {
    let mut bf = BloomFilter::for_items(10);
    bf.add(b"");
    assert!(bf.possibly_contains(b""));
}

#[test]
fn binary_key() {
    let mut bf = BloomFilter::for_items(10);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.add(&key);
    assert!(bf.possibly_contains(&key));
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_serialize_deserialize() {
    let mut bf = BloomFilter::for_items(500);
    for i in 0..500u64 {
        bf.add(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());

    let mut cursor = Cursor::new(&buf);
    let bf2 = BloomFilter::read_from(&mut cursor).unwrap();

    assert_eq!(bf2.num_bits(), bf.num_bits());
    assert_eq!(bf2.num_hashes(), bf.num_hashes());
    for i in 0..500u64 {
        assert!(
            bf2.possibly_contains(&i.to_le_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn deserialize_rejects_implausible_bit_count() {
    // 300 MB worth of bits is over the 200 MB cap.
    let mut buf = Vec::new();
    buf.extend_from_slice(&(300u64 * 1024 * 1024 * 8).to_le_bytes());
    buf.push(7u8);

    let mut cursor = Cursor::new(&buf);
    assert!(BloomFilter::read_from(&mut cursor).is_err());
}

#[test]
fn deserialize_rejects_zero_bits() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.push(7u8);

    let mut cursor = Cursor::new(&buf);
    assert!(BloomFilter::read_from(&mut cursor).is_err());
}

#[test]
fn deserialize_rejects_truncated_bits() {
    let mut bf = BloomFilter::for_items(100);
    bf.add(b"k");
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    buf.truncate(buf.len() - 4);

    let mut cursor = Cursor::new(&buf);
    assert!(BloomFilter::read_from(&mut cursor).is_err());
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let bf = BloomFilter::for_items(100);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
    assert!(debug.contains("num_bits"));
}
