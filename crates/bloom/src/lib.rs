//! # Bloom filter
//!
//! A space-efficient membership summary for SSTables. The filter can say with
//! certainty that a key is **not** in a table (no false negatives), but may
//! occasionally claim a key is present when it isn't. Every table embeds one
//! in its index file so point lookups can skip tables that cannot contain the
//! key.
//!
//! Sizing follows the engine-wide policy of 10 bits per expected key with 7
//! hash probes, which lands the false-positive rate around 1%.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::for_items(1000);
//! bf.add(b"hello");
//! assert!(bf.possibly_contains(b"hello"));
//! ```

use std::io::{self, Read, Write};

/// Bits allocated per expected item.
pub const BITS_PER_ITEM: u64 = 10;
/// Number of hash probes per key.
pub const NUM_HASHES: u8 = 7;

/// Upper bound on an on-disk filter: 200 MB of bits. Anything larger is a
/// corrupt index, not a filter.
const MAX_BLOOM_BITS: u64 = 200 * 1024 * 1024 * 8;

/// A bloom filter backed by a packed bit vector with `k` derived probes.
///
/// Uses double hashing: probe `i` lands at `h1 + i * h2` where `h1` and `h2`
/// are FNV-1a hashes with two different bases.
pub struct BloomFilter {
    /// Packed bit storage, 8 bits per byte.
    bits: Vec<u8>,
    /// Number of addressable bits.
    num_bits: u64,
    /// Number of hash probes (k).
    num_hashes: u8,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` keys at the standard
    /// 10-bits-per-item / 7-hash policy.
    #[must_use]
    pub fn for_items(expected_items: usize) -> Self {
        let num_bits = (expected_items as u64).saturating_mul(BITS_PER_ITEM).max(64);
        Self::with_params(num_bits, NUM_HASHES)
    }

    /// Creates a filter with an explicit bit count and probe count.
    #[must_use]
    pub fn with_params(num_bits: u64, num_hashes: u8) -> Self {
        let num_bits = num_bits.max(1);
        let num_hashes = num_hashes.max(1);
        let byte_len = ((num_bits + 7) / 8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            num_bits,
            num_hashes,
        }
    }

    /// Rebuilds a filter from deserialized parts.
    fn from_raw(bits: Vec<u8>, num_bits: u64, num_hashes: u8) -> Self {
        Self {
            bits,
            num_bits,
            num_hashes,
        }
    }

    /// Adds a key to the filter.
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.probe(h1, h2, i);
            self.set_bit(idx);
        }
    }

    /// Returns `true` if the key **might** have been added, `false` if it
    /// definitely was not.
    #[must_use]
    pub fn possibly_contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            if !self.get_bit(self.probe(h1, h2, i)) {
                return false;
            }
        }
        true
    }

    /// Number of addressable bits.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash probes.
    #[must_use]
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Size in bytes of the serialized form:
    /// `num_bits(u64) + num_hashes(u8) + packed bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 1 + self.bits.len()
    }

    /// Serializes the filter.
    ///
    /// Wire format (little-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u8][bits: (num_bits+7)/8 bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&[self.num_hashes])?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter, rejecting implausible bit counts.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        let mut buf1 = [0u8; 1];
        r.read_exact(&mut buf1)?;
        let num_hashes = buf1[0];

        if num_bits == 0 || num_bits > MAX_BLOOM_BITS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible bloom filter size: {} bits", num_bits),
            ));
        }
        if num_hashes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter with zero hashes",
            ));
        }

        let byte_len = ((num_bits + 7) / 8) as usize;
        let mut bits = vec![0u8; byte_len];
        r.read_exact(&mut bits)?;

        Ok(Self::from_raw(bits, num_bits, num_hashes))
    }

    // ---- Internal helpers ----

    /// Double hashing: probe(i) = (h1 + i * h2) mod num_bits.
    fn probe(&self, h1: u64, h2: u64, i: u8) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    fn set_bit(&mut self, idx: u64) {
        self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    fn get_bit(&self, idx: u64) -> bool {
        (self.bits[(idx / 8) as usize] >> (idx % 8)) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Two independent 64-bit FNV-1a hashes with different bases.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (
        fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
        fnv1a_64(key, 0x517c_c1b7_2722_0a95),
    )
}

/// FNV-1a 64-bit hash with a configurable starting basis.
fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
