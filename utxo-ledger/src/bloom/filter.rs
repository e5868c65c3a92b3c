//! Bloom filter sized BIP37-style.

use std::cmp;

use bitvec::prelude::*;

use super::error::BloomError;
use super::hash::murmur3;

/// Maximum size of a bloom filter in bytes (36KB)
pub const MAX_BLOOM_FILTER_SIZE: usize = 36000;

/// Maximum number of hash functions
pub const MAX_HASH_FUNCS: u32 = 50;

/// Seed multiplier from BIP37.
const SEED_MULTIPLIER: u32 = 0xfba4_c795;

/// Insert-only bloom filter.
///
/// The filter is never cleared while a wallet is alive: an identity inserted
/// once stays matchable, which is what makes it safe as a relevance hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    n_hash_funcs: u32,
    n_tweak: u32,
    /// Number of insertions so far, used for the false positive estimate.
    inserted: u64,
}

impl BloomFilter {
    /// Create a new bloom filter.
    ///
    /// # Arguments
    /// * `elements` - Expected number of elements to be added
    /// * `false_positive_rate` - Desired false positive rate (0.0 to 1.0, exclusive)
    /// * `tweak` - Value added to every hash seed
    pub fn new(elements: u32, false_positive_rate: f64, tweak: u32) -> Result<Self, BloomError> {
        if elements == 0 {
            return Err(BloomError::InvalidElementCount(elements));
        }

        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(BloomError::InvalidFalsePositiveRate(false_positive_rate));
        }

        let ln2 = std::f64::consts::LN_2;
        let size = (-(elements as f64) * false_positive_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let size = size.clamp(1, MAX_BLOOM_FILTER_SIZE * 8);

        let n_hash_funcs = (size as f64 / elements as f64 * ln2).ceil() as u32;
        let n_hash_funcs = cmp::max(1, cmp::min(n_hash_funcs, MAX_HASH_FUNCS));

        Ok(BloomFilter {
            bits: bitvec![u8, Lsb0; 0; size],
            n_hash_funcs,
            n_tweak: tweak,
            inserted: 0,
        })
    }

    fn bit_index(&self, data: &[u8], round: u32) -> usize {
        let seed = round.wrapping_mul(SEED_MULTIPLIER).wrapping_add(self.n_tweak);
        murmur3(data, seed) as usize % self.bits.len()
    }

    /// Insert data into the filter.
    pub fn insert(&mut self, data: &[u8]) {
        for round in 0..self.n_hash_funcs {
            let index = self.bit_index(data, round);
            self.bits.set(index, true);
        }
        self.inserted += 1;
    }

    /// Check whether data might be in the filter. Never returns a false negative.
    pub fn contains(&self, data: &[u8]) -> bool {
        (0..self.n_hash_funcs).all(|round| self.bits[self.bit_index(data, round)])
    }

    /// Whether nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Number of insertions performed (duplicates included).
    pub fn len(&self) -> u64 {
        self.inserted
    }

    /// Filter size in bytes.
    pub fn size(&self) -> usize {
        self.bits.len().div_ceil(8)
    }

    pub fn hash_funcs(&self) -> u32 {
        self.n_hash_funcs
    }

    pub fn tweak(&self) -> u32 {
        self.n_tweak
    }

    /// Estimate the current false positive rate: `(1 - e^(-k*n/m))^k`.
    pub fn estimate_false_positive_rate(&self) -> f64 {
        if self.inserted == 0 {
            return 0.0;
        }

        let k = self.n_hash_funcs as f64;
        let ratio = -(k * self.inserted as f64) / self.bits.len() as f64;
        (1.0 - ratio.exp()).powf(k)
    }
}
