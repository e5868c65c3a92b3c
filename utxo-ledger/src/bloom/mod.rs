//! Probabilistic membership filter.
//!
//! The wallet feeds every address identity and every owned outpoint into a
//! murmur3 bloom filter so incoming data can be screened cheaply before the
//! authoritative index lookup. False negatives are impossible.

pub mod error;
pub mod filter;
pub mod hash;

pub use error::BloomError;
pub use filter::{BloomFilter, MAX_BLOOM_FILTER_SIZE, MAX_HASH_FUNCS};
pub use hash::murmur3;
