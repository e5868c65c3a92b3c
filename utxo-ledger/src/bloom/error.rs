//! Bloom filter error types

use thiserror::Error;

/// Errors that can occur when sizing a bloom filter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BloomError {
    #[error("Invalid false positive rate {0}, must be between 0 and 1")]
    InvalidFalsePositiveRate(f64),

    #[error("Invalid element count {0}, must be greater than 0")]
    InvalidElementCount(u32),
}
