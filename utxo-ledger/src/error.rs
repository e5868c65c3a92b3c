//! Error types for the UTXO ledger.

use bitcoin::Txid;
use thiserror::Error;

use crate::bloom::BloomError;

/// Main error type for the ledger engine.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Funding error: {0}")]
    Funding(#[from] FundingError),

    #[error("Transaction construction cancelled")]
    Cancelled,

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Transaction {txid} is not fully signed ({unsigned} inputs without a spend proof)")]
    IncompleteSignature {
        txid: Txid,
        unsigned: usize,
    },

    #[error("Bloom filter error: {0}")]
    Bloom(#[from] BloomError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

impl From<bitcoin::bip32::Error> for LedgerError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        LedgerError::Derivation(err.to_string())
    }
}

/// Construction-time configuration errors. These are fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Lookahead must be between 1 and 2^31 - 1, got {0}")]
    InvalidLookahead(u32),

    #[error("Invalid filter parameters: {0}")]
    InvalidFilter(String),

    #[error("Invalid root key material: {0}")]
    InvalidRootKey(String),
}

/// Errors reported by a funding (coin selection) collaborator.
///
/// A funding failure never touches the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("Insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds {
        needed: u64,
        available: u64,
    },

    #[error("Spend request has no outputs")]
    NoOutputs,

    #[error("Invalid spend request: {0}")]
    Invalid(String),
}

/// Logging-related errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Subscriber initialization failed: {0}")]
    SubscriberInit(String),
}

/// Type alias for results returned by the ledger engine.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Type alias for logging results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;
