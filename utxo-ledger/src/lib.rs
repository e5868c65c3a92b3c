//! Deterministic UTXO ledger for a single-signer HD wallet.
//!
//! This library keeps an in-memory ledger of the outputs a wallet owns and
//! keeps it consistent while blocks are connected and disconnected:
//!
//! - Allocate receive and change addresses from two deterministic chains
//! - Recognise owned outputs through an address index and a bloom pre-filter
//! - Credit and debit outputs with reversible undo records
//! - Replay or revert whole blocks in reorg-safe order
//! - Fund, sign and submit outgoing transactions
//!
//! # Quick Start
//!
//! ```no_run
//! use std::str::FromStr;
//!
//! use utxo_ledger::bitcoin::bip32::DerivationPath;
//! use utxo_ledger::{Bip32KeyProvider, LedgerConfig, Wallet};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LedgerConfig::regtest().with_lookahead(5);
//!     let path = DerivationPath::from_str("m/84'/1'/0'")?;
//!     let provider = Bip32KeyProvider::from_seed(config.network, &[7u8; 32], &path)?;
//!
//!     let mut wallet = Wallet::new(config, provider)?;
//!     println!("receive at {}", wallet.receive_address()?);
//!
//!     // Feed blocks as they arrive; disconnect them again on a reorg.
//!     let block = wallet.connect(1, &[], &[]);
//!     assert!(!block.is_relevant());
//!     wallet.disconnect(1, &[], &[]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod bloom;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod wallet;


// Re-export main types for convenience
pub use config::LedgerConfig;
pub use error::{
    ConfigError, FundingError, LedgerError, LoggingError, LoggingResult, Result,
};
pub use logging::{LoggingConfig, init_console_logging, init_logging};
pub use types::{AddressId, Chain, Coordinate, OutputRef, TxKind};
pub use wallet::{
    ApplyOutcome, Balance, Bip32KeyProvider, BlockResult, Coin, EcdsaSigner, Funder, KeyMaterial,
    KeyProvider, LargestFirstFunder, Ledger, ScriptHasher, Signer, SpendRequest,
    StandardScriptHasher, TransactionResult, UnapplyOutcome, Wallet,
};

// Re-export bitcoin so downstream users share the same version
pub use bitcoin;
