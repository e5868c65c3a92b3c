//! Wallet ledger engine.
//!
//! [`Wallet`] owns the five components and is the only way to mutate them:
//! - [`KeyFrontier`]: receive/change derivation frontiers
//! - [`AddressIndex`]: address identity → coordinate, plus the relevance filter
//! - [`Ledger`]: active outputs, undo records and the running balance
//! - [`TransactionProcessor`]: apply/unapply of single transactions
//! - block connect/disconnect ordering (see [`sync`])
//!
//! All mutation is synchronous and expects a single sequential driver.

pub mod address_index;
pub mod builder;
pub mod keys;
pub mod ledger;
pub mod sync;
pub mod transaction_processor;

#[cfg(test)]
mod ledger_test;
#[cfg(test)]
mod sync_test;

use bitcoin::{Address, Transaction};

use crate::bloom::BloomFilter;
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::types::{AddressId, Chain, Coordinate, OutputRef};
pub use address_index::{AddressIndex, ScriptHasher, StandardScriptHasher};
pub use builder::{EcdsaSigner, Funder, LargestFirstFunder, Signer, SigningInput, SpendRequest};
pub use keys::{Bip32KeyProvider, KeyFrontier, KeyMaterial, KeyProvider};
pub use ledger::{Balance, COINBASE_MATURITY, Coin, Ledger};
pub use sync::BlockResult;
pub use transaction_processor::{
    ApplyOutcome, TransactionProcessor, TransactionResult, UnapplyOutcome,
};
use transaction_processor::LedgerContext;

/// Ledger-tracking engine for a single-signer HD wallet.
#[derive(Debug)]
pub struct Wallet<K = Bip32KeyProvider, H = StandardScriptHasher> {
    config: LedgerConfig,
    keys: KeyFrontier<K>,
    index: AddressIndex,
    ledger: Ledger,
    processor: TransactionProcessor,
    hasher: H,
}

impl<K: KeyProvider> Wallet<K, StandardScriptHasher> {
    /// Create a wallet using the standard script hasher.
    pub fn new(config: LedgerConfig, provider: K) -> Result<Self> {
        Self::with_hasher(config, provider, StandardScriptHasher)
    }
}

impl<K: KeyProvider, H: ScriptHasher> Wallet<K, H> {
    /// Create a wallet with a custom script hasher.
    ///
    /// Validates `config` and allocates `config.lookahead` coordinates on
    /// each chain.
    pub fn with_hasher(config: LedgerConfig, provider: K, hasher: H) -> Result<Self> {
        config.validate()?;

        let filter = BloomFilter::new(
            config.filter_elements,
            config.filter_false_positive_rate,
            config.filter_tweak,
        )?;
        let mut index = AddressIndex::new(filter);
        let mut keys = KeyFrontier::new(provider);

        for chain in Chain::ALL {
            for _ in 0..config.lookahead {
                keys.advance(chain, &mut index)?;
            }
        }

        tracing::info!(
            "Wallet initialised on {} with {} coordinates per chain (witness: {})",
            config.network,
            config.lookahead,
            config.witness
        );

        Ok(Self {
            config,
            keys,
            index,
            ledger: Ledger::new(),
            processor: TransactionProcessor::new(),
            hasher,
        })
    }

    fn context(&mut self) -> (&mut TransactionProcessor, LedgerContext<'_, K, H>) {
        let Self {
            keys,
            index,
            ledger,
            processor,
            hasher,
            ..
        } = self;
        (
            processor,
            LedgerContext {
                ledger,
                keys,
                index,
                hasher,
            },
        )
    }

    /// Apply a transaction at `height` (`None` for unconfirmed).
    pub fn apply(&mut self, tx: &Transaction, height: Option<u32>) -> ApplyOutcome {
        let (processor, ctx) = self.context();
        processor.apply(tx, height, ctx)
    }

    /// Reverse a previously applied transaction.
    pub fn unapply(&mut self, tx: &Transaction, height: Option<u32>) -> UnapplyOutcome {
        let (processor, ctx) = self.context();
        processor.unapply(tx, height, ctx)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn address_index(&self) -> &AddressIndex {
        &self.index
    }

    pub fn key_frontier(&self) -> &KeyFrontier<K> {
        &self.keys
    }

    pub fn processor(&self) -> &TransactionProcessor {
        &self.processor
    }

    /// Key material of the newest coordinate on `chain`.
    pub fn current_key(&self, chain: Chain) -> Result<KeyMaterial> {
        // The constructor allocates at least one coordinate per chain.
        let coordinate = self.keys.current(chain).unwrap_or(Coordinate::new(chain, 0));
        self.keys.derive(coordinate)
    }

    /// Current receive address.
    pub fn receive_address(&self) -> Result<Address> {
        let key = self.current_key(Chain::External)?;
        Ok(key.address(self.config.network, self.config.witness))
    }

    /// Current change address.
    pub fn change_address(&self) -> Result<Address> {
        let key = self.current_key(Chain::Internal)?;
        Ok(key.address(self.config.network, self.config.witness))
    }

    pub fn coordinate_of(&self, address_id: &AddressId) -> Option<Coordinate> {
        self.index.lookup(address_id)
    }

    /// Key material for an owned address identity.
    pub fn key_for(&self, address_id: &AddressId) -> Result<Option<KeyMaterial>> {
        self.index.lookup(address_id).map(|coordinate| self.keys.derive(coordinate)).transpose()
    }

    pub fn active_outputs(&self) -> impl Iterator<Item = &Coin> {
        self.ledger.active_outputs()
    }

    pub fn balance(&self) -> u64 {
        self.ledger.balance()
    }

    pub fn balance_breakdown(&self, tip: u32) -> Balance {
        self.ledger.balance_breakdown(tip)
    }

    pub fn transaction_count(&self) -> u64 {
        self.processor.transaction_count()
    }

    /// Cheap pre-check against the relevance filter. A `false` means the
    /// transaction certainly does not touch this wallet.
    pub fn is_probably_relevant(&self, tx: &Transaction) -> bool {
        let spends_ours = tx
            .input
            .iter()
            .any(|input| self.index.probably_relevant(&OutputRef::from(input.previous_output).encode()));
        spends_ours
            || tx.output.iter().any(|output| {
                self.hasher
                    .address_id(&output.script_pubkey)
                    .is_some_and(|id| self.index.probably_relevant(id.as_bytes()))
            })
    }

    /// Net effect `tx` would have on the balance: owned outputs received
    /// minus active outputs it spends.
    pub fn calculate_net_amount(&self, tx: &Transaction) -> i64 {
        let spent: u64 = tx
            .input
            .iter()
            .filter_map(|input| self.ledger.get(&OutputRef::from(input.previous_output)))
            .map(|coin| coin.value)
            .fold(0u64, u64::saturating_add);

        let received: u64 = tx
            .output
            .iter()
            .filter(|output| {
                self.hasher
                    .address_id(&output.script_pubkey)
                    .is_some_and(|id| self.index.contains(&id))
            })
            .map(|output| output.value.to_sat())
            .fold(0u64, u64::saturating_add);

        let net = i128::from(received) - i128::from(spent);
        i64::try_from(net).unwrap_or(if net < 0 { i64::MIN } else { i64::MAX })
    }

    /// Fee paid by `tx`, if every input spends an active output of this wallet.
    pub fn calculate_transaction_fee(&self, tx: &Transaction) -> Option<u64> {
        let mut total_input = 0u64;
        for input in &tx.input {
            let coin = self.ledger.get(&OutputRef::from(input.previous_output))?;
            total_input = total_input.checked_add(coin.value)?;
        }

        let total_output = tx
            .output
            .iter()
            .try_fold(0u64, |total, out| total.checked_add(out.value.to_sat()))?;
        total_input.checked_sub(total_output)
    }
}
