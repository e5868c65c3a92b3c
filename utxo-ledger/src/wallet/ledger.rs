//! Active and pending-undo output sets with a running balance.
//!
//! An output is in at most one of the two maps. It moves active → undo when a
//! currently applied transaction consumes it and undo → active when that
//! consumption is reversed. `balance` always equals the sum of active values.

use std::collections::HashMap;

use bitcoin::{Amount, ScriptBuf, TxOut};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::{Coordinate, OutputRef};

/// Confirmations a coinbase output needs before it can be spent.
pub const COINBASE_MATURITY: u32 = 100;

/// An owned output together with what is needed to spend it again.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coin {
    pub output_ref: OutputRef,
    /// Value in satoshis.
    pub value: u64,
    /// Height of the containing block, `None` while unconfirmed.
    pub height: Option<u32>,
    pub script_pubkey: ScriptBuf,
    /// Derivation coordinate of the key that can spend this output.
    pub coordinate: Coordinate,
    pub is_coinbase: bool,
}

impl Coin {
    pub fn is_confirmed(&self) -> bool {
        self.height.is_some()
    }

    /// Confirmations at chain tip `tip`, 0 while unconfirmed.
    pub fn confirmations(&self, tip: u32) -> u32 {
        match self.height {
            Some(height) if tip >= height => tip - height + 1,
            _ => 0,
        }
    }

    /// Coinbase outputs need [`COINBASE_MATURITY`] confirmations.
    pub fn is_mature(&self, tip: u32) -> bool {
        !self.is_coinbase || self.confirmations(tip) >= COINBASE_MATURITY
    }

    pub fn is_witness(&self) -> bool {
        self.script_pubkey.is_witness_program()
    }

    pub fn txout(&self) -> TxOut {
        TxOut {
            value: Amount::from_sat(self.value),
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

/// Balance split by spendability at a given tip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    /// Confirmed, mature outputs.
    pub confirmed: u64,
    /// Outputs not yet in a block.
    pub unconfirmed: u64,
    /// Coinbase outputs below maturity.
    pub immature: u64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.confirmed + self.unconfirmed + self.immature
    }
}

/// Owned outputs, undo records and the running balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    active: HashMap<OutputRef, Coin>,
    undo: HashMap<OutputRef, Coin>,
    balance: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn sub_balance(&mut self, value: u64) {
        debug_assert!(self.balance >= value, "balance underflow");
        self.balance = self.balance.saturating_sub(value);
    }

    /// Make `coin` active. A stale undo record for the same reference is dropped.
    ///
    /// Returns `false` (and does nothing) if the resulting balance would
    /// exceed [`Amount::MAX_MONEY`].
    pub fn credit(&mut self, coin: Coin) -> bool {
        let output_ref = coin.output_ref;
        let previous = self.active.get(&output_ref).map_or(0, |existing| existing.value);
        let balance = match self.balance.saturating_sub(previous).checked_add(coin.value) {
            Some(balance) if balance <= Amount::MAX_MONEY.to_sat() => balance,
            _ => {
                tracing::warn!(
                    "Refusing credit of {} sat for {}: balance {} would exceed the money supply",
                    coin.value,
                    output_ref,
                    self.balance
                );
                return false;
            }
        };

        self.undo.remove(&output_ref);
        self.active.insert(output_ref, coin);
        self.balance = balance;
        true
    }

    /// Consume an active output, keeping it as an undo record.
    ///
    /// Returns `false` (and does nothing) if the output is not active.
    pub fn debit(&mut self, output_ref: &OutputRef) -> bool {
        let Some(coin) = self.active.remove(output_ref) else {
            return false;
        };
        self.sub_balance(coin.value);
        self.undo.insert(*output_ref, coin);
        true
    }

    /// Reverse a [`Ledger::debit`].
    ///
    /// Returns `false` (and does nothing) if no undo record exists or the
    /// balance cannot hold the restored value.
    pub fn undo_debit(&mut self, output_ref: &OutputRef) -> bool {
        let Some(value) = self.undo.get(output_ref).map(|coin| coin.value) else {
            return false;
        };
        let Some(balance) = self.balance.checked_add(value) else {
            tracing::error!("Balance overflow restoring {} sat for {}", value, output_ref);
            return false;
        };
        if let Some(coin) = self.undo.remove(output_ref) {
            self.balance = balance;
            self.active.insert(*output_ref, coin);
        }
        true
    }

    /// Erase a credit outright. No undo record is kept.
    ///
    /// Returns whether the output was active.
    pub fn undo_credit(&mut self, output_ref: &OutputRef) -> bool {
        let Some(coin) = self.active.remove(output_ref) else {
            return false;
        };
        self.sub_balance(coin.value);
        true
    }

    /// Sum of all active values.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Split the balance by spendability at chain tip `tip`.
    pub fn balance_breakdown(&self, tip: u32) -> Balance {
        self.active.values().fold(Balance::default(), |mut balance, coin| {
            if !coin.is_confirmed() {
                balance.unconfirmed += coin.value;
            } else if !coin.is_mature(tip) {
                balance.immature += coin.value;
            } else {
                balance.confirmed += coin.value;
            }
            balance
        })
    }

    /// Active outputs in no particular order.
    pub fn active_outputs(&self) -> impl Iterator<Item = &Coin> {
        self.active.values()
    }

    /// Consumed outputs still held for a possible undo.
    pub fn undo_outputs(&self) -> impl Iterator<Item = &Coin> {
        self.undo.values()
    }

    pub fn get(&self, output_ref: &OutputRef) -> Option<&Coin> {
        self.active.get(output_ref)
    }

    pub fn is_active(&self, output_ref: &OutputRef) -> bool {
        self.active.contains_key(output_ref)
    }

    pub fn is_pending_undo(&self, output_ref: &OutputRef) -> bool {
        self.undo.contains_key(output_ref)
    }

    /// Number of active outputs.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn check_invariants(&self) {
        let sum: u64 = self.active.values().map(|coin| coin.value).sum();
        assert_eq!(self.balance, sum, "balance out of sync with active outputs");
        assert!(
            self.active.keys().all(|output_ref| !self.undo.contains_key(output_ref)),
            "output both active and pending undo"
        );
    }
}
