//! Transaction processing: relevance, ledger mutation and frontier advancement.
//!
//! A transaction is either unseen or processed-relevant. Only transactions
//! that changed the ledger are remembered; irrelevant ones leave no trace and
//! are rescanned in full whenever they are seen again.

use std::collections::HashMap;

use bitcoin::{Script, Transaction, Txid};

use super::address_index::{AddressIndex, ScriptHasher};
use super::keys::{KeyFrontier, KeyProvider};
use super::ledger::{Coin, Ledger};
use crate::types::{Coordinate, OutputRef, TxKind, has_witness};

/// What a single apply or unapply did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub txid: Txid,
    /// Outputs credited on apply, or erased on unapply.
    pub credited: Vec<OutputRef>,
    /// Outputs consumed on apply, or restored on unapply.
    pub debited: Vec<OutputRef>,
    /// Coordinates allocated because an edge address was used.
    pub advanced: Vec<Coordinate>,
    /// Total value of `credited`.
    pub value_credited: u64,
    /// Total value of `debited`.
    pub value_debited: u64,
}

impl TransactionResult {
    fn new(txid: Txid) -> Self {
        Self {
            txid,
            credited: Vec::new(),
            debited: Vec::new(),
            advanced: Vec::new(),
            value_credited: 0,
            value_debited: 0,
        }
    }

    pub fn is_relevant(&self) -> bool {
        !self.credited.is_empty() || !self.debited.is_empty()
    }

    /// Signed effect on the balance of the apply that produced this result.
    pub fn net_amount(&self) -> i64 {
        let net = i128::from(self.value_credited) - i128::from(self.value_debited);
        i64::try_from(net).unwrap_or(if net < 0 { i64::MIN } else { i64::MAX })
    }
}

/// Outcome of [`Wallet::apply`](crate::Wallet::apply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The transaction was already processed; nothing was reprocessed.
    AlreadyApplied,
    /// Nothing in the transaction belongs to the wallet.
    NotRelevant,
    Applied(TransactionResult),
}

impl ApplyOutcome {
    pub fn is_relevant(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }

    pub fn result(&self) -> Option<&TransactionResult> {
        match self {
            ApplyOutcome::Applied(result) => Some(result),
            _ => None,
        }
    }
}

/// Outcome of [`Wallet::unapply`](crate::Wallet::unapply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnapplyOutcome {
    /// The transaction was never applied (or already unapplied).
    NotApplied,
    Reverted(TransactionResult),
}

impl UnapplyOutcome {
    /// Whether reverting touched the ledger.
    pub fn is_relevant(&self) -> bool {
        matches!(self, UnapplyOutcome::Reverted(result) if result.is_relevant())
    }

    pub fn result(&self) -> Option<&TransactionResult> {
        match self {
            UnapplyOutcome::Reverted(result) => Some(result),
            UnapplyOutcome::NotApplied => None,
        }
    }
}

/// Mutable view over the components a transaction can touch.
pub(crate) struct LedgerContext<'a, K, H> {
    pub ledger: &'a mut Ledger,
    pub keys: &'a mut KeyFrontier<K>,
    pub index: &'a mut AddressIndex,
    pub hasher: &'a H,
}

/// Witness policy: a transaction carrying witness data only credits outputs
/// whose script is a witness program, whatever address form is tracked.
fn passes_witness_gate(tx_has_witness: bool, script: &Script) -> bool {
    !tx_has_witness || script.is_witness_program()
}

/// Processed-transaction set and relevant transaction counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionProcessor {
    /// Applied relevant transactions and the height they were applied at.
    processed: HashMap<Txid, Option<u32>>,
    tx_count: u64,
}

impl TransactionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of relevant transactions currently applied.
    pub fn transaction_count(&self) -> u64 {
        self.tx_count
    }

    pub fn is_processed(&self, txid: &Txid) -> bool {
        self.processed.contains_key(txid)
    }

    /// Height a processed transaction was applied at. `None` if unknown or
    /// applied unconfirmed.
    pub fn transaction_height(&self, txid: &Txid) -> Option<u32> {
        self.processed.get(txid).copied().flatten()
    }

    pub fn processed_txids(&self) -> impl Iterator<Item = &Txid> {
        self.processed.keys()
    }

    pub(crate) fn apply<K: KeyProvider, H: ScriptHasher>(
        &mut self,
        tx: &Transaction,
        height: Option<u32>,
        ctx: LedgerContext<'_, K, H>,
    ) -> ApplyOutcome {
        let txid = tx.compute_txid();
        if self.processed.contains_key(&txid) {
            tracing::trace!("Transaction {} already applied", txid);
            return ApplyOutcome::AlreadyApplied;
        }

        let LedgerContext {
            ledger,
            keys,
            index,
            hasher,
        } = ctx;
        let mut result = TransactionResult::new(txid);

        let kind = TxKind::of(tx);
        if kind == TxKind::Standard {
            for input in &tx.input {
                let output_ref = OutputRef::from(input.previous_output);
                let value = ledger.get(&output_ref).map_or(0, |coin| coin.value);
                if ledger.debit(&output_ref) {
                    tracing::debug!("💸 Output spent: {} (value: {})", output_ref, value);
                    result.debited.push(output_ref);
                    result.value_debited = result.value_debited.saturating_add(value);
                }
            }
        }

        let tx_has_witness = has_witness(tx);
        for (vout, output) in tx.output.iter().enumerate() {
            let Some(address_id) = hasher.address_id(&output.script_pubkey) else {
                continue;
            };
            let Some(coordinate) = index.lookup(&address_id) else {
                continue;
            };
            if !passes_witness_gate(tx_has_witness, &output.script_pubkey) {
                tracing::debug!(
                    "Skipping non-witness output {}:{} of witness transaction",
                    txid,
                    vout
                );
                continue;
            }

            let output_ref = OutputRef::new(txid, vout as u32);
            let value = output.value.to_sat();
            let credited = ledger.credit(Coin {
                output_ref,
                value,
                height,
                script_pubkey: output.script_pubkey.clone(),
                coordinate,
                is_coinbase: tx.is_coinbase(),
            });
            if !credited {
                continue;
            }
            index.watch_output(&output_ref);
            tracing::debug!("💰 New output: {} to {} (value: {})", output_ref, coordinate, value);

            result.credited.push(output_ref);
            result.value_credited = result.value_credited.saturating_add(value);

            if keys.is_edge(coordinate) {
                match keys.advance(coordinate.chain, index) {
                    Ok(key) => result.advanced.push(key.coordinate()),
                    // The edge stays in place; the next use retries.
                    Err(e) => tracing::error!("Failed to extend {} chain: {}", coordinate.chain, e),
                }
            }
        }

        if !result.is_relevant() {
            return ApplyOutcome::NotRelevant;
        }

        self.processed.insert(txid, height);
        self.tx_count += 1;
        tracing::debug!(
            "📝 Applied {} at {:?}: +{} outputs, -{} outputs",
            txid,
            height,
            result.credited.len(),
            result.debited.len()
        );
        ApplyOutcome::Applied(result)
    }

    pub(crate) fn unapply<K, H: ScriptHasher>(
        &mut self,
        tx: &Transaction,
        height: Option<u32>,
        ctx: LedgerContext<'_, K, H>,
    ) -> UnapplyOutcome {
        let txid = tx.compute_txid();
        if !self.processed.contains_key(&txid) {
            tracing::debug!("Transaction {} was never applied, nothing to unapply", txid);
            return UnapplyOutcome::NotApplied;
        }

        let LedgerContext { ledger, .. } = ctx;
        let mut result = TransactionResult::new(txid);

        let tx_has_witness = has_witness(tx);
        for (vout, output) in tx.output.iter().enumerate() {
            if !passes_witness_gate(tx_has_witness, &output.script_pubkey) {
                continue;
            }
            let output_ref = OutputRef::new(txid, vout as u32);
            let value = ledger.get(&output_ref).map_or(0, |coin| coin.value);
            if ledger.undo_credit(&output_ref) {
                result.credited.push(output_ref);
                result.value_credited = result.value_credited.saturating_add(value);
            }
        }

        for input in &tx.input {
            let output_ref = OutputRef::from(input.previous_output);
            if ledger.undo_debit(&output_ref) {
                let value = ledger.get(&output_ref).map_or(0, |coin| coin.value);
                result.debited.push(output_ref);
                result.value_debited = result.value_debited.saturating_add(value);
            }
        }

        if result.is_relevant() {
            self.tx_count = self.tx_count.saturating_sub(1);
        }
        self.processed.remove(&txid);

        tracing::debug!(
            "↩️ Unapplied {} at {:?}: -{} outputs, +{} restored",
            txid,
            height,
            result.credited.len(),
            result.debited.len()
        );
        UnapplyOutcome::Reverted(result)
    }
}
