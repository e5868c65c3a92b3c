//! Block connect/disconnect ordering.
//!
//! Connecting applies the block's transactions in block order, then the
//! external set. Disconnecting walks the same two lists backwards so every
//! spend is reverted before the credit it consumed.

use bitcoin::Transaction;

use super::address_index::ScriptHasher;
use super::keys::KeyProvider;
use super::transaction_processor::{ApplyOutcome, TransactionResult, UnapplyOutcome};
use super::Wallet;

/// Summary of one connect or disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResult {
    pub height: u32,
    /// Results of the transactions that touched the ledger, in processing order.
    pub transactions: Vec<TransactionResult>,
    pub relevant_transaction_count: usize,
    pub total_outputs_credited: usize,
    pub total_outputs_debited: usize,
}

impl BlockResult {
    fn new(height: u32) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    fn record(&mut self, result: TransactionResult) {
        if !result.is_relevant() {
            return;
        }
        self.relevant_transaction_count += 1;
        self.total_outputs_credited += result.credited.len();
        self.total_outputs_debited += result.debited.len();
        self.transactions.push(result);
    }

    pub fn is_relevant(&self) -> bool {
        self.relevant_transaction_count > 0
    }

    /// Sum of the recorded [`TransactionResult::net_amount`]s. For a
    /// disconnect this is the amount taken back out of the balance.
    pub fn net_amount(&self) -> i64 {
        self.transactions
            .iter()
            .map(TransactionResult::net_amount)
            .fold(0i64, i64::saturating_add)
    }
}

impl<K: KeyProvider, H: ScriptHasher> Wallet<K, H> {
    /// Apply a newly connected block at `height`.
    ///
    /// `block_txs` are processed in block order, followed by `external_txs`.
    pub fn connect(
        &mut self,
        height: u32,
        block_txs: &[Transaction],
        external_txs: &[Transaction],
    ) -> BlockResult {
        let mut block_result = BlockResult::new(height);

        for tx in block_txs.iter().chain(external_txs) {
            if let ApplyOutcome::Applied(result) = self.apply(tx, Some(height)) {
                block_result.record(result);
            }
        }

        if block_result.is_relevant() {
            tracing::info!(
                "📦 Connected block {}: {} relevant transactions, +{} outputs, -{} outputs, balance {}",
                height,
                block_result.relevant_transaction_count,
                block_result.total_outputs_credited,
                block_result.total_outputs_debited,
                self.balance()
            );
        } else {
            tracing::debug!(
                "Connected block {} ({} transactions, none relevant)",
                height,
                block_txs.len() + external_txs.len()
            );
        }

        block_result
    }

    /// Revert a block previously passed to [`Wallet::connect`] with the same
    /// transaction lists.
    pub fn disconnect(
        &mut self,
        height: u32,
        block_txs: &[Transaction],
        external_txs: &[Transaction],
    ) -> BlockResult {
        let mut block_result = BlockResult::new(height);

        for tx in external_txs.iter().rev().chain(block_txs.iter().rev()) {
            if let UnapplyOutcome::Reverted(result) = self.unapply(tx, Some(height)) {
                block_result.record(result);
            }
        }

        if block_result.is_relevant() {
            tracing::info!(
                "⏪ Disconnected block {}: {} relevant transactions reverted, balance {}",
                height,
                block_result.relevant_transaction_count,
                self.balance()
            );
        } else {
            tracing::debug!("Disconnected block {} (nothing to revert)", height);
        }

        block_result
    }
}
