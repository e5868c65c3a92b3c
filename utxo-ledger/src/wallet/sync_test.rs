//! Unit tests for block connect/disconnect

#[cfg(test)]
mod tests {
    use bitcoin::Transaction;

    use crate::test_utils::{
        foreign_outpoint, foreign_script, test_key, test_wallet, transaction, txout,
    };
    use crate::types::{Chain, OutputRef};
    use crate::wallet::Wallet;

    fn pay_receive(seed: u8, index: u32, value: u64) -> Transaction {
        let script = test_key(Chain::External, index).script_pubkey(true);
        transaction(&[foreign_outpoint(seed)], vec![txout(script, value)])
    }

    /// Funding tx followed by a spend of its output inside the same block.
    fn chained_block(wallet: &Wallet) -> Vec<Transaction> {
        let funding = pay_receive(1, 0, 40_000);
        let change = wallet.current_key(Chain::Internal).unwrap().script_pubkey(true);
        let spend = transaction(
            &[OutputRef::new(funding.compute_txid(), 0).outpoint()],
            vec![txout(foreign_script(8), 15_000), txout(change, 24_000)],
        );
        vec![funding, spend]
    }

    #[test]
    fn test_connect_chained_block() {
        let mut wallet = test_wallet();
        let block = chained_block(&wallet);

        let result = wallet.connect(100, &block, &[]);
        assert_eq!(result.height, 100);
        assert_eq!(result.relevant_transaction_count, 2);
        assert_eq!(result.total_outputs_credited, 2);
        assert_eq!(result.total_outputs_debited, 1);
        assert_eq!(result.net_amount(), 24_000);

        assert_eq!(wallet.balance(), 24_000);
        assert_eq!(wallet.ledger().len(), 1);
        assert_eq!(wallet.ledger().undo_len(), 1);
        assert_eq!(wallet.transaction_count(), 2);
    }

    #[test]
    fn test_disconnect_chained_block_restores_state() {
        let mut wallet = test_wallet();
        let block = chained_block(&wallet);

        wallet.connect(100, &block, &[]);
        let result = wallet.disconnect(100, &block, &[]);
        assert_eq!(result.relevant_transaction_count, 2);

        assert_eq!(wallet.balance(), 0);
        assert!(wallet.ledger().is_empty());
        assert_eq!(wallet.ledger().undo_len(), 0);
        assert_eq!(wallet.transaction_count(), 0);
        assert_eq!(wallet.processor().processed_txids().count(), 0);
        wallet.ledger().check_invariants();
    }

    #[test]
    fn test_round_trip_over_several_blocks() {
        let mut wallet = test_wallet();
        let before_ledger = wallet.ledger().clone();
        let before_processor = wallet.processor().clone();

        let first = chained_block(&wallet);
        let external = vec![pay_receive(2, 0, 3_000)];
        wallet.connect(100, &first, &external);

        let second = vec![pay_receive(3, 1, 7_000), pay_receive(4, 0, 500)];
        wallet.connect(101, &second, &[]);
        assert_eq!(wallet.balance(), 24_000 + 3_000 + 7_000 + 500);
        let frontier = wallet.key_frontier().next_index(Chain::External);

        wallet.disconnect(101, &second, &[]);
        wallet.disconnect(100, &first, &external);

        assert_eq!(wallet.ledger(), &before_ledger);
        assert_eq!(wallet.processor(), &before_processor);
        // Allocated coordinates survive the reorg.
        assert_eq!(wallet.key_frontier().next_index(Chain::External), frontier);
    }

    #[test]
    fn test_external_transactions_after_block() {
        let mut wallet = test_wallet();
        let funding = pay_receive(1, 0, 10_000);
        let spend = transaction(
            &[OutputRef::new(funding.compute_txid(), 0).outpoint()],
            vec![txout(foreign_script(5), 9_000)],
        );

        // The spend only finds its input because block txs go first.
        let result = wallet.connect(7, std::slice::from_ref(&funding), std::slice::from_ref(&spend));
        assert_eq!(result.relevant_transaction_count, 2);
        assert_eq!(wallet.balance(), 0);

        // Externals are reverted first.
        wallet.disconnect(7, std::slice::from_ref(&funding), std::slice::from_ref(&spend));
        assert_eq!(wallet.balance(), 0);
        assert_eq!(wallet.ledger().undo_len(), 0);
        assert_eq!(wallet.transaction_count(), 0);
    }

    #[test]
    fn test_out_of_order_disconnect_leaves_undo_record() {
        let mut wallet = test_wallet();
        let funding = pay_receive(1, 0, 10_000);
        let funded = OutputRef::new(funding.compute_txid(), 0);
        let spend = transaction(&[funded.outpoint()], vec![txout(foreign_script(5), 9_000)]);

        wallet.connect(1, std::slice::from_ref(&funding), &[]);
        wallet.connect(2, std::slice::from_ref(&spend), &[]);

        // Reverting the credit first cannot touch the consumed output.
        let result = wallet.disconnect(1, std::slice::from_ref(&funding), &[]);
        assert!(!result.is_relevant());
        assert!(wallet.ledger().is_pending_undo(&funded));
        assert!(!wallet.processor().is_processed(&funding.compute_txid()));
        assert_eq!(wallet.transaction_count(), 2);

        // Reverting the spend afterwards resurrects it.
        wallet.disconnect(2, std::slice::from_ref(&spend), &[]);
        assert!(wallet.ledger().is_active(&funded));
        assert_eq!(wallet.balance(), 10_000);
        assert_eq!(wallet.transaction_count(), 1);
        wallet.ledger().check_invariants();
    }

    #[test]
    fn test_irrelevant_block() {
        let mut wallet = test_wallet();
        let block = vec![transaction(&[foreign_outpoint(1)], vec![txout(foreign_script(2), 1)])];

        let result = wallet.connect(5, &block, &[]);
        assert!(!result.is_relevant());
        assert!(result.transactions.is_empty());
        assert!(!wallet.disconnect(5, &block, &[]).is_relevant());
    }
}
