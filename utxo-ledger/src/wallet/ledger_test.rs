//! Unit tests for the output ledger

#[cfg(test)]
mod tests {
    use crate::types::{Coordinate, OutputRef};
    use crate::wallet::ledger::{Balance, COINBASE_MATURITY, Coin, Ledger};
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, ScriptBuf, Txid, WPubkeyHash};

    fn output_ref(tx: u8, vout: u32) -> OutputRef {
        OutputRef::new(Txid::from_byte_array([tx; 32]), vout)
    }

    fn coin(tx: u8, vout: u32, value: u64, height: Option<u32>) -> Coin {
        Coin {
            output_ref: output_ref(tx, vout),
            value,
            height,
            script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([tx; 20])),
            coordinate: Coordinate::external(0),
            is_coinbase: false,
        }
    }

    #[test]
    fn test_credit_beyond_money_supply_is_refused() {
        let max = Amount::MAX_MONEY.to_sat();
        let mut ledger = Ledger::new();
        assert!(!ledger.credit(coin(1, 0, max + 1, None)));
        assert!(ledger.is_empty());

        assert!(ledger.credit(coin(1, 1, max - 10, None)));
        assert!(!ledger.credit(coin(1, 2, u64::MAX / 2 + 1, None)));
        assert!(!ledger.credit(coin(1, 3, 11, None)));
        assert!(ledger.credit(coin(1, 4, 10, None)));
        assert_eq!(ledger.balance(), max);
        assert_eq!(ledger.len(), 2);

        // Replacing an output only counts the difference.
        assert!(ledger.credit(coin(1, 4, 5, None)));
        assert_eq!(ledger.balance(), max - 5);
        ledger.check_invariants();
    }

    #[test]
    fn test_credit_and_debit() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 50_000, Some(10)));
        ledger.credit(coin(1, 1, 20_000, Some(10)));
        assert_eq!(ledger.balance(), 70_000);
        assert_eq!(ledger.len(), 2);

        assert!(ledger.debit(&output_ref(1, 0)));
        assert_eq!(ledger.balance(), 20_000);
        assert!(!ledger.is_active(&output_ref(1, 0)));
        assert!(ledger.is_pending_undo(&output_ref(1, 0)));
        ledger.check_invariants();
    }

    #[test]
    fn test_debit_unknown_is_noop() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 1_000, None));
        assert!(!ledger.debit(&output_ref(2, 0)));
        assert_eq!(ledger.balance(), 1_000);
        assert_eq!(ledger.undo_len(), 0);
    }

    #[test]
    fn test_double_debit_is_noop() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 1_000, None));
        assert!(ledger.debit(&output_ref(1, 0)));
        assert!(!ledger.debit(&output_ref(1, 0)));
        assert_eq!(ledger.balance(), 0);
        ledger.check_invariants();
    }

    #[test]
    fn test_undo_debit_restores() {
        let mut ledger = Ledger::new();
        let original = coin(1, 0, 7_500, Some(3));
        ledger.credit(original.clone());
        ledger.debit(&output_ref(1, 0));

        assert!(ledger.undo_debit(&output_ref(1, 0)));
        assert_eq!(ledger.balance(), 7_500);
        assert_eq!(ledger.get(&output_ref(1, 0)), Some(&original));
        assert_eq!(ledger.undo_len(), 0);

        // Nothing left to undo.
        assert!(!ledger.undo_debit(&output_ref(1, 0)));
        assert_eq!(ledger.balance(), 7_500);
        ledger.check_invariants();
    }

    #[test]
    fn test_undo_credit_keeps_no_record() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 4_000, Some(3)));

        assert!(ledger.undo_credit(&output_ref(1, 0)));
        assert_eq!(ledger.balance(), 0);
        assert!(ledger.is_empty());
        assert_eq!(ledger.undo_len(), 0);
        assert!(!ledger.undo_credit(&output_ref(1, 0)));
    }

    #[test]
    fn test_undo_credit_ignores_consumed_output() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 4_000, Some(3)));
        ledger.debit(&output_ref(1, 0));

        assert!(!ledger.undo_credit(&output_ref(1, 0)));
        assert!(ledger.is_pending_undo(&output_ref(1, 0)));
        ledger.check_invariants();
    }

    #[test]
    fn test_credit_supersedes_undo_record() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 4_000, None));
        ledger.debit(&output_ref(1, 0));
        assert!(ledger.is_pending_undo(&output_ref(1, 0)));

        ledger.credit(coin(1, 0, 4_000, Some(9)));
        assert!(!ledger.is_pending_undo(&output_ref(1, 0)));
        assert_eq!(ledger.get(&output_ref(1, 0)).and_then(|c| c.height), Some(9));
        assert_eq!(ledger.balance(), 4_000);
        ledger.check_invariants();
    }

    #[test]
    fn test_recredit_does_not_double_count() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 4_000, None));
        ledger.credit(coin(1, 0, 4_000, Some(2)));
        assert_eq!(ledger.balance(), 4_000);
        ledger.check_invariants();
    }

    #[test]
    fn test_balance_breakdown() {
        let mut ledger = Ledger::new();
        ledger.credit(coin(1, 0, 1_000, Some(10)));
        ledger.credit(coin(2, 0, 300, None));

        let mut reward = coin(3, 0, 5_000, Some(100));
        reward.is_coinbase = true;
        ledger.credit(reward);

        let breakdown = ledger.balance_breakdown(150);
        assert_eq!(
            breakdown,
            Balance {
                confirmed: 1_000,
                unconfirmed: 300,
                immature: 5_000,
            }
        );
        assert_eq!(breakdown.total(), ledger.balance());

        let later = ledger.balance_breakdown(100 + COINBASE_MATURITY - 1);
        assert_eq!(later.immature, 0);
        assert_eq!(later.confirmed, 6_000);
    }

    #[test]
    fn test_coin_confirmations() {
        let c = coin(1, 0, 1, Some(10));
        assert_eq!(c.confirmations(10), 1);
        assert_eq!(c.confirmations(15), 6);
        assert_eq!(c.confirmations(5), 0);
        assert_eq!(coin(1, 0, 1, None).confirmations(100), 0);
        assert!(c.is_witness());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_coin_serde() {
        let original = coin(4, 2, 12_345, Some(77));
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Coin = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }
}
