//! Fixtures shared by unit and integration tests.

use std::str::FromStr;

use bitcoin::bip32::DerivationPath;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    WPubkeyHash, absolute,
};

use crate::config::LedgerConfig;
use crate::types::Chain;
use crate::wallet::{Bip32KeyProvider, KeyMaterial, KeyProvider, Wallet};

/// Seed behind every fixture wallet.
pub const TEST_SEED: [u8; 32] = [7u8; 32];

/// Account path behind every fixture wallet.
pub const TEST_ACCOUNT_PATH: &str = "m/84'/1'/0'";

pub fn test_provider() -> Bip32KeyProvider {
    let path = DerivationPath::from_str(TEST_ACCOUNT_PATH).expect("valid path");
    Bip32KeyProvider::from_seed(LedgerConfig::regtest().network, &TEST_SEED, &path)
        .expect("valid seed")
}

/// Regtest wallet with a lookahead of one per chain.
pub fn test_wallet() -> Wallet {
    test_wallet_with(LedgerConfig::regtest())
}

pub fn test_wallet_with(config: LedgerConfig) -> Wallet {
    Wallet::new(config, test_provider()).expect("valid test config")
}

/// Key material of the fixture provider at `chain/index`, allocated or not.
pub fn test_key(chain: Chain, index: u32) -> KeyMaterial {
    test_provider()
        .derive(crate::types::Coordinate::new(chain, index))
        .expect("derivable coordinate")
}

/// An outpoint no wallet ever created.
pub fn foreign_outpoint(seed: u8) -> OutPoint {
    OutPoint {
        txid: Txid::from_byte_array([seed; 32]),
        vout: seed as u32,
    }
}

/// A P2WPKH script for a key the wallet does not own.
pub fn foreign_script(seed: u8) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([seed; 20]))
}

/// A P2PKH script for a key the wallet does not own.
pub fn foreign_legacy_script(seed: u8) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([seed; 20]))
}

pub fn txout(script_pubkey: ScriptBuf, value: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey,
    }
}

/// Transaction spending `inputs` without witness data.
pub fn transaction(inputs: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: inputs
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    }
}

/// Like [`transaction`] but every input carries a dummy witness.
pub fn witness_transaction(inputs: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    let mut tx = transaction(inputs, outputs);
    for input in &mut tx.input {
        input.witness.push([0x30u8; 72]);
        input.witness.push([0x02u8; 33]);
    }
    tx
}

/// Coinbase transaction for block `height` paying `outputs`.
pub fn coinbase(height: u32, outputs: Vec<TxOut>) -> Transaction {
    let script_sig = ScriptBuf::builder().push_int(height as i64).into_script();
    Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs,
    }
}
