//! Outgoing transaction construction: funding, signing and submission.
//!
//! Funding is the only asynchronous step and runs against an immutable
//! borrow of the wallet. The finished transaction enters the ledger through
//! [`Wallet::apply`] like any other observed transaction.

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness, absolute, ecdsa,
};
use tokio_util::sync::CancellationToken;

use super::Wallet;
use super::address_index::ScriptHasher;
use super::keys::{KeyMaterial, KeyProvider};
use super::ledger::Coin;
use super::transaction_processor::ApplyOutcome;
use crate::config::DEFAULT_FEE_RATE;
use crate::error::{FundingError, LedgerError, Result};
use crate::types::{Chain, OutputRef};

/// Outputs below this value are not worth creating.
pub const DUST_THRESHOLD: u64 = 546;

// Virtual sizes used for fee estimation.
const TX_OVERHEAD_VBYTES: u64 = 11;
const P2WPKH_INPUT_VBYTES: u64 = 68;
const P2PKH_INPUT_VBYTES: u64 = 148;

/// Payment to be funded from the wallet's active outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendRequest {
    pub outputs: Vec<TxOut>,
    /// Fee rate in sat/vB. Falls back to the wallet configuration.
    pub fee_rate: Option<u64>,
}

impl SpendRequest {
    pub fn new(outputs: Vec<TxOut>) -> Self {
        Self {
            outputs,
            fee_rate: None,
        }
    }

    /// Single payment of `amount` satoshis to `script_pubkey`.
    pub fn pay_to(script_pubkey: ScriptBuf, amount: u64) -> Self {
        Self::new(vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey,
        }])
    }

    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = Some(fee_rate);
        self
    }

    /// Total value of the requested outputs, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.outputs
            .iter()
            .map(|output| output.value.to_sat())
            .fold(0u64, u64::saturating_add)
    }
}

/// Fills a spend request into an unsigned transaction.
#[async_trait]
pub trait Funder: Send + Sync {
    /// Select from `coins` to pay `request`, sending any change to
    /// `change_script`.
    async fn fund(
        &self,
        coins: &[Coin],
        request: &SpendRequest,
        change_script: ScriptBuf,
    ) -> std::result::Result<Transaction, FundingError>;
}

/// An input the wallet can sign, with the key that controls it.
#[derive(Debug, Clone)]
pub struct SigningInput {
    pub input_index: usize,
    pub coin: Coin,
    pub key: KeyMaterial,
}

/// Produces spending proofs for a funded transaction.
pub trait Signer {
    fn sign(&self, tx: &mut Transaction, inputs: &[SigningInput]) -> Result<()>;

    fn is_fully_signed(&self, tx: &Transaction) -> bool {
        unsigned_inputs(tx) == 0
    }
}

/// Number of inputs carrying neither a script signature nor a witness.
pub fn unsigned_inputs(tx: &Transaction) -> usize {
    tx.input
        .iter()
        .filter(|input| input.script_sig.is_empty() && input.witness.is_empty())
        .count()
}

fn output_vbytes(output: &TxOut) -> u64 {
    // value + compact size length + script
    9 + output.script_pubkey.len() as u64
}

fn input_vbytes(coin: &Coin) -> u64 {
    if coin.is_witness() {
        P2WPKH_INPUT_VBYTES
    } else {
        P2PKH_INPUT_VBYTES
    }
}

/// Spends the largest outputs first until the payment and fee are covered.
#[derive(Debug, Clone)]
pub struct LargestFirstFunder {
    fee_rate: u64,
    dust_threshold: u64,
}

impl Default for LargestFirstFunder {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            dust_threshold: DUST_THRESHOLD,
        }
    }
}

impl LargestFirstFunder {
    pub fn new(fee_rate: u64) -> Self {
        Self {
            fee_rate,
            ..Self::default()
        }
    }

    pub fn with_dust_threshold(mut self, threshold: u64) -> Self {
        self.dust_threshold = threshold;
        self
    }

    fn select(
        &self,
        coins: &[Coin],
        request: &SpendRequest,
        change_script: ScriptBuf,
    ) -> std::result::Result<Transaction, FundingError> {
        if request.outputs.is_empty() {
            return Err(FundingError::NoOutputs);
        }
        if let Some(output) = request.outputs.iter().find(|o| o.value.to_sat() < self.dust_threshold)
        {
            return Err(FundingError::Invalid(format!(
                "output of {} sat is below the dust threshold",
                output.value.to_sat()
            )));
        }

        let fee_rate = request.fee_rate.unwrap_or(self.fee_rate);
        let target = request.total();
        if target > Amount::MAX_MONEY.to_sat() {
            return Err(FundingError::Invalid(format!(
                "requested {} sat exceeds the money supply",
                target
            )));
        }
        let base_vbytes =
            TX_OVERHEAD_VBYTES + request.outputs.iter().map(output_vbytes).sum::<u64>();

        let mut candidates: Vec<&Coin> = coins.iter().collect();
        candidates.sort_by(|a, b| b.value.cmp(&a.value).then(a.output_ref.cmp(&b.output_ref)));

        let mut selected = Vec::new();
        let mut total = 0u64;
        let mut vbytes = base_vbytes;
        for coin in candidates {
            if total >= target.saturating_add(vbytes.saturating_mul(fee_rate)) {
                break;
            }
            selected.push(coin);
            total = total.saturating_add(coin.value);
            vbytes += input_vbytes(coin);
        }

        let fee = vbytes.saturating_mul(fee_rate);
        let needed = target.saturating_add(fee);
        if selected.is_empty() || total < needed {
            return Err(FundingError::InsufficientFunds {
                needed,
                available: total,
            });
        }

        let mut outputs = request.outputs.clone();
        let mut change = TxOut {
            value: Amount::ZERO,
            script_pubkey: change_script,
        };
        let fee_with_change = (vbytes + output_vbytes(&change)).saturating_mul(fee_rate);
        let change_value = total.saturating_sub(target.saturating_add(fee_with_change));
        if change_value >= self.dust_threshold {
            change.value = Amount::from_sat(change_value);
            outputs.push(change);
        }

        tracing::debug!(
            "Funded {} sat with {} inputs ({} sat available, {} outputs)",
            target,
            selected.len(),
            total,
            outputs.len()
        );

        Ok(Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: selected
                .iter()
                .map(|coin| TxIn {
                    previous_output: coin.output_ref.outpoint(),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs,
        })
    }
}

#[async_trait]
impl Funder for LargestFirstFunder {
    async fn fund(
        &self,
        coins: &[Coin],
        request: &SpendRequest,
        change_script: ScriptBuf,
    ) -> std::result::Result<Transaction, FundingError> {
        self.select(coins, request, change_script)
    }
}

/// Signs P2WPKH inputs with a witness and P2PKH inputs with a script signature.
#[derive(Debug, Clone)]
pub struct EcdsaSigner {
    secp: Secp256k1<All>,
}

impl Default for EcdsaSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl EcdsaSigner {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }
}

enum Proof {
    Witness(Witness),
    ScriptSig(ScriptBuf),
}

impl Signer for EcdsaSigner {
    fn sign(&self, tx: &mut Transaction, inputs: &[SigningInput]) -> Result<()> {
        let mut proofs = Vec::with_capacity(inputs.len());
        {
            let mut cache = SighashCache::new(&*tx);

            for input in inputs {
                let private_key = input.key.private_key().ok_or_else(|| {
                    LedgerError::Signing(format!("no private key for {}", input.key.coordinate()))
                })?;
                let public_key = input.key.public_key();
                let script_pubkey = &input.coin.script_pubkey;

                let digest = if input.coin.is_witness() {
                    cache
                        .p2wpkh_signature_hash(
                            input.input_index,
                            script_pubkey,
                            Amount::from_sat(input.coin.value),
                            EcdsaSighashType::All,
                        )
                        .map_err(|e| LedgerError::Signing(e.to_string()))?
                        .to_byte_array()
                } else {
                    cache
                        .legacy_signature_hash(
                            input.input_index,
                            script_pubkey,
                            EcdsaSighashType::All.to_u32(),
                        )
                        .map_err(|e| LedgerError::Signing(e.to_string()))?
                        .to_byte_array()
                };

                let message = Message::from_digest(digest);
                let signature =
                    ecdsa::Signature::sighash_all(self.secp.sign_ecdsa(&message, &private_key.inner));

                let proof = if input.coin.is_witness() {
                    let mut witness = Witness::new();
                    witness.push(signature.to_vec());
                    witness.push(public_key.to_bytes());
                    Proof::Witness(witness)
                } else {
                    let sig_push = PushBytesBuf::try_from(signature.to_vec())
                        .map_err(|_| LedgerError::Signing("invalid signature length".into()))?;
                    Proof::ScriptSig(
                        ScriptBuf::builder()
                            .push_slice(sig_push)
                            .push_slice(public_key.to_bytes())
                            .into_script(),
                    )
                };
                proofs.push((input.input_index, proof));
            }
        }

        for (index, proof) in proofs {
            match proof {
                Proof::Witness(witness) => tx.input[index].witness = witness,
                Proof::ScriptSig(script_sig) => tx.input[index].script_sig = script_sig,
            }
        }
        Ok(())
    }
}

impl<K: KeyProvider, H: ScriptHasher> Wallet<K, H> {
    /// Fund `request` from the active outputs.
    ///
    /// The funding future is raced against `cancel`; a cancelled or failed
    /// funding attempt leaves the wallet untouched.
    pub async fn create_transaction<F>(
        &self,
        request: &SpendRequest,
        funder: &F,
        cancel: &CancellationToken,
    ) -> Result<Transaction>
    where
        F: Funder + ?Sized,
    {
        let request = SpendRequest {
            fee_rate: Some(request.fee_rate.unwrap_or(self.config().fee_rate)),
            ..request.clone()
        };
        let coins: Vec<Coin> = self.active_outputs().cloned().collect();
        let change_script = self.current_key(Chain::Internal)?.script_pubkey(self.config().witness);

        let tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Transaction funding cancelled");
                return Err(LedgerError::Cancelled);
            }
            funded = funder.fund(&coins, &request, change_script) => funded?,
        };

        if let Some(foreign) = tx
            .input
            .iter()
            .map(|input| input.previous_output)
            .find(|outpoint| !self.ledger().is_active(&OutputRef::from(*outpoint)))
        {
            return Err(FundingError::Invalid(format!(
                "funder spent {foreign}, which is not an active wallet output"
            ))
            .into());
        }

        Ok(tx)
    }

    /// Sign every input of `tx` that spends an active wallet output.
    pub fn sign_transaction<S>(&self, mut tx: Transaction, signer: &S) -> Result<Transaction>
    where
        S: Signer + ?Sized,
    {
        let mut inputs = Vec::new();
        for (input_index, input) in tx.input.iter().enumerate() {
            let Some(coin) = self.ledger().get(&OutputRef::from(input.previous_output)) else {
                continue;
            };
            let key = self.key_frontier().derive(coin.coordinate)?;
            inputs.push(SigningInput {
                input_index,
                coin: coin.clone(),
                key,
            });
        }

        signer.sign(&mut tx, &inputs)?;

        if !signer.is_fully_signed(&tx) {
            return Err(LedgerError::IncompleteSignature {
                txid: tx.compute_txid(),
                unsigned: unsigned_inputs(&tx),
            });
        }
        Ok(tx)
    }

    /// Fund, sign and apply a payment as unconfirmed.
    pub async fn send<F, S>(
        &mut self,
        request: &SpendRequest,
        funder: &F,
        signer: &S,
        cancel: &CancellationToken,
    ) -> Result<(Transaction, ApplyOutcome)>
    where
        F: Funder + ?Sized,
        S: Signer + ?Sized,
    {
        let tx = self.create_transaction(request, funder, cancel).await?;
        let tx = self.sign_transaction(tx, signer)?;
        let outcome = self.apply(&tx, None);

        tracing::info!(
            "📤 Sent {} ({} sat to {} outputs)",
            tx.compute_txid(),
            request.total(),
            request.outputs.len()
        );
        Ok((tx, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;
    use bitcoin::{Txid, WPubkeyHash};

    fn coin(seed: u8, value: u64) -> Coin {
        Coin {
            output_ref: OutputRef::new(Txid::from_byte_array([seed; 32]), 0),
            value,
            height: Some(1),
            script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([seed; 20])),
            coordinate: Coordinate::external(0),
            is_coinbase: false,
        }
    }

    fn destination() -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0xee; 20]))
    }

    fn change() -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0xcc; 20]))
    }

    #[test]
    fn test_largest_first_uses_fewest_inputs() {
        let coins = vec![coin(1, 5_000), coin(2, 80_000), coin(3, 20_000)];
        let request = SpendRequest::pay_to(destination(), 50_000);

        let tx = LargestFirstFunder::new(1).select(&coins, &request, change()).unwrap();
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].previous_output, coins[1].output_ref.outpoint());
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].script_pubkey, change());

        let out_total: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        assert!(out_total < 80_000);
    }

    #[test]
    fn test_dust_change_goes_to_fee() {
        let coins = vec![coin(1, 10_300)];
        let request = SpendRequest::pay_to(destination(), 10_000);
        let tx = LargestFirstFunder::new(1).select(&coins, &request, change()).unwrap();
        assert_eq!(tx.output.len(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let coins = vec![coin(1, 1_000), coin(2, 2_000)];
        let request = SpendRequest::pay_to(destination(), 10_000);
        let err = LargestFirstFunder::new(1).select(&coins, &request, change()).unwrap_err();
        assert!(matches!(
            err,
            FundingError::InsufficientFunds { available: 3_000, needed } if needed > 10_000
        ));
    }

    #[test]
    fn test_request_beyond_money_supply_is_rejected() {
        let half = TxOut {
            value: Amount::from_sat(u64::MAX / 2 + 1),
            script_pubkey: destination(),
        };
        let request = SpendRequest::new(vec![half.clone(), half]);
        assert_eq!(request.total(), u64::MAX);

        let err = LargestFirstFunder::default()
            .select(&[coin(1, 1_000)], &request, change())
            .unwrap_err();
        assert!(matches!(err, FundingError::Invalid(_)));
    }

    #[test]
    fn test_extreme_fee_rate_is_insufficient_funds() {
        let coins = vec![coin(1, 50_000)];
        let request = SpendRequest::pay_to(destination(), 10_000).with_fee_rate(u64::MAX);
        let err = LargestFirstFunder::default().select(&coins, &request, change()).unwrap_err();
        assert!(matches!(
            err,
            FundingError::InsufficientFunds { available: 50_000, needed: u64::MAX }
        ));
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let err = LargestFirstFunder::default()
            .select(&[coin(1, 1_000)], &SpendRequest::default(), change())
            .unwrap_err();
        assert_eq!(err, FundingError::NoOutputs);
    }

    #[test]
    fn test_unsigned_inputs_counts_empty_proofs() {
        let coins = vec![coin(1, 40_000), coin(2, 40_000)];
        let request = SpendRequest::pay_to(destination(), 60_000);
        let mut tx = LargestFirstFunder::new(1).select(&coins, &request, change()).unwrap();
        assert_eq!(unsigned_inputs(&tx), 2);

        tx.input[0].witness.push([1u8; 8]);
        assert_eq!(unsigned_inputs(&tx), 1);
        assert!(!EcdsaSigner::new().is_fully_signed(&tx));
    }
}
