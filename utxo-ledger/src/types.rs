//! Common identifiers shared by the wallet components.

use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, PubkeyHash, ScriptHash, Transaction, Txid, WPubkeyHash};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the two deterministic address sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Chain {
    /// Receive addresses handed out to payers.
    External,
    /// Change addresses used by the wallet's own spends.
    Internal,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::External, Chain::Internal];

    /// BIP44 change level child number for this chain.
    pub fn child_number(self) -> u32 {
        match self {
            Chain::External => 0,
            Chain::Internal => 1,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self.child_number() as usize
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::External => f.write_str("external"),
            Chain::Internal => f.write_str("internal"),
        }
    }
}

/// A position in the deterministic key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub chain: Chain,
    pub index: u32,
}

impl Coordinate {
    pub fn new(chain: Chain, index: u32) -> Self {
        Self {
            chain,
            index,
        }
    }

    pub fn external(index: u32) -> Self {
        Self::new(Chain::External, index)
    }

    pub fn internal(index: u32) -> Self {
        Self::new(Chain::Internal, index)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain, self.index)
    }
}

/// Opaque 20-byte address identity: the hash committed to by a locking script.
///
/// A P2PKH and a P2WPKH script for the same key share an identity, so the
/// script form has to be checked separately where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AddressId([u8; 20]);

impl AddressId {
    pub const LEN: usize = 20;

    pub const fn from_byte_array(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    pub fn to_byte_array(self) -> [u8; 20] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<PubkeyHash> for AddressId {
    fn from(hash: PubkeyHash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl From<WPubkeyHash> for AddressId {
    fn from(hash: WPubkeyHash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl From<ScriptHash> for AddressId {
    fn from(hash: ScriptHash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Canonical reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutputRef(OutPoint);

impl OutputRef {
    /// Length of [`OutputRef::encode`].
    pub const ENCODED_LEN: usize = 36;

    pub fn new(txid: Txid, vout: u32) -> Self {
        Self(OutPoint {
            txid,
            vout,
        })
    }

    pub fn txid(&self) -> Txid {
        self.0.txid
    }

    pub fn vout(&self) -> u32 {
        self.0.vout
    }

    pub fn outpoint(&self) -> OutPoint {
        self.0
    }

    /// Stable 36-byte encoding: txid bytes followed by the little-endian vout,
    /// identical to the consensus serialization of an outpoint.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..32].copy_from_slice(self.0.txid.as_byte_array());
        buf[32..].copy_from_slice(&self.0.vout.to_le_bytes());
        buf
    }
}

impl From<OutPoint> for OutputRef {
    fn from(outpoint: OutPoint) -> Self {
        Self(outpoint)
    }
}

impl From<OutputRef> for OutPoint {
    fn from(output_ref: OutputRef) -> Self {
        output_ref.0
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How a transaction's inputs are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Coinbase or zero-input transaction: inputs reference nothing spendable.
    Coinbase,
    /// Ordinary transaction whose inputs consume earlier outputs.
    Standard,
}

impl TxKind {
    pub fn of(tx: &Transaction) -> Self {
        if tx.input.is_empty() || tx.is_coinbase() {
            TxKind::Coinbase
        } else {
            TxKind::Standard
        }
    }
}

/// Whether any input of `tx` carries witness data.
pub fn has_witness(tx: &Transaction) -> bool {
    tx.input.iter().any(|input| !input.witness.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::serialize;

    #[test]
    fn test_output_ref_encoding_matches_consensus() {
        let txid = Txid::from_byte_array([0xab; 32]);
        let output_ref = OutputRef::new(txid, 7);
        assert_eq!(output_ref.encode().to_vec(), serialize(&output_ref.outpoint()));
        assert_eq!(output_ref.encode(), OutputRef::new(txid, 7).encode());
        assert_ne!(output_ref.encode(), OutputRef::new(txid, 8).encode());
    }

    #[test]
    fn test_address_id_from_slice() {
        assert!(AddressId::from_slice(&[1u8; 19]).is_none());
        let id = AddressId::from_slice(&[1u8; 20]).unwrap();
        assert_eq!(id.to_string(), "01".repeat(20));
    }

    #[test]
    fn test_coordinate_display() {
        assert_eq!(Coordinate::external(3).to_string(), "external/3");
        assert_eq!(Coordinate::internal(0).to_string(), "internal/0");
    }
}
