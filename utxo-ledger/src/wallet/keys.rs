//! Deterministic key frontier for the receive and change chains.
//!
//! Keys are never cached: any allocated coordinate is re-derived from the
//! root key on demand. The frontier only remembers how far each chain has
//! been allocated.

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, CompressedPublicKey, Network, PrivateKey, ScriptBuf};

use super::address_index::AddressIndex;
use crate::error::{ConfigError, LedgerError, Result};
use crate::types::{AddressId, Chain, Coordinate};

/// Key material for a single coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    coordinate: Coordinate,
    public_key: CompressedPublicKey,
    private_key: Option<PrivateKey>,
}

impl KeyMaterial {
    pub fn new(
        coordinate: Coordinate,
        public_key: CompressedPublicKey,
        private_key: Option<PrivateKey>,
    ) -> Self {
        Self {
            coordinate,
            public_key,
            private_key,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// Private key, if the provider holds private material.
    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// Identity shared by the P2PKH and P2WPKH forms of this key.
    pub fn address_id(&self) -> AddressId {
        self.public_key.pubkey_hash().into()
    }

    pub fn script_pubkey(&self, witness: bool) -> ScriptBuf {
        if witness {
            ScriptBuf::new_p2wpkh(&self.public_key.wpubkey_hash())
        } else {
            ScriptBuf::new_p2pkh(&self.public_key.pubkey_hash())
        }
    }

    pub fn address(&self, network: Network, witness: bool) -> Address {
        if witness {
            Address::p2wpkh(&self.public_key, network)
        } else {
            Address::p2pkh(self.public_key.pubkey_hash(), network)
        }
    }
}

/// Produces key material for any coordinate. Must be deterministic and
/// free of side effects.
pub trait KeyProvider {
    fn derive(&self, coordinate: Coordinate) -> Result<KeyMaterial>;
}

/// BIP32 provider deriving `account / chain / index` with normal
/// (non-hardened) steps below an account-level extended private key.
#[derive(Debug, Clone)]
pub struct Bip32KeyProvider {
    account: Xpriv,
    secp: Secp256k1<All>,
}

impl Bip32KeyProvider {
    pub fn new(account: Xpriv) -> Self {
        Self {
            account,
            secp: Secp256k1::new(),
        }
    }

    /// Build a provider from a BIP32 seed and an account path such as
    /// `m/84'/0'/0'`.
    pub fn from_seed(network: Network, seed: &[u8], account_path: &DerivationPath) -> Result<Self> {
        if !(16..=64).contains(&seed.len()) {
            return Err(ConfigError::InvalidRootKey(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            ))
            .into());
        }

        let secp = Secp256k1::new();
        let master = Xpriv::new_master(network, seed)
            .map_err(|e| ConfigError::InvalidRootKey(e.to_string()))?;
        let account = master
            .derive_priv(&secp, account_path)
            .map_err(|e| ConfigError::InvalidRootKey(e.to_string()))?;

        Ok(Self {
            account,
            secp,
        })
    }

    pub fn account_xpub(&self) -> Xpub {
        Xpub::from_priv(&self.secp, &self.account)
    }
}

impl KeyProvider for Bip32KeyProvider {
    fn derive(&self, coordinate: Coordinate) -> Result<KeyMaterial> {
        let path = [
            ChildNumber::from_normal_idx(coordinate.chain.child_number())?,
            ChildNumber::from_normal_idx(coordinate.index)?,
        ];
        let child = self.account.derive_priv(&self.secp, &path)?;
        let private_key = child.to_priv();
        let public_key = CompressedPublicKey(private_key.inner.public_key(&self.secp));

        Ok(KeyMaterial::new(coordinate, public_key, Some(private_key)))
    }
}

/// Next-index counters for both chains plus the provider they derive from.
#[derive(Debug)]
pub struct KeyFrontier<K> {
    provider: K,
    next: [u32; 2],
}

impl<K: KeyProvider> KeyFrontier<K> {
    /// A frontier with nothing allocated yet.
    pub(crate) fn new(provider: K) -> Self {
        Self {
            provider,
            next: [0; 2],
        }
    }

    /// The next unallocated index on `chain`.
    pub fn next_index(&self, chain: Chain) -> u32 {
        self.next[chain.slot()]
    }

    /// The most recently allocated coordinate on `chain`.
    pub fn current(&self, chain: Chain) -> Option<Coordinate> {
        self.next_index(chain).checked_sub(1).map(|index| Coordinate::new(chain, index))
    }

    /// Whether `coordinate` is the newest, still-unused coordinate of its chain.
    pub fn is_edge(&self, coordinate: Coordinate) -> bool {
        self.current(coordinate.chain) == Some(coordinate)
    }

    /// Re-derive key material for an allocated coordinate.
    pub fn derive(&self, coordinate: Coordinate) -> Result<KeyMaterial> {
        debug_assert!(
            coordinate.index < self.next_index(coordinate.chain),
            "coordinate {coordinate} is beyond the frontier"
        );
        self.provider.derive(coordinate)
    }

    /// Allocate the next coordinate on `chain` and register its address
    /// identity with `index`.
    pub fn advance(&mut self, chain: Chain, index: &mut AddressIndex) -> Result<KeyMaterial> {
        let coordinate = Coordinate::new(chain, self.next_index(chain));
        let key = self.provider.derive(coordinate)?;

        self.next[chain.slot()] = coordinate
            .index
            .checked_add(1)
            .ok_or_else(|| LedgerError::Derivation(format!("{chain} chain exhausted")))?;
        index.insert(key.address_id(), coordinate);

        tracing::debug!("Allocated {} ({})", coordinate, key.address_id());
        Ok(key)
    }

    pub fn provider(&self) -> &K {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomFilter;
    use std::str::FromStr;

    fn provider() -> Bip32KeyProvider {
        let path = DerivationPath::from_str("m/84'/1'/0'").unwrap();
        Bip32KeyProvider::from_seed(Network::Regtest, &[7u8; 32], &path).unwrap()
    }

    fn empty_index() -> AddressIndex {
        AddressIndex::new(BloomFilter::new(100, 0.001, 0).unwrap())
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = provider();
        let b = provider();
        let coordinate = Coordinate::internal(5);
        assert_eq!(a.derive(coordinate).unwrap(), b.derive(coordinate).unwrap());
        assert_ne!(
            a.derive(Coordinate::external(5)).unwrap().public_key(),
            a.derive(coordinate).unwrap().public_key()
        );
    }

    #[test]
    fn test_seed_length_is_checked() {
        let path = DerivationPath::master();
        let result = Bip32KeyProvider::from_seed(Network::Regtest, &[1u8; 8], &path);
        assert!(matches!(result, Err(LedgerError::Config(ConfigError::InvalidRootKey(_)))));
    }

    #[test]
    fn test_advance_registers_address() {
        let mut frontier = KeyFrontier::new(provider());
        let mut index = empty_index();

        assert_eq!(frontier.current(Chain::External), None);

        let key = frontier.advance(Chain::External, &mut index).unwrap();
        assert_eq!(key.coordinate(), Coordinate::external(0));
        assert_eq!(frontier.next_index(Chain::External), 1);
        assert_eq!(frontier.next_index(Chain::Internal), 0);
        assert_eq!(index.lookup(&key.address_id()), Some(Coordinate::external(0)));
        assert!(index.probably_relevant(key.address_id().as_bytes()));

        assert!(frontier.is_edge(Coordinate::external(0)));
        frontier.advance(Chain::External, &mut index).unwrap();
        assert!(!frontier.is_edge(Coordinate::external(0)));
        assert!(frontier.is_edge(Coordinate::external(1)));
    }

    #[test]
    fn test_rederived_key_matches_allocated_key() {
        let mut frontier = KeyFrontier::new(provider());
        let mut index = empty_index();
        let allocated = frontier.advance(Chain::Internal, &mut index).unwrap();
        assert_eq!(frontier.derive(Coordinate::internal(0)).unwrap(), allocated);
    }

    #[test]
    fn test_address_forms_share_identity() {
        let key = provider().derive(Coordinate::external(0)).unwrap();
        let witness = key.script_pubkey(true);
        let legacy = key.script_pubkey(false);
        assert!(witness.is_p2wpkh());
        assert!(legacy.is_p2pkh());
        assert_eq!(key.address(Network::Regtest, true).script_pubkey(), witness);
        assert_eq!(key.address(Network::Regtest, false).script_pubkey(), legacy);
    }
}
