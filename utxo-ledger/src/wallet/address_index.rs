//! Address identity index and relevance pre-filter.

use std::collections::HashMap;

use bitcoin::Script;

use crate::bloom::BloomFilter;
use crate::types::{AddressId, Coordinate, OutputRef};

/// Maps a locking script to its address identity.
pub trait ScriptHasher {
    /// `None` for script forms without a recognised identity.
    fn address_id(&self, script: &Script) -> Option<AddressId>;
}

/// Recognises the single-key hash forms P2PKH and P2WPKH. Script hashes
/// have no key behind them and are never owned.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScriptHasher;

impl ScriptHasher for StandardScriptHasher {
    fn address_id(&self, script: &Script) -> Option<AddressId> {
        let bytes = script.as_bytes();
        if script.is_p2pkh() {
            // OP_DUP OP_HASH160 <20> ... OP_EQUALVERIFY OP_CHECKSIG
            AddressId::from_slice(&bytes[3..23])
        } else if script.is_p2wpkh() {
            // OP_0 <20>
            AddressId::from_slice(&bytes[2..22])
        } else {
            None
        }
    }
}

/// Authoritative address identity → coordinate map, fronted by a bloom filter.
#[derive(Debug, Clone)]
pub struct AddressIndex {
    entries: HashMap<AddressId, Coordinate>,
    filter: BloomFilter,
}

impl AddressIndex {
    pub fn new(filter: BloomFilter) -> Self {
        Self {
            entries: HashMap::new(),
            filter,
        }
    }

    /// Authoritative lookup.
    pub fn lookup(&self, address_id: &AddressId) -> Option<Coordinate> {
        self.entries.get(address_id).copied()
    }

    pub fn contains(&self, address_id: &AddressId) -> bool {
        self.entries.contains_key(address_id)
    }

    /// Fast, non-authoritative check. A `false` is definitive; a `true` must
    /// be confirmed with [`AddressIndex::lookup`] or the ledger.
    pub fn probably_relevant(&self, data: &[u8]) -> bool {
        self.filter.contains(data)
    }

    pub(crate) fn insert(&mut self, address_id: AddressId, coordinate: Coordinate) {
        self.filter.insert(address_id.as_bytes());
        self.entries.insert(address_id, coordinate);
    }

    /// Make an owned output matchable by the filter.
    pub(crate) fn watch_output(&mut self, output_ref: &OutputRef) {
        self.filter.insert(&output_ref.encode());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AddressId, &Coordinate)> {
        self.entries.iter()
    }

    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    pub fn filter_false_positive_rate(&self) -> f64 {
        self.filter.estimate_false_positive_rate()
    }
}
