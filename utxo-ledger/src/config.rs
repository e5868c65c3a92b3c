//! Configuration management for the ledger engine.

use bitcoin::Network;

use crate::error::ConfigError;

/// Coordinates allocated per chain at construction.
pub const DEFAULT_LOOKAHEAD: u32 = 1;

/// Expected element count the relevance filter is sized for.
pub const DEFAULT_FILTER_ELEMENTS: u32 = 1000;

/// Target false positive rate of the relevance filter.
pub const DEFAULT_FILTER_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Fee rate in sat/vB used by the default funder.
pub const DEFAULT_FEE_RATE: u64 = 1;

/// Largest valid non-hardened BIP32 child index.
const MAX_NORMAL_INDEX: u32 = (1 << 31) - 1;

/// Configuration for a [`Wallet`](crate::Wallet).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Network addresses are rendered for.
    pub network: Network,

    /// Number of coordinates allocated on each chain up front. Must be at
    /// least 1 so a current receive and change key always exists.
    pub lookahead: u32,

    /// Track witness (P2WPKH) addresses. When set, outputs of a transaction
    /// carrying witness data are only credited if they are witness programs.
    pub witness: bool,

    /// Expected number of elements the relevance filter is sized for.
    pub filter_elements: u32,

    /// Desired false positive rate of the relevance filter.
    pub filter_false_positive_rate: f64,

    /// Tweak mixed into the filter's hash seeds.
    pub filter_tweak: u32,

    /// Fee rate (sat/vB) used when funding outgoing transactions.
    pub fee_rate: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            lookahead: DEFAULT_LOOKAHEAD,
            witness: true,
            filter_elements: DEFAULT_FILTER_ELEMENTS,
            filter_false_positive_rate: DEFAULT_FILTER_FALSE_POSITIVE_RATE,
            filter_tweak: 0,
            fee_rate: DEFAULT_FEE_RATE,
        }
    }
}

impl LedgerConfig {
    /// Create a new configuration for the given network.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn mainnet() -> Self {
        Self::new(Network::Bitcoin)
    }

    pub fn testnet() -> Self {
        Self::new(Network::Testnet)
    }

    pub fn regtest() -> Self {
        Self::new(Network::Regtest)
    }

    /// Set the number of coordinates allocated per chain at construction.
    pub fn with_lookahead(mut self, lookahead: u32) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Track witness (`true`) or legacy (`false`) addresses.
    pub fn with_witness(mut self, witness: bool) -> Self {
        self.witness = witness;
        self
    }

    /// Size the relevance filter.
    pub fn with_filter(mut self, elements: u32, false_positive_rate: f64) -> Self {
        self.filter_elements = elements;
        self.filter_false_positive_rate = false_positive_rate;
        self
    }

    pub fn with_filter_tweak(mut self, tweak: u32) -> Self {
        self.filter_tweak = tweak;
        self
    }

    pub fn with_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fee_rate = sat_per_vb;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookahead == 0 || self.lookahead > MAX_NORMAL_INDEX {
            return Err(ConfigError::InvalidLookahead(self.lookahead));
        }

        if self.filter_elements == 0 {
            return Err(ConfigError::InvalidFilter("filter_elements must be > 0".to_string()));
        }

        let rate = self.filter_false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(ConfigError::InvalidFilter(format!(
                "filter_false_positive_rate must be in (0, 1), got {rate}"
            )));
        }

        Ok(())
    }
}
