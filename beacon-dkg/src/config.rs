//! Frozen configuration for the process-wide generator singleton and the
//! notarisation manager's aggregation domain.

use serde::{Deserialize, Serialize};

/// 48-byte ASCII prefix reserved for C6's aggregation hash, distinct from any
/// DKG hash-to-curve domain tag.
pub const AGGREGATION_PAD_LEN: usize = 48;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconManagerConfig {
    /// Domain-separation string hashed to produce the `G` generator.
    pub generator_g_seed: String,

    /// Domain-separation string hashed to produce the `H` generator. Must
    /// differ from `generator_g_seed`.
    pub generator_h_seed: String,

    /// 48-byte ASCII prefix used by the notarisation manager's `hash_to_Fr`
    /// aggregation coefficient.
    pub aggregation_pad: String,
}

impl Default for BeaconManagerConfig {
    fn default() -> Self {
        Self {
            generator_g_seed: "Fetch.ai Elliptic Curve Generator G".to_string(),
            generator_h_seed: "Fetch.ai Elliptic Curve Generator H".to_string(),
            aggregation_pad: format!("BLS Aggregation {}", "0".repeat(32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;
    use static_assertions::assert_impl_all;

    assert_impl_all!(BeaconManagerConfig: Serialize, DeserializeOwned, Clone);

    #[test]
    fn default_seeds_are_non_empty_and_distinct() {
        let cfg = BeaconManagerConfig::default();
        assert_ne!(cfg.generator_g_seed, cfg.generator_h_seed);
        assert!(!cfg.generator_g_seed.is_empty());
        assert!(!cfg.generator_h_seed.is_empty());
        assert_eq!(cfg.aggregation_pad.len(), AGGREGATION_PAD_LEN);
    }
}
