//! Process-wide pairing/generator initialisation.
//!
//! The pairing library itself has no explicit init step in this backend, but
//! the two Pedersen generators `G`, `H` are frozen, shared, immutable state
//! that must be derived exactly once and reused by every `BeaconManager`.
//! `init` is idempotent and safe to call from multiple threads; concurrent
//! callers block on the same `OnceCell` until the first completes.

use crate::config::BeaconManagerConfig;
use bn256_bls::curve::bn256::{hash_to_g2, G2};
use bn256_bls::group::Element;
use once_cell::sync::OnceCell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("generator seeds must be non-empty and distinct")]
    DegenerateSeeds,

    #[error("hash-to-G2 produced the identity element, seed: {0}")]
    IdentityGenerator(String),
}

/// The frozen generator pair derived once at process start.
#[derive(Debug, Clone)]
pub struct Generators {
    pub g: G2,
    pub h: G2,
}

static GENERATORS: OnceCell<Generators> = OnceCell::new();

/// Derives and freezes `G`, `H` from the given configuration the first time
/// it is called; every later call (with any config) just returns the
/// already-frozen pair. Returns an error if the seeds are degenerate or the
/// derived points collapse to the identity.
pub fn init(config: &BeaconManagerConfig) -> Result<Generators, InitError> {
    if let Some(g) = GENERATORS.get() {
        return Ok(g.clone());
    }

    if config.generator_g_seed.is_empty()
        || config.generator_h_seed.is_empty()
        || config.generator_g_seed == config.generator_h_seed
    {
        return Err(InitError::DegenerateSeeds);
    }

    let g = hash_to_g2(&config.generator_g_seed)
        .map_err(|_| InitError::IdentityGenerator(config.generator_g_seed.clone()))?;
    let h = hash_to_g2(&config.generator_h_seed)
        .map_err(|_| InitError::IdentityGenerator(config.generator_h_seed.clone()))?;

    if g == G2::new() {
        return Err(InitError::IdentityGenerator(config.generator_g_seed.clone()));
    }
    if h == G2::new() {
        return Err(InitError::IdentityGenerator(config.generator_h_seed.clone()));
    }

    let generators = Generators { g, h };
    let _ = GENERATORS.set(generators.clone());
    Ok(generators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bn256_bls::group::Element;

    #[test]
    fn init_is_idempotent_and_distinct() {
        let cfg = BeaconManagerConfig::default();
        let first = init(&cfg).unwrap();
        let second = init(&cfg).unwrap();
        assert_eq!(first.g, second.g);
        assert_eq!(first.h, second.h);
        assert_ne!(first.g, first.h);
        assert_ne!(first.g, G2::new());
    }
}
