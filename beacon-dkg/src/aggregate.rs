//! Aggregate/notarisation BLS manager (C6).
//!
//! Runs independently of the DKG: every member brings its own keypair, and
//! a deterministic per-signer coefficient (Boneh-Drijvers-Neven style) makes
//! the aggregate immune to rogue-key attacks without an interactive setup.

use crate::cabinet::{Address, CabinetIndex};
use crate::config::BeaconManagerConfig;
use bitvec::prelude::*;
use bn256_bls::curve::bn256::{hash_to_fr, hash_to_g1, PairingCurve as BN256, Scalar, G1, G2, GT};
use bn256_bls::group::{Element, PairingCurve as _};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("{0} is not a member of the notarisation cabinet")]
    NotMember(CabinetIndex),

    #[error("hash-to-G1 failed while signing or verifying")]
    HashToCurve,
}

/// Per-signer aggregation coefficient `α_i`.
fn aggregation_coefficient(pad: &str, pk_i: &G2, ordered_pks: &[G2]) -> Scalar {
    let mut buf = Vec::with_capacity(pad.len() + ordered_pks.len() * 128);
    buf.extend_from_slice(pad.as_bytes());
    buf.extend_from_slice(pk_i.to_str().as_bytes());
    for pk in ordered_pks {
        buf.extend_from_slice(pk.to_str().as_bytes());
    }
    hash_to_fr(&buf)
}

/// One aeon's fixed membership, public keys and derived aggregation
/// coefficients. `index(member)` is stable for the aeon.
pub struct NotarisationManager {
    aggregation_pad: String,
    round_start: u64,
    round_end: u64,
    threshold: usize,
    members: Vec<Address>,
    index_of: HashMap<Address, CabinetIndex>,
    public_keys: Vec<G2>,
    coefficients: Vec<Scalar>,
    /// `pk_i^{α_i}`, memoised so aggregate verify reduces to G2 addition plus
    /// one pairing equality.
    aggregate_public_keys: Vec<G2>,
}

impl NotarisationManager {
    pub fn new(config: &BeaconManagerConfig) -> Self {
        Self {
            aggregation_pad: config.aggregation_pad.clone(),
            round_start: 0,
            round_end: 0,
            threshold: 0,
            members: Vec::new(),
            index_of: HashMap::new(),
            public_keys: Vec::new(),
            coefficients: Vec::new(),
            aggregate_public_keys: Vec::new(),
        }
    }

    /// Fixes `n`, membership and the aggregation domain for one aeon.
    pub fn set_aeon_details(
        &mut self,
        round_start: u64,
        round_end: u64,
        threshold: usize,
        cabinet_public_keys: Vec<(Address, G2)>,
    ) {
        self.round_start = round_start;
        self.round_end = round_end;
        self.threshold = threshold;
        self.members = cabinet_public_keys.iter().map(|(a, _)| a.clone()).collect();
        self.index_of = self
            .members
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i as CabinetIndex))
            .collect();
        self.public_keys = cabinet_public_keys.into_iter().map(|(_, pk)| pk).collect();

        self.coefficients = self
            .public_keys
            .iter()
            .map(|pk| aggregation_coefficient(&self.aggregation_pad, pk, &self.public_keys))
            .collect();
        self.aggregate_public_keys = self
            .public_keys
            .iter()
            .zip(&self.coefficients)
            .map(|(pk, alpha)| {
                let mut p = pk.clone();
                p.mul(alpha);
                p
            })
            .collect();
    }

    pub fn round_start(&self) -> u64 {
        self.round_start
    }

    pub fn round_end(&self) -> u64 {
        self.round_end
    }

    pub fn index(&self, member: &Address) -> Option<CabinetIndex> {
        self.index_of.get(member).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `σ_i(m) = H(m)^{sk_i · α_i}`.
    pub fn sign(&self, signer: CabinetIndex, secret_key: &Scalar, message: &[u8]) -> Result<G1, AggregateError> {
        let alpha = self
            .coefficients
            .get(signer as usize)
            .ok_or(AggregateError::NotMember(signer))?;
        let mut exponent = secret_key.clone();
        exponent.mul(alpha);
        let mut sig = hash_to_g1(message).map_err(|_| AggregateError::HashToCurve)?;
        sig.mul(&exponent);
        Ok(sig)
    }

    /// `pairing(σ_i, G) == pairing(H(m), pk_i^{α_i})`.
    pub fn verify_individual(&self, signer: CabinetIndex, signature: &G1, message: &[u8], generator_g: &G2) -> Result<bool, AggregateError> {
        let apk = self
            .aggregate_public_keys
            .get(signer as usize)
            .ok_or(AggregateError::NotMember(signer))?;
        let h_m = hash_to_g1(message).map_err(|_| AggregateError::HashToCurve)?;
        let lhs: GT = BN256::pair(signature, generator_g);
        let rhs: GT = BN256::pair(&h_m, apk);
        Ok(lhs == rhs)
    }

    /// `Σ = Σ_i σ_i`, plus the bitmap of contributing signers.
    pub fn compose(&self, signatures: &[(CabinetIndex, G1)]) -> (G1, BitVec) {
        let mut sum = G1::new();
        let mut signers = bitvec![0; self.members.len()];
        for (i, sig) in signatures {
            sum.add(sig);
            signers.set(*i as usize, true);
        }
        (sum, signers)
    }

    /// `APK = Σ_{signers[i]=1} pk_i^{α_i}`; checks `pairing(Σ, G) == pairing(H(m), APK)`.
    pub fn verify_aggregate(&self, aggregate_signature: &G1, signers: &BitSlice, message: &[u8], generator_g: &G2) -> Result<bool, AggregateError> {
        let mut apk = G2::new();
        for (i, bit) in signers.iter().enumerate() {
            if *bit {
                apk.add(
                    self.aggregate_public_keys
                        .get(i)
                        .ok_or(AggregateError::NotMember(i as CabinetIndex))?,
                );
            }
        }
        let h_m = hash_to_g1(message).map_err(|_| AggregateError::HashToCurve)?;
        let lhs: GT = BN256::pair(aggregate_signature, generator_g);
        let rhs: GT = BN256::pair(&h_m, &apk);
        Ok(lhs == rhs)
    }
}

/// `{round, group_public_key}`, ordered lower-round-first.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicKeyMessage {
    pub round: u64,
    pub group_public_key: String,
}

impl PartialOrd for PublicKeyMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKeyMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.round.cmp(&other.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bn256_bls::curve::bn256::Scalar;

    fn generator_g() -> G2 {
        bn256_bls::curve::bn256::hash_to_g2("notarisation test generator").unwrap()
    }

    fn keypair() -> (Scalar, G2) {
        let sk = Scalar::rand(&mut rand::thread_rng());
        let mut pk = generator_g();
        pk.mul(&sk);
        (sk, pk)
    }

    fn cabinet(n: usize) -> (Vec<Address>, Vec<(Scalar, G2)>) {
        let members: Vec<Address> = (0..n).map(|i| Address::new(vec![i as u8])).collect();
        let keys: Vec<(Scalar, G2)> = (0..n).map(|_| keypair()).collect();
        (members, keys)
    }

    #[test]
    fn individual_signature_verifies_against_aggregation_coefficient() {
        let (members, keys) = cabinet(4);
        let mut mgr = NotarisationManager::new(&BeaconManagerConfig::default());
        let cabinet_public_keys: Vec<(Address, G2)> = members.iter().cloned().zip(keys.iter().map(|(_, pk)| pk.clone())).collect();
        mgr.set_aeon_details(100, 200, 2, cabinet_public_keys);

        let msg = b"notarise block #42";
        let g = generator_g();
        for (i, (sk, _)) in keys.iter().enumerate() {
            let sig = mgr.sign(i as CabinetIndex, sk, msg).unwrap();
            assert!(mgr.verify_individual(i as CabinetIndex, &sig, msg, &g).unwrap());
        }
    }

    #[test]
    fn aggregate_signature_from_a_quorum_verifies() {
        let (members, keys) = cabinet(5);
        let mut mgr = NotarisationManager::new(&BeaconManagerConfig::default());
        let cabinet_public_keys: Vec<(Address, G2)> = members.iter().cloned().zip(keys.iter().map(|(_, pk)| pk.clone())).collect();
        mgr.set_aeon_details(1, 2, 2, cabinet_public_keys);

        let msg = b"notarise block #43";
        let g = generator_g();
        let signatures: Vec<(CabinetIndex, G1)> = keys
            .iter()
            .enumerate()
            .take(3)
            .map(|(i, (sk, _))| (i as CabinetIndex, mgr.sign(i as CabinetIndex, sk, msg).unwrap()))
            .collect();

        let (aggregate, signers) = mgr.compose(&signatures);
        assert!(mgr.verify_aggregate(&aggregate, &signers, msg, &g).unwrap());
        assert_eq!(signers.count_ones(), 3);
    }

    #[test]
    fn aggregate_signature_fails_once_a_signer_is_swapped_out() {
        let (members, keys) = cabinet(3);
        let mut mgr = NotarisationManager::new(&BeaconManagerConfig::default());
        let cabinet_public_keys: Vec<(Address, G2)> = members.iter().cloned().zip(keys.iter().map(|(_, pk)| pk.clone())).collect();
        mgr.set_aeon_details(1, 2, 1, cabinet_public_keys);

        let msg = b"notarise block #44";
        let g = generator_g();
        let mut signatures: Vec<(CabinetIndex, G1)> = keys
            .iter()
            .enumerate()
            .take(2)
            .map(|(i, (sk, _))| (i as CabinetIndex, mgr.sign(i as CabinetIndex, sk, msg).unwrap()))
            .collect();
        let (aggregate, signers) = mgr.compose(&signatures);
        assert!(mgr.verify_aggregate(&aggregate, &signers, msg, &g).unwrap());

        // Swap one signature for the third member's and keep the old bitmap:
        // the aggregate no longer matches the claimed signer set.
        let (_, sk2) = &keys[2];
        let bad_sig = mgr.sign(2, sk2, msg).unwrap();
        signatures[1] = (1, bad_sig);
        let (bad_aggregate, _) = mgr.compose(&signatures);
        assert!(!mgr.verify_aggregate(&bad_aggregate, &signers, msg, &g).unwrap());
    }
}
