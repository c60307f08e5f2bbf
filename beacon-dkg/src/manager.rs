//! The DKG arithmetic engine (`BeaconManager`).
//!
//! Holds all per-participant Pedersen-VSS state across one DKG instance and
//! exposes every arithmetic operation the setup service needs. Nothing here
//! touches broadcast or transport; every method takes `&mut self` and trusts
//! its caller to serialise access and to have already classified the sender.

use crate::cabinet::{Address, Cabinet, CabinetIndex};
use crate::error::{DKGError, ShareError};
use crate::init::Generators;
use bn256_bls::curve::bn256::{hash_to_g1, PairingCurve as BN256, Scalar, G1, G2, GT};
use bn256_bls::group::{Element, PairingCurve as _};
use bn256_bls::poly::{lagrange_interpolate, Eval, Idx, Poly};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Pedersen commitment: `g^a · h^b`.
fn compute_lhs(g: &G2, h: &G2, a: &Scalar, b: &Scalar) -> G2 {
    let mut ga = g.clone();
    ga.mul(a);
    let mut hb = h.clone();
    hb.mul(b);
    ga.add(&hb);
    ga
}

/// `∏_{k=0..t} coeffs[k]^{(j+1)^k}`, i.e. the public polynomial with these
/// coefficients evaluated at `j`. `Poly::eval`'s Horner step is exactly this
/// product in the additive notation the group traits use.
fn eval_public_poly(coeffs: &[G2], j: Idx) -> G2 {
    Poly::<G2>::from(coeffs.to_vec()).eval(j).value
}

/// Outcome of [`BeaconManager::add_signature_part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Success,
    NotMember,
    AlreadyAdded,
    Invalid,
}

/// Terminal status the setup service reports once a round is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgStatus {
    Success,
    FailedNotInQual,
    FailedQualTooSmall,
    FailedReconstruction,
}

/// Snapshot of a completed engine, the payload of a `FinalState` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgOutput {
    pub secret_share: Option<String>,
    pub group_public_key: Option<String>,
    pub public_key_shares: Vec<Option<String>>,
    pub qual: Vec<Address>,
    pub cabinet_size: usize,
    pub polynomial_degree: usize,
    pub cabinet_index: CabinetIndex,
}

pub struct BeaconManager {
    cabinet: Cabinet,
    threshold: usize,
    cabinet_index: CabinetIndex,
    generators: Generators,

    poly_a: Poly<Scalar>,
    poly_b: Poly<Scalar>,

    coefficients: Vec<Option<Vec<G2>>>,
    qual_coefficients: Vec<Option<Vec<G2>>>,
    received_shares: Vec<Option<(Scalar, Scalar)>>,

    reconstruction_shares: HashMap<Address, (Vec<CabinetIndex>, Vec<Option<Scalar>>)>,

    qual: Vec<Address>,
    secret_share: Option<Scalar>,
    x_prime: Option<Scalar>,
    group_public_key: Option<G2>,
    public_key_shares: Vec<Option<G2>>,

    current_message: Vec<u8>,
    already_signed: std::collections::BTreeSet<CabinetIndex>,
    signature_buffer: BTreeMap<CabinetIndex, G1>,
    group_signature: Option<G1>,
}

impl BeaconManager {
    pub fn new(generators: Generators) -> Self {
        Self {
            cabinet: Cabinet::new(Vec::new()),
            threshold: 0,
            cabinet_index: 0,
            generators,
            poly_a: Poly::zero(),
            poly_b: Poly::zero(),
            coefficients: Vec::new(),
            qual_coefficients: Vec::new(),
            received_shares: Vec::new(),
            reconstruction_shares: HashMap::new(),
            qual: Vec::new(),
            secret_share: None,
            x_prime: None,
            group_public_key: None,
            public_key_shares: Vec::new(),
            current_message: Vec::new(),
            already_signed: std::collections::BTreeSet::new(),
            signature_buffer: BTreeMap::new(),
            group_signature: None,
        }
    }

    /// Sets `n`, `t`, `cabinet_index`, rebuilds the address↔index map, sizes
    /// every buffer and clears QUAL and the outputs of any previous round.
    pub fn reset_cabinet(&mut self, members: Vec<Address>, threshold: usize, self_address: &Address) {
        let n = members.len();
        self.cabinet = Cabinet::new(members);
        self.threshold = threshold;
        self.cabinet_index = self
            .cabinet
            .index_of(self_address)
            .expect("self must be a cabinet member");

        self.poly_a = Poly::zero();
        self.poly_b = Poly::zero();
        self.coefficients = vec![None; n];
        self.qual_coefficients = vec![None; n];
        self.received_shares = vec![None; n];
        self.reconstruction_shares.clear();
        self.qual.clear();
        self.secret_share = None;
        self.x_prime = None;
        self.group_public_key = None;
        self.public_key_shares = vec![None; n];
        self.current_message.clear();
        self.already_signed.clear();
        self.signature_buffer.clear();
        self.group_signature = None;
    }

    pub fn cabinet_index(&self) -> CabinetIndex {
        self.cabinet_index
    }

    pub fn cabinet(&self) -> &Cabinet {
        &self.cabinet
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Samples fresh `a_{self,·}, b_{self,·}`, computes `C_{self,·}` and
    /// pre-computes every private share for this round.
    pub fn generate_coefficients(&mut self) {
        let mut rng = rand::thread_rng();
        self.poly_a = Poly::new_from(self.threshold, &mut rng);
        self.poly_b = Poly::new_from(self.threshold, &mut rng);

        let coeffs: Vec<G2> = (0..=self.threshold)
            .map(|k| compute_lhs(&self.generators.g, &self.generators.h, &self.poly_a.get(k as Idx), &self.poly_b.get(k as Idx)))
            .collect();
        self.coefficients[self.cabinet_index as usize] = Some(coeffs);

        let (s, sp) = self.compute_own_share(self.cabinet_index);
        self.received_shares[self.cabinet_index as usize] = Some((s, sp));
    }

    fn compute_own_share(&self, j: CabinetIndex) -> (Scalar, Scalar) {
        (self.poly_a.eval(j).value, self.poly_b.eval(j).value)
    }

    /// Serialised `C_{self,·}`.
    pub fn get_coefficients(&self) -> Vec<String> {
        self.coefficients[self.cabinet_index as usize]
            .as_ref()
            .expect("generate_coefficients must run first")
            .iter()
            .map(G2::to_str)
            .collect()
    }

    /// Serialised `A_{self,·} = g^{a_{self,k}}`, computed on first call.
    pub fn get_qual_coefficients(&mut self) -> Vec<String> {
        if self.qual_coefficients[self.cabinet_index as usize].is_none() {
            let coeffs: Vec<G2> = (0..=self.threshold)
                .map(|k| {
                    let mut p = self.generators.g.clone();
                    p.mul(&self.poly_a.get(k as Idx));
                    p
                })
                .collect();
            self.qual_coefficients[self.cabinet_index as usize] = Some(coeffs);
        }
        self.qual_coefficients[self.cabinet_index as usize]
            .as_ref()
            .unwrap()
            .iter()
            .map(G2::to_str)
            .collect()
    }

    /// `(s_{self,receiver}, s'_{self,receiver})` as hex-encoded scalars.
    pub fn get_own_shares(&self, receiver: CabinetIndex) -> (String, String) {
        let (s, sp) = self.compute_own_share(receiver);
        (s.to_str(), sp.to_str())
    }

    /// Decodes and stores `C_{from,·}`.
    pub fn add_coefficients(&mut self, from: CabinetIndex, coeffs: &[String]) -> Result<(), ShareError> {
        if self.coefficients[from as usize].is_some() {
            return Err(ShareError::DuplicateCoefficients(from));
        }
        let decoded = coeffs
            .iter()
            .map(|s| G2::from_str(s).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError)))
            .collect::<Result<Vec<_>, _>>()?;
        self.coefficients[from as usize] = Some(decoded);
        Ok(())
    }

    /// Decodes and stores `s_{from,self}, s'_{from,self}`.
    pub fn add_shares(&mut self, from: CabinetIndex, share: (&str, &str)) -> Result<(), ShareError> {
        if self.received_shares[from as usize].is_some() {
            return Err(ShareError::DuplicateSubmission(from));
        }
        let s = Scalar::from_str(share.0).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        let sp = Scalar::from_str(share.1).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        self.received_shares[from as usize] = Some((s, sp));
        Ok(())
    }

    /// Invariant (2): `g^{s_{i,j}} · h^{s'_{i,j}} == ∏ (C_{i,k})^{(j+1)^k}`.
    fn check_invariant_2(&self, dealer: CabinetIndex, recipient: CabinetIndex, s: &Scalar, sp: &Scalar) -> bool {
        let coeffs = match &self.coefficients[dealer as usize] {
            Some(c) => c,
            None => return false,
        };
        let lhs = compute_lhs(&self.generators.g, &self.generators.h, s, sp);
        let rhs = eval_public_poly(coeffs, recipient);
        lhs == rhs
    }

    /// Invariant (3): `g^{s_{i,j}} == ∏ (A_{i,k})^{(j+1)^k}`.
    fn check_invariant_3(&self, dealer: CabinetIndex, recipient: CabinetIndex, s: &Scalar) -> bool {
        let coeffs = match &self.qual_coefficients[dealer as usize] {
            Some(c) => c,
            None => return false,
        };
        let mut lhs = self.generators.g.clone();
        lhs.mul(s);
        let rhs = eval_public_poly(coeffs, recipient);
        lhs == rhs
    }

    /// For each dealer from whom coefficients were received, checks
    /// invariant (2) at `j = self`. Returns accusations for every dealer
    /// whose check fails, whose commitments are missing or all-zero, or
    /// whose share was never received or is all-zero.
    pub fn compute_complaints(&self) -> Vec<CabinetIndex> {
        let mut accused = Vec::new();
        for i in self.cabinet.indices() {
            if i == self.cabinet_index {
                continue;
            }
            let degenerate_coeffs = match &self.coefficients[i as usize] {
                None => true,
                Some(c) => c.iter().all(|p| *p == G2::new()),
            };
            let (share_missing, degenerate_share, ok) = match &self.received_shares[i as usize] {
                None => (true, false, false),
                Some((s, sp)) => (
                    false,
                    *s == Scalar::new() && *sp == Scalar::new(),
                    self.check_invariant_2(i, self.cabinet_index, s, sp),
                ),
            };
            if degenerate_coeffs || share_missing || degenerate_share || !ok {
                warn!(dealer = i, "phase-1 invariant failed, raising complaint");
                accused.push(i);
            }
        }
        accused
    }

    /// Recomputes both sides of invariant (2) at `j = index(accuser)`. If it
    /// passes and `accuser == self`, overwrites the stored share with the
    /// exposed (authoritative) values.
    pub fn verify_complaint_answer(&mut self, from: CabinetIndex, accuser: CabinetIndex, share: (&str, &str)) -> Result<bool, ShareError> {
        let s = Scalar::from_str(share.0).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        let sp = Scalar::from_str(share.1).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        let ok = self.check_invariant_2(from, accuser, &s, &sp);
        if ok && accuser == self.cabinet_index {
            self.received_shares[from as usize] = Some((s, sp));
        }
        debug!(dealer = from, accuser, ok, "verified complaint answer");
        Ok(ok)
    }

    /// `secret_share ← Σ_{i ∈ QUAL} s_{i,self}`; also accumulates the
    /// blinding-factor total `x' ← Σ_{i ∈ QUAL} s'_{i,self}`.
    pub fn compute_secret_share(&mut self, qual: &[CabinetIndex]) {
        let mut acc = Scalar::new();
        let mut acc_prime = Scalar::new();
        for &i in qual {
            if let Some((s, sp)) = &self.received_shares[i as usize] {
                acc.add(s);
                acc_prime.add(sp);
            }
        }
        self.secret_share = Some(acc);
        self.x_prime = Some(acc_prime);
    }

    /// Same shape as [`Self::add_coefficients`] but targets `A_{from,·}`.
    pub fn add_qual_coefficients(&mut self, from: CabinetIndex, coeffs: &[String]) -> Result<(), ShareError> {
        if self.qual_coefficients[from as usize].is_some() {
            return Err(ShareError::DuplicateCoefficients(from));
        }
        let decoded = coeffs
            .iter()
            .map(|s| G2::from_str(s).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError)))
            .collect::<Result<Vec<_>, _>>()?;
        self.qual_coefficients[from as usize] = Some(decoded);
        Ok(())
    }

    /// For each `i ∈ QUAL, i ≠ self`, checks invariant (3); returns
    /// accusations carrying the exposed evidence `(s_{i,self}, s'_{i,self})`.
    pub fn compute_qual_complaints(&self, qual: &[CabinetIndex]) -> Vec<(CabinetIndex, (String, String))> {
        let mut out = Vec::new();
        for &i in qual {
            if i == self.cabinet_index {
                continue;
            }
            let (s, sp) = match &self.received_shares[i as usize] {
                Some(pair) => pair,
                None => {
                    out.push((i, (Scalar::new().to_str(), Scalar::new().to_str())));
                    continue;
                }
            };
            if !self.check_invariant_3(i, self.cabinet_index, s) {
                warn!(dealer = i, "phase-2 invariant failed, raising qual-complaint");
                out.push((i, (s.to_str(), sp.to_str())));
            }
        }
        out
    }

    /// Decides culpability of a received qual-complaint: forged evidence
    /// culprits the sender, a justified complaint culprits the accused
    /// dealer, and a spurious complaint culprits the sender again.
    pub fn verify_qual_complaint(&self, from: CabinetIndex, victim: CabinetIndex, share: (&str, &str)) -> Result<CabinetIndex, ShareError> {
        let s = Scalar::from_str(share.0).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        let sp = Scalar::from_str(share.1).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;

        if !self.check_invariant_2(victim, from, &s, &sp) {
            return Ok(from);
        }
        if !self.check_invariant_3(victim, from, &s) {
            return Ok(victim);
        }
        Ok(from)
    }

    /// The `s` half of the share this node holds from `dealer`, used by the
    /// setup service to broadcast a reconstruction contribution for `dealer`.
    pub fn share_from(&self, dealer: CabinetIndex) -> Option<Scalar> {
        self.received_shares[dealer as usize].as_ref().map(|(s, _)| s.clone())
    }

    /// Records a good reconstruction share once; silently drops duplicates.
    pub fn add_reconstruction_share(&mut self, from: CabinetIndex, owner: &Address, s: &str) -> Result<(), ShareError> {
        let value = Scalar::from_str(s).map_err(|_| ShareError::Decode(from, bn256_bls::curve::CurveError::DecodeError))?;
        let n = self.cabinet.len();
        let entry = self
            .reconstruction_shares
            .entry(owner.clone())
            .or_insert_with(|| (Vec::new(), vec![None; n]));
        if entry.1[from as usize].is_some() {
            return Err(ShareError::DuplicateSubmission(from));
        }
        entry.1[from as usize] = Some(value);
        entry.0.push(from);
        Ok(())
    }

    /// For each owner in `reconstruction_shares` other than self, interpolates
    /// `a_{owner,·}` from the collected shares (requires more than `t` good
    /// contributors) and recomputes `A_{owner,k} ← g^{a_{owner,k}}`. Returns
    /// `Err` naming the first owner for which there were insufficient shares.
    pub fn run_reconstruction(&mut self, self_address: &Address) -> Result<(), DKGError> {
        let owners: Vec<Address> = self.reconstruction_shares.keys().cloned().collect();
        for owner in owners {
            if &owner == self_address {
                continue;
            }
            let (contributors, shares) = self.reconstruction_shares[&owner].clone();
            let have = contributors.len();
            let need = self.threshold;
            if have <= need {
                return Err(DKGError::InsufficientShares {
                    owner,
                    have,
                    need,
                });
            }
            let evals: Vec<Eval<Scalar>> = contributors
                .iter()
                .map(|&i| Eval {
                    value: shares[i as usize].clone().expect("contributor recorded implies share present"),
                    index: i,
                })
                .collect();
            let poly = Poly::<Scalar>::full_recover(self.threshold + 1, evals)?;
            let owner_idx = self
                .cabinet
                .index_of(&owner)
                .expect("owner must be a cabinet member");
            let coeffs: Vec<G2> = (0..=self.threshold)
                .map(|k| {
                    let mut p = self.generators.g.clone();
                    p.mul(&poly.get(k as Idx));
                    p
                })
                .collect();
            self.qual_coefficients[owner_idx as usize] = Some(coeffs);
        }
        Ok(())
    }

    /// `group_public_key = Σ_{i ∈ QUAL} A_{i,0}`;
    /// `public_key_shares[j] = Σ_{i ∈ QUAL} ∏ (A_{i,k})^{(j+1)^k}` for every `j`.
    pub fn compute_public_keys(&mut self, qual: &[CabinetIndex]) {
        let mut gpk = G2::new();
        for &i in qual {
            if let Some(coeffs) = &self.qual_coefficients[i as usize] {
                gpk.add(&coeffs[0]);
            }
        }
        self.group_public_key = Some(gpk);
        self.qual = qual
            .iter()
            .map(|&i| self.cabinet.address_of(i).expect("qual index must resolve").clone())
            .collect();

        let n = self.cabinet.len();
        let mut shares = vec![G2::new(); n];
        for j in 0..n as CabinetIndex {
            for &i in qual {
                if let Some(coeffs) = &self.qual_coefficients[i as usize] {
                    shares[j as usize].add(&eval_public_poly(coeffs, j));
                }
            }
        }
        self.public_key_shares = shares.into_iter().map(Some).collect();
    }

    pub fn secret_share(&self) -> Option<&Scalar> {
        self.secret_share.as_ref()
    }

    pub fn group_public_key(&self) -> Option<&G2> {
        self.group_public_key.as_ref()
    }

    pub fn public_key_shares(&self) -> &[Option<G2>] {
        &self.public_key_shares
    }

    pub fn qual(&self) -> &[Address] {
        &self.qual
    }

    /// Snapshot getter used to persist or transfer a finished engine.
    pub fn get_dkg_output(&self) -> DkgOutput {
        DkgOutput {
            secret_share: self.secret_share.as_ref().map(Scalar::to_str),
            group_public_key: self.group_public_key.as_ref().map(G2::to_str),
            public_key_shares: self.public_key_shares.iter().map(|p| p.as_ref().map(G2::to_str)).collect(),
            qual: self.qual.clone(),
            cabinet_size: self.cabinet.len(),
            polynomial_degree: self.threshold,
            cabinet_index: self.cabinet_index,
        }
    }

    /// Reverse of [`Self::get_dkg_output`], used when loading a pre-computed
    /// result (e.g. handed out by a dealer instead of run interactively).
    pub fn set_dkg_output(&mut self, output: &DkgOutput) -> Result<(), ShareError> {
        self.secret_share = output
            .secret_share
            .as_deref()
            .map(|s| Scalar::from_str(s).map_err(|_| ShareError::Decode(self.cabinet_index, bn256_bls::curve::CurveError::DecodeError)))
            .transpose()?;
        self.group_public_key = output
            .group_public_key
            .as_deref()
            .map(|s| G2::from_str(s).map_err(|_| ShareError::Decode(self.cabinet_index, bn256_bls::curve::CurveError::DecodeError)))
            .transpose()?;
        self.public_key_shares = output
            .public_key_shares
            .iter()
            .map(|opt| {
                opt.as_deref()
                    .map(|s| G2::from_str(s).map_err(|_| ShareError::Decode(self.cabinet_index, bn256_bls::curve::CurveError::DecodeError)))
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.qual = output.qual.clone();
        Ok(())
    }

    // --- Signing path (post-DKG) ---

    /// Resets the per-message signature buffer and the already-signed set.
    pub fn set_message(&mut self, message: &[u8]) {
        self.current_message = message.to_vec();
        self.already_signed.clear();
        self.signature_buffer.clear();
        self.group_signature = None;
    }

    /// `H(m)^{secret_share}`.
    pub fn sign(&self) -> Result<G1, DKGError> {
        let secret = self.secret_share.as_ref().ok_or(DKGError::NotInQual)?;
        let h_m = hash_to_g1(&self.current_message)
            .map_err(|e| DKGError::DegenerateInterpolation(e.to_string()))?;
        let mut sig = h_m;
        sig.mul(secret);
        Ok(sig)
    }

    /// Verifies `pairing(signature, G) == pairing(H(m), public_key_shares[j])`
    /// and, on success, stores the share under `j`.
    pub fn add_signature_part(&mut self, identity: CabinetIndex, signature: &G1) -> AddResult {
        if identity as usize >= self.cabinet.len() {
            return AddResult::NotMember;
        }
        if self.already_signed.contains(&identity) {
            return AddResult::AlreadyAdded;
        }
        let pk = match &self.public_key_shares[identity as usize] {
            Some(pk) => pk,
            None => return AddResult::Invalid,
        };
        let h_m = match hash_to_g1(&self.current_message) {
            Ok(h) => h,
            Err(_) => return AddResult::Invalid,
        };
        let lhs: GT = BN256::pair(signature, &self.generators.g);
        let rhs: GT = BN256::pair(&h_m, pk);
        if lhs != rhs {
            return AddResult::Invalid;
        }
        self.already_signed.insert(identity);
        self.signature_buffer.insert(identity, signature.clone());
        AddResult::Success
    }

    /// `|buffer| ≥ t+1`.
    pub fn can_verify(&self) -> bool {
        self.signature_buffer.len() >= self.threshold + 1
    }

    /// Lagrange-interpolates the buffered shares into the group signature and
    /// checks it against `group_public_key`.
    pub fn verify(&mut self) -> Result<bool, DKGError> {
        let evals: Vec<Eval<G1>> = self
            .signature_buffer
            .iter()
            .map(|(&idx, sig)| Eval {
                value: sig.clone(),
                index: idx,
            })
            .collect();
        let group_sig = lagrange_interpolate::<G1, Scalar>(self.threshold + 1, evals)?;
        self.group_signature = Some(group_sig.clone());

        let gpk = self
            .group_public_key
            .as_ref()
            .ok_or(DKGError::NotInQual)?;
        let h_m = hash_to_g1(&self.current_message)
            .map_err(|e| DKGError::DegenerateInterpolation(e.to_string()))?;
        let lhs: GT = BN256::pair(&group_sig, &self.generators.g);
        let rhs: GT = BN256::pair(&h_m, gpk);
        Ok(lhs == rhs)
    }

    pub fn group_signature(&self) -> Option<&G1> {
        self.group_signature.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeaconManagerConfig;
    use crate::init;
    use serde::de::DeserializeOwned;
    use static_assertions::assert_impl_all;

    assert_impl_all!(DkgOutput: Serialize, DeserializeOwned, Clone);

    fn generators() -> Generators {
        init::init(&BeaconManagerConfig::default()).unwrap()
    }

    fn addresses(n: usize) -> Vec<Address> {
        (0..n).map(|i| Address::new(vec![i as u8])).collect()
    }

    fn setup(n: usize, t: usize) -> (Vec<Address>, Vec<BeaconManager>) {
        let members = addresses(n);
        let managers = members
            .iter()
            .map(|a| {
                let mut m = BeaconManager::new(generators());
                m.reset_cabinet(members.clone(), t, a);
                m
            })
            .collect();
        (members, managers)
    }

    /// Exchanges phase-1 coefficients and shares among every pair of
    /// members, optionally substituting a dealer's real coefficients for
    /// `corrupt` (dealer index -> all-zero commitments to broadcast instead).
    fn exchange_phase1(managers: &mut [BeaconManager], corrupt: &[CabinetIndex]) {
        let n = managers.len();
        for m in managers.iter_mut() {
            m.generate_coefficients();
        }
        let t = managers[0].threshold();
        let coeffs: Vec<Vec<String>> = managers
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if corrupt.contains(&(i as CabinetIndex)) {
                    vec![G2::new().to_str(); t + 1]
                } else {
                    m.get_coefficients()
                }
            })
            .collect();
        for recv in 0..n {
            for dealer in 0..n {
                if dealer == recv {
                    continue;
                }
                managers[recv].add_coefficients(dealer as CabinetIndex, &coeffs[dealer]).unwrap();
                let (s, sp) = managers[dealer].get_own_shares(recv as CabinetIndex);
                managers[recv].add_shares(dealer as CabinetIndex, (&s, &sp)).unwrap();
            }
        }
    }

    #[test]
    fn honest_cabinet_raises_no_phase1_complaints() {
        let (_members, mut managers) = setup(4, 3);
        exchange_phase1(&mut managers, &[]);
        for m in &managers {
            assert!(m.compute_complaints().is_empty());
        }
    }

    #[test]
    fn honest_cabinet_produces_matching_group_key_and_threshold_signature() {
        let (_members, mut managers) = setup(4, 3);
        exchange_phase1(&mut managers, &[]);

        let qual: Vec<CabinetIndex> = (0..4).collect();
        for m in managers.iter_mut() {
            m.compute_secret_share(&qual);
        }
        let qual_coeffs: Vec<Vec<String>> = managers.iter_mut().map(|m| m.get_qual_coefficients()).collect();
        for recv in 0..4 {
            for dealer in 0..4 {
                if dealer == recv {
                    continue;
                }
                managers[recv].add_qual_coefficients(dealer, &qual_coeffs[dealer as usize]).unwrap();
            }
        }
        for m in &managers {
            assert!(m.compute_qual_complaints(&qual).is_empty());
        }
        for m in managers.iter_mut() {
            m.compute_public_keys(&qual);
        }

        let gpk = managers[0].group_public_key().cloned().unwrap();
        assert!(managers.iter().all(|m| m.group_public_key() == Some(&gpk)));
        assert_eq!(managers[0].qual().len(), 4);

        let msg = b"committee decision #1";
        for m in managers.iter_mut() {
            m.set_message(msg);
        }
        let sigs: Vec<(CabinetIndex, G1)> = managers
            .iter()
            .enumerate()
            .map(|(i, m)| (i as CabinetIndex, m.sign().unwrap()))
            .collect();

        // Collect threshold+1 = 4 shares at node 0 and recombine.
        for (idx, sig) in &sigs {
            let res = managers[0].add_signature_part(*idx, sig);
            assert_eq!(res, AddResult::Success);
        }
        assert!(managers[0].can_verify());
        assert!(managers[0].verify().unwrap());
    }

    #[test]
    fn dealer_with_zero_coefficients_is_accused_by_every_honest_member() {
        let (_members, mut managers) = setup(4, 3);
        exchange_phase1(&mut managers, &[0]);

        for m in managers.iter().skip(1) {
            assert_eq!(m.compute_complaints(), vec![0]);
        }

        // QUAL excludes the corrupt dealer: 3 members against t = 3, so the
        // cabinet lacks the quorum (t+1 = 4) needed to proceed.
        let qual: Vec<CabinetIndex> = vec![1, 2, 3];
        assert!(qual.len() <= managers[0].threshold());
    }

    #[test]
    fn two_corrupt_dealers_shrink_qual_below_threshold() {
        let (_members, mut managers) = setup(5, 3);
        exchange_phase1(&mut managers, &[0, 1]);

        for m in managers.iter().skip(2) {
            let mut accused = m.compute_complaints();
            accused.sort();
            assert_eq!(accused, vec![0, 1]);
        }
        let qual: Vec<CabinetIndex> = vec![2, 3, 4];
        assert!(qual.len() <= managers[0].threshold());
    }

    #[test]
    fn bad_qual_coefficients_are_repaired_by_reconstruction() {
        let (members, mut managers) = setup(5, 2);
        exchange_phase1(&mut managers, &[]);

        let qual: Vec<CabinetIndex> = (0..5).collect();
        for m in managers.iter_mut() {
            m.compute_secret_share(&qual);
        }
        let mut qual_coeffs: Vec<Vec<String>> = managers.iter_mut().map(|m| m.get_qual_coefficients()).collect();
        // Node 0 broadcasts a degenerate A_{0,*} instead of its real one.
        qual_coeffs[0] = vec![G2::new().to_str(); 3];

        for recv in 0..5 {
            for dealer in 0..5 {
                if dealer == recv {
                    continue;
                }
                managers[recv].add_qual_coefficients(dealer, &qual_coeffs[dealer as usize]).unwrap();
            }
        }

        for m in managers.iter().skip(1) {
            let complaints = m.compute_qual_complaints(&qual);
            assert_eq!(complaints.len(), 1);
            assert_eq!(complaints[0].0, 0);
        }

        // Every honest judge agrees node 0 is culpable.
        for judge in 1..5 {
            let (_, share) = managers[1].compute_qual_complaints(&qual).remove(0);
            let culprit = managers[judge]
                .verify_qual_complaint(1, 0, (&share.0, &share.1))
                .unwrap();
            assert_eq!(culprit, 0);
        }

        // Nodes 1..4 reconstruct node 0's polynomial from each other's shares.
        for recv in 1..5u32 {
            let s0 = managers[recv as usize].share_from(0).unwrap().to_str();
            for other in 1..5u32 {
                if other == recv {
                    continue;
                }
                managers[other as usize].add_reconstruction_share(recv, &members[0], &s0).unwrap();
            }
        }
        for other in 1..5usize {
            managers[other].run_reconstruction(&members[other]).unwrap();
        }

        // Reconstruction repairs node 0's entry in place; the full QUAL
        // (including node 0) is used for the final group key.
        for other in 1..5usize {
            managers[other].compute_public_keys(&qual);
        }
        let gpk = managers[1].group_public_key().cloned().unwrap();
        assert!(managers[1..5].iter().all(|m| m.group_public_key() == Some(&gpk)));
    }

    #[test]
    fn reconstruction_fails_with_too_few_honest_contributors() {
        let (members, mut managers) = setup(4, 2);
        exchange_phase1(&mut managers, &[]);
        let qual: Vec<CabinetIndex> = (0..4).collect();
        for m in managers.iter_mut() {
            m.compute_secret_share(&qual);
        }

        // Only one other node contributes a reconstruction share for node 0,
        // which is not enough (need > t = 2 contributors).
        let s0 = managers[1].share_from(0).unwrap().to_str();
        managers[2].add_reconstruction_share(1, &members[0], &s0).unwrap();

        let err = managers[2].run_reconstruction(&members[2]).unwrap_err();
        assert!(matches!(err, DKGError::InsufficientShares { have: 1, need: 2, .. }));
    }
}
