//! BN254 (a.k.a. BN256 / alt_bn128) backed implementation of the [`crate::group`] traits.
//!
//! `Fr` is the scalar field, `G1` is the signature group, `G2` is the public-key
//! and generator group, `GT` is the pairing target group.

use crate::group::{Curve, CurveFrom, Element, PairingCurve as PC, Point, Scalar as Sc};
use ark_bn254::{Bn254, Fq12, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{AffineCurve, PairingEngine, ProjectiveCurve};
use ark_ff::{Field, FromBytes, One, PrimeField, ToBytes, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand_core::RngCore;
use serde::{
    de::Error as DeserializeError, ser::Error as SerializationError, Deserialize, Deserializer,
    Serialize, Serializer,
};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::{AddAssign, MulAssign, Neg, SubAssign};
use thiserror::Error;

/// Error produced while hashing a byte string onto a curve, or decoding one
/// from its string encoding.
#[derive(Debug, Error)]
pub enum HashToCurveError {
    #[error("exhausted try-and-increment counter without finding a point")]
    CounterExhausted,

    #[error("string did not decode to a valid curve element or scalar")]
    DecodeError,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Scalar(
    #[serde(deserialize_with = "deserialize_field")]
    #[serde(serialize_with = "serialize_field")]
    Fr,
);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct G1(
    #[serde(deserialize_with = "deserialize_group")]
    #[serde(serialize_with = "serialize_group")]
    G1Projective,
);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct G2(
    #[serde(deserialize_with = "deserialize_group")]
    #[serde(serialize_with = "serialize_group")]
    G2Projective,
);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GT(
    #[serde(deserialize_with = "deserialize_field")]
    #[serde(serialize_with = "serialize_field")]
    Fq12,
);

impl Element for Scalar {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Fr::zero())
    }
    fn one() -> Self {
        Self(Fr::one())
    }
    fn add(&mut self, s2: &Self) {
        self.0.add_assign(&s2.0);
    }
    fn mul(&mut self, mul: &Self::RHS) {
        self.0.mul_assign(&mul.0);
    }
    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }
}

impl Sc for Scalar {
    fn set_int(&mut self, i: u64) {
        self.0 = Fr::from(i);
    }
    fn inverse(&self) -> Option<Self> {
        Field::inverse(&self.0).map(Self)
    }
    fn negate(&mut self) {
        self.0 = self.0.neg();
    }
    fn sub(&mut self, other: &Self) {
        self.0.sub_assign(&other.0);
    }
    fn from_random_bytes(bytes: &[u8]) -> Option<Self> {
        Fr::from_random_bytes(bytes).map(Self)
    }
    fn serialized_size(&self) -> usize {
        CanonicalSerialize::serialized_size(&self.0)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

impl Scalar {
    /// Canonical hex encoding, used as the `to_str` half of the string round-trip
    /// required of every curve element.
    pub fn to_str(&self) -> String {
        to_hex(&self.0)
    }

    /// Inverse of [`Scalar::to_str`].
    pub fn from_str(s: &str) -> Result<Self, HashToCurveError> {
        from_hex(s).map(Self).ok_or(HashToCurveError::DecodeError)
    }
}

impl Element for G1 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(G1Projective::zero())
    }
    fn one() -> Self {
        Self(G1Projective::prime_subgroup_generator())
    }
    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }
    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0);
    }
    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(G1Projective::rand(rng))
    }
}

impl Point for G1 {
    type Error = HashToCurveError;

    fn map(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.0 = try_and_increment_g1(data)?;
        Ok(())
    }
}

impl fmt::Display for G1 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0.into_affine()))
    }
}

impl G1 {
    pub fn to_str(&self) -> String {
        to_hex(&self.0.into_affine())
    }

    pub fn from_str(s: &str) -> Result<Self, HashToCurveError> {
        let affine: G1Affine = from_hex(s).ok_or(HashToCurveError::DecodeError)?;
        Ok(Self(affine.into_projective()))
    }
}

impl Element for G2 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(G2Projective::zero())
    }
    fn one() -> Self {
        Self(G2Projective::prime_subgroup_generator())
    }
    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }
    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0);
    }
    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(G2Projective::rand(rng))
    }
}

impl Point for G2 {
    type Error = HashToCurveError;

    fn map(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.0 = try_and_increment_g2(data)?;
        Ok(())
    }
}

impl fmt::Display for G2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0.into_affine()))
    }
}

impl G2 {
    pub fn to_str(&self) -> String {
        to_hex(&self.0.into_affine())
    }

    pub fn from_str(s: &str) -> Result<Self, HashToCurveError> {
        let affine: G2Affine = from_hex(s).ok_or(HashToCurveError::DecodeError)?;
        Ok(Self(affine.into_projective()))
    }
}

impl Element for GT {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Fq12::zero())
    }
    fn one() -> Self {
        Self(Fq12::one())
    }
    fn add(&mut self, s2: &Self) {
        self.0.mul_assign(&s2.0);
    }
    fn mul(&mut self, mul: &Scalar) {
        self.0 = self.0.pow(mul.0.into_repr());
    }
    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(Fq12::rand(rng))
    }
}

impl fmt::Display for GT {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

pub type G1Curve = CurveFrom<Scalar, G1>;
pub type G2Curve = CurveFrom<Scalar, G2>;

#[derive(Clone, Debug)]
pub struct PairingCurve {}

impl PC for PairingCurve {
    type Scalar = Scalar;
    type G1 = G1;
    type G2 = G2;
    type GT = GT;

    fn pair(a: &Self::G1, b: &Self::G2) -> Self::GT {
        GT(Bn254::pairing(a.0, b.0))
    }
}

/// `hash_to_Fr` (§4.1): reduces an arbitrary byte string to a scalar, used by the
/// notarisation manager to derive per-signer aggregation coefficients.
pub fn hash_to_fr(bytes: &[u8]) -> Scalar {
    let mut counter = 0u32;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(b"hash_to_Fr");
        hasher.update(&counter.to_be_bytes());
        hasher.update(bytes);
        let digest = hasher.finalize();
        if let Some(s) = Fr::from_random_bytes(&digest) {
            return Scalar(s);
        }
        counter += 1;
    }
}

/// `hash_to_G1` (§4.1): maps an arbitrary message to a point in the signature group.
pub fn hash_to_g1(msg: &[u8]) -> Result<G1, HashToCurveError> {
    let mut out = G1::new();
    out.map(msg)?;
    Ok(out)
}

/// `hash_to_G2` (§4.1): used once per generator, at `set_generators` time, to turn
/// a frozen domain-separation string into a fixed, non-identity `G2` element.
pub fn hash_to_g2(domain_sep: &str) -> Result<G2, HashToCurveError> {
    let mut out = G2::new();
    out.map(domain_sep.as_bytes())?;
    Ok(out)
}

fn try_and_increment_g1(data: &[u8]) -> Result<G1Projective, HashToCurveError> {
    const MAX_TRIES: u32 = 256;
    for counter in 0..MAX_TRIES {
        let mut hasher = Sha256::new();
        hasher.update(b"bn256-bls-g1");
        hasher.update(&counter.to_be_bytes());
        hasher.update(data);
        let digest = hasher.finalize();
        if let Some(x) = <G1Affine as AffineCurve>::BaseField::from_random_bytes(&digest) {
            if let Some(p) = G1Affine::get_point_from_x(x, false) {
                return Ok(p.mul_by_cofactor().into_projective());
            }
        }
    }
    Err(HashToCurveError::CounterExhausted)
}

fn try_and_increment_g2(data: &[u8]) -> Result<G2Projective, HashToCurveError> {
    const MAX_TRIES: u32 = 256;
    for counter in 0..MAX_TRIES {
        let mut hasher = Sha256::new();
        hasher.update(b"bn256-bls-g2");
        hasher.update(&counter.to_be_bytes());
        hasher.update(data);
        let digest = hasher.finalize();
        if let Some(x) = <G2Affine as AffineCurve>::BaseField::from_random_bytes(&digest) {
            if let Some(p) = G2Affine::get_point_from_x(x, false) {
                return Ok(p.mul_by_cofactor().into_projective());
            }
        }
    }
    Err(HashToCurveError::CounterExhausted)
}

fn to_hex<C: CanonicalSerialize>(c: &C) -> String {
    let mut bytes = vec![0u8; c.serialized_size()];
    c.serialize(&mut &mut bytes[..])
        .expect("writing to a correctly sized buffer cannot fail");
    hex::encode(bytes)
}

fn from_hex<C: CanonicalDeserialize>(s: &str) -> Option<C> {
    let bytes = hex::decode(s).ok()?;
    C::deserialize(&mut &bytes[..]).ok()
}

fn deserialize_field<'de, D, C>(deserializer: D) -> Result<C, D::Error>
where
    D: Deserializer<'de>,
    C: CanonicalDeserialize,
{
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    C::deserialize(&mut &bytes[..]).map_err(DeserializeError::custom)
}

fn serialize_field<S, C>(c: &C, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: CanonicalSerialize,
{
    let mut bytes = vec![0; c.serialized_size()];
    c.serialize(&mut &mut bytes[..])
        .map_err(SerializationError::custom)?;
    s.serialize_bytes(&bytes)
}

fn deserialize_group<'de, D, C>(deserializer: D) -> Result<C, D::Error>
where
    D: Deserializer<'de>,
    C: ProjectiveCurve,
    C::Affine: CanonicalDeserialize,
{
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    let affine =
        C::Affine::deserialize(&mut &bytes[..]).map_err(DeserializeError::custom)?;
    Ok(affine.into_projective())
}

fn serialize_group<S, C>(c: &C, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: ProjectiveCurve,
    C::Affine: CanonicalSerialize,
{
    let affine = c.into_affine();
    let mut bytes = vec![0; affine.serialized_size()];
    affine
        .serialize(&mut &mut bytes[..])
        .map_err(SerializationError::custom)?;
    s.serialize_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;
    use static_assertions::assert_impl_all;

    assert_impl_all!(G1: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(G2: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(GT: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(Scalar: Serialize, DeserializeOwned, Clone);

    #[test]
    fn generators_are_distinct_and_nonzero() {
        let g = hash_to_g2("Fetch.ai Elliptic Curve Generator G").unwrap();
        let h = hash_to_g2("Fetch.ai Elliptic Curve Generator H").unwrap();
        assert_ne!(g, G2::new());
        assert_ne!(h, G2::new());
        assert_ne!(g, h);
    }

    #[test]
    fn scalar_str_round_trip() {
        let mut rng = rand::thread_rng();
        let s = Scalar::rand(&mut rng);
        let decoded = Scalar::from_str(&s.to_str()).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn g1_str_round_trip() {
        let mut rng = rand::thread_rng();
        let p = G1::rand(&mut rng);
        let decoded = G1::from_str(&p.to_str()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(Scalar::from_str("not-hex-and-not-a-scalar").is_err());
    }

    #[test]
    fn pairing_is_bilinear() {
        let mut rng = rand::thread_rng();
        let a = Scalar::rand(&mut rng);
        let g1 = G1::one();
        let g2 = G2::one();

        let mut g1a = g1.clone();
        g1a.mul(&a);
        let mut g2a = g2.clone();
        g2a.mul(&a);

        let lhs = PairingCurve::pair(&g1a, &g2);
        let rhs = PairingCurve::pair(&g1, &g2a);
        assert_eq!(lhs, rhs);
    }
}
