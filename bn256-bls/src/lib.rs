//! # BN256 curve and polynomial primitives
//!
//! This crate wraps the BN254/BN256 pairing-friendly curve behind the generic
//! [`group`] traits, and provides the polynomial arithmetic used to build and
//! interpolate Pedersen-VSS secret shares.
//!
//! ```rust
//! use bn256_bls::curve::bn256::{G2, PairingCurve};
//! use bn256_bls::group::{Element, PairingCurve as _, Point};
//!
//! // public keys and signature generators live on G2
//! let g = G2::one();
//! assert_ne!(g, G2::new());
//! ```
//!
//! Threshold secret sharing is built on top of [`poly::Poly`]:
//!
//! ```rust
//! use bn256_bls::poly::{Poly, Idx};
//! use bn256_bls::curve::bn256::Scalar;
//!
//! let (n, t) = (5usize, 3usize);
//! let private_poly = Poly::<Scalar>::new(t - 1);
//! let shares = (0..n as Idx).map(|i| private_poly.eval(i)).collect::<Vec<_>>();
//! let recovered = Poly::<Scalar>::recover(t, shares).unwrap();
//! assert_eq!(&recovered, private_poly.public_key());
//! ```

/// Curve implementation for the traits defined in [`group`].
pub mod curve;

/// Definitions of generic traits over scalars of prime fields and points on elliptic curves.
pub mod group;

/// Polynomial evaluation, interpolation and commitment used for secret sharing.
pub mod poly;
