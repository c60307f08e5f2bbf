pub mod bn256;

use thiserror::Error;

/// Error which unifies curve-specific errors behind one type so callers outside
/// this crate never need to name the backing pairing library directly.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("failed to decode a curve element or scalar from its string encoding")]
    DecodeError,

    #[error("hash-to-curve failed: {0}")]
    HashToCurve(String),
}
