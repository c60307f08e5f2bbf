//! Error types for share-level rejection and round-level failure.

use crate::cabinet::{Address, CabinetIndex};
use bn256_bls::curve::CurveError;
use thiserror::Error;

/// A fault in a single inbound message. Always locally absorbed: the caller
/// drops the message and, where the protocol calls for it, turns the fault
/// into a complaint against its sender. Never propagated as a round failure.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("could not decode a curve element from peer {0}")]
    Decode(CabinetIndex, #[source] CurveError),

    #[error("sender {0} is not a member of the current cabinet")]
    UnknownSender(CabinetIndex),

    #[error("duplicate submission from {0} for this round")]
    DuplicateSubmission(CabinetIndex),

    #[error("coefficients from {0} were already recorded")]
    DuplicateCoefficients(CabinetIndex),

    #[error("phase-1 invariant failed for dealer {dealer} at recipient {recipient}")]
    InvariantViolation {
        dealer: CabinetIndex,
        recipient: CabinetIndex,
    },
}

/// A round-level failure. Unlike [`ShareError`], every variant here is fatal
/// for the participant observing it: the setup service transitions to
/// `Final` with no DKG output.
#[derive(Debug, Error)]
pub enum DKGError {
    #[error("this node was excluded from QUAL")]
    NotInQual,

    #[error("QUAL has only {0} members, need more than threshold {1}")]
    QualTooSmall(usize, usize),

    #[error("reconstruction of {owner}'s polynomial had only {have} good shares, need more than {need}")]
    InsufficientShares {
        owner: Address,
        have: usize,
        need: usize,
    },

    #[error("too many qual-complaints were upheld: {0} > threshold {1}")]
    TooManyQualComplaints(usize, usize),

    #[error("interpolation is degenerate: {0} points given, or duplicate indices present")]
    DegenerateInterpolation(String),

    #[error(transparent)]
    Poly(#[from] bn256_bls::poly::PolyError),
}
