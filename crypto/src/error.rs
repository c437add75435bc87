use thiserror::Error;

/// Errors surfaced by the pairing vault.
///
/// These map onto the "Validation" and "Configuration / invariant breach"
/// categories of the error taxonomy; none of them are retried against the
/// same input by a caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("signer index {0} is out of range for a group of size {1}")]
    SignerIndexOutOfRange(u32, usize),
    #[error("partial signature for round {0} failed verification against the commitment polynomial")]
    InvalidPartial(u64),
    #[error("fewer than the threshold ({needed}) verified shares were supplied ({got})")]
    InsufficientShares { needed: usize, got: usize },
    #[error("reconstructed signature failed verification under the group public key")]
    InvalidAggregate,
    #[error("beacon signature for round {0} failed verification under the group public key")]
    InvalidBeacon(u64),
    #[error("malformed group element or scalar encoding")]
    MalformedEncoding,
    #[error("commitment polynomial is empty")]
    EmptyCommitments,
    #[error("duplicate signer index {0} in share set")]
    DuplicateSigner(u32),
    #[error("identity signature failed verification")]
    InvalidIdentitySignature,
}

pub type Result<T> = std::result::Result<T, Error>;
