use thiserror::Error;

/// §7 "DKG failure" category: every variant here ends the run in
/// `Aborted`; none are retried within the same run (the operator reruns).
#[derive(Debug, Error)]
pub enum Error {
    #[error("dkg phase {current} cannot accept a {got} message")]
    UnexpectedMessage { current: &'static str, got: &'static str },
    #[error("accept did not carry the shared setup secret")]
    BadSetupSecret,
    #[error("timed out waiting for {0} in phase {1}")]
    Timeout(&'static str, &'static str),
    #[error("fewer than threshold ({needed}) dealers survived complaints ({got})")]
    InsufficientDealers { needed: usize, got: usize },
    #[error("participant index {0} is not a member of this dkg session")]
    UnknownParticipant(u32),
    #[error("deal decryption failed for recipient {0}")]
    DealDecryption(u32),
    #[error("deal failed to verify against its dealer's commitment")]
    InvalidDeal,
    #[error(transparent)]
    Crypto(#[from] crypto::Error),
    #[error("malformed dkg payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] net::Error),
    #[error("resharing requires a quorum of the previous committee; have {have}, need {need}")]
    ResharingQuorum { have: usize, need: usize },
    #[error("malformed group element or scalar encoding: {0}")]
    Encoding(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
