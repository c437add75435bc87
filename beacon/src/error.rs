use thiserror::Error;

/// §7 error taxonomy, beacon-production slice. `Transient` and `Validation`
/// are the two locally-recoverable categories the handler and sync manager
/// never retry from the same source/at the same tick; `Storage` and
/// `Invariant` are surfaced to the control plane per §7 "Propagation".
#[derive(Debug, Error)]
pub enum Error {
    #[error("partial for round {round} is more than one round ahead of wall-clock round {wall_clock}")]
    FutureRound { round: u64, wall_clock: u64 },
    #[error("signer index {0} is out of range or is this node's own index")]
    BadSignerIndex(u32),
    #[error("partial failed verification against the group's commitment polynomial")]
    InvalidPartial,
    #[error("round/time arithmetic overflowed")]
    RoundOverflow,
    #[error("handler is stopped and cannot be restarted")]
    HandlerStopped,
    #[error("no beacon stored above requested round")]
    NoBeaconAboveRequested,
    #[error("sync aborted: {0}")]
    SyncAborted(String),
    #[error("group descriptor is invalid: {0}")]
    InvalidGroup(String),
    #[error(transparent)]
    Crypto(#[from] crypto::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error(transparent)]
    Transport(#[from] net::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for net::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(e) => e,
            Error::NoBeaconAboveRequested => net::Error::NoBeaconAboveRequested,
            Error::FutureRound { .. } | Error::BadSignerIndex(_) | Error::InvalidPartial => {
                net::Error::Malformed(err.to_string())
            }
            other => net::Error::Rejected(other.to_string()),
        }
    }
}
