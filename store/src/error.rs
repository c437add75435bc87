use thiserror::Error;

/// §7 "Storage" errors, plus the cursor's distinguished end-of-stream
/// signal used by callers to detect "no more beacons" without treating it
/// as a fault.
#[derive(Debug, Error)]
pub enum Error {
    #[error("round {round} already stored with a different beacon")]
    Mismatch { round: u64 },
    #[error("round {0} not found")]
    NotFound(u64),
    #[error("no beacon stored yet")]
    EmptyStore,
    #[error("no more beacons past the current cursor position")]
    NoMoreBeacons,
    #[error("underlying store engine failure: {0}")]
    Backend(#[from] sled::Error),
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row at round {round}: {source}")]
    Corrupt {
        round: u64,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
