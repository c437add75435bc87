use thiserror::Error;

/// §7 "Storage" and "Configuration / invariant breach" errors for the
/// persisted-state layout (§6).
#[derive(Debug, Error)]
pub enum Error {
    #[error("identity key not found at {0}")]
    IdentityNotFound(String),
    #[error("group descriptor not found at {0}")]
    GroupNotFound(String),
    #[error("share not found at {0}")]
    ShareNotFound(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed key material at {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Crypto(#[from] crypto::Error),
    #[error("a user-only entropy source was supplied without acknowledging the testing-only flag")]
    UnacknowledgedUserOnlyEntropy,
}

pub type Result<T> = std::result::Result<T, Error>;
