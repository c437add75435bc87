//! Collapses the per-crate `thiserror` enums (`crypto::Error`,
//! `store::Error`, `net::Error`, `dkg::Error`, `beacon::Error`,
//! `keys::Error`) into the small caller-facing shape §7 asks for: "a small
//! structured `Status` enum (ok / transient / fatal) rather than exposing
//! raw error chains to callers". Every control-plane command in
//! [`crate::control`] returns one of these.

use std::fmt;

/// Outcome of a control-plane command (§7 "Propagation").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Recoverable: the same command is expected to succeed on a retry
    /// (peer unreachable, deadline elapsed, sync not yet caught up).
    Transient(String),
    /// Not recoverable without operator intervention (bad group, missing
    /// share, invariant breach) — the affected beacon id only; other
    /// hosted ids are unaffected (§7 "Propagation").
    Fatal(String),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Status::Fatal(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Status::Transient(msg.into())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Transient(msg) => write!(f, "transient: {msg}"),
            Status::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl From<keys::Error> for Status {
    fn from(err: keys::Error) -> Self {
        Status::Fatal(err.to_string())
    }
}

impl From<dkg::Error> for Status {
    fn from(err: dkg::Error) -> Self {
        match err {
            dkg::Error::Transport(net::Error::Transient(_)) => Status::Transient(err.to_string()),
            _ => Status::Fatal(err.to_string()),
        }
    }
}

impl From<beacon::Error> for Status {
    fn from(err: beacon::Error) -> Self {
        match err {
            beacon::Error::SyncAborted(_) | beacon::Error::Transport(net::Error::Transient(_)) => {
                Status::Transient(err.to_string())
            }
            _ => Status::Fatal(err.to_string()),
        }
    }
}

impl From<net::Error> for Status {
    fn from(err: net::Error) -> Self {
        match err {
            net::Error::Transient(_) => Status::Transient(err.to_string()),
            _ => Status::Fatal(err.to_string()),
        }
    }
}

impl From<crypto::Error> for Status {
    fn from(err: crypto::Error) -> Self {
        Status::Fatal(err.to_string())
    }
}

impl From<store::Error> for Status {
    fn from(err: store::Error) -> Self {
        Status::Fatal(err.to_string())
    }
}
