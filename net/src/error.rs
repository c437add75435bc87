use thiserror::Error;

/// §7 error taxonomy, transport-facing slice. `Transient` covers the
/// "Transient network" category (peer unreachable, stream reset, deadline);
/// it is the only variant callers should retry against a different peer or
/// on the next tick. The others are "Protocol violation" / "Validation"
/// and are returned to the RPC caller without retry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("peer rejected request: {0}")]
    Rejected(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("no beacon stored above requested round")]
    NoBeaconAboveRequested,
    #[error("unknown beacon id: {0}")]
    UnknownBeaconId(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Aborted => {
                Error::Transient(status.message().to_string())
            }
            tonic::Code::NotFound => Error::NoBeaconAboveRequested,
            tonic::Code::InvalidArgument => Error::Malformed(status.message().to_string()),
            _ => Error::Rejected(status.message().to_string()),
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Transient(msg) => tonic::Status::unavailable(msg),
            Error::Rejected(msg) => tonic::Status::permission_denied(msg),
            Error::Malformed(msg) => tonic::Status::invalid_argument(msg),
            Error::NoBeaconAboveRequested => {
                tonic::Status::not_found("no beacon stored above requested round")
            }
            Error::UnknownBeaconId(id) => tonic::Status::not_found(format!("unknown beacon id {id}")),
        }
    }
}
