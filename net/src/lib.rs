//! The randomness beacon's transport facade: §2 "Transport facade" / §6
//! "External interfaces" of the design. Fixes the wire format as
//! Protocol Buffers served over `tonic` (TLS by default), while keeping
//! the core's actual consumption point — [`service::BeaconService`],
//! [`service::DkgService`], [`service::BeaconClient`] — free of any
//! `tonic` types, so a different wire format could be swapped in without
//! touching `beacon` or `dkg`.

pub mod error;
pub mod grpc;
pub mod messages;
pub mod peer;
pub mod service;

pub mod pb {
    tonic::include_proto!("randbeacon");
}

pub use error::{Error, Result};
pub use grpc::{BeaconRegistry, GrpcServer, TonicBeaconClient};
pub use messages::{ChainInfoMsg, DkgAckMsg, DkgEnvelopeMsg, PartialBeaconMsg, StatusMsg};
pub use peer::Peer;
pub use service::{BeaconClient, BeaconEntryStream, BeaconService, DkgService};
