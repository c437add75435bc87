//! tonic/gRPC wire adapter: the one place in this crate that imports
//! `tonic` generated code. Everything above this module (the core, via
//! `BeaconService`/`DkgService`/`BeaconClient`) stays wire-format agnostic.

pub mod client;
pub mod server;

pub use client::TonicBeaconClient;
pub use server::{BeaconRegistry, GrpcServer};
