//! Multi-beacon-id hosting and the control-plane command surface (§2.1
//! "Multi-beacon-id hosting", §6 "Control-plane"). Everything upstream of
//! this crate (`crypto`, `store`, `net`, `dkg`, `beacon`, `keys`) is
//! wire/storage/scheduling machinery for *one* beacon id; `node` is the
//! thin layer a host process embeds to run an arbitrary number of them in
//! one address space, sharing only the transport facade.

pub mod config;
pub mod control;
pub mod registry;
pub mod status;

pub use config::{DkgTimeoutsConfig, NodeConfig, SyncConfig};
pub use registry::NodeRuntime;
pub use status::Status;
