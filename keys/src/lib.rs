//! Long-term node identity, group descriptor, and share persistence: §6
//! "Persisted state layout" of the design, using a load/flush keystore
//! pattern.

pub mod entropy;
pub mod error;
pub mod perm;
pub mod store;

pub use entropy::{default_rng, DkgEntropySource};
pub use error::{Error, Result};
pub use store::KeyStore;
