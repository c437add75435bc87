//! Pairing-based threshold BLS primitives: §4.1 of the design.
//!
//! This crate is stateless across rounds (aside from the cached, parsed
//! form a [`vault::Vault`] keeps of its own share). It knows nothing about
//! networking, storage, or scheduling — those live in `net`, `store`, and
//! `beacon` respectively.

pub mod error;
pub mod identity;
pub mod share;
pub mod types;
pub mod vault;

pub use error::{Error, Result};
pub use identity::IdentityKeyPair;
pub use share::Share;
pub use types::{Beacon, GroupDescriptor, Node, Partial, SchemeId};
pub use vault::Vault;
