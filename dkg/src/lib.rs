//! DKG / resharing state machine: §4.6 of the design. One [`engine::DkgEngine`]
//! run produces a [`crypto::Share`] and [`crypto::GroupDescriptor`]; the same
//! machine, parameterized with an old group/share, drives resharing.

pub mod crypto_deal;
pub mod engine;
pub mod error;
pub mod message;
pub mod phase;
pub mod polynomial;

pub use engine::{DkgConfig, DkgEngine, DkgOutcome};
pub use error::{Error, Result};
pub use phase::{DkgState, Phase};
