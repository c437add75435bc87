use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// This node's slice of the group secret, as produced by DKG/resharing.
///
/// `commitments[0]` evaluated through [`crate::vault::eval_commitment`] at `0`
/// equals the group public key; this is checked once at load time by
/// [`crate::vault::Vault::new`], not on every signing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub index: u32,
    /// Little-endian encoding of the scalar `p(index)` on the group's secret
    /// polynomial. Zeroized on drop by the holder (see `keys::share_store`);
    /// this type itself is a plain data carrier.
    pub scalar: Vec<u8>,
    /// Compressed G2 points, one per polynomial coefficient, lowest degree
    /// first. `commitments.len() == threshold`.
    pub commitments: Vec<Vec<u8>>,
}

impl Drop for Share {
    fn drop(&mut self) {
        self.scalar.zeroize();
    }
}
