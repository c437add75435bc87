use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The only two knobs a scheme id fixes: chained-vs-unchained message
/// construction, and (for now) a single supported curve/pairing choice.
/// New scheme ids are added here as the system grows; `list_schemes`
/// enumerates exactly this set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeId {
    /// `digest(round, prev) = SHA-256(prev || round_be)`.
    ChainedBls12381G1,
    /// `digest(round, prev) = SHA-256(round_be)`; `prev` is ignored.
    UnchainedBls12381G1,
}

impl SchemeId {
    pub fn is_chained(self) -> bool {
        matches!(self, SchemeId::ChainedBls12381G1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemeId::ChainedBls12381G1 => "bls-chained-g1",
            SchemeId::UnchainedBls12381G1 => "bls-unchained-g1",
        }
    }

    /// All scheme ids this build knows how to speak; backs the `list-schemes`
    /// control-plane command.
    pub fn known() -> &'static [SchemeId] {
        &[SchemeId::ChainedBls12381G1, SchemeId::UnchainedBls12381G1]
    }
}

/// One node's long-term identity within a group, as recorded in the group
/// descriptor. Distinct from the per-epoch threshold [`crate::Share`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Compressed public key bytes for this node's long-term identity.
    pub public_key: Vec<u8>,
    pub address: String,
    pub index: u32,
    pub tls: bool,
    /// Signature of this node over its own `(public_key, address, index)`,
    /// so a peer receiving the group descriptor can authenticate membership
    /// without a separate handshake.
    pub self_signature: Vec<u8>,
}

/// The immutable-within-an-epoch description of the signing committee.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub nodes: Vec<Node>,
    pub threshold: u32,
    pub period: Duration,
    pub catchup_period: Duration,
    pub genesis_time: u64,
    pub transition_time: u64,
    pub genesis_seed: Vec<u8>,
    /// Compressed G2 point: the commitment polynomial evaluated at 0.
    pub public_key: Vec<u8>,
    pub scheme_id: SchemeId,
}

impl GroupDescriptor {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `1 < threshold <= n`; `period > 0`; `catchup_period <= period`;
    /// `genesis_time != 0`. Violations are fatal per §7 "Configuration /
    /// invariant breach" — the handler must refuse to start the epoch.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.len();
        if self.threshold <= 1 || self.threshold as usize > n {
            return Err(format!(
                "invalid threshold {} for group of size {}",
                self.threshold, n
            ));
        }
        if self.period.is_zero() {
            return Err("period must be non-zero".into());
        }
        if self.catchup_period > self.period {
            return Err("catchup_period must not exceed period".into());
        }
        if self.genesis_time == 0 {
            return Err("genesis_time must be non-zero".into());
        }
        Ok(())
    }

    /// A content hash of the descriptor, stable across re-serialization;
    /// used by `chain_info` and to detect accidental descriptor drift.
    pub fn hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(&node.public_key);
            hasher.update(node.address.as_bytes());
            hasher.update(node.index.to_be_bytes());
        }
        hasher.update(self.threshold.to_be_bytes());
        hasher.update((self.period.as_secs()).to_be_bytes());
        hasher.update(self.genesis_time.to_be_bytes());
        hasher.update(&self.genesis_seed);
        hasher.update(&self.public_key);
        hasher.update(self.scheme_id.as_str().as_bytes());
        hasher.finalize().into()
    }
}

/// A finalized round record. `round == 0` is the genesis placeholder and is
/// never produced by the vault: its `signature` is the group's
/// `genesis_seed` by convention and it has no predecessor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub round: u64,
    pub signature: Vec<u8>,
    pub previous_signature: Vec<u8>,
}

impl Beacon {
    pub fn genesis(genesis_seed: Vec<u8>) -> Self {
        Beacon {
            round: 0,
            signature: genesis_seed,
            previous_signature: Vec::new(),
        }
    }

    /// `SHA-256(signature)`, the value actually published to clients.
    pub fn randomness(&self) -> [u8; 32] {
        crate::vault::randomness(&self.signature)
    }
}

/// One node's share of a round's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partial {
    pub round: u64,
    pub previous_signature: Vec<u8>,
    pub signer_index: u32,
    pub sig_share: Vec<u8>,
}
