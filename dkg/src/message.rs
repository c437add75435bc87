//! DKG packet payloads (§4.6.1). Each is serialized to JSON and carried as
//! the opaque `payload` of a [`net::DkgEnvelopeMsg`]; `phase` on the
//! envelope names the variant for logging and routing, the RPC method used
//! (`propose`/`accept`/`deal`/`response`) names the category.

use crypto::{GroupDescriptor, Node};
use serde::{Deserialize, Serialize};

/// Leader -> followers: the proposed group and a hash of the pre-shared
/// setup secret (never the secret itself) so followers can later prove
/// membership without the leader re-transmitting it in cleartext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub group: GroupDescriptor,
    pub is_reshare: bool,
    /// Present only for a reshare: the previous epoch's group, needed by
    /// followers to locate their old share and compute old-committee
    /// Lagrange weights.
    pub old_group: Option<GroupDescriptor>,
}

/// Follower -> leader: proof of membership via the shared setup secret,
/// authenticated by the follower's long-term identity signature over it
/// (§4.6 invariant (c)). `public_key` lets the leader look up which group
/// node is accepting and verify `setup_secret_proof` against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Accept {
    pub setup_secret_proof: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Leader -> followers, once every invited node has accepted: the
/// finalized, order-stable participant list every dealer commits to
/// before dealing (§4.6 "Proposing" exit condition).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Start {
    pub participants: Vec<Node>,
}

/// One dealer's contribution: a Feldman/Pedersen commitment to its
/// sub-polynomial, plus one encrypted evaluation per recipient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deal {
    pub dealer_index: u32,
    /// Compressed G2 points, lowest-degree coefficient first.
    pub commitments: Vec<Vec<u8>>,
    pub encrypted_shares: Vec<EncryptedShare>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedShare {
    pub recipient_index: u32,
    /// Ephemeral G2 point used for this message's ECDH exchange.
    pub ephemeral_public: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Recipient's verdict on one dealer's deal, broadcast to every other
/// participant (§4.6.1 "a `Complain` response ... marks that dealer's
/// contribution as excluded").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub dealer_index: u32,
    pub recipient_index: u32,
    pub complaint: bool,
}

/// The tagged union actually carried in an envelope's `payload`, so one
/// `phase` string maps onto exactly one variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DkgMessage {
    Proposal(Proposal),
    Accept(Accept),
    Start(Start),
    Deal(Deal),
    Response(Response),
}

impl DkgMessage {
    pub fn phase_tag(&self) -> &'static str {
        match self {
            DkgMessage::Proposal(_) => "proposal",
            DkgMessage::Accept(_) => "accept",
            DkgMessage::Start(_) => "start",
            DkgMessage::Deal(_) => "deal",
            DkgMessage::Response(_) => "response",
        }
    }

    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("DkgMessage is serializable")
    }

    pub fn from_payload(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
