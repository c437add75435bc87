//! Wire-agnostic message types for the inbound RPC surface (§6). These are
//! what `BeaconService`/`DkgService` implementors (the `beacon` and `dkg`
//! crates) actually see; the protobuf/tonic encoding lives only in
//! `grpc.rs` so the core never takes a direct `tonic` dependency at its
//! protocol seams.

use crypto::Beacon;

#[derive(Clone, Debug)]
pub struct PartialBeaconMsg {
    pub round: u64,
    pub previous_signature: Vec<u8>,
    pub signer_index: u32,
    pub partial_sig: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SyncChainRequestMsg {
    pub from_round: u64,
}

#[derive(Clone, Debug)]
pub struct ChainInfoMsg {
    pub public_key: Vec<u8>,
    pub period_seconds: u64,
    pub genesis_time: u64,
    pub hash: Vec<u8>,
    pub genesis_seed: Vec<u8>,
    pub scheme_id: String,
}

#[derive(Clone, Debug, Default)]
pub struct StatusMsg {
    pub running: bool,
    pub serving: bool,
    pub chain_head: u64,
    pub known_peers: Vec<String>,
}

/// One phase-tagged DKG packet. The payload is opaque to the transport and
/// interpreted entirely by the `dkg` crate (§6.1).
#[derive(Clone, Debug)]
pub struct DkgEnvelopeMsg {
    pub sender_index: u32,
    pub phase: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct DkgAckMsg {
    pub ok: bool,
    pub error: String,
}

impl DkgAckMsg {
    pub fn ok() -> Self {
        DkgAckMsg {
            ok: true,
            error: String::new(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        DkgAckMsg {
            ok: false,
            error: msg.into(),
        }
    }
}

pub(crate) fn beacon_to_proto(b: &Beacon) -> crate::pb::BeaconReply {
    crate::pb::BeaconReply {
        round: b.round,
        signature: b.signature.clone(),
        previous_signature: b.previous_signature.clone(),
    }
}

pub(crate) fn beacon_from_proto(b: crate::pb::BeaconReply) -> Beacon {
    Beacon {
        round: b.round,
        signature: b.signature,
        previous_signature: b.previous_signature,
    }
}
