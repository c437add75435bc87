//! The narrow interface the core consumes (§2 "Transport facade"). The
//! beacon handler, sync manager, and DKG engine implement
//! [`BeaconService`]/[`DkgService`] and never see `tonic` directly; the
//! `grpc` module adapts these traits onto the generated gRPC service.

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::{Error, Result};
use crate::messages::{ChainInfoMsg, DkgAckMsg, DkgEnvelopeMsg, PartialBeaconMsg, StatusMsg};
use crypto::Beacon;

/// A stream of beacons in strictly ascending round order, as yielded by
/// `sync_chain` on either side of the wire (§4.5, §6).
pub type BeaconEntryStream = Pin<Box<dyn Stream<Item = std::result::Result<Beacon, Error>> + Send>>;

/// Server-side handler for the beacon-production RPCs (`partial_beacon`,
/// `sync_chain`, `chain_info`, `status`). One implementor per hosted
/// beacon id; the `node` crate's registry dispatches by `beacon_id` before
/// calling in.
#[async_trait]
pub trait BeaconService: Send + Sync {
    async fn partial_beacon(&self, msg: PartialBeaconMsg) -> Result<()>;
    async fn sync_chain(&self, from_round: u64) -> Result<BeaconEntryStream>;
    async fn chain_info(&self) -> Result<ChainInfoMsg>;
    async fn status(&self) -> Result<StatusMsg>;
}

/// Server-side handler for the `dkg/*` RPC family (§6).
#[async_trait]
pub trait DkgService: Send + Sync {
    async fn propose(&self, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn accept(&self, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn deal(&self, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn response(&self, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
}

/// Client-side counterpart: what the beacon handler's broadcast fan-out
/// and the sync manager call against a [`crate::Peer`]. Pluggable — the
/// core depends only on this trait, not on any particular client.
#[async_trait]
pub trait BeaconClient: Send + Sync {
    async fn partial_beacon(&self, peer: &crate::Peer, beacon_id: &str, msg: PartialBeaconMsg) -> Result<()>;
    async fn sync_chain(&self, peer: &crate::Peer, beacon_id: &str, from_round: u64) -> Result<BeaconEntryStream>;
    async fn chain_info(&self, peer: &crate::Peer, beacon_id: &str) -> Result<ChainInfoMsg>;
    async fn status(&self, peer: &crate::Peer, beacon_id: &str) -> Result<StatusMsg>;
    async fn dkg_propose(&self, peer: &crate::Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn dkg_accept(&self, peer: &crate::Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn dkg_deal(&self, peer: &crate::Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
    async fn dkg_response(&self, peer: &crate::Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg>;
}
