//! Sync manager: §4.5. Two modes share the same peer-iteration shape —
//! catch-up closes a gap to a target round, validate-and-correct audits a
//! range and refetches faulty beacons — using a "try next peer on any
//! validation failure" loop adapted to a strict round-indexed, gap-free log.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing::{info, instrument, warn};

use crypto::{Beacon, GroupDescriptor};
use net::{BeaconClient, Peer};
use store::ChainStore;

use crate::error::{Error, Result};
use crate::peer_manager::PeerManager;

/// Per-stream-item inactivity deadline (§5 "a per-RPC inactivity timeout
/// (a few seconds) applies to outbound sync streams").
const STREAM_INACTIVITY: Duration = Duration::from_secs(5);

pub struct SyncManager {
    beacon_id: String,
    store: Arc<ChainStore>,
    client: Arc<dyn BeaconClient>,
    peers: Arc<PeerManager>,
}

/// One round's outcome from [`SyncManager::validate_chain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundVerdict {
    Ok,
    Missing,
    Invalid,
}

impl SyncManager {
    pub fn new(beacon_id: String, store: Arc<ChainStore>, client: Arc<dyn BeaconClient>, peers: Arc<PeerManager>) -> Self {
        SyncManager {
            beacon_id,
            store,
            client,
            peers,
        }
    }

    fn verify(&self, group: &GroupDescriptor, beacon: &Beacon) -> std::result::Result<(), ()> {
        crypto::vault::verify_beacon(&group.public_key, group.scheme_id, beacon).map_err(|_| ())
    }

    /// Checks the hash-chain link for a chained scheme: `beacon.previous_signature`
    /// must equal the stored signature of `beacon.round - 1`.
    fn check_chain_link(&self, group: &GroupDescriptor, beacon: &Beacon) -> bool {
        if !group.scheme_id.is_chained() || beacon.round == 0 {
            return true;
        }
        match self.store.get(beacon.round - 1) {
            Ok(prev) => prev.signature == beacon.previous_signature,
            Err(_) => false,
        }
    }

    /// Catch-up: closes the gap to `target_round` by streaming from peers,
    /// in the order [`PeerManager::order`] proposes, dropping and moving to
    /// the next peer on any validation failure (§4.5 steps 1-4). Bounded by
    /// `deadline`, the next wall-clock round boundary (§4.5 step 5, hard).
    #[instrument(skip(self, group, peers, deadline), fields(beacon_id = %self.beacon_id))]
    pub async fn run_sync(&self, target_round: u64, group: &GroupDescriptor, peers: &[Peer], deadline: Duration) -> Result<u64> {
        let overall = tokio::time::timeout(deadline, self.run_sync_inner(target_round, group, peers));
        match overall.await {
            Ok(result) => result,
            Err(_) => Err(Error::SyncAborted("catch-up deadline elapsed before target round was reached".into())),
        }
    }

    async fn run_sync_inner(&self, target_round: u64, group: &GroupDescriptor, peers: &[Peer]) -> Result<u64> {
        let mut from = self.store.last().map(|b| b.round + 1).unwrap_or(1);
        if from > target_round {
            return Ok(from.saturating_sub(1));
        }
        let ordered = self.peers.order(peers);
        for peer in &ordered {
            if from > target_round {
                break;
            }
            match self.drain_peer_stream(peer, from, group).await {
                Ok(advanced_to) => {
                    from = advanced_to;
                    self.peers.record_success(peer, 0);
                }
                Err(e) => {
                    warn!(peer = %peer.address, error = %e, "sync stream failed, trying next peer");
                    self.peers.record_failure(peer);
                    continue;
                }
            }
        }
        if from <= target_round {
            return Err(Error::SyncAborted(format!(
                "exhausted peers with head still at round {}, target {}",
                from.saturating_sub(1),
                target_round
            )));
        }
        info!(head = from - 1, "catch-up complete");
        Ok(from - 1)
    }

    /// Consumes one peer's `sync_chain` stream starting at `from`, storing
    /// each valid beacon in order; returns the round one past the last one
    /// successfully stored, or an error on the first invalid/out-of-order
    /// item (the caller then tries the next peer, §4.5 step 3).
    async fn drain_peer_stream(&self, peer: &Peer, mut from: u64, group: &GroupDescriptor) -> Result<u64> {
        let mut stream = self.client.sync_chain(peer, &self.beacon_id, from).await?;
        loop {
            let item = match tokio::time::timeout(STREAM_INACTIVITY, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => return Err(Error::SyncAborted("stream inactivity timeout".into())),
            };
            let beacon = item?;
            if beacon.round != from {
                return Err(Error::SyncAborted(format!("expected round {from}, got {}", beacon.round)));
            }
            if self.verify(group, &beacon).is_err() {
                return Err(Error::SyncAborted(format!("round {from} failed signature verification")));
            }
            if !self.check_chain_link(group, &beacon) {
                return Err(Error::SyncAborted(format!("round {from} failed hash-chain link check")));
            }
            self.store.put(&beacon)?;
            from += 1;
        }
        Ok(from)
    }

    /// Walks the store from 0 to `up_to`, verifying each present round;
    /// calls `cb(round, verdict)` for every round in range and returns the
    /// faulty-or-missing ones (§4.5 "Validate").
    #[instrument(skip(self, group, cb), fields(beacon_id = %self.beacon_id))]
    pub fn validate_chain(&self, up_to: u64, group: &GroupDescriptor, mut cb: impl FnMut(u64, RoundVerdict)) -> Vec<u64> {
        let mut faulty = Vec::new();
        for round in 0..=up_to {
            let verdict = match self.store.get(round) {
                Ok(beacon) => {
                    if round == 0 {
                        RoundVerdict::Ok
                    } else if self.verify(group, &beacon).is_ok() && self.check_chain_link(group, &beacon) {
                        RoundVerdict::Ok
                    } else {
                        RoundVerdict::Invalid
                    }
                }
                Err(_) => RoundVerdict::Missing,
            };
            if verdict != RoundVerdict::Ok {
                faulty.push(round);
            }
            cb(round, verdict);
        }
        faulty
    }

    /// Corrects a set of known-faulty rounds by refetching each individually
    /// (distinct from catch-up's contiguous-suffix walk, §4.5 "Correct").
    #[instrument(skip(self, group, peers, cb), fields(beacon_id = %self.beacon_id))]
    pub async fn run_resync(
        &self,
        faulty_rounds: &[u64],
        group: &GroupDescriptor,
        peers: &[Peer],
        mut cb: impl FnMut(u64, bool),
    ) -> Result<()> {
        let ordered = self.peers.order(peers);
        for &round in faulty_rounds {
            let mut fixed = false;
            for peer in &ordered {
                match self.fetch_one(peer, round, group).await {
                    Ok(beacon) => {
                        self.store.del(round)?;
                        self.store.put(&beacon)?;
                        self.peers.record_success(peer, 0);
                        fixed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %peer.address, round, error = %e, "resync fetch failed, trying next peer");
                        self.peers.record_failure(peer);
                    }
                }
            }
            cb(round, fixed);
        }
        Ok(())
    }

    async fn fetch_one(&self, peer: &Peer, round: u64, group: &GroupDescriptor) -> Result<Beacon> {
        let mut stream = self.client.sync_chain(peer, &self.beacon_id, round).await?;
        let item = tokio::time::timeout(STREAM_INACTIVITY, stream.next())
            .await
            .map_err(|_| Error::SyncAborted("stream inactivity timeout".into()))?
            .ok_or_else(|| Error::SyncAborted("peer closed stream with no beacon".into()))?;
        let beacon = item?;
        if beacon.round != round {
            return Err(Error::SyncAborted(format!("expected round {round}, got {}", beacon.round)));
        }
        if self.verify(group, &beacon).is_err() || !self.check_chain_link(group, &beacon) {
            return Err(Error::SyncAborted(format!("round {round} failed verification on resync")));
        }
        Ok(beacon)
    }
}
