//! The beacon handler: §4.3. Owns the tick loop, the incoming-partial RPC
//! surface, and the glue between the aggregator, the chain store, and the
//! sync manager. One instance per hosted beacon id; the `node` crate's
//! registry looks an instance up by `beacon_id` before dispatching into it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crypto::{Beacon, GroupDescriptor, Partial, Vault};
use net::{
    BeaconClient, BeaconEntryStream, BeaconService, ChainInfoMsg, Error as NetError, Peer,
    PartialBeaconMsg, Result as NetResult, StatusMsg,
};
use store::ChainStore;

use crate::aggregator::{reconstruct, Admission, Aggregator};
use crate::error::Error;
use crate::monitor::ThresholdMonitor;
use crate::peer_manager::PeerManager;
use crate::sync::SyncManager;
use crate::ticker::{schedule_hurry_up, time_of_round, Tick, Ticker};

/// §4.3 "States": `Stopped` is entered once and is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    Stopped,
    Running,
    Serving,
}

/// The allowed clock-skew slack on an inbound partial: at most one round
/// ahead of the local wall-clock round (§4.3 "Incoming partial handler").
const ROUND_SLACK: u64 = 1;

/// Delay before a "hurry-up" re-tick once the handler notices it just
/// caught up a round (§4.3 "Catch-up tick"): the group's catchup period.
pub struct BeaconHandler {
    beacon_id: String,
    store: Arc<ChainStore>,
    vault: RwLock<Arc<Vault>>,
    group: RwLock<Arc<GroupDescriptor>>,
    client: Arc<dyn BeaconClient>,
    peer_manager: Arc<PeerManager>,
    aggregator: Aggregator,
    monitor: Arc<ThresholdMonitor>,
    sync: SyncManager,
    state: RwLock<HandlerState>,
    cancel: CancellationToken,
    last_tick_round: AtomicU64,
    hurry_tx: flume::Sender<Tick>,
    hurry_rx: flume::Receiver<Tick>,
}

impl BeaconHandler {
    pub fn new(
        beacon_id: impl Into<String>,
        store: Arc<ChainStore>,
        vault: Vault,
        group: GroupDescriptor,
        client: Arc<dyn BeaconClient>,
    ) -> Self {
        let beacon_id = beacon_id.into();
        let peer_manager = Arc::new(PeerManager::new());
        let threshold = group.threshold;
        let (hurry_tx, hurry_rx) = flume::unbounded();
        BeaconHandler {
            sync: SyncManager::new(beacon_id.clone(), store.clone(), client.clone(), peer_manager.clone()),
            beacon_id,
            store,
            vault: RwLock::new(Arc::new(vault)),
            group: RwLock::new(Arc::new(group)),
            client,
            peer_manager,
            aggregator: Aggregator::new(),
            monitor: Arc::new(ThresholdMonitor::new(32, threshold)),
            state: RwLock::new(HandlerState::Stopped),
            cancel: CancellationToken::new(),
            last_tick_round: AtomicU64::new(0),
            hurry_tx,
            hurry_rx,
        }
    }

    pub fn state(&self) -> HandlerState {
        *self.state.read()
    }

    pub fn group(&self) -> Arc<GroupDescriptor> {
        self.group.read().clone()
    }

    pub fn vault(&self) -> Arc<Vault> {
        self.vault.read().clone()
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    /// The handler's chain store, for control-plane operations (`backup`)
    /// that need the raw store rather than a handler-mediated view.
    pub fn store(&self) -> Arc<ChainStore> {
        self.store.clone()
    }

    /// Atomically swaps in the post-reshare share and group descriptor at
    /// `transition_time` (§5 "a resharing atomically swaps it"). The caller
    /// (the `node` crate's reshare orchestration) is responsible for timing
    /// the call to that boundary.
    pub fn swap_epoch(&self, vault: Vault, group: GroupDescriptor) {
        *self.vault.write() = Arc::new(vault);
        *self.group.write() = Arc::new(group);
        info!(beacon_id = %self.beacon_id, "epoch swapped after reshare");
    }

    fn peers(&self, group: &GroupDescriptor) -> Vec<Peer> {
        let vault = self.vault.read();
        let self_index = vault.index();
        group
            .nodes
            .iter()
            .filter(|n| n.index != self_index)
            .map(|n| Peer::new(n.address.clone(), n.tls))
            .collect()
    }

    /// Starts the tick loop and returns once it has been spawned; the loop
    /// itself runs until `stop` is called or an unrecoverable error occurs
    /// (§4.3 "Running means the loop is alive").
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if *state != HandlerState::Stopped {
                return;
            }
            *state = HandlerState::Running;
        }
        let group = self.group();
        let ticker = Ticker::new(group.genesis_time, group.period);
        let ticks = ticker.spawn(self.cancel.clone());
        let handler = self.clone();
        tokio::spawn(async move {
            handler.run(ticks).await;
        });
    }

    /// Cancels the root context and closes the chain store's callbacks
    /// (§5 "stop cancels the root context"; §4.4 "once with closed=true when
    /// the handler stops"). Terminal: a stopped handler cannot be restarted.
    pub fn stop(&self) {
        let mut state = self.state.write();
        if *state == HandlerState::Stopped {
            return;
        }
        *state = HandlerState::Stopped;
        self.cancel.cancel();
        if let Ok(last) = self.store.last() {
            self.store.close_callbacks(&last);
        }
    }

    async fn run(self: Arc<Self>, ticks: flume::Receiver<Tick>) {
        let hurry_rx = self.hurry_rx.clone();
        loop {
            tokio::select! {
                tick = ticks.recv_async() => {
                    match tick {
                        Ok(tick) => self.on_tick(tick).await,
                        Err(_) => {
                            debug!("ticker channel closed, handler loop exiting");
                            break;
                        }
                    }
                }
                tick = hurry_rx.recv_async() => {
                    if let Ok(tick) = tick {
                        self.on_tick(tick).await;
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }
    }

    #[instrument(skip(self), fields(beacon_id = %self.beacon_id, round = tick.round))]
    async fn on_tick(&self, tick: Tick) {
        {
            let mut state = self.state.write();
            if *state == HandlerState::Running {
                *state = HandlerState::Serving;
            }
        }
        self.last_tick_round.store(tick.round, Ordering::SeqCst);
        self.monitor.begin_round();

        let last = match self.store.last() {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "chain store has no rows at all, cannot tick");
                return;
            }
        };

        let (prev_sig, target_round) = if last.round >= tick.round {
            (last.previous_signature.clone(), last.round)
        } else {
            (last.signature.clone(), last.round + 1)
        };

        let group = self.group();
        let vault = self.vault();
        let msg = vault.digest(target_round, &prev_sig);

        let partial = match vault.sign_partial(target_round, &prev_sig) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to produce local partial");
                return;
            }
        };

        self.admit_and_maybe_finalize(target_round, msg.clone(), prev_sig.clone(), partial.clone(), &vault, &group);

        let peers = self.peers(&group);
        let ordered = self.peer_manager.order(&peers);
        let wire = PartialBeaconMsg {
            round: target_round,
            previous_signature: prev_sig,
            signer_index: partial.signer_index,
            partial_sig: partial.sig_share,
        };
        for peer in ordered {
            let client = self.client.clone();
            let beacon_id = self.beacon_id.clone();
            let wire = wire.clone();
            let monitor = self.monitor.clone();
            let peer_manager = self.peer_manager.clone();
            tokio::spawn(async move {
                let ok = client.partial_beacon(&peer, &beacon_id, wire).await.is_ok();
                monitor.record_delivery(&peer.address, ok);
                if ok {
                    peer_manager.record_success(&peer, 0);
                } else {
                    peer_manager.record_failure(&peer);
                }
            });
        }

        if last.round + 1 < tick.round {
            self.trigger_catchup(tick.round, &group).await;
        }

        let stored_head = self.store.last().map(|b| b.round).unwrap_or(last.round);
        if stored_head < tick.round {
            // Still behind wall-clock after this tick's signing attempt; rerun
            // immediately after one catchup period instead of waiting for the
            // next full-period tick (§4.3 "Catch-up tick").
            let next_target = stored_head + 1;
            let deadline = time_of_round(group.genesis_time, group.period, next_target).unwrap_or(tick.deadline);
            schedule_hurry_up(group.catchup_period, next_target, deadline, self.hurry_tx.clone(), self.cancel.clone());
        }
    }

    fn admit_and_maybe_finalize(
        &self,
        round: u64,
        msg: Vec<u8>,
        prev_sig: Vec<u8>,
        partial: Partial,
        vault: &Vault,
        group: &GroupDescriptor,
    ) {
        match self.aggregator.admit(round, msg, prev_sig, partial, group.threshold) {
            Admission::ThresholdReached { msg, prev_sig: _, shares } => {
                self.finalize_round(round, &msg, &shares, vault, group);
            }
            Admission::Pending | Admission::DuplicateSigner => {}
        }
    }

    fn finalize_round(&self, round: u64, msg: &[u8], shares: &[Partial], vault: &Vault, group: &GroupDescriptor) {
        let signature = match reconstruct(vault, msg, shares, group.threshold) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(round, error = %e, "threshold reached but reconstruction failed, waiting for more shares");
                return;
            }
        };
        let previous_signature = if group.scheme_id.is_chained() {
            shares[0].previous_signature.clone()
        } else {
            Vec::new()
        };
        let beacon = Beacon {
            round,
            signature,
            previous_signature,
        };
        if let Err(e) = vault.verify_beacon(&beacon) {
            error!(round, error = %e, "reconstructed signature failed verification, discarding");
            return;
        }
        match self.store.put(&beacon) {
            Ok(()) => {
                self.aggregator.drop_round(round);
                self.aggregator.prune_below(round.saturating_sub(1));
                info!(round, "beacon produced");
            }
            Err(e) => error!(round, error = %e, "failed to persist finalized beacon"),
        }
    }

    async fn trigger_catchup(&self, current_round: u64, group: &GroupDescriptor) {
        let peers = self.peers(group);
        let deadline = Duration::from_secs(group.period.as_secs().max(1));
        match self.sync.run_sync(current_round.saturating_sub(1), group, &peers, deadline).await {
            Ok(head) => info!(head, "catch-up sync closed the gap"),
            Err(e) => warn!(error = %e, "catch-up sync did not fully close the gap"),
        }
    }
}

#[async_trait]
impl BeaconService for BeaconHandler {
    #[instrument(skip(self, msg), fields(beacon_id = %self.beacon_id, round = msg.round))]
    async fn partial_beacon(&self, msg: PartialBeaconMsg) -> NetResult<()> {
        let wall_clock = self.last_tick_round.load(Ordering::SeqCst);
        if wall_clock > 0 && msg.round > wall_clock + ROUND_SLACK {
            return Err(Error::FutureRound {
                round: msg.round,
                wall_clock,
            }
            .into());
        }
        if self.store.get(msg.round).is_ok() {
            // Already stored for this round; a partial for a closed round is a
            // no-op regardless of its content (§4.3 "ignore ... if the round
            // is already stored").
            return Ok(());
        }

        let vault = self.vault();
        let group = self.group();
        if msg.signer_index as usize >= group.len() || msg.signer_index == vault.index() {
            return Err(Error::BadSignerIndex(msg.signer_index).into());
        }

        let partial = Partial {
            round: msg.round,
            previous_signature: msg.previous_signature.clone(),
            signer_index: msg.signer_index,
            sig_share: msg.partial_sig,
        };
        let digest = vault.digest(msg.round, &msg.previous_signature);
        if vault.verify_partial(&digest, &partial).is_err() {
            return Err(Error::InvalidPartial.into());
        }

        self.admit_and_maybe_finalize(msg.round, digest, msg.previous_signature, partial, &vault, &group);
        Ok(())
    }

    #[instrument(skip(self), fields(beacon_id = %self.beacon_id))]
    async fn sync_chain(&self, from_round: u64) -> NetResult<BeaconEntryStream> {
        let head = self.store.last().map(|b| b.round).unwrap_or(0);
        if from_round > head {
            return Err(NetError::NoBeaconAboveRequested);
        }
        // The store's reads are in-memory/mmap-backed and cheap, so the
        // whole requested range is materialized up front rather than
        // driving a lazy generator off a second task (§4.5 server side).
        let mut beacons = Vec::with_capacity((head - from_round + 1) as usize);
        for round in from_round..=head {
            match self.store.get(round) {
                Ok(beacon) => beacons.push(Ok(beacon)),
                Err(_) => break,
            }
        }
        Ok(Box::pin(tokio_stream::iter(beacons)))
    }

    #[instrument(skip(self), fields(beacon_id = %self.beacon_id))]
    async fn chain_info(&self) -> NetResult<ChainInfoMsg> {
        let group = self.group();
        let vault = self.vault();
        Ok(ChainInfoMsg {
            public_key: vault.group_public_key(),
            period_seconds: group.period.as_secs(),
            genesis_time: group.genesis_time,
            hash: group.hash().to_vec(),
            genesis_seed: group.genesis_seed.clone(),
            scheme_id: group.scheme_id.as_str().to_string(),
        })
    }

    async fn status(&self) -> NetResult<StatusMsg> {
        let group = self.group();
        Ok(StatusMsg {
            running: self.state() != HandlerState::Stopped,
            serving: self.state() == HandlerState::Serving,
            chain_head: self.store.last().map(|b| b.round).unwrap_or(0),
            known_peers: self.peers(&group).into_iter().map(|p| p.address).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blstrs::Scalar;
    use ff::Field;
    use group::{Curve, Group as _};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use crypto::{GroupDescriptor, Node, SchemeId, Share};
    use net::{BeaconEntryStream, ChainInfoMsg, DkgAckMsg, DkgEnvelopeMsg, StatusMsg};

    struct NullClient;

    #[async_trait]
    impl BeaconClient for NullClient {
        async fn partial_beacon(&self, _peer: &Peer, _beacon_id: &str, _msg: PartialBeaconMsg) -> NetResult<()> {
            Ok(())
        }
        async fn sync_chain(&self, _peer: &Peer, _beacon_id: &str, _from_round: u64) -> NetResult<BeaconEntryStream> {
            Ok(Box::pin(tokio_stream::iter(Vec::new())))
        }
        async fn chain_info(&self, _peer: &Peer, _beacon_id: &str) -> NetResult<ChainInfoMsg> {
            unimplemented!()
        }
        async fn status(&self, _peer: &Peer, _beacon_id: &str) -> NetResult<StatusMsg> {
            unimplemented!()
        }
        async fn dkg_propose(&self, _peer: &Peer, _beacon_id: &str, _envelope: DkgEnvelopeMsg) -> NetResult<DkgAckMsg> {
            unimplemented!()
        }
        async fn dkg_accept(&self, _peer: &Peer, _beacon_id: &str, _envelope: DkgEnvelopeMsg) -> NetResult<DkgAckMsg> {
            unimplemented!()
        }
        async fn dkg_deal(&self, _peer: &Peer, _beacon_id: &str, _envelope: DkgEnvelopeMsg) -> NetResult<DkgAckMsg> {
            unimplemented!()
        }
        async fn dkg_response(&self, _peer: &Peer, _beacon_id: &str, _envelope: DkgEnvelopeMsg) -> NetResult<DkgAckMsg> {
            unimplemented!()
        }
    }

    /// Builds an `n`-of-`t` committee and returns each member's [`Vault`]
    /// alongside the shared [`GroupDescriptor`] (genesis seed `b"genesis"`,
    /// chained scheme, 2s period), mirroring `crypto::vault`'s own test
    /// fixture builder.
    fn make_committee(n: u32, t: u32, seed: u64) -> (Vec<Vault>, GroupDescriptor) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let poly: Vec<Scalar> = (0..t as usize).map(|_| Scalar::random(&mut rng)).collect();
        let eval = |x: Scalar| -> Scalar {
            let mut acc = Scalar::ZERO;
            for c in poly.iter().rev() {
                acc = acc * x + c;
            }
            acc
        };
        let commitments: Vec<Vec<u8>> = poly
            .iter()
            .map(|c| (blstrs::G2Affine::generator() * c).to_affine().to_compressed().to_vec())
            .collect();
        let group_public = {
            use crypto::vault::eval_commitment;
            let parsed: Vec<blstrs::G2Affine> = commitments
                .iter()
                .map(|c| {
                    let repr: [u8; 96] = c.as_slice().try_into().unwrap();
                    Option::from(blstrs::G2Affine::from_compressed(&repr)).unwrap()
                })
                .collect();
            eval_commitment(&parsed, 0).to_affine().to_compressed().to_vec()
        };

        let mut vaults = Vec::new();
        let mut nodes = Vec::new();
        for i in 0..n {
            let scalar = eval(Scalar::from((i + 1) as u64));
            let share = Share {
                index: i,
                scalar: scalar.to_bytes_le().to_vec(),
                commitments: commitments.clone(),
            };
            vaults.push(Vault::new(share, SchemeId::ChainedBls12381G1).unwrap());
            nodes.push(Node {
                public_key: Vec::new(),
                address: format!("127.0.0.1:{}", 9000 + i),
                index: i,
                tls: false,
                self_signature: Vec::new(),
            });
        }
        let group = GroupDescriptor {
            nodes,
            threshold: t,
            period: Duration::from_secs(2),
            catchup_period: Duration::from_millis(200),
            genesis_time: 1_000,
            transition_time: 0,
            genesis_seed: b"genesis".to_vec(),
            public_key: group_public,
            scheme_id: SchemeId::ChainedBls12381G1,
        };
        (vaults, group)
    }

    fn handler_for(store: Arc<ChainStore>, vault: Vault, group: GroupDescriptor) -> Arc<BeaconHandler> {
        Arc::new(BeaconHandler::new("test", store, vault, group, Arc::new(NullClient)))
    }

    #[test]
    fn starts_stopped_and_transitions_to_running() {
        let (mut vaults, group) = make_committee(3, 2, 1);
        let vault = vaults.remove(0);
        let store = Arc::new(ChainStore::open_temporary(true, group.genesis_seed.clone()).unwrap());
        let handler = handler_for(store, vault, group);
        assert_eq!(handler.state(), HandlerState::Stopped);
        handler.stop();
        assert_eq!(handler.state(), HandlerState::Stopped, "stop on an already-stopped handler is a no-op");
    }

    #[tokio::test]
    async fn rejects_partial_more_than_one_round_ahead() {
        let (mut vaults, group) = make_committee(3, 2, 2);
        let vault = vaults.remove(0);
        let store = Arc::new(ChainStore::open_temporary(true, group.genesis_seed.clone()).unwrap());
        let handler = handler_for(store, vault, group);
        handler.last_tick_round.store(5, Ordering::SeqCst);

        let msg = PartialBeaconMsg {
            round: 10,
            previous_signature: Vec::new(),
            signer_index: 1,
            partial_sig: vec![0u8; 48],
        };
        let err = handler.partial_beacon(msg).await.unwrap_err();
        assert!(matches!(err, NetError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_partial_from_own_signer_index() {
        let (mut vaults, group) = make_committee(3, 2, 3);
        let vault = vaults.remove(0);
        let own_index = vault.index();
        let store = Arc::new(ChainStore::open_temporary(true, group.genesis_seed.clone()).unwrap());
        let handler = handler_for(store, vault, group);

        let msg = PartialBeaconMsg {
            round: 1,
            previous_signature: b"genesis".to_vec(),
            signer_index: own_index,
            partial_sig: vec![0u8; 48],
        };
        let err = handler.partial_beacon(msg).await.unwrap_err();
        assert!(matches!(err, NetError::Malformed(_)));
    }

    #[tokio::test]
    async fn threshold_reached_produces_and_stores_beacon() {
        let (mut vaults, group) = make_committee(3, 2, 4);
        let host_vault = vaults.remove(0);
        let store = Arc::new(ChainStore::open_temporary(true, group.genesis_seed.clone()).unwrap());
        let handler = handler_for(store.clone(), host_vault, group.clone());
        // Node 0 hosts the handler; feed it verified partials from nodes 1 and 2
        // (the remaining two vaults after `remove(0)`), reaching threshold=2.
        for vault in &vaults {
            let partial = vault.sign_partial(1, &group.genesis_seed).unwrap();
            let msg = PartialBeaconMsg {
                round: partial.round,
                previous_signature: partial.previous_signature,
                signer_index: partial.signer_index,
                partial_sig: partial.sig_share,
            };
            handler.partial_beacon(msg).await.unwrap();
        }
        let beacon = store.get(1).expect("threshold was reached, round 1 should be stored");
        handler.vault().verify_beacon(&beacon).expect("stored beacon verifies under the group key");
    }
}
