//! The DKG / resharing state machine (§4.6). One [`DkgEngine`] drives
//! exactly one run (fresh keygen or reshare) to `Done` or `Aborted`; the
//! `node` crate constructs a fresh engine per `start-dkg`/`start-reshare`
//! control-plane command and discards it afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blstrs::{G2Affine, G2Projective, Scalar};
use ff::Field;
use group::{Curve, Group};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crypto::{GroupDescriptor, IdentityKeyPair, Node, Share};
use keys::DkgEntropySource;
use net::{BeaconClient, DkgAckMsg, DkgEnvelopeMsg, DkgService, Peer};
use sha2::{Digest, Sha256};

use crate::crypto_deal::{decrypt_share, encrypt_share};
use crate::error::{Error, Result};
use crate::message::{Accept, Deal, DkgMessage, EncryptedShare, Proposal, Response, Start};
use crate::phase::{DkgState, Phase};
use crate::polynomial::{commit_polynomial, eval_polynomial, g2_from_bytes, lagrange_at_zero, sample_polynomial, scalar_from_bytes};

/// Configuration for one DKG/resharing run, supplied by the control-plane
/// command that starts it (§6 `start-dkg`/`start-reshare`).
pub struct DkgConfig {
    pub beacon_id: String,
    pub group: GroupDescriptor,
    /// Pre-shared setup secret, gating `Accept` (§4.6 invariant (c)). Never
    /// transmitted; only its hash travels on the wire.
    pub setup_secret: String,
    pub leader: bool,
    pub accept_timeout: Duration,
    pub executing_timeout: Duration,
    /// Present only for a reshare.
    pub old_group: Option<GroupDescriptor>,
    pub old_share: Option<Share>,
    pub entropy: Option<DkgEntropySource>,
}

impl DkgConfig {
    fn setup_secret_hash(&self) -> [u8; 32] {
        Sha256::digest(self.setup_secret.as_bytes()).into()
    }

    pub fn is_reshare(&self) -> bool {
        self.old_group.is_some()
    }
}

struct DealRecord {
    commitments: Vec<G2Affine>,
    my_share: Scalar,
}

struct Run {
    config: DkgConfig,
    state: DkgState,
    my_index: Option<u32>,
    deals: HashMap<u32, DealRecord>,
    final_participants: Option<Vec<Node>>,
}

/// Drives one DKG/resharing run end to end. Implements [`DkgService`] so
/// the `net` gRPC server can route inbound `dkg/*` RPCs directly into it.
pub struct DkgEngine {
    identity: Arc<IdentityKeyPair>,
    client: Arc<dyn BeaconClient>,
    run: Mutex<Run>,
    accepted_notify: Notify,
    start_notify: Notify,
    deals_notify: Notify,
}

/// What a successful run produces: installed into the crypto vault and
/// persisted by the `keys` crate (§4.6 "share committed").
pub struct DkgOutcome {
    pub share: Share,
    pub group: GroupDescriptor,
}

impl DkgEngine {
    pub fn new(identity: Arc<IdentityKeyPair>, client: Arc<dyn BeaconClient>, config: DkgConfig) -> Self {
        let deadline = Instant::now() + config.accept_timeout + config.executing_timeout;
        let participants = config.group.nodes.clone();
        let my_index = participants
            .iter()
            .find(|n| n.public_key == identity.public_key())
            .map(|n| n.index);
        let run = Run {
            config,
            state: DkgState::new(participants, deadline),
            my_index,
            deals: HashMap::new(),
            final_participants: None,
        };
        DkgEngine {
            identity,
            client,
            run: Mutex::new(run),
            accepted_notify: Notify::new(),
            start_notify: Notify::new(),
            deals_notify: Notify::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.run.lock().state.phase
    }

    fn leader_node(&self) -> Node {
        let run = self.run.lock();
        run.config.group.nodes[0].clone()
    }

    /// Leader-only: drives `Fresh -> Proposing -> Executing -> Done`.
    #[instrument(skip(self), fields(beacon_id = %self.run.lock().config.beacon_id))]
    pub async fn run_leader(&self) -> Result<DkgOutcome> {
        {
            let mut run = self.run.lock();
            run.state.transition(Phase::Proposing);
        }
        let (participants, accept_timeout, secret_hash, is_reshare, old_group) = {
            let run = self.run.lock();
            (
                run.config.group.nodes.clone(),
                run.config.accept_timeout,
                run.config.setup_secret_hash(),
                run.config.is_reshare(),
                run.config.old_group.clone(),
            )
        };
        let my_index = self.run.lock().my_index;
        let proposal = DkgMessage::Proposal(Proposal {
            group: self.run.lock().config.group.clone(),
            is_reshare,
            old_group,
        });
        let beacon_id = self.run.lock().config.beacon_id.clone();
        for node in participants.iter().filter(|n| Some(n.index) != my_index) {
            let peer = Peer::new(node.address.clone(), node.tls);
            let envelope = DkgEnvelopeMsg {
                sender_index: my_index.unwrap_or(0),
                phase: proposal.phase_tag().to_string(),
                payload: proposal.to_payload(),
            };
            if let Err(e) = self.client.dkg_propose(&peer, &beacon_id, envelope).await {
                warn!(peer = %node.address, error = %e, "propose delivery failed");
            }
        }

        // If leader itself participates (it always does, per index 0),
        // count itself as implicitly accepted.
        if let Some(idx) = my_index {
            self.run.lock().state.accepted.insert(idx);
        }
        let needed = participants.len();
        let wait = timeout(accept_timeout, async {
            loop {
                if self.run.lock().state.accepted.len() >= needed {
                    return;
                }
                self.accepted_notify.notified().await;
            }
        })
        .await;
        if wait.is_err() {
            self.run.lock().state.abort();
            return Err(Error::Timeout("accept", "proposing"));
        }
        let _ = secret_hash;

        self.run.lock().state.transition(Phase::Executing);
        let final_participants = participants.clone();
        self.run.lock().final_participants = Some(final_participants.clone());
        let start_msg = DkgMessage::Start(Start {
            participants: final_participants.clone(),
        });
        for node in participants.iter().filter(|n| Some(n.index) != my_index) {
            let peer = Peer::new(node.address.clone(), node.tls);
            let envelope = DkgEnvelopeMsg {
                sender_index: my_index.unwrap_or(0),
                phase: start_msg.phase_tag().to_string(),
                payload: start_msg.to_payload(),
            };
            let _ = self.client.dkg_propose(&peer, &beacon_id, envelope).await;
        }

        self.execute().await
    }

    /// Follower-only: waits to be driven through `Fresh -> Accepted ->
    /// Executing -> Done` by inbound RPCs, which are handled by the
    /// [`DkgService`] impl below.
    #[instrument(skip(self), fields(beacon_id = %self.run.lock().config.beacon_id))]
    pub async fn run_follower(&self) -> Result<DkgOutcome> {
        let deadline = self.run.lock().state.deadline;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = timeout(remaining, async {
            loop {
                if self.run.lock().state.phase == Phase::Executing {
                    return;
                }
                self.start_notify.notified().await;
            }
        })
        .await;
        if wait.is_err() {
            self.run.lock().state.abort();
            return Err(Error::Timeout("start", "accepted"));
        }
        self.execute().await
    }

    /// Common to leader and follower once in `Executing`: deal, collect
    /// deals and complaints, then finalize (§4.6 "Executing" exit).
    async fn execute(&self) -> Result<DkgOutcome> {
        let (participants, my_index, beacon_id, executing_timeout) = {
            let run = self.run.lock();
            (
                run.final_participants.clone().unwrap_or_else(|| run.config.group.nodes.clone()),
                run.my_index,
                run.config.beacon_id.clone(),
                run.config.executing_timeout,
            )
        };
        let my_index = my_index.ok_or(Error::UnknownParticipant(0))?;

        self.send_deal(&participants, my_index, &beacon_id).await?;

        let n = participants.len();
        let wait = timeout(executing_timeout, async {
            loop {
                if self.run.lock().deals.len() >= n {
                    return;
                }
                self.deals_notify.notified().await;
            }
        })
        .await;
        if wait.is_err() {
            warn!("executing phase timed out before every dealer's deal arrived; finalizing with what arrived");
        }

        self.finalize(my_index)
    }

    /// This node, as a dealer, samples its sub-polynomial and ships one
    /// encrypted evaluation to every participant (§4.6.1).
    async fn send_deal(&self, participants: &[Node], my_index: u32, beacon_id: &str) -> Result<()> {
        let t = self.run.lock().config.group.threshold as usize;
        let (constant_term, mut rng) = self.dealer_secret(participants, my_index)?;
        let coeffs = sample_polynomial(t, constant_term, &mut rng);
        let commitments = commit_polynomial(&coeffs);
        let commitments_bytes: Vec<Vec<u8>> = commitments.iter().map(|c| c.to_compressed().to_vec()).collect();

        let mut my_own_share = None;
        let mut encrypted_shares = Vec::with_capacity(participants.len());
        for node in participants {
            let x = Scalar::from((node.index + 1) as u64);
            let value = eval_polynomial(&coeffs, x);
            if node.index == my_index {
                my_own_share = Some(value);
                continue;
            }
            let recipient_public = g2_from_bytes(&node.public_key)?;
            encrypted_shares.push(encrypt_share(&recipient_public, &value, node.index, &mut rng));
        }

        // Record our own evaluation directly; no self-encryption needed.
        if let Some(value) = my_own_share {
            let mut run = self.run.lock();
            run.deals.insert(
                my_index,
                DealRecord {
                    commitments: commitments.clone(),
                    my_share: value,
                },
            );
            run.state.deals_received.insert(my_index);
        }

        let deal = DkgMessage::Deal(Deal {
            dealer_index: my_index,
            commitments: commitments_bytes,
            encrypted_shares,
        });
        for node in participants.iter().filter(|n| n.index != my_index) {
            let peer = Peer::new(node.address.clone(), node.tls);
            let envelope = DkgEnvelopeMsg {
                sender_index: my_index,
                phase: deal.phase_tag().to_string(),
                payload: deal.to_payload(),
            };
            if let Err(e) = self.client.dkg_deal(&peer, beacon_id, envelope).await {
                warn!(peer = %node.address, error = %e, "deal delivery failed");
            }
        }
        Ok(())
    }

    /// Fresh DKG draws a uniformly random constant term. Resharing fixes it
    /// to the dealer's *raw* old share (unweighted): the Lagrange weight
    /// that turns a sum of old shares back into the old group secret can
    /// only be computed once the actual reconstructing subset of
    /// old-committee dealers is known, so it is applied later in
    /// [`Self::finalize`] rather than baked in here (§4.6 "Resharing"). A
    /// brand-new joiner with no `old_share` deals a zero constant term — it
    /// is a share *recipient* only and contributes no additive secret.
    fn dealer_secret(&self, _participants: &[Node], _my_index: u32) -> Result<(Scalar, rand_chacha::ChaCha20Rng)> {
        let run = self.run.lock();
        let rng_source = run.config.entropy.as_ref();
        let mut rng = rng_source.map(|e| e.build_rng()).unwrap_or_else(keys::default_rng);
        if run.config.is_reshare() {
            match &run.config.old_share {
                Some(old_share) => {
                    let old_scalar = scalar_from_bytes(&old_share.scalar)?;
                    Ok((old_scalar, rng))
                }
                None => Ok((Scalar::ZERO, rng)),
            }
        } else {
            Ok((Scalar::random(&mut rng), rng))
        }
    }

    /// Sums surviving dealers' contributions into this node's final share
    /// and the group's commitment polynomial (§4.6 invariants (a), (b)).
    ///
    /// In reshare mode, each surviving old-committee dealer's contribution
    /// is scaled by `lambda_i(0)` computed against the *actual* surviving
    /// subset of old-committee dealers (not the old committee's full
    /// static roster), so the sum reconstructs the old group secret even
    /// when some old members don't re-deal this run, as long as a quorum
    /// of the old committee survives (§4.6 "a quorum of the previous
    /// committee"). This reweighting is sound because Lagrange
    /// interpolation is linear in the dealt polynomials: each surviving
    /// dealer `i`'s polynomial `D_i` satisfies `D_i(0) = old_share_i`, so
    /// `sum_i lambda_i(0) * D_i` is itself a degree-(t'-1) polynomial
    /// whose value at 0 is the old group secret. Non-old-committee
    /// dealers (new joiners) are summed unweighted, matching the zero
    /// constant term [`Self::dealer_secret`] gave them.
    fn finalize(&self, my_index: u32) -> Result<DkgOutcome> {
        let mut run = self.run.lock();
        let threshold = run.config.group.threshold as usize;
        let majority = run.config.group.nodes.len() / 2 + 1;

        let surviving: Vec<u32> = run
            .deals
            .keys()
            .copied()
            .filter(|dealer| {
                let complaints = run
                    .state
                    .responses_received
                    .iter()
                    .filter(|((d, _), complained)| d == dealer && **complained)
                    .count();
                complaints < majority
            })
            .collect();

        if surviving.len() < threshold {
            run.state.abort();
            return Err(Error::InsufficientDealers {
                needed: threshold,
                got: surviving.len(),
            });
        }

        let old_group = run.config.old_group.clone();
        let old_survivors: Vec<u32> = match &old_group {
            Some(old_group) => surviving
                .iter()
                .copied()
                .filter(|dealer| old_group.nodes.iter().any(|n| n.index == *dealer))
                .collect(),
            None => Vec::new(),
        };
        if let Some(old_group) = &old_group {
            if old_survivors.len() < old_group.threshold as usize {
                run.state.abort();
                return Err(Error::ResharingQuorum {
                    have: old_survivors.len(),
                    need: old_group.threshold as usize,
                });
            }
        }

        let degree = run.deals.values().next().map(|d| d.commitments.len()).unwrap_or(threshold);
        let mut final_commitments = vec![G2Projective::identity(); degree];
        let mut final_scalar = Scalar::ZERO;
        for dealer in &surviving {
            let record = &run.deals[dealer];
            let weight = match old_survivors.iter().position(|i| i == dealer) {
                Some(at) => lagrange_at_zero(&old_survivors, at),
                None => Scalar::ONE,
            };
            final_scalar += weight * record.my_share;
            for (acc, c) in final_commitments.iter_mut().zip(record.commitments.iter()) {
                *acc += G2Projective::from(*c) * weight;
            }
        }
        let commitments_bytes: Vec<Vec<u8>> = final_commitments
            .iter()
            .map(|p| p.to_affine().to_compressed().to_vec())
            .collect();
        let group_public_key = final_commitments[0].to_affine().to_compressed().to_vec();

        run.state.transition(Phase::Done);
        info!(surviving = surviving.len(), index = my_index, "dkg finalized");

        let mut group = run.config.group.clone();
        group.public_key = group_public_key;

        Ok(DkgOutcome {
            share: Share {
                index: my_index,
                scalar: final_scalar.to_bytes_le().to_vec(),
                commitments: commitments_bytes,
            },
            group,
        })
    }
}

#[async_trait]
impl DkgService for DkgEngine {
    async fn propose(&self, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
        let message = match DkgMessage::from_payload(&envelope.payload) {
            Ok(m) => m,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        match message {
            DkgMessage::Proposal(proposal) => {
                let my_public = self.identity.public_key();
                let is_member = proposal.group.nodes.iter().any(|n| n.public_key == my_public);
                if !is_member {
                    return Ok(DkgAckMsg::err("not a member of the proposed group"));
                }
                {
                    let mut run = self.run.lock();
                    run.config.group = proposal.group;
                    run.state.transition(Phase::Accepted);
                }
                let secret_hash = self.run.lock().config.setup_secret_hash();
                let accept = DkgMessage::Accept(Accept {
                    setup_secret_proof: self.identity.sign(&secret_hash),
                    public_key: self.identity.public_key(),
                });
                let leader = self.leader_node();
                let beacon_id = self.run.lock().config.beacon_id.clone();
                let my_index = self.run.lock().my_index.unwrap_or(0);
                let client = self.client.clone();
                let peer = Peer::new(leader.address.clone(), leader.tls);
                let envelope = DkgEnvelopeMsg {
                    sender_index: my_index,
                    phase: accept.phase_tag().to_string(),
                    payload: accept.to_payload(),
                };
                if let Err(e) = client.dkg_accept(&peer, &beacon_id, envelope).await {
                    warn!(error = %e, "failed to return accept to leader");
                }
                Ok(DkgAckMsg::ok())
            }
            DkgMessage::Start(start) => {
                let mut run = self.run.lock();
                run.final_participants = Some(start.participants);
                run.state.transition(Phase::Executing);
                drop(run);
                self.start_notify.notify_waiters();
                Ok(DkgAckMsg::ok())
            }
            _ => Ok(DkgAckMsg::err("unexpected message on propose channel")),
        }
    }

    async fn accept(&self, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
        let message = match DkgMessage::from_payload(&envelope.payload) {
            Ok(m) => m,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        let DkgMessage::Accept(accept) = message else {
            return Ok(DkgAckMsg::err("unexpected message on accept channel"));
        };
        let secret_hash = self.run.lock().config.setup_secret_hash();
        if crypto::identity::verify(&accept.public_key, &secret_hash, &accept.setup_secret_proof).is_err() {
            return Ok(DkgAckMsg::err("accept failed the setup-secret proof"));
        }
        self.run.lock().state.accepted.insert(envelope.sender_index);
        self.accepted_notify.notify_waiters();
        Ok(DkgAckMsg::ok())
    }

    async fn deal(&self, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
        let message = match DkgMessage::from_payload(&envelope.payload) {
            Ok(m) => m,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        let DkgMessage::Deal(deal) = message else {
            return Ok(DkgAckMsg::err("unexpected message on deal channel"));
        };
        let my_index = self.run.lock().my_index.unwrap_or(0);
        let mine: Option<&EncryptedShare> = deal.encrypted_shares.iter().find(|s| s.recipient_index == my_index);
        let Some(mine) = mine else {
            return Ok(DkgAckMsg::err("no share addressed to this node"));
        };

        let my_secret = match scalar_from_bytes(&self.identity.secret_bytes()) {
            Ok(s) => s,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        let value = match decrypt_share(&my_secret, mine) {
            Ok(v) => v,
            Err(e) => {
                self.broadcast_complaint(deal.dealer_index, my_index).await;
                return Ok(DkgAckMsg::err(e.to_string()));
            }
        };

        let commitments: Result<Vec<G2Affine>> = deal.commitments.iter().map(|c| g2_from_bytes(c)).collect();
        let commitments = match commitments {
            Ok(c) => c,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        let expected = crate::polynomial::eval_commitment(&commitments, Scalar::from((my_index + 1) as u64)).to_affine();
        let actual = (G2Affine::generator() * value).to_affine();
        if expected != actual {
            self.broadcast_complaint(deal.dealer_index, my_index).await;
            return Ok(DkgAckMsg::err("deal failed feldman verification"));
        }

        {
            let mut run = self.run.lock();
            run.deals.insert(
                deal.dealer_index,
                DealRecord {
                    commitments,
                    my_share: value,
                },
            );
            run.state.deals_received.insert(deal.dealer_index);
        }
        self.deals_notify.notify_waiters();
        Ok(DkgAckMsg::ok())
    }

    async fn response(&self, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
        let message = match DkgMessage::from_payload(&envelope.payload) {
            Ok(m) => m,
            Err(e) => return Ok(DkgAckMsg::err(e.to_string())),
        };
        let DkgMessage::Response(response) = message else {
            return Ok(DkgAckMsg::err("unexpected message on response channel"));
        };
        self.run
            .lock()
            .state
            .responses_received
            .insert((response.dealer_index, response.recipient_index), response.complaint);
        Ok(DkgAckMsg::ok())
    }
}

impl DkgEngine {
    async fn broadcast_complaint(&self, dealer_index: u32, my_index: u32) {
        let (participants, beacon_id) = {
            let run = self.run.lock();
            (run.config.group.nodes.clone(), run.config.beacon_id.clone())
        };
        let response = DkgMessage::Response(Response {
            dealer_index,
            recipient_index: my_index,
            complaint: true,
        });
        for node in participants.iter().filter(|n| n.index != my_index) {
            let peer = Peer::new(node.address.clone(), node.tls);
            let envelope = DkgEnvelopeMsg {
                sender_index: my_index,
                phase: response.phase_tag().to_string(),
                payload: response.to_payload(),
            };
            let _ = self.client.dkg_response(&peer, &beacon_id, envelope).await;
        }
        self.run
            .lock()
            .state
            .responses_received
            .insert((dealer_index, my_index), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use crypto::Vault;
    use net::{BeaconEntryStream, ChainInfoMsg, PartialBeaconMsg, StatusMsg};

    /// Routes `dkg_*` client calls directly into the addressed engine's
    /// [`DkgService`] methods, simulating an in-process network the way
    /// `beacon/src/handler.rs`'s `NullClient` fixture simulates one for the
    /// beacon handler. `partial_beacon`/`sync_chain`/`chain_info`/`status`
    /// are never exercised by a DKG run and are stubbed out.
    struct Router {
        engines: parking_lot::Mutex<HashMap<String, Arc<DkgEngine>>>,
    }

    impl Router {
        fn new() -> Arc<Self> {
            Arc::new(Router {
                engines: parking_lot::Mutex::new(HashMap::new()),
            })
        }

        fn register(&self, address: impl Into<String>, engine: Arc<DkgEngine>) {
            self.engines.lock().insert(address.into(), engine);
        }

        fn lookup(&self, peer: &Peer) -> Arc<DkgEngine> {
            self.engines
                .lock()
                .get(&peer.address)
                .cloned()
                .expect("test peer always registered before use")
        }
    }

    #[async_trait]
    impl BeaconClient for Router {
        async fn partial_beacon(&self, _peer: &Peer, _beacon_id: &str, _msg: PartialBeaconMsg) -> net::Result<()> {
            Ok(())
        }
        async fn sync_chain(&self, _peer: &Peer, _beacon_id: &str, _from_round: u64) -> net::Result<BeaconEntryStream> {
            Err(net::Error::Rejected("not exercised in this test".into()))
        }
        async fn chain_info(&self, _peer: &Peer, _beacon_id: &str) -> net::Result<ChainInfoMsg> {
            Err(net::Error::Rejected("not exercised in this test".into()))
        }
        async fn status(&self, _peer: &Peer, _beacon_id: &str) -> net::Result<StatusMsg> {
            Err(net::Error::Rejected("not exercised in this test".into()))
        }
        async fn dkg_propose(&self, peer: &Peer, _beacon_id: &str, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
            self.lookup(peer).propose(envelope).await
        }
        async fn dkg_accept(&self, peer: &Peer, _beacon_id: &str, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
            self.lookup(peer).accept(envelope).await
        }
        async fn dkg_deal(&self, peer: &Peer, _beacon_id: &str, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
            self.lookup(peer).deal(envelope).await
        }
        async fn dkg_response(&self, peer: &Peer, _beacon_id: &str, envelope: DkgEnvelopeMsg) -> net::Result<DkgAckMsg> {
            self.lookup(peer).response(envelope).await
        }
    }

    #[derive(Clone)]
    struct SimNode {
        identity: Arc<IdentityKeyPair>,
        node: Node,
    }

    fn make_nodes(n: u32, seed: u64, port_base: u16) -> Vec<SimNode> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let identity = Arc::new(IdentityKeyPair::generate(&mut rng));
                let node = Node {
                    public_key: identity.public_key(),
                    address: format!("127.0.0.1:{}", port_base + i as u16),
                    index: i,
                    tls: false,
                    self_signature: Vec::new(),
                };
                SimNode { identity, node }
            })
            .collect()
    }

    fn group_descriptor(nodes: &[SimNode], threshold: u32) -> GroupDescriptor {
        GroupDescriptor {
            nodes: nodes.iter().map(|s| s.node.clone()).collect(),
            threshold,
            period: Duration::from_secs(2),
            catchup_period: Duration::from_millis(200),
            genesis_time: 1_000,
            transition_time: 0,
            genesis_seed: b"genesis".to_vec(),
            public_key: Vec::new(),
            scheme_id: crypto::SchemeId::ChainedBls12381G1,
        }
    }

    /// Runs one DKG/resharing session to completion for every node in
    /// `nodes` (node 0 leads) and returns each node's [`DkgOutcome`] in
    /// index order.
    async fn run_session(
        nodes: &[SimNode],
        group: &GroupDescriptor,
        old_group: Option<GroupDescriptor>,
        old_shares: &HashMap<u32, Share>,
    ) -> Vec<DkgOutcome> {
        let router = Router::new();
        let mut engines = Vec::with_capacity(nodes.len());
        for sim in nodes {
            let config = DkgConfig {
                beacon_id: "test".to_string(),
                group: group.clone(),
                setup_secret: "shared-setup-secret".to_string(),
                leader: sim.node.index == 0,
                accept_timeout: Duration::from_secs(5),
                executing_timeout: Duration::from_secs(5),
                old_group: old_group.clone(),
                old_share: old_shares.get(&sim.node.index).cloned(),
                entropy: None,
            };
            let engine = Arc::new(DkgEngine::new(sim.identity.clone(), router.clone(), config));
            router.register(sim.node.address.clone(), engine.clone());
            engines.push(engine);
        }

        let mut handles = Vec::with_capacity(engines.len());
        for (i, engine) in engines.into_iter().enumerate() {
            handles.push(tokio::spawn(async move {
                if i == 0 {
                    engine.run_leader().await
                } else {
                    engine.run_follower().await
                }
            }));
        }
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.expect("task did not panic").expect("dkg run succeeded"));
        }
        outcomes
    }

    #[tokio::test]
    async fn fresh_dkg_all_nodes_agree_on_group_public_key() {
        let nodes = make_nodes(3, 1, 9100);
        let group = group_descriptor(&nodes, 2);

        let outcomes = run_session(&nodes, &group, None, &HashMap::new()).await;

        let expected_key = outcomes[0].group.public_key.clone();
        for outcome in &outcomes {
            assert_eq!(outcome.group.public_key, expected_key, "every honest participant derives the same group key");
            let vault = Vault::new(outcome.share.clone(), crypto::SchemeId::ChainedBls12381G1)
                .expect("share must lie on the committed polynomial (§4.6 invariant (b))");
            assert_eq!(vault.group_public_key(), expected_key);
        }
    }

    #[tokio::test]
    async fn reshare_preserves_group_public_key_with_full_old_committee() {
        let old_nodes = make_nodes(3, 10, 9200);
        let old_group = group_descriptor(&old_nodes, 2);
        let old_outcomes = run_session(&old_nodes, &old_group, None, &HashMap::new()).await;
        let old_group = old_outcomes[0].group.clone();
        let old_shares: HashMap<u32, Share> = old_outcomes.iter().map(|o| (o.share.index, o.share.clone())).collect();

        // New committee: all three old members continue, plus one brand-new
        // joiner at index 3 with no old share.
        let new_node = make_nodes(1, 11, 9299).remove(0);
        let mut new_nodes = old_nodes;
        new_nodes.push(SimNode {
            identity: new_node.identity,
            node: Node { index: 3, ..new_node.node },
        });
        let new_group = group_descriptor(&new_nodes, 3);

        let new_outcomes = run_session(&new_nodes, &new_group, Some(old_group.clone()), &old_shares).await;

        for outcome in &new_outcomes {
            assert_eq!(
                outcome.group.public_key, old_group.public_key,
                "the group public key must survive a reshare (§4.6 invariant (a), §8 scenario 6)"
            );
        }
        // The new joiner contributed no additive secret: its share still
        // lies on the new polynomial, but the polynomial's value at 0 is
        // unchanged from the old group secret.
        let joiner_outcome = &new_outcomes[3];
        Vault::new(joiner_outcome.share.clone(), crypto::SchemeId::ChainedBls12381G1)
            .expect("new joiner's share lies on the new committed polynomial");
    }

    #[tokio::test]
    async fn reshare_reconstructs_old_key_when_one_old_member_does_not_continue() {
        let old_nodes = make_nodes(3, 20, 9300);
        let old_group = group_descriptor(&old_nodes, 2);
        let old_outcomes = run_session(&old_nodes, &old_group, None, &HashMap::new()).await;
        let old_group = old_outcomes[0].group.clone();
        let old_shares: HashMap<u32, Share> = old_outcomes.iter().map(|o| (o.share.index, o.share.clone())).collect();

        // Only old members 0 and 1 continue into the new committee (a
        // quorum of the old threshold-2 committee); old member 2 departs
        // entirely and a new joiner takes its place at index 2.
        let joiner = make_nodes(1, 21, 9399).remove(0);
        let new_nodes = vec![
            old_nodes[0].clone(),
            old_nodes[1].clone(),
            SimNode {
                identity: joiner.identity,
                node: Node { index: 2, ..joiner.node },
            },
        ];
        let new_group = group_descriptor(&new_nodes, 2);

        let new_outcomes = run_session(&new_nodes, &new_group, Some(old_group.clone()), &old_shares).await;

        for outcome in &new_outcomes {
            assert_eq!(
                outcome.group.public_key, old_group.public_key,
                "a quorum of the old committee (2 of 3) must still reconstruct the old group key, \
                 weighted against the subset that actually dealt rather than the full old roster"
            );
        }
    }
}
