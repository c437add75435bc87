//! The control-plane command surface (§6 "Control-plane (in-process or
//! loopback) commands"). Every command takes a beacon id plus whatever
//! parameters it needs and returns a [`Status`] (or a small typed result
//! alongside one, for the read commands) — no raw error chains escape this
//! module, per §7 "Propagation".

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use beacon::{BeaconRuntime, RoundVerdict};
use crypto::{GroupDescriptor, IdentityKeyPair, SchemeId, Vault};
use dkg::{DkgConfig, DkgEngine, DkgOutcome};
use keys::{DkgEntropySource, KeyStore};
use net::{BeaconClient, BeaconService, Peer, StatusMsg};
use store::ChainStore;

use crate::registry::NodeRuntime;
use crate::status::Status;

impl NodeRuntime {
    /// `start-dkg(group, secret, entropy?, leader?)`: runs §4.6 from
    /// scratch and, on success, installs the resulting share/group and
    /// starts the handler (§6 "on success installs group+share").
    #[instrument(skip(self, secret, entropy), fields(beacon_id = %beacon_id))]
    pub async fn start_dkg(
        &self,
        beacon_id: &str,
        group: GroupDescriptor,
        secret: String,
        leader: bool,
        entropy: Option<DkgEntropySource>,
    ) -> Status {
        if let Err(e) = group.validate() {
            return Status::fatal(e);
        }
        let key_store = match KeyStore::open(&self.config.base_dir, beacon_id) {
            Ok(k) => k,
            Err(e) => return e.into(),
        };
        let identity = if key_store.identity_exists() {
            match key_store.load_identity() {
                Ok(identity) => identity,
                Err(e) => return e.into(),
            }
        } else {
            let mut rng = entropy.as_ref().map(|e| e.build_rng()).unwrap_or_else(keys::default_rng);
            let identity = IdentityKeyPair::generate(&mut rng);
            if let Err(e) = key_store.save_identity(&identity) {
                return e.into();
            }
            identity
        };

        let config = DkgConfig {
            beacon_id: beacon_id.to_string(),
            group: group.clone(),
            setup_secret: secret,
            leader,
            accept_timeout: self.config.dkg.accept(),
            executing_timeout: self.config.dkg.executing(),
            old_group: None,
            old_share: None,
            entropy,
        };
        let engine = Arc::new(DkgEngine::new(Arc::new(identity), self.client.clone(), config));
        self.set_dkg(beacon_id, engine.clone());

        let outcome = if leader { engine.run_leader().await } else { engine.run_follower().await };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "dkg run aborted");
                self.remove(beacon_id);
                return e.into();
            }
        };
        self.commit_epoch(beacon_id, key_store, outcome)
    }

    /// `start-reshare(new_group, secret, old_group?, leader?)`: runs §4.6
    /// in reshare mode against an already-running beacon id, then swaps
    /// the new epoch in at `transition_time` (§5, §6.1).
    #[instrument(skip(self, secret, entropy), fields(beacon_id = %beacon_id))]
    pub async fn start_reshare(
        &self,
        beacon_id: &str,
        new_group: GroupDescriptor,
        secret: String,
        old_group: GroupDescriptor,
        leader: bool,
        entropy: Option<DkgEntropySource>,
    ) -> Status {
        let existing = match self.runtime(beacon_id) {
            Some(runtime) => runtime,
            None => return Status::fatal(format!("beacon id {beacon_id} is not currently running; load it before resharing")),
        };
        if let Err(e) = new_group.validate() {
            return Status::fatal(e);
        }
        let key_store = match KeyStore::open(&self.config.base_dir, beacon_id) {
            Ok(k) => k,
            Err(e) => return e.into(),
        };
        let identity = match key_store.load_identity() {
            Ok(identity) => identity,
            Err(e) => return e.into(),
        };
        let old_share = match key_store.load_share() {
            Ok(share) => share,
            Err(e) => return e.into(),
        };

        let config = DkgConfig {
            beacon_id: beacon_id.to_string(),
            group: new_group.clone(),
            setup_secret: secret,
            leader,
            accept_timeout: self.config.dkg.accept(),
            executing_timeout: self.config.dkg.executing(),
            old_group: Some(old_group),
            old_share: Some(old_share),
            entropy,
        };
        let engine = Arc::new(DkgEngine::new(Arc::new(identity), self.client.clone(), config));
        self.set_dkg(beacon_id, engine.clone());

        let outcome = if leader { engine.run_leader().await } else { engine.run_follower().await };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "reshare aborted, old epoch remains active");
                self.set_running(beacon_id, existing);
                return e.into();
            }
        };

        if let Err(e) = key_store.save_group(&outcome.group) {
            self.set_running(beacon_id, existing);
            return e.into();
        }
        if let Err(e) = key_store.save_share(&outcome.share) {
            self.set_running(beacon_id, existing);
            return e.into();
        }
        let vault = match Vault::new(outcome.share, outcome.group.scheme_id) {
            Ok(vault) => vault,
            Err(e) => {
                self.set_running(beacon_id, existing);
                return e.into();
            }
        };

        self.set_running(beacon_id, existing.clone());
        let transition_time = outcome.group.transition_time;
        let group = outcome.group;
        let target = existing;
        let beacon_id_owned = beacon_id.to_string();
        tokio::spawn(async move {
            let now = beacon::ticker::unix_now();
            if transition_time > now {
                tokio::time::sleep(Duration::from_secs(transition_time - now)).await;
            }
            target.swap_epoch(vault, group);
            info!(beacon_id = %beacon_id_owned, "resharing epoch swap complete");
        });
        Status::Ok
    }

    fn commit_epoch(&self, beacon_id: &str, key_store: KeyStore, outcome: DkgOutcome) -> Status {
        if let Err(e) = key_store.save_group(&outcome.group) {
            return e.into();
        }
        if let Err(e) = key_store.save_share(&outcome.share) {
            return e.into();
        }
        self.spawn_beacon(beacon_id, &key_store, outcome.share, outcome.group)
    }

    fn spawn_beacon(&self, beacon_id: &str, key_store: &KeyStore, share: crypto::Share, group: GroupDescriptor) -> Status {
        let vault = match Vault::new(share, group.scheme_id) {
            Ok(vault) => vault,
            Err(e) => return e.into(),
        };
        let store = match ChainStore::open(key_store.chain_db_path(), group.scheme_id.is_chained(), group.genesis_seed.clone()) {
            Ok(store) => Arc::new(store),
            Err(e) => return e.into(),
        };
        let runtime = Arc::new(BeaconRuntime::start(beacon_id.to_string(), store, vault, group, self.client.clone()));
        self.set_running(beacon_id, runtime);
        Status::Ok
    }

    /// `load-beacon(beacon_id)`: re-opens a previously committed epoch
    /// from disk and starts the handler (§6 "load-beacon").
    #[instrument(skip(self), fields(beacon_id = %beacon_id))]
    pub fn load_beacon(&self, beacon_id: &str) -> Status {
        let key_store = match KeyStore::open(&self.config.base_dir, beacon_id) {
            Ok(k) => k,
            Err(e) => return e.into(),
        };
        let group = match key_store.load_group() {
            Ok(group) => group,
            Err(e) => return e.into(),
        };
        let share = match key_store.load_share() {
            Ok(share) => share,
            Err(e) => return e.into(),
        };
        self.spawn_beacon(beacon_id, &key_store, share, group)
    }

    /// `stop(beacon_id)`: cancels the running handler's tick loop.
    pub fn stop(&self, beacon_id: &str) -> Status {
        match self.runtime(beacon_id) {
            Some(runtime) => {
                runtime.stop();
                Status::Ok
            }
            None => Status::fatal(format!("beacon id {beacon_id} is not running")),
        }
    }

    /// `backup(writer, beacon_id)`: delegates directly to the chain
    /// store's `save_to` (§6.1).
    pub fn backup(&self, beacon_id: &str, writer: &mut dyn Write) -> Status {
        match self.runtime(beacon_id) {
            Some(runtime) => match runtime.store().save_to(writer) {
                Ok(()) => Status::Ok,
                Err(e) => e.into(),
            },
            None => Status::fatal(format!("beacon id {beacon_id} is not running")),
        }
    }

    /// `status(beacon_id)`: the same operational snapshot `net::status`
    /// exposes over the wire, available in-process without a round trip.
    pub async fn status(&self, beacon_id: &str) -> Result<StatusMsg, Status> {
        match self.runtime(beacon_id) {
            Some(runtime) => runtime.handler().status().await.map_err(Status::from),
            None => Err(Status::fatal(format!("unknown beacon id {beacon_id}"))),
        }
    }

    /// `follow(remote, hash)`: bootstraps a brand-new node from a trusted
    /// peer's `chain_info`, verified against an operator-supplied expected
    /// chain hash, optionally fast-forwarded by an operator-supplied
    /// snapshot (§4.2.1 `load_from`) before falling back to a round-by-round
    /// catch-up sync for whatever the snapshot didn't cover (§6.1). If a
    /// share for this beacon id is already on disk, the handler is started
    /// once caught up; otherwise this id stays a read-only chain mirror.
    #[instrument(skip(self, group, snapshot), fields(beacon_id = %beacon_id))]
    pub async fn follow(
        &self,
        beacon_id: &str,
        group: GroupDescriptor,
        remote: Peer,
        expected_hash: [u8; 32],
        snapshot: Option<&mut dyn std::io::Read>,
    ) -> Status {
        if group.hash() != expected_hash {
            return Status::fatal("group descriptor hash does not match the operator-supplied expected hash");
        }
        let info = match self.client.chain_info(&remote, beacon_id).await {
            Ok(info) => info,
            Err(e) => return e.into(),
        };
        if info.hash != expected_hash {
            return Status::fatal("remote peer's chain_info hash does not match the expected hash");
        }

        let key_store = match KeyStore::open(&self.config.base_dir, beacon_id) {
            Ok(k) => k,
            Err(e) => return e.into(),
        };
        if let Err(e) = key_store.save_group(&group) {
            return e.into();
        }
        let store = match ChainStore::open(key_store.chain_db_path(), group.scheme_id.is_chained(), group.genesis_seed.clone()) {
            Ok(store) => Arc::new(store),
            Err(e) => return e.into(),
        };
        if let Some(reader) = snapshot {
            if let Err(e) = store.load_from(reader) {
                return e.into();
            }
        }

        let peers = Arc::new(beacon::PeerManager::new());
        let sync = beacon::SyncManager::new(beacon_id.to_string(), store.clone(), self.client.clone(), peers);
        let target_round = match beacon::current_round(group.genesis_time, group.period, beacon::ticker::unix_now()) {
            Ok(round) => round.saturating_sub(1).max(1),
            Err(e) => return Status::fatal(e.to_string()),
        };
        if let Err(e) = sync.run_sync(target_round, &group, &[remote], self.config.sync.follow_deadline()).await {
            return e.into();
        }

        if key_store.share_exists() {
            let share = match key_store.load_share() {
                Ok(share) => share,
                Err(e) => return e.into(),
            };
            return self.spawn_beacon(beacon_id, &key_store, share, group);
        }
        Status::Ok
    }

    /// `check-chain(up_to)`: a read-only consistency scan (§4.2.1).
    pub fn check_chain(&self, beacon_id: &str, up_to: u64) -> Result<Vec<(u64, RoundVerdict)>, Status> {
        match self.runtime(beacon_id) {
            Some(runtime) => Ok(runtime.check_chain(up_to)),
            None => Err(Status::fatal(format!("unknown beacon id {beacon_id}"))),
        }
    }

    /// `list-schemes`: every scheme id this build knows how to speak
    /// (§9 "Scheme pluggability").
    pub fn list_schemes(&self) -> Vec<&'static str> {
        SchemeId::known().iter().map(|s| s.as_str()).collect()
    }
}
