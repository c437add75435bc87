//! Multi-beacon-id hosting (§2.1 "Multi-beacon-id hosting", §9 "Global
//! state": "a process may host multiple independent beacon ids; each owns
//! its own chain store, vault, group, share, and handler. There is no
//! shared mutable state across ids other than the transport facade").
//!
//! [`NodeRuntime`] is that registry plus the shared transport client; it
//! implements [`net::BeaconRegistry`] directly so [`net::grpc::GrpcServer`]
//! can dispatch into it without any adapter layer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tonic::Status as GrpcStatus;

use beacon::BeaconRuntime;
use dkg::DkgEngine;
use net::{BeaconClient, BeaconService, DkgService};

use crate::config::NodeConfig;

/// One hosted beacon id's current phase: either a DKG/resharing run is
/// in flight, or the handler is up and serving rounds. A freshly
/// registered id with neither is not reachable yet.
pub(crate) enum Hosted {
    Dkg(Arc<DkgEngine>),
    Running(Arc<BeaconRuntime>),
}

/// The registry plus everything every hosted id shares: the persisted-state
/// root and one transport client reused across all of them (§9 "the
/// transport facade" is the one piece of genuinely shared state).
pub struct NodeRuntime {
    pub(crate) config: NodeConfig,
    pub(crate) client: Arc<dyn BeaconClient>,
    pub(crate) hosted: RwLock<HashMap<String, Hosted>>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig, client: Arc<dyn BeaconClient>) -> Self {
        NodeRuntime {
            config,
            client,
            hosted: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<dyn BeaconClient> {
        self.client.clone()
    }

    pub fn is_hosting(&self, beacon_id: &str) -> bool {
        self.hosted.read().contains_key(beacon_id)
    }

    pub fn hosted_ids(&self) -> Vec<String> {
        self.hosted.read().keys().cloned().collect()
    }

    /// The running beacon, if this id has completed its DKG/resharing and
    /// is actively serving rounds.
    pub fn runtime(&self, beacon_id: &str) -> Option<Arc<BeaconRuntime>> {
        match self.hosted.read().get(beacon_id) {
            Some(Hosted::Running(runtime)) => Some(runtime.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_dkg(&self, beacon_id: impl Into<String>, engine: Arc<DkgEngine>) {
        self.hosted.write().insert(beacon_id.into(), Hosted::Dkg(engine));
    }

    pub(crate) fn set_running(&self, beacon_id: impl Into<String>, runtime: Arc<BeaconRuntime>) {
        self.hosted.write().insert(beacon_id.into(), Hosted::Running(runtime));
    }

    pub(crate) fn remove(&self, beacon_id: &str) -> Option<Hosted> {
        self.hosted.write().remove(beacon_id)
    }
}

impl net::BeaconRegistry for NodeRuntime {
    fn beacon_service(&self, beacon_id: &str) -> Result<Arc<dyn BeaconService>, GrpcStatus> {
        match self.hosted.read().get(beacon_id) {
            Some(Hosted::Running(runtime)) => Ok(runtime.handler() as Arc<dyn BeaconService>),
            Some(Hosted::Dkg(_)) => Err(GrpcStatus::failed_precondition(format!(
                "beacon id {beacon_id} is still running its dkg/resharing phase"
            ))),
            None => Err(GrpcStatus::not_found(format!("unknown beacon id {beacon_id}"))),
        }
    }

    fn dkg_service(&self, beacon_id: &str) -> Result<Arc<dyn DkgService>, GrpcStatus> {
        match self.hosted.read().get(beacon_id) {
            Some(Hosted::Dkg(engine)) => Ok(engine.clone() as Arc<dyn DkgService>),
            Some(Hosted::Running(_)) => Err(GrpcStatus::failed_precondition(format!(
                "beacon id {beacon_id} already completed its dkg and is serving rounds"
            ))),
            None => Err(GrpcStatus::not_found(format!("unknown beacon id {beacon_id}"))),
        }
    }
}
