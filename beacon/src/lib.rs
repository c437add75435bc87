//! Beacon production: §4 of the design. Wires the chain store, the vault,
//! the tick-driven handler, peer bookkeeping, and the sync manager into one
//! per-beacon-id runtime. The DKG/resharing phase machine that produces the
//! [`crypto::Share`] consumed here lives in the sibling `dkg` crate; the
//! multi-beacon-id registry and control-plane dispatch live in `node`.

pub mod aggregator;
pub mod error;
pub mod handler;
pub mod monitor;
pub mod peer_manager;
pub mod sync;
pub mod ticker;

pub use aggregator::{Admission, Aggregator};
pub use error::{Error, Result};
pub use handler::{BeaconHandler, HandlerState};
pub use monitor::ThresholdMonitor;
pub use peer_manager::{PeerManager, PeerStats};
pub use sync::{RoundVerdict, SyncManager};
pub use ticker::{current_round, next_round, time_of_round, Tick, Ticker};

use std::sync::Arc;

use crypto::{GroupDescriptor, Vault};
use net::{BeaconClient, Peer};
use store::ChainStore;

/// A fully wired, single beacon id's production runtime: chain store, vault,
/// tick loop, and sync manager behind one handle. `node` holds one of these
/// per hosted beacon id and dispatches RPCs into its [`handler`].
pub struct BeaconRuntime {
    handler: Arc<BeaconHandler>,
}

impl BeaconRuntime {
    /// Assembles a beacon runtime from an already-generated share (the
    /// output of a completed DKG or resharing) and starts the tick loop
    /// immediately (§4.3 "Stopped -> Running" on construction).
    pub fn start(
        beacon_id: impl Into<String>,
        store: Arc<ChainStore>,
        vault: Vault,
        group: GroupDescriptor,
        client: Arc<dyn BeaconClient>,
    ) -> Self {
        let handler = Arc::new(BeaconHandler::new(beacon_id, store, vault, group, client));
        handler.start();
        BeaconRuntime { handler }
    }

    pub fn handler(&self) -> Arc<BeaconHandler> {
        self.handler.clone()
    }

    pub fn stop(&self) {
        self.handler.stop();
    }

    pub fn group(&self) -> Arc<GroupDescriptor> {
        self.handler.group()
    }

    pub fn store(&self) -> Arc<ChainStore> {
        self.handler.store()
    }

    /// Swaps in the post-reshare epoch (§5 "a resharing atomically swaps
    /// it"); the caller is responsible for calling this at the new group's
    /// `transition_time`.
    pub fn swap_epoch(&self, vault: Vault, group: GroupDescriptor) {
        self.handler.swap_epoch(vault, group);
    }

    /// A read-only consistency scan: validates every stored round up to
    /// `up_to` and reports (round, fault) pairs for anything wrong or
    /// missing. Thin store-facing entry point for the `check-chain`
    /// control-plane command (§4.2.1 supplemented operation) so `node`
    /// never has to reach into sync manager internals for a simple audit.
    pub fn check_chain(&self, up_to: u64) -> Vec<(u64, RoundVerdict)> {
        let group = self.group();
        let sync = self.handler.sync_manager();
        let mut report = Vec::new();
        sync.validate_chain(up_to, &group, |round, verdict| report.push((round, verdict)));
        report
    }

    /// Drives a catch-up sync to `target_round` against `peers`, outside
    /// the regular tick-driven path (used for an explicit operator-invoked
    /// `follow`, §6).
    pub async fn follow(&self, target_round: u64, peers: &[Peer], deadline: std::time::Duration) -> Result<u64> {
        let group = self.group();
        self.handler.sync_manager().run_sync(target_round, &group, peers, deadline).await
    }
}
