//! In-process configuration structs (§1.1 "Configuration"): serde-derived,
//! `Default`-implementing, constructible or deserializable by whatever host
//! process owns the actual TOML/argv front-end. This crate never opens a
//! file itself; sub-configs nest behind one top-level struct.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts for one DKG/resharing run (§4.6 phases "Accepted", "Executing").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DkgTimeoutsConfig {
    pub accept_secs: u64,
    pub executing_secs: u64,
}

impl Default for DkgTimeoutsConfig {
    fn default() -> Self {
        DkgTimeoutsConfig {
            accept_secs: 5,
            executing_secs: 10,
        }
    }
}

impl DkgTimeoutsConfig {
    pub fn accept(&self) -> Duration {
        Duration::from_secs(self.accept_secs)
    }

    pub fn executing(&self) -> Duration {
        Duration::from_secs(self.executing_secs)
    }
}

/// Timeouts/behavior knobs for the sync manager's catch-up and `follow`
/// control-plane command (§4.5, §6.1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub catchup_deadline_secs: u64,
    pub follow_deadline_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            catchup_deadline_secs: 10,
            follow_deadline_secs: 120,
        }
    }
}

impl SyncConfig {
    pub fn catchup_deadline(&self) -> Duration {
        Duration::from_secs(self.catchup_deadline_secs)
    }

    pub fn follow_deadline(&self) -> Duration {
        Duration::from_secs(self.follow_deadline_secs)
    }
}

/// Root node configuration: one process, many hosted beacon ids (§9
/// "Global state"), all under one persisted-state root (§6 "Persisted
/// state layout").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Root of the per-beacon-id directories the `keys` crate manages.
    pub base_dir: PathBuf,
    pub dkg: DkgTimeoutsConfig,
    pub sync: SyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            base_dir: PathBuf::from("./randbeacon-data"),
            dkg: DkgTimeoutsConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
