//! Per-peer delivery statistics and shuffled/weighted peer ordering,
//! adapted from a single `get_peer` pick to the ordered-list shape the
//! sync manager and the handler's broadcast fan-out both need (§2.1
//! "Peer manager").

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::thread_rng;

use net::Peer;

/// In-memory only; reset across restarts is fine (§3.1).
#[derive(Clone, Debug, Default)]
pub struct PeerStats {
    pub successes: u32,
    pub failures: u32,
    pub last_rtt_millis: u64,
}

impl PeerStats {
    fn score(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 0.5;
        }
        self.successes as f64 / total as f64
    }
}

#[derive(Default)]
pub struct PeerManager {
    stats: Mutex<HashMap<String, PeerStats>>,
}

impl PeerManager {
    pub fn new() -> Self {
        PeerManager::default()
    }

    pub fn record_success(&self, peer: &Peer, rtt_millis: u64) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(peer.address.clone()).or_default();
        entry.successes += 1;
        entry.last_rtt_millis = rtt_millis;
    }

    pub fn record_failure(&self, peer: &Peer) {
        let mut stats = self.stats.lock();
        stats.entry(peer.address.clone()).or_default().failures += 1;
    }

    pub fn stats_for(&self, peer: &Peer) -> PeerStats {
        self.stats.lock().get(&peer.address).cloned().unwrap_or_default()
    }

    /// A shuffled ordering of `candidates`, success-weighted: peers with a
    /// better observed success rate sort earlier on average, but the order
    /// is not fully deterministic so a single bad-but-lucky peer doesn't
    /// permanently monopolize the front of the list (§4.5 "shuffled list
    /// of peers").
    pub fn order(&self, candidates: &[Peer]) -> Vec<Peer> {
        let mut scored: Vec<(f64, Peer)> = {
            let stats = self.stats.lock();
            candidates
                .iter()
                .map(|p| {
                    let score = stats.get(&p.address).map(PeerStats::score).unwrap_or(0.5);
                    (score, p.clone())
                })
                .collect()
        };
        scored.shuffle(&mut thread_rng());
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_peers_sort_ahead_of_failing_ones() {
        let pm = PeerManager::new();
        let good = Peer::new("good:1", false);
        let bad = Peer::new("bad:1", false);
        for _ in 0..5 {
            pm.record_success(&good, 10);
        }
        for _ in 0..5 {
            pm.record_failure(&bad);
        }
        let ordered = pm.order(&[bad.clone(), good.clone()]);
        assert_eq!(ordered[0], good);
    }

    #[test]
    fn unknown_peers_get_neutral_score() {
        let pm = PeerManager::new();
        let peer = Peer::new("fresh:1", false);
        assert_eq!(pm.stats_for(&peer).successes, 0);
        let ordered = pm.order(&[peer.clone()]);
        assert_eq!(ordered, vec![peer]);
    }
}
