//! Threshold/health monitor: §4.3 "Threshold monitor", split out as its own
//! module per §2.1 rather than folded silently into the handler. Counts
//! per-peer partial-RPC delivery failures over a sliding window of rounds
//! and emits a `tracing::warn!` alert when fewer than `threshold` peers
//! look reachable. Purely observational — §4.3 "it does not otherwise
//! affect protocol correctness".

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::warn;

/// One round's worth of per-peer outcomes, oldest first.
struct Window {
    rounds: VecDeque<HashMap<String, bool>>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Window {
            rounds: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push_round(&mut self) {
        if self.rounds.len() == self.capacity {
            self.rounds.pop_front();
        }
        self.rounds.push_back(HashMap::new());
    }

    fn record(&mut self, peer: &str, reachable: bool) {
        if self.rounds.is_empty() {
            self.rounds.push_back(HashMap::new());
        }
        self.rounds.back_mut().unwrap().insert(peer.to_string(), reachable);
    }

    /// A peer counts as reachable if it succeeded at least once in the
    /// window; a peer never seen at all is assumed unreachable (it hasn't
    /// proven otherwise).
    fn reachable_peers(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for round in &self.rounds {
            for (peer, ok) in round {
                if *ok {
                    seen.insert(peer.clone());
                }
            }
        }
        seen.len()
    }
}

/// Background watcher the handler feeds with per-round delivery outcomes.
pub struct ThresholdMonitor {
    window: Mutex<Window>,
    threshold: usize,
}

impl ThresholdMonitor {
    /// `window_rounds` bounds how many recent rounds' outcomes are kept;
    /// `threshold` is the group's signing threshold.
    pub fn new(window_rounds: usize, threshold: usize) -> Self {
        ThresholdMonitor {
            window: Mutex::new(Window::new(window_rounds.max(1))),
            threshold,
        }
    }

    pub fn begin_round(&self) {
        self.window.lock().push_round();
    }

    pub fn record_delivery(&self, peer_address: &str, ok: bool) {
        let mut window = self.window.lock();
        window.record(peer_address, ok);
        drop(window);
        self.check_and_alert();
    }

    fn check_and_alert(&self) {
        let reachable = self.window.lock().reachable_peers();
        if reachable < self.threshold {
            warn!(
                reachable,
                threshold = self.threshold,
                "fewer than threshold peers appear reachable over the recent window"
            );
        }
    }

    pub fn reachable_peers(&self) -> usize {
        self.window.lock().reachable_peers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reachable_count_survives_across_window() {
        let mon = ThresholdMonitor::new(3, 3);
        mon.begin_round();
        mon.record_delivery("a", true);
        mon.record_delivery("b", true);
        mon.begin_round();
        mon.record_delivery("a", true);
        assert_eq!(mon.reachable_peers(), 2);
    }

    #[test]
    fn window_evicts_oldest_round() {
        let mon = ThresholdMonitor::new(1, 2);
        mon.begin_round();
        mon.record_delivery("a", true);
        mon.begin_round();
        mon.record_delivery("b", true);
        // "a" fell out of the single-round window.
        assert_eq!(mon.reachable_peers(), 1);
    }
}
