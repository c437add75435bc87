//! Partial cache & aggregator: §4.3 "Aggregator". In-memory, keyed by
//! round, deduplicates partials by signer index, and reconstructs the full
//! signature the first time verified distinct shares reach `threshold`.
//! Private to the handler (§5 "Shared resources"); all access goes through
//! this type's own lock.

use std::collections::HashMap;

use crypto::{Partial, Vault};
use parking_lot::Mutex;

struct RoundEntry {
    msg: Vec<u8>,
    prev_sig: Vec<u8>,
    shares: HashMap<u32, Partial>,
}

/// Keyed by `(round, msg_hash)` per §4.3; in practice one round only ever
/// has one live `msg` (the one the handler is currently signing), so the
/// inner map is keyed by round and the message is carried alongside it —
/// a partial whose `digest` doesn't match the round's current message
/// (e.g. a stale predecessor) is rejected by the caller before it reaches
/// here.
#[derive(Default)]
pub struct Aggregator {
    rounds: Mutex<HashMap<u64, RoundEntry>>,
}

/// What admitting a partial can trigger.
pub enum Admission {
    /// Accepted; still below threshold.
    Pending,
    /// Threshold reached: here is the aggregated raw shares to reconstruct
    /// with. Reconstruction and storage happen outside this lock so crypto
    /// work and I/O never run with the aggregator held.
    ThresholdReached { msg: Vec<u8>, prev_sig: Vec<u8>, shares: Vec<Partial> },
    /// Already had this signer's share for this round (replay); a no-op.
    DuplicateSigner,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator::default()
    }

    /// Admits `partial` for `round`, signed over `msg` (with predecessor
    /// `prev_sig`). Verification must have already happened — this type
    /// only dedups and counts.
    pub fn admit(&self, round: u64, msg: Vec<u8>, prev_sig: Vec<u8>, partial: Partial, threshold: usize) -> Admission {
        let mut rounds = self.rounds.lock();
        let entry = rounds.entry(round).or_insert_with(|| RoundEntry {
            msg: msg.clone(),
            prev_sig: prev_sig.clone(),
            shares: HashMap::new(),
        });
        if entry.shares.contains_key(&partial.signer_index) {
            return Admission::DuplicateSigner;
        }
        entry.shares.insert(partial.signer_index, partial);
        if entry.shares.len() >= threshold {
            let shares: Vec<Partial> = entry.shares.values().cloned().collect();
            let msg = entry.msg.clone();
            let prev_sig = entry.prev_sig.clone();
            Admission::ThresholdReached { msg, prev_sig, shares }
        } else {
            Admission::Pending
        }
    }

    /// Drops a round's partial set once its full signature is stored (§4.3
    /// "drop the round's partial set") or once the round becomes historic.
    pub fn drop_round(&self, round: u64) {
        self.rounds.lock().remove(&round);
    }

    pub fn distinct_signers(&self, round: u64) -> usize {
        self.rounds.lock().get(&round).map(|e| e.shares.len()).unwrap_or(0)
    }

    /// Drops every round strictly below `below` — historic rounds whose
    /// partials can no longer matter once the chain has moved past them.
    pub fn prune_below(&self, below: u64) {
        self.rounds.lock().retain(|round, _| *round >= below);
    }
}

/// Reconstructs and re-verifies the full signature for a threshold-reached
/// round. Run outside the aggregator's lock; dispatched to a rayon worker
/// if the caller is risk of starving the tick loop (§5 "Cryptographic
/// verification is synchronous and CPU-bound").
pub fn reconstruct(vault: &Vault, msg: &[u8], shares: &[Partial], threshold: usize) -> crypto::Result<Vec<u8>> {
    vault.aggregate(msg, shares, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(round: u64, signer: u32) -> Partial {
        Partial {
            round,
            previous_signature: b"prev".to_vec(),
            signer_index: signer,
            sig_share: vec![signer as u8; 4],
        }
    }

    #[test]
    fn reaches_threshold_exactly_once() {
        let agg = Aggregator::new();
        let msg = b"msg".to_vec();
        let prev = b"prev".to_vec();
        assert!(matches!(
            agg.admit(1, msg.clone(), prev.clone(), partial(1, 0), 3),
            Admission::Pending
        ));
        assert!(matches!(
            agg.admit(1, msg.clone(), prev.clone(), partial(1, 1), 3),
            Admission::Pending
        ));
        match agg.admit(1, msg.clone(), prev.clone(), partial(1, 2), 3) {
            Admission::ThresholdReached { shares, .. } => assert_eq!(shares.len(), 3),
            _ => panic!("expected threshold reached"),
        }
    }

    #[test]
    fn duplicate_signer_is_a_noop() {
        let agg = Aggregator::new();
        let msg = b"msg".to_vec();
        let prev = b"prev".to_vec();
        agg.admit(1, msg.clone(), prev.clone(), partial(1, 0), 3);
        assert!(matches!(
            agg.admit(1, msg, prev, partial(1, 0), 3),
            Admission::DuplicateSigner
        ));
        assert_eq!(agg.distinct_signers(1), 1);
    }

    #[test]
    fn drop_round_clears_state() {
        let agg = Aggregator::new();
        agg.admit(1, b"m".to_vec(), b"p".to_vec(), partial(1, 0), 3);
        agg.drop_round(1);
        assert_eq!(agg.distinct_signers(1), 0);
    }

    #[test]
    fn prune_below_clears_only_historic_rounds() {
        let agg = Aggregator::new();
        agg.admit(1, b"m".to_vec(), b"p".to_vec(), partial(1, 0), 3);
        agg.admit(5, b"m".to_vec(), b"p".to_vec(), partial(5, 0), 3);
        agg.prune_below(5);
        assert_eq!(agg.distinct_signers(1), 0);
        assert_eq!(agg.distinct_signers(5), 1);
    }
}
