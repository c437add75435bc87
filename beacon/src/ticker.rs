//! Round-time math and the tick emitter: §4 "Ticker", §6 "Round-numbering &
//! time", §8 boundary properties. All arithmetic is checked; overflow is
//! reported rather than silently wrapped (§9 "Round indexing & time math").

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// `genesis_time + (round-1)*period` for `round >= 1`; `genesis_time` itself
/// for the sentinel `round == 0` (§8 "time_of_round(_, _, 0) == genesis_time").
pub fn time_of_round(genesis_time: u64, period: Duration, round: u64) -> Result<u64> {
    if round == 0 {
        return Ok(genesis_time);
    }
    let offset = (round - 1)
        .checked_mul(period.as_secs())
        .ok_or(Error::RoundOverflow)?;
    genesis_time.checked_add(offset).ok_or(Error::RoundOverflow)
}

/// The round whose period contains `now`, clamped to 1 for `now < genesis_time`
/// (§6: `current_round(now) = floor((now - genesis_time)/period) + 1`).
pub fn current_round(genesis_time: u64, period: Duration, now: u64) -> Result<u64> {
    if now < genesis_time {
        return Ok(1);
    }
    let elapsed = now - genesis_time;
    let idx = elapsed
        .checked_div(period.as_secs())
        .ok_or(Error::RoundOverflow)?;
    idx.checked_add(1).ok_or(Error::RoundOverflow)
}

/// The next round to occur strictly after `now`, and its deadline.
/// Boundary cases (§8): `next_round(genesis_time - 1) == (1, genesis_time)`,
/// `next_round(genesis_time) == (2, genesis_time + period)`.
pub fn next_round(genesis_time: u64, period: Duration, now: u64) -> Result<(u64, u64)> {
    let idx = current_round(genesis_time, period, now)?;
    let idx_deadline = time_of_round(genesis_time, period, idx)?;
    if idx_deadline > now {
        Ok((idx, idx_deadline))
    } else {
        let next = idx.checked_add(1).ok_or(Error::RoundOverflow)?;
        let deadline = time_of_round(genesis_time, period, next)?;
        Ok((next, deadline))
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

/// One `(round, deadline)` event (§4 "Ticker").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub round: u64,
    pub deadline: u64,
}

/// Emits [`Tick`]s aligned to `genesis_time + round*period`. Spawned as its
/// own task; the handler consumes its receiver alongside the catch-up queue
/// (§4.3 "hurry-up" mode) in a single `select!` loop.
pub struct Ticker {
    genesis_time: u64,
    period: Duration,
}

impl Ticker {
    pub fn new(genesis_time: u64, period: Duration) -> Self {
        Ticker { genesis_time, period }
    }

    /// Spawns the background loop and returns the channel ticks arrive on.
    /// The loop exits promptly once `cancel` fires (§5 "stop cancels the
    /// root context").
    pub fn spawn(self, cancel: CancellationToken) -> flume::Receiver<Tick> {
        let (tx, rx) = flume::unbounded();
        tokio::spawn(async move {
            loop {
                let now = unix_now();
                let (round, deadline) = match next_round(self.genesis_time, self.period, now) {
                    Ok(rd) => rd,
                    Err(e) => {
                        tracing::error!(error = %e, "ticker round/time math overflowed, stopping");
                        return;
                    }
                };
                let wait = Duration::from_secs(deadline.saturating_sub(now));
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        debug!(round, deadline, "tick");
                        if tx.send(Tick { round, deadline }).is_err() {
                            return;
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
        rx
    }
}

/// A one-shot, catchup-period-delayed re-tick, used by the handler's
/// "hurry-up" mode (§4.3) to target a beacon that just caught up rather
/// than waiting for the next full-period tick.
#[instrument(skip(tx, cancel))]
pub fn schedule_hurry_up(delay: Duration, round: u64, deadline: u64, tx: flume::Sender<Tick>, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let _ = tx.send(Tick { round, deadline });
            }
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(2);
    const GENESIS: u64 = 1_000_000;

    #[test]
    fn time_of_round_zero_is_genesis() {
        assert_eq!(time_of_round(GENESIS, PERIOD, 0).unwrap(), GENESIS);
    }

    #[test]
    fn time_of_round_one_is_genesis_too() {
        assert_eq!(time_of_round(GENESIS, PERIOD, 1).unwrap(), GENESIS);
        assert_eq!(time_of_round(GENESIS, PERIOD, 2).unwrap(), GENESIS + 2);
    }

    #[test]
    fn current_round_clamps_before_genesis() {
        assert_eq!(current_round(GENESIS, PERIOD, GENESIS - 100).unwrap(), 1);
        assert_eq!(current_round(GENESIS, PERIOD, 0).unwrap(), 1);
    }

    #[test]
    fn next_round_boundary_cases() {
        assert_eq!(next_round(GENESIS, PERIOD, GENESIS - 1).unwrap(), (1, GENESIS));
        assert_eq!(next_round(GENESIS, PERIOD, GENESIS).unwrap(), (2, GENESIS + 2));
        assert_eq!(next_round(GENESIS, PERIOD, GENESIS + 1).unwrap(), (2, GENESIS + 2));
    }

    #[test]
    fn round_trip_within_period() {
        for t in GENESIS..GENESIS + 10 {
            let (round, deadline) = next_round(GENESIS, PERIOD, t).unwrap();
            assert!(deadline <= t + PERIOD.as_secs());
            assert!(t < deadline);
            let back = time_of_round(GENESIS, PERIOD, round).unwrap();
            assert_eq!(back, deadline);
        }
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        assert!(matches!(
            time_of_round(u64::MAX - 1, PERIOD, 2),
            Err(Error::RoundOverflow)
        ));
    }
}

/// Boundary properties (§8) checked against arbitrary, not just
/// hand-picked, genesis/period/time combinations.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// §8 invariant 6: `time_of_round(round_of_time(t)) <= t <
        /// time_of_round(round_of_time(t)) + period`, for every `t >= genesis`.
        #[test]
        fn current_round_brackets_time(
            genesis in 0u64..10_000_000,
            period_secs in 1u64..3_600,
            offset in 0u64..100_000_000,
        ) {
            let period = Duration::from_secs(period_secs);
            let t = genesis + offset;
            let round = current_round(genesis, period, t).unwrap();
            let start = time_of_round(genesis, period, round).unwrap();
            prop_assert!(start <= t);
            prop_assert!(t < start + period_secs);
        }

        /// `current_round` never decreases as `t` advances.
        #[test]
        fn current_round_is_monotone(
            genesis in 0u64..10_000_000,
            period_secs in 1u64..3_600,
            a in 0u64..100_000_000,
            b in 0u64..100_000_000,
        ) {
            let period = Duration::from_secs(period_secs);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let r_lo = current_round(genesis, period, genesis + lo).unwrap();
            let r_hi = current_round(genesis, period, genesis + hi).unwrap();
            prop_assert!(r_lo <= r_hi);
        }

        /// `next_round`'s deadline is always strictly in the future and
        /// agrees with `time_of_round` at the round it names.
        #[test]
        fn next_round_deadline_matches_time_of_round(
            genesis in 0u64..10_000_000,
            period_secs in 1u64..3_600,
            offset in 0u64..100_000_000,
        ) {
            let period = Duration::from_secs(period_secs);
            let now = genesis + offset;
            let (round, deadline) = next_round(genesis, period, now).unwrap();
            prop_assert!(deadline > now);
            prop_assert_eq!(time_of_round(genesis, period, round).unwrap(), deadline);
        }
    }
}
