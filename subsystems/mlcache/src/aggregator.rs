//! # Running Statistics
//!
//! Global counters shared by every scorer: hits, misses, the round counter
//! used as UCB time, the number of resident entries and the incrementally
//! maintained weighted average score.
//!
//! Counters are plain atomics. The hit/miss counter of an event is bumped
//! with release ordering before the round counter, so anyone who observes
//! round `t` also observes the counter of event `t`.

use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::config::ArithmeticPolicy;

/// Point-in-time copy of the global counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Hits observed
    pub hits: u64,
    /// Misses observed
    pub misses: u64,
    /// Events observed (UCB round)
    pub round: u64,
    /// Weighted average score of resident entries
    pub weighted_average: i64,
    /// Resident entries
    pub resident_count: u64,
}

/// Global hit/miss counters and weighted average
#[derive(Debug)]
pub struct RunningStats {
    hits: AtomicU64,
    misses: AtomicU64,
    round: AtomicU64,
    weighted_average: AtomicI64,
    resident: AtomicU64,
    policy: ArithmeticPolicy,
}

impl RunningStats {
    /// Create zeroed statistics
    pub const fn new(policy: ArithmeticPolicy) -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            round: AtomicU64::new(0),
            weighted_average: AtomicI64::new(0),
            resident: AtomicU64::new(0),
            policy,
        }
    }

    /// Count one event and return its round number (starting at 1)
    ///
    /// Counters wrap on overflow.
    #[inline]
    pub fn record_event(&self, hit: bool) -> u64 {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Release);
        self.round.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Count one event without advancing the round
    #[inline]
    pub fn record_outcome(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold an entry score into the weighted average
    ///
    /// `average += score / resident_count`. Returns the new average.
    pub fn update_average(&self, score: i64) -> i64 {
        let resident = self.resident.load(Ordering::Acquire);
        let policy = self.policy;

        let previous = self
            .weighted_average
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |avg| {
                Some(next_average(policy, avg, score, resident))
            })
            .unwrap_or_else(|avg| avg);

        next_average(policy, previous, score, resident)
    }

    /// One more resident entry
    #[inline]
    pub fn resident_inc(&self) {
        self.resident.fetch_add(1, Ordering::AcqRel);
    }

    /// One resident entry fewer (saturating)
    #[inline]
    pub fn resident_dec(&self) {
        self.resident_sub(1);
    }

    /// `n` resident entries fewer (saturating)
    pub fn resident_sub(&self, n: u64) {
        let _ = self
            .resident
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_sub(n))
            });
    }

    /// Hits observed
    #[inline(always)]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    /// Misses observed
    #[inline(always)]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Acquire)
    }

    /// Current round
    #[inline(always)]
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    /// Current weighted average
    #[inline(always)]
    pub fn weighted_average(&self) -> i64 {
        self.weighted_average.load(Ordering::Acquire)
    }

    /// Resident entries
    #[inline(always)]
    pub fn resident_count(&self) -> u64 {
        self.resident.load(Ordering::Acquire)
    }

    /// Arithmetic policy
    #[inline(always)]
    pub fn policy(&self) -> ArithmeticPolicy {
        self.policy
    }

    /// Copy of every counter
    pub fn snapshot(&self) -> CounterSnapshot {
        // Round first: the counters it implies are then visible
        let round = self.round();
        CounterSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            round,
            weighted_average: self.weighted_average(),
            resident_count: self.resident_count(),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Release);
        self.misses.store(0, Ordering::Release);
        self.round.store(0, Ordering::Release);
        self.weighted_average.store(0, Ordering::Release);
        self.resident.store(0, Ordering::Release);
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new(ArithmeticPolicy::default())
    }
}

fn next_average(policy: ArithmeticPolicy, avg: i64, score: i64, resident: u64) -> i64 {
    match policy {
        ArithmeticPolicy::Legacy => {
            // An empty cache divides by the largest count instead of zero
            let divisor = if resident == 0 { u64::MAX } else { resident };
            let delta = (score as i128 / divisor as i128) as i64;
            let next = avg.wrapping_add(delta);
            if next == i64::MAX { 0 } else { next }
        },
        ArithmeticPolicy::Guarded => {
            if resident == 0 {
                return avg;
            }
            let delta = (score as i128 / resident as i128) as i64;
            avg.saturating_add(delta)
        },
    }
}
