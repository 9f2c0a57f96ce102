//! # Score Updater
//!
//! Per-entry state machine driven by hit/miss events.
//!
//! ```text
//!                 miss (score = avg) / hit (score = 0, then hit rule)
//!   Untracked ─────────────────────────────────────────────▶ Resident
//!                                                             │   ▲
//!                                              host eviction  │   │ miss: score = avg,
//!                                                             ▼   │ sweep if score != 0
//!                                                             Shadow
//! ```
//!
//! Hit rule on a resident entry at round `t` with `n` plays:
//!
//! ```text
//! score = score - C + bound(t - 1, n) - bound(t, n) * n;   n += 1
//! ```
//!
//! Two strategies implement [`ScoringStrategy`]: [`AdaptiveScoring`] runs
//! the full model, [`CountingOnly`] only counts hits and misses.

use crate::aggregator::RunningStats;
use crate::bound::ConfidenceBound;
use crate::config::ScoringMode;
use crate::entry::{EntryMeta, EntryState, GroupId, PageKey};
use crate::store::ScoreStore;
use crate::sweep::{ShadowSweep, SweepReport};

// =============================================================================
// Outcomes
// =============================================================================

/// How an event moved an entry through the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Untracked key became resident
    Created,
    /// Resident entry was hit
    Hit,
    /// Shadow entry was hit and became resident again
    RevivedByHit,
    /// Miss on a shadow without signal; treated as a cold miss
    ColdRevival,
    /// Miss on a shadow with a nonzero score; siblings were penalized
    PrematureEviction,
    /// Miss on an entry that was still resident
    Refreshed,
}

/// Score change produced by one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreChange {
    /// Round of the event
    pub round: u64,
    /// State transition taken
    pub transition: Transition,
    /// Entry score after the event
    pub score: i64,
    /// Entry play count after the event
    pub plays: u64,
    /// Weighted average after the event
    pub weighted_average: i64,
    /// Sibling sweep, if one ran
    pub sweep: Option<SweepReport>,
}

/// Result of feeding one event to a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The engine is not accepting events
    Ignored,
    /// Only the hit/miss counters moved
    Counted,
    /// The event had no group to score in
    Unscored,
    /// An entry was scored
    Scored(ScoreChange),
}

impl AccessOutcome {
    /// Score change, if any
    pub fn change(&self) -> Option<&ScoreChange> {
        match self {
            AccessOutcome::Scored(change) => Some(change),
            _ => None,
        }
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// A way of turning hit/miss events into counters and scores
pub trait ScoringStrategy: Send + Sync {
    /// Mode implemented by this strategy
    fn mode(&self) -> ScoringMode;

    /// Handle one access
    fn on_access(
        &self,
        store: &ScoreStore,
        stats: &RunningStats,
        key: PageKey,
        group: Option<GroupId>,
        hit: bool,
    ) -> AccessOutcome;
}

// =============================================================================
// Counting Only
// =============================================================================

/// Counts hits and misses; scores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingOnly;

impl ScoringStrategy for CountingOnly {
    fn mode(&self) -> ScoringMode {
        ScoringMode::CountingOnly
    }

    fn on_access(
        &self,
        _store: &ScoreStore,
        stats: &RunningStats,
        _key: PageKey,
        _group: Option<GroupId>,
        hit: bool,
    ) -> AccessOutcome {
        stats.record_outcome(hit);
        AccessOutcome::Counted
    }
}

// =============================================================================
// Adaptive
// =============================================================================

/// UCB scoring with shadow-entry correction
#[derive(Debug)]
pub struct AdaptiveScoring {
    bound: ConfidenceBound,
    sweep: ShadowSweep,
}

impl AdaptiveScoring {
    /// Create the strategy for scale `C`
    pub fn new(scale: u64, sweep: ShadowSweep) -> Self {
        Self {
            bound: ConfidenceBound::new(scale),
            sweep,
        }
    }

    /// Reward unit `C` as a signed score delta
    #[inline(always)]
    fn unit(&self) -> i64 {
        self.bound.scale() as i64
    }

    fn on_hit(
        &self,
        store: &ScoreStore,
        stats: &RunningStats,
        round: u64,
        key: PageKey,
        group: GroupId,
    ) -> ScoreChange {
        // Retried when the entry is detached under us by forget/forget_group
        let (created, revived, meta) = loop {
            let Some((cell, created)) = store.group_or_create(group).get_or_insert_with(key, || {
                stats.resident_inc();
                EntryMeta::resident(0)
            }) else {
                continue;
            };

            let applied = cell.update_live(|meta| {
                let revived = meta.state == EntryState::Shadow;
                if revived {
                    stats.resident_inc();
                    meta.state = EntryState::Resident;
                    meta.score = stats.weighted_average();
                }
                meta.score = meta
                    .score
                    .wrapping_sub(self.unit())
                    .wrapping_add(self.bound.hit_correction(round, meta.plays));
                meta.play();
                (revived, *meta)
            });
            if let Some((revived, meta)) = applied {
                break (created, revived, meta);
            }
        };

        let transition = match (created, revived) {
            (true, _) => Transition::Created,
            (false, true) => Transition::RevivedByHit,
            (false, false) => Transition::Hit,
        };

        ScoreChange {
            round,
            transition,
            score: meta.score,
            plays: meta.plays,
            weighted_average: stats.update_average(meta.score),
            sweep: None,
        }
    }

    fn on_miss(
        &self,
        store: &ScoreStore,
        stats: &RunningStats,
        round: u64,
        key: PageKey,
        group: GroupId,
    ) -> ScoreChange {
        let average = stats.weighted_average();

        let (group, transition, meta) = loop {
            let group = store.group_or_create(group);
            let Some((cell, created)) = group.get_or_insert_with(key, || {
                stats.resident_inc();
                EntryMeta::resident(average)
            }) else {
                continue;
            };

            let applied = cell.update_live(|meta| {
                if created {
                    return (Transition::Created, *meta);
                }
                let transition = match meta.state {
                    EntryState::Shadow if meta.has_signal() => Transition::PrematureEviction,
                    EntryState::Shadow => Transition::ColdRevival,
                    EntryState::Resident => Transition::Refreshed,
                };
                if meta.state == EntryState::Shadow {
                    stats.resident_inc();
                }
                meta.state = EntryState::Resident;
                meta.score = average;
                (transition, *meta)
            });
            if let Some((transition, meta)) = applied {
                break (group, transition, meta);
            }
        };

        let sweep = if transition == Transition::PrematureEviction {
            log::debug!(
                "mlcache: {} in {} evicted too early, penalizing siblings",
                key,
                group.id()
            );
            Some(self.sweep.penalize(&group, key))
        } else {
            None
        };

        ScoreChange {
            round,
            transition,
            score: meta.score,
            plays: meta.plays,
            weighted_average: stats.update_average(meta.score),
            sweep,
        }
    }
}

impl ScoringStrategy for AdaptiveScoring {
    fn mode(&self) -> ScoringMode {
        ScoringMode::Adaptive
    }

    fn on_access(
        &self,
        store: &ScoreStore,
        stats: &RunningStats,
        key: PageKey,
        group: Option<GroupId>,
        hit: bool,
    ) -> AccessOutcome {
        let round = stats.record_event(hit);
        let Some(group) = group else {
            return AccessOutcome::Unscored;
        };

        let change = if hit {
            self.on_hit(store, stats, round, key, group)
        } else {
            self.on_miss(store, stats, round, key, group)
        };
        AccessOutcome::Scored(change)
    }
}
