//! # Scoring Engine
//!
//! Entry point for the host cache. The host reports every lookup outcome
//! through [`Engine::on_cache_access`] and tells the engine about evictions
//! and reclamation through the eviction hooks. Everything runs synchronously
//! on the caller's context; only long sibling sweeps yield.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use static_assertions::assert_impl_all;

use crate::aggregator::RunningStats;
use crate::config::{EngineConfig, ScoringMode};
use crate::entry::{EntryMeta, EntrySnapshot, EntryState, GroupId, PageKey};
use crate::error::{MlCacheError, MlCacheResult};
use crate::report::{StatsNode, StatsRegistry, StatsSnapshot};
use crate::store::{ScoreStore, Upsert};
use crate::sweep::{DefaultYielder, ShadowSweep, Yielder};
use crate::updater::{AccessOutcome, AdaptiveScoring, CountingOnly, ScoringStrategy};

// =============================================================================
// Access Sink
// =============================================================================

/// Callback surface handed to the host cache
pub trait AccessSink: Send + Sync {
    /// A lookup for `key` in `group` hit or missed
    fn on_cache_access(&self, key: PageKey, group: Option<GroupId>, hit: bool);
}

// =============================================================================
// Engine
// =============================================================================

/// Adaptive page scoring engine
pub struct Engine {
    config: EngineConfig,
    store: ScoreStore,
    stats: Arc<RunningStats>,
    strategy: Box<dyn ScoringStrategy>,
    registry: Arc<dyn StatsRegistry>,
    active: AtomicBool,
}

assert_impl_all!(Engine: Send, Sync);

impl Engine {
    /// Start the engine and publish its stats node
    ///
    /// Fails if the configuration is invalid or the node cannot be
    /// registered; nothing is left registered on failure.
    pub fn init(config: EngineConfig, registry: Arc<dyn StatsRegistry>) -> MlCacheResult<Self> {
        Self::init_with_yielder(config, registry, Box::new(DefaultYielder::default()))
    }

    /// Start the engine with a host-provided sweep yielder
    pub fn init_with_yielder(
        config: EngineConfig,
        registry: Arc<dyn StatsRegistry>,
        yielder: Box<dyn Yielder>,
    ) -> MlCacheResult<Self> {
        config.validate()?;

        let stats = Arc::new(RunningStats::new(config.arithmetic));
        let strategy: Box<dyn ScoringStrategy> = match config.mode {
            ScoringMode::Adaptive => {
                let sweep = ShadowSweep::new(config.scale as i64, config.yield_batch, yielder);
                Box::new(AdaptiveScoring::new(config.scale, sweep))
            },
            ScoringMode::CountingOnly => Box::new(CountingOnly),
        };

        let node = Arc::new(StatsNode::new(
            config.stats_node_name,
            config.mode,
            stats.clone(),
        ));
        if let Err(e) = registry.register(node) {
            log::warn!("mlcache: cannot register {}: {}", config.stats_node_name, e);
            return Err(e);
        }

        log::info!(
            "mlcache: started ({:?}, C={}, yield every {})",
            config.mode,
            config.scale,
            config.yield_batch
        );

        Ok(Self {
            config,
            store: ScoreStore::new(),
            stats,
            strategy,
            registry,
            active: AtomicBool::new(true),
        })
    }

    /// Withdraw the stats node and stop accepting events
    pub fn shutdown(&self) -> MlCacheResult<()> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Err(MlCacheError::ShutDown);
        }
        self.registry.unregister(self.config.stats_node_name);
        log::info!(
            "mlcache: stopped after {} hits, {} misses",
            self.stats.hits(),
            self.stats.misses()
        );
        Ok(())
    }

    /// Is the engine accepting events?
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Feed one lookup outcome
    ///
    /// `group` is `None` for pages without a backing object; such events are
    /// counted but not scored.
    pub fn on_cache_access(&self, key: PageKey, group: Option<GroupId>, hit: bool) -> AccessOutcome {
        if !self.is_active() {
            return AccessOutcome::Ignored;
        }
        let outcome = self
            .strategy
            .on_access(&self.store, &self.stats, key, group, hit);
        log::trace!("mlcache: {} hit={} -> {:?}", key, hit, outcome);
        outcome
    }

    // -------------------------------------------------------------------------
    // Host eviction hooks
    // -------------------------------------------------------------------------

    /// The host evicted a page; keep its metadata as a shadow
    ///
    /// Returns `true` if a resident entry became a shadow.
    pub fn evict(&self, group: GroupId, key: PageKey) -> bool {
        let Some(cell) = self.store.entry(group, key) else {
            return false;
        };
        let evicted = cell
            .update_live(|meta| {
                if meta.state != EntryState::Resident {
                    return false;
                }
                meta.state = EntryState::Shadow;
                true
            })
            .unwrap_or(false);
        if evicted {
            self.stats.resident_dec();
        }
        evicted
    }

    /// The host reclaimed a page for good; drop its metadata
    pub fn forget(&self, group: GroupId, key: PageKey) -> Option<EntryMeta> {
        let meta = self.store.remove(group, key)?;
        if meta.state == EntryState::Resident {
            self.stats.resident_dec();
        }
        Some(meta)
    }

    /// The host released a backing object; drop every entry it owned
    ///
    /// Events racing with the release land in a fresh group. Returns the
    /// number of entries dropped.
    pub fn forget_group(&self, group: GroupId) -> usize {
        let Some(removed) = self.store.remove_group(group) else {
            return 0;
        };
        self.stats.resident_sub(removed.resident_len() as u64);
        log::debug!("mlcache: dropped {} ({} entries)", group, removed.len());
        removed.len()
    }

    /// Recreate a shadow placeholder carrying `score`
    pub fn install_shadow(&self, group: GroupId, key: PageKey, score: i64) {
        if self.store.upsert(group, key, score, 0, false) == Upsert::Updated(EntryState::Resident) {
            self.stats.resident_dec();
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Current metadata of one entry
    pub fn score_of(&self, group: GroupId, key: PageKey) -> Option<EntrySnapshot> {
        self.store.get(group, key)
    }

    /// Current metadata of every entry in a group
    pub fn group_scores(&self, group: GroupId) -> Vec<EntrySnapshot> {
        self.store.snapshot(group)
    }

    /// Weighted average score; 0 when only counting
    pub fn weighted_average(&self) -> i64 {
        if !self.strategy.mode().is_adaptive() {
            return 0;
        }
        self.stats.weighted_average()
    }

    /// Hits observed
    pub fn hits(&self) -> u64 {
        self.stats.hits()
    }

    /// Misses observed
    pub fn misses(&self) -> u64 {
        self.stats.misses()
    }

    /// Snapshot of every statistic
    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.stats.snapshot();
        StatsSnapshot {
            hits: counters.hits,
            misses: counters.misses,
            round: counters.round,
            weighted_average: self.weighted_average(),
            resident_count: counters.resident_count,
            groups: self.store.group_count(),
            mode: self.strategy.mode(),
        }
    }

    /// Active scoring mode
    pub fn mode(&self) -> ScoringMode {
        self.strategy.mode()
    }

    /// Configuration the engine was started with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl AccessSink for Engine {
    fn on_cache_access(&self, key: PageKey, group: Option<GroupId>, hit: bool) {
        Engine::on_cache_access(self, key, group, hit);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("groups", &self.store.group_count())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::ConfidenceBound;
    use crate::report::NodeTable;
    use crate::sweep::SpinYield;
    use crate::updater::{ScoreChange, Transition};

    const G: GroupId = GroupId(1);
    const A: PageKey = PageKey(10);
    const B: PageKey = PageKey(11);
    const C: PageKey = PageKey(12);

    struct FailingRegistry;

    impl StatsRegistry for FailingRegistry {
        fn register(&self, _node: Arc<StatsNode>) -> MlCacheResult<()> {
            Err(MlCacheError::StatsRegistration)
        }

        fn unregister(&self, _name: &str) -> Option<Arc<StatsNode>> {
            None
        }
    }

    fn engine(config: EngineConfig) -> (Arc<NodeTable>, Engine) {
        let table = Arc::new(NodeTable::new());
        let engine =
            Engine::init_with_yielder(config, table.clone(), Box::new(SpinYield)).unwrap();
        (table, engine)
    }

    fn score(engine: &Engine, key: PageKey) -> i64 {
        score_in(engine, G, key)
    }

    fn score_in(engine: &Engine, group: GroupId, key: PageKey) -> i64 {
        engine.score_of(group, key).unwrap().score
    }

    #[test]
    fn test_init_publishes_node() {
        let (table, engine) = engine(EngineConfig::default());
        assert!(table.lookup("mlcache_stats").is_some());
        assert!(engine.is_active());

        engine.shutdown().unwrap();
        assert!(table.lookup("mlcache_stats").is_none());
        assert_eq!(engine.shutdown(), Err(MlCacheError::ShutDown));
    }

    #[test]
    fn test_init_fails_on_registration_error() {
        let result = Engine::init(EngineConfig::default(), Arc::new(FailingRegistry));
        assert_eq!(result.err(), Some(MlCacheError::StatsRegistration));
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let table = Arc::new(NodeTable::new());
        let result = Engine::init(EngineConfig::new().with_scale(0), table.clone());
        assert_eq!(result.err(), Some(MlCacheError::InvalidConfig("scale")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_events_ignored_after_shutdown() {
        let (_, engine) = engine(EngineConfig::default());
        engine.shutdown().unwrap();
        assert_eq!(engine.on_cache_access(A, Some(G), true), AccessOutcome::Ignored);
        assert_eq!(engine.hits(), 0);
    }

    #[test]
    fn test_shadow_scenario() {
        let (table, engine) = engine(EngineConfig::default());

        // Cold misses: everyone starts at the (zero) average
        for key in [A, B, C] {
            engine.on_cache_access(key, Some(G), false);
        }
        for key in [A, B, C] {
            assert_eq!(score(&engine, key), 0);
        }
        assert_eq!(engine.weighted_average(), 0);

        // Two hits on A: -100, then -200 (bound(4, 1) == bound(5, 1))
        engine.on_cache_access(A, Some(G), true);
        engine.on_cache_access(A, Some(G), true);
        assert_eq!(score(&engine, A), -200);
        assert_eq!(engine.weighted_average(), -33 - 66);

        // A is evicted with a nonzero score, then missed again
        assert!(engine.evict(G, A));
        assert!(!engine.score_of(G, A).unwrap().present);
        let prior_average = engine.weighted_average();

        let outcome = engine.on_cache_access(A, Some(G), false);
        let change = outcome.change().unwrap();
        assert_eq!(change.sweep.unwrap().penalized, 2);
        assert_eq!(score(&engine, A), prior_average);
        assert_eq!(score(&engine, B), -100);
        assert_eq!(score(&engine, C), -100);

        let node = table.lookup("mlcache_stats").unwrap();
        let mut buf = [0u8; 64];
        let n = node.read(0, &mut buf);
        assert!(buf[..n].starts_with(b"Hits: 2 | Misses: 4\n"));
    }

    #[test]
    fn test_cold_shadow_miss_leaves_siblings() {
        let (_, engine) = engine(EngineConfig::default());
        engine.on_cache_access(A, Some(G), false);
        engine.on_cache_access(B, Some(G), true);
        let before = score(&engine, B);

        // A was never scored away from zero
        assert!(engine.evict(G, A));
        engine.on_cache_access(A, Some(G), false);
        assert_eq!(score(&engine, B), before);
    }

    #[test]
    fn test_counting_only_mode() {
        let (table, engine) = engine(EngineConfig::counting_only());
        engine.on_cache_access(A, Some(G), true);
        engine.on_cache_access(A, Some(G), false);
        assert_eq!(engine.hits(), 1);
        assert_eq!(engine.misses(), 1);
        assert_eq!(engine.weighted_average(), 0);
        assert!(engine.score_of(G, A).is_none());
        assert_eq!(engine.mode(), ScoringMode::CountingOnly);

        let node = table.lookup("mlcache_stats").unwrap();
        assert_eq!(node.render().as_str(), "Hits: 1 | Misses: 1\n");
    }

    #[test]
    fn test_forget_and_resident_count() {
        let (_, engine) = engine(EngineConfig::default());
        engine.on_cache_access(A, Some(G), false);
        engine.on_cache_access(B, Some(G), false);
        engine.on_cache_access(A, Some(GroupId(2)), false);
        assert_eq!(engine.snapshot().resident_count, 3);

        assert!(engine.forget(G, A).is_some());
        assert!(engine.forget(G, A).is_none());
        assert_eq!(engine.snapshot().resident_count, 2);

        // Shadows do not count as resident
        assert!(engine.evict(G, B));
        assert!(!engine.evict(G, B));
        assert_eq!(engine.snapshot().resident_count, 1);

        assert_eq!(engine.forget_group(GroupId(2)), 1);
        assert_eq!(engine.forget_group(GroupId(2)), 0);
        assert_eq!(engine.snapshot().resident_count, 0);
        assert_eq!(engine.snapshot().groups, 1);
    }

    #[test]
    fn test_unknown_entries_are_noops() {
        let (_, engine) = engine(EngineConfig::default());
        assert!(!engine.evict(GroupId(99), A));
        assert!(engine.forget(GroupId(99), A).is_none());
        assert_eq!(engine.forget_group(GroupId(99)), 0);
        assert!(engine.score_of(GroupId(99), A).is_none());
        assert!(engine.group_scores(GroupId(99)).is_empty());
    }

    #[test]
    fn test_install_shadow() {
        let (_, engine) = engine(EngineConfig::default());
        engine.on_cache_access(B, Some(G), false);
        engine.install_shadow(G, A, -500);

        let outcome = engine.on_cache_access(A, Some(G), false);
        assert!(outcome.change().unwrap().sweep.is_some());
        assert_eq!(score(&engine, B), -100);

        // Overwriting a resident entry turns it into a shadow
        engine.install_shadow(G, B, 7);
        assert_eq!(engine.snapshot().resident_count, 1);
        assert_eq!(engine.group_scores(G).len(), 2);
    }

    #[test]
    fn test_plays_never_decrease() {
        let (_, engine) = engine(EngineConfig::default());
        let keys = [A, B, C];
        let mut last = [0u64; 3];
        for i in 0..300u64 {
            let idx = (i * 7 % 3) as usize;
            let key = keys[idx];
            match i % 5 {
                0 => {
                    engine.on_cache_access(key, Some(G), false);
                },
                1 => {
                    engine.evict(G, key);
                },
                _ => {
                    engine.on_cache_access(key, Some(G), true);
                },
            }
            for (j, &k) in keys.iter().enumerate() {
                if let Some(snap) = engine.score_of(G, k) {
                    assert!(snap.plays >= last[j]);
                    last[j] = snap.plays;
                }
            }
        }
    }

    #[test]
    fn test_unowned_pages_counted() {
        let (_, engine) = engine(EngineConfig::default());
        assert_eq!(engine.on_cache_access(A, None, true), AccessOutcome::Unscored);
        assert_eq!(engine.hits(), 1);
        assert_eq!(engine.snapshot().groups, 0);
    }

    #[test]
    fn test_concurrent_groups_converge() {
        let (_, engine) = engine(EngineConfig::default());
        let engine = Arc::new(engine);

        let workers: Vec<_> = (0..2u64)
            .map(|g| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    engine.on_cache_access(PageKey(0), Some(GroupId(g)), false);
                    for _ in 0..500 {
                        engine.on_cache_access(PageKey(0), Some(GroupId(g)), true);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(engine.hits(), 1_000);
        assert_eq!(engine.misses(), 2);
        assert_eq!(engine.snapshot().round, 1_002);
        for g in 0..2 {
            let snap = engine.score_of(GroupId(g), PageKey(0)).unwrap();
            assert_eq!(snap.plays, 500);
            assert!(snap.present);
        }
    }

    #[test]
    fn test_concurrent_groups_match_serial_replay() {
        let (_, engine) = engine(EngineConfig::default());
        let engine = Arc::new(engine);

        let workers: Vec<_> = (0..2u64)
            .map(|g| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let mut changes = Vec::new();
                    for i in 0..=500 {
                        let outcome = engine.on_cache_access(PageKey(0), Some(GroupId(g)), i > 0);
                        changes.push(*outcome.change().unwrap());
                    }
                    changes
                })
            })
            .collect();
        let histories: Vec<Vec<ScoreChange>> =
            workers.into_iter().map(|w| w.join().unwrap()).collect();

        let calc = ConfidenceBound::new(100);
        for (g, changes) in histories.iter().enumerate() {
            assert_eq!(changes[0].transition, Transition::Created);

            // Each group's hits, replayed alone in their recorded rounds
            let mut expected = changes[0].score;
            for (plays, change) in changes[1..].iter().enumerate() {
                expected = expected
                    .wrapping_sub(100)
                    .wrapping_add(calc.hit_correction(change.round, plays as u64));
                assert_eq!(change.score, expected);
                assert_eq!(change.plays, plays as u64 + 1);
            }
            assert_eq!(score_in(&engine, GroupId(g as u64), PageKey(0)), expected);
        }
    }

    #[test]
    fn test_concurrent_hits_on_one_key_linearize() {
        let (_, engine) = engine(EngineConfig::default());
        let engine = Arc::new(engine);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| *engine.on_cache_access(A, Some(G), true).change().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut changes: Vec<ScoreChange> =
            workers.into_iter().flat_map(|w| w.join().unwrap()).collect();

        assert_eq!(engine.hits(), 8_000);
        assert_eq!(engine.score_of(G, A).unwrap().plays, 8_000);

        // Play counts order the hits; replaying in that order gives every score
        changes.sort_by_key(|c| c.plays);
        let calc = ConfidenceBound::new(100);
        let mut expected = 0i64;
        for (plays, change) in changes.iter().enumerate() {
            assert_eq!(change.plays, plays as u64 + 1);
            expected = expected
                .wrapping_sub(100)
                .wrapping_add(calc.hit_correction(change.round, plays as u64));
            assert_eq!(change.score, expected);
        }
        assert_eq!(score(&engine, A), expected);
    }

    #[test]
    fn test_forget_group_during_events_keeps_resident_count() {
        let (_, engine) = engine(EngineConfig::default());
        let engine = Arc::new(engine);

        let workers: Vec<_> = (0..3u64)
            .map(|t| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..3_000u64 {
                        let key = PageKey((i * 7 + t) % 32);
                        match i % 4 {
                            0 => {
                                engine.on_cache_access(key, Some(G), false);
                            },
                            1 => {
                                engine.evict(G, key);
                            },
                            _ => {
                                engine.on_cache_access(key, Some(G), true);
                            },
                        }
                    }
                })
            })
            .collect();
        let releaser = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for _ in 0..300 {
                    engine.forget_group(G);
                    std::thread::yield_now();
                }
            })
        };
        for worker in workers {
            worker.join().unwrap();
        }
        releaser.join().unwrap();

        engine.forget_group(G);
        assert_eq!(engine.snapshot().resident_count, 0);
    }

    #[test]
    fn test_sink_object() {
        let (_, engine) = engine(EngineConfig::default());
        let engine = Arc::new(engine);
        let sink: Arc<dyn AccessSink> = engine.clone();
        sink.on_cache_access(A, Some(G), false);
        assert_eq!(engine.misses(), 1);
    }
}
