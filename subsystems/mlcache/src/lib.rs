//! # Helix Adaptive Page Cache Scoring
//!
//! Assigns every cached page a desirability score learned from its hit/miss
//! history. An external eviction policy consumes the scores; this crate
//! never picks victims itself.
//!
//! ## Model
//!
//! Each page is an arm of a multi-armed bandit. Hits move its score by a
//! fixed unit `C` corrected by a UCB1 exploration term that shrinks as the
//! page accumulates plays. Evicted pages leave a *shadow* behind: if a page
//! is missed while its shadow still carries a score, it was evicted too
//! early and every other resident page of the same backing object pays `C`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  host page cache                                                      │
//! │     │ on_cache_access(key, group, hit)      evict / forget            │
//! │     ▼                                            │                    │
//! │  ┌────────────┐   record_event   ┌──────────────┐│                    │
//! │  │   Engine   │─────────────────▶│ RunningStats │◀── StatsNode (0444) │
//! │  └─────┬──────┘                  └──────────────┘│                    │
//! │        │ ScoringStrategy                         │                    │
//! │        ▼                                         ▼                    │
//! │  ┌──────────────────┐  bound()  ┌─────────────────────────────┐       │
//! │  │ AdaptiveScoring  │──────────▶│ ConfidenceBound (integer)   │       │
//! │  │ / CountingOnly   │           └─────────────────────────────┘       │
//! │  └─────┬────────────┘                                                 │
//! │        │ miss on nonzero shadow                                       │
//! │        ▼                                                              │
//! │  ┌──────────────┐   slot walk   ┌──────────────────────────────┐      │
//! │  │ ShadowSweep  │──────────────▶│ ScoreStore ── Group ── Entry │      │
//! │  └──────────────┘               └──────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Events arrive in parallel. Entry metadata is behind a per-entry spinlock,
//! group membership behind a reader-writer lock that sweeps only hold for a
//! single slot, and global counters are atomics. Nothing blocks on I/O.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use helix_mlcache::{Engine, EngineConfig, GroupId, NodeTable, PageKey};
//!
//! let table = Arc::new(NodeTable::new());
//! let engine = Engine::init(EngineConfig::default(), table.clone())?;
//!
//! engine.on_cache_access(PageKey(42), Some(GroupId(7)), false);
//! engine.evict(GroupId(7), PageKey(42));
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod aggregator;
pub mod bound;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod global;
pub mod report;
pub mod store;
pub mod sweep;
pub mod updater;

pub use aggregator::{CounterSnapshot, RunningStats};
pub use bound::{upper_bound, ConfidenceBound};
pub use config::{ArithmeticPolicy, EngineConfig, ScoringMode};
pub use engine::{AccessSink, Engine};
pub use entry::{EntryMeta, EntrySnapshot, EntryState, GroupId, PageKey};
pub use error::{MlCacheError, MlCacheResult};
pub use report::{NodeMode, NodeTable, StatsNode, StatsReader, StatsRegistry, StatsSnapshot};
pub use store::{Group, ScoreStore, Upsert};
pub use sweep::{DefaultYielder, ShadowSweep, SpinYield, SweepReport, Yielder};
pub use updater::{
    AccessOutcome, AdaptiveScoring, CountingOnly, ScoreChange, ScoringStrategy, Transition,
};
