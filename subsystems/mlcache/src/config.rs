//! # Engine Configuration
//!
//! Runtime knobs of the scoring engine. The scoring mode replaces a
//! compile-time switch: the counting-only path is a first-class strategy.

use crate::error::{MlCacheError, MlCacheResult};

/// Default scaling factor of the learning model (`C`)
pub const DEFAULT_SCALE: u64 = 100;

/// Default number of entries a sweep walks between cooperative yields
pub const DEFAULT_YIELD_BATCH: usize = 4096;

/// Default name of the stats node
pub const DEFAULT_STATS_NODE: &str = "mlcache_stats";

/// Which scoring strategy handles events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoringMode {
    /// UCB scoring with shadow sweeps
    #[default]
    Adaptive,
    /// Only hits and misses are counted
    CountingOnly,
}

impl ScoringMode {
    /// Is the adaptive path active?
    #[inline(always)]
    pub fn is_adaptive(self) -> bool {
        self == ScoringMode::Adaptive
    }
}

/// How the weighted average treats degenerate arithmetic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArithmeticPolicy {
    /// Zero resident entries divide by `u64::MAX`; an average reaching
    /// `i64::MAX` resets to 0; additions wrap.
    #[default]
    Legacy,
    /// Zero resident entries skip the update; additions saturate.
    Guarded,
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Scaling factor `C`: reward per hit and penalty per sweep
    pub scale: u64,
    /// Entries walked between cooperative yields inside a sweep
    pub yield_batch: usize,
    /// Scoring strategy
    pub mode: ScoringMode,
    /// Weighted average arithmetic
    pub arithmetic: ArithmeticPolicy,
    /// Name under which the stats node is registered
    pub stats_node_name: &'static str,
}

impl EngineConfig {
    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            yield_batch: DEFAULT_YIELD_BATCH,
            mode: ScoringMode::Adaptive,
            arithmetic: ArithmeticPolicy::Legacy,
            stats_node_name: DEFAULT_STATS_NODE,
        }
    }

    /// Configuration for the counting-only path
    pub const fn counting_only() -> Self {
        let mut config = Self::new();
        config.mode = ScoringMode::CountingOnly;
        config
    }

    /// Set the scaling factor
    pub fn with_scale(mut self, scale: u64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the yield batch
    pub fn with_yield_batch(mut self, yield_batch: usize) -> Self {
        self.yield_batch = yield_batch;
        self
    }

    /// Set the scoring mode
    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the arithmetic policy
    pub fn with_arithmetic(mut self, arithmetic: ArithmeticPolicy) -> Self {
        self.arithmetic = arithmetic;
        self
    }

    /// Set the stats node name
    pub fn with_stats_node_name(mut self, name: &'static str) -> Self {
        self.stats_node_name = name;
        self
    }

    /// Check that every field is usable
    pub fn validate(&self) -> MlCacheResult<()> {
        if self.scale == 0 {
            return Err(MlCacheError::InvalidConfig("scale"));
        }
        // C^2 must fit the signed score domain
        if self.scale > i32::MAX as u64 {
            return Err(MlCacheError::InvalidConfig("scale"));
        }
        if self.yield_batch == 0 {
            return Err(MlCacheError::InvalidConfig("yield_batch"));
        }
        if self.stats_node_name.is_empty() {
            return Err(MlCacheError::InvalidConfig("stats_node_name"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
