//! # Global Engine
//!
//! Process-wide engine instance for hosts that report events from contexts
//! where threading a handle through is impractical.

use alloc::sync::Arc;

use spin::Once;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::entry::{GroupId, PageKey};
use crate::error::{MlCacheError, MlCacheResult};
use crate::report::StatsRegistry;
use crate::updater::AccessOutcome;

static GLOBAL_ENGINE: Once<Engine> = Once::new();

/// Start the global engine
///
/// Exactly one caller succeeds; every other caller, concurrent or later,
/// gets [`MlCacheError::AlreadyInitialized`].
pub fn init(
    config: EngineConfig,
    registry: Arc<dyn StatsRegistry>,
) -> MlCacheResult<&'static Engine> {
    let mut started = false;
    let engine = GLOBAL_ENGINE.try_call_once(|| {
        started = true;
        Engine::init(config, registry)
    })?;
    if !started {
        return Err(MlCacheError::AlreadyInitialized);
    }
    Ok(engine)
}

/// The global engine, if started
pub fn engine() -> Option<&'static Engine> {
    GLOBAL_ENGINE.get()
}

/// Feed one lookup outcome to the global engine
pub fn on_cache_access(key: PageKey, group: Option<GroupId>, hit: bool) -> AccessOutcome {
    match engine() {
        Some(engine) => engine.on_cache_access(key, group, hit),
        None => AccessOutcome::Ignored,
    }
}

/// Weighted average of the global engine; 0 when absent or only counting
pub fn weighted_average() -> i64 {
    engine().map_or(0, |e| e.weighted_average())
}

/// Stop the global engine
pub fn shutdown() -> MlCacheResult<()> {
    engine().ok_or(MlCacheError::ShutDown)?.shutdown()
}
