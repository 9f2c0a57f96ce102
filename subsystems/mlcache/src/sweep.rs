//! # Shadow Sweep
//!
//! When a page comes back with a nonzero shadow score it was evicted too
//! early, and the pages that stayed resident instead pay for it: every other
//! resident entry of the group loses `C`.
//!
//! The sweep walks the group's slot arena by index and only holds the
//! group lock while fetching one slot. Inserts may proceed during a sweep;
//! entries appended behind the cursor are visited, entries landing in an
//! already-visited slot are not, and no slot is visited twice. The yield
//! cadence counts every live entry walked, so a group made mostly of shadows
//! still gives the CPU back.

use alloc::boxed::Box;

use crate::entry::{EntryCell, EntryState, PageKey};
use crate::store::Group;

// =============================================================================
// Cooperative Yield
// =============================================================================

/// Hook used by long sweeps to give the CPU back
pub trait Yielder: Send + Sync {
    /// Let other work run
    fn yield_now(&self);
}

/// Busy-wait hint; for contexts without a scheduler
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinYield;

impl Yielder for SpinYield {
    #[inline]
    fn yield_now(&self) {
        core::hint::spin_loop();
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(feature = "std", test))] {
        /// Yields the current OS thread
        #[derive(Debug, Clone, Copy, Default)]
        pub struct ThreadYield;

        impl Yielder for ThreadYield {
            #[inline]
            fn yield_now(&self) {
                std::thread::yield_now();
            }
        }

        /// Yielder used when the host does not provide one
        pub type DefaultYielder = ThreadYield;
    } else {
        /// Yielder used when the host does not provide one
        pub type DefaultYielder = SpinYield;
    }
}

// =============================================================================
// Sweep
// =============================================================================

/// What a sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Live slots inspected
    pub visited: usize,
    /// Entries penalized
    pub penalized: usize,
    /// Cooperative yields taken
    pub yields: usize,
}

/// Sibling penalization over a group
pub struct ShadowSweep {
    penalty: i64,
    yield_batch: usize,
    yielder: Box<dyn Yielder>,
}

impl ShadowSweep {
    /// Create a sweep that subtracts `penalty` and yields every `yield_batch`
    /// entries walked
    pub fn new(penalty: i64, yield_batch: usize, yielder: Box<dyn Yielder>) -> Self {
        Self {
            penalty,
            yield_batch: yield_batch.max(1),
            yielder,
        }
    }

    /// Penalty per entry
    #[inline(always)]
    pub fn penalty(&self) -> i64 {
        self.penalty
    }

    /// Subtract the penalty from every resident entry of `group` except
    /// `exclude`
    pub fn penalize(&self, group: &Group, exclude: PageKey) -> SweepReport {
        let mut report = SweepReport::default();
        let mut slot = 0;

        // Slot count is re-read each step: the arena may grow under us
        while slot < group.slot_count() {
            let cell = group.slot(slot);
            slot += 1;

            let Some(cell) = cell else { continue };
            report.visited += 1;

            if cell.key() != exclude && self.penalize_one(&cell) {
                report.penalized += 1;
            }

            if report.visited % self.yield_batch == 0 {
                self.yielder.yield_now();
                report.yields += 1;
            }
        }

        log::trace!(
            "ShadowSweep: {} penalized {} of {} entries",
            group.id(),
            report.penalized,
            report.visited
        );
        report
    }

    fn penalize_one(&self, cell: &EntryCell) -> bool {
        cell.update_live(|meta| {
            if meta.state != EntryState::Resident {
                return false;
            }
            meta.penalize(self.penalty);
            true
        })
        .unwrap_or(false)
    }
}

impl core::fmt::Debug for ShadowSweep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShadowSweep")
            .field("penalty", &self.penalty)
            .field("yield_batch", &self.yield_batch)
            .finish_non_exhaustive()
    }
}
