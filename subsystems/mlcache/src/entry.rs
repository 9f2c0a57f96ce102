//! # Cache Entries
//!
//! Per-page scoring metadata. An entry is either resident in the cache or
//! kept as a shadow after eviction; an untracked key simply has no entry.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

/// Identity of a cached page inside its group (e.g. page index in a file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey(pub u64);

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Identity of a backing object (e.g. an inode's address space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

/// Residency of a tracked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Data is in the cache
    Resident,
    /// Data was evicted; metadata is kept for credit/blame on re-access
    Shadow,
}

impl EntryState {
    /// Is the entry's data in the cache?
    #[inline(always)]
    pub fn is_present(self) -> bool {
        self == EntryState::Resident
    }

    /// State for a `present` flag
    #[inline(always)]
    pub fn from_present(present: bool) -> Self {
        if present {
            EntryState::Resident
        } else {
            EntryState::Shadow
        }
    }
}

/// Scoring metadata of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Desirability score (may go negative)
    pub score: i64,
    /// Number of times this entry has been scored on a hit
    pub plays: u64,
    /// Residency
    pub state: EntryState,
}

impl EntryMeta {
    /// Fresh resident entry
    pub const fn resident(score: i64) -> Self {
        Self {
            score,
            plays: 0,
            state: EntryState::Resident,
        }
    }

    /// Shadow placeholder carrying a retained score
    pub const fn shadow(score: i64) -> Self {
        Self {
            score,
            plays: 0,
            state: EntryState::Shadow,
        }
    }

    /// Does the shadow carry a signal? A zero score means no prior history.
    #[inline(always)]
    pub fn has_signal(&self) -> bool {
        self.score != 0
    }

    /// Subtract `by` from the score, wrapping
    #[inline(always)]
    pub fn penalize(&mut self, by: i64) {
        self.score = self.score.wrapping_sub(by);
    }

    /// Record one more play. Play counts never decrease.
    #[inline(always)]
    pub fn play(&mut self) {
        self.plays = self.plays.saturating_add(1);
    }
}

/// Entry slot shared between the store and concurrent scorers
///
/// Every mutation of score and play count goes through the mutex, so
/// events on the same key are linearized. A cell removed from its group is
/// detached under that mutex and refuses live updates from then on.
#[derive(Debug)]
pub struct EntryCell {
    key: PageKey,
    meta: Mutex<EntryMeta>,
    detached: AtomicBool,
}

impl EntryCell {
    /// Create a new cell
    pub fn new(key: PageKey, meta: EntryMeta) -> Self {
        Self {
            key,
            meta: Mutex::new(meta),
            detached: AtomicBool::new(false),
        }
    }

    /// Key of this entry
    #[inline(always)]
    pub fn key(&self) -> PageKey {
        self.key
    }

    /// Copy of the current metadata
    #[inline]
    pub fn load(&self) -> EntryMeta {
        *self.meta.lock()
    }

    /// Run `f` with exclusive access to the metadata
    #[inline]
    pub fn update<R>(&self, f: impl FnOnce(&mut EntryMeta) -> R) -> R {
        let mut meta = self.meta.lock();
        f(&mut meta)
    }

    /// Run `f` unless the cell has been detached from its group
    #[inline]
    pub fn update_live<R>(&self, f: impl FnOnce(&mut EntryMeta) -> R) -> Option<R> {
        let mut meta = self.meta.lock();
        if self.detached.load(Ordering::Acquire) {
            return None;
        }
        Some(f(&mut meta))
    }

    /// Freeze the cell and return its final metadata
    pub fn detach(&self) -> EntryMeta {
        let meta = self.meta.lock();
        self.detached.store(true, Ordering::Release);
        *meta
    }

    /// Has the cell left its group?
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Snapshot for callers outside the engine
    pub fn snapshot(&self, group: GroupId) -> EntrySnapshot {
        let meta = self.load();
        EntrySnapshot {
            group,
            key: self.key,
            score: meta.score,
            plays: meta.plays,
            present: meta.state.is_present(),
        }
    }
}

/// Point-in-time copy of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Owning group
    pub group: GroupId,
    /// Entry key
    pub key: PageKey,
    /// Score
    pub score: i64,
    /// Play count
    pub plays: u64,
    /// Resident (true) or shadow (false)
    pub present: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_present() {
        assert_eq!(EntryState::from_present(true), EntryState::Resident);
        assert_eq!(EntryState::from_present(false), EntryState::Shadow);
        assert!(EntryState::Resident.is_present());
        assert!(!EntryState::Shadow.is_present());
    }

    #[test]
    fn test_penalize_wraps() {
        let mut meta = EntryMeta::resident(i64::MIN);
        meta.penalize(1);
        assert_eq!(meta.score, i64::MAX);
    }

    #[test]
    fn test_play_saturates() {
        let mut meta = EntryMeta::resident(0);
        meta.plays = u64::MAX;
        meta.play();
        assert_eq!(meta.plays, u64::MAX);
    }

    #[test]
    fn test_cell_snapshot() {
        let cell = EntryCell::new(PageKey(3), EntryMeta::shadow(-40));
        cell.update(|m| m.play());
        let snap = cell.snapshot(GroupId(9));
        assert_eq!(snap.group, GroupId(9));
        assert_eq!(snap.key, PageKey(3));
        assert_eq!(snap.score, -40);
        assert_eq!(snap.plays, 1);
        assert!(!snap.present);
    }

    #[test]
    fn test_detached_cell_is_frozen() {
        let cell = EntryCell::new(PageKey(1), EntryMeta::resident(5));
        assert_eq!(cell.update_live(|m| m.penalize(1)), Some(()));
        assert!(!cell.is_detached());

        assert_eq!(cell.detach().score, 4);
        assert!(cell.is_detached());
        assert_eq!(cell.update_live(|m| m.penalize(1)), None);
        assert_eq!(cell.load().score, 4);
    }

    #[test]
    fn test_shadow_signal() {
        assert!(!EntryMeta::shadow(0).has_signal());
        assert!(EntryMeta::shadow(-1).has_signal());
    }
}
