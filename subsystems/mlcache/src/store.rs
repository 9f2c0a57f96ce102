//! # Score Store
//!
//! Per-entry metadata, partitioned by group.
//!
//! ## Layout
//!
//! ```text
//! ScoreStore ── RwLock<HashMap<GroupId, Arc<Group>>>
//!                                           │
//!   Group ── RwLock<GroupSlots>             ▼
//!              slots: [ Some(A) | None | Some(C) | Some(D) ]   (index-stable)
//!              index: { A→0, C→2, D→3 }
//!              free:  [ 1 ]
//! ```
//!
//! Slots never move. Removing an entry tombstones its slot and the slot is
//! reused by a later insert, so a sweep walking slot indices visits every
//! entry at most once while inserts keep going.
//!
//! Removed entries and the entries of a removed group are detached under
//! their own lock. Resident accounting done inside [`EntryCell::update_live`]
//! or inside an insert's `init` therefore settles exactly once per entry.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use spin::RwLock;

use crate::entry::{EntryCell, EntryMeta, EntrySnapshot, EntryState, GroupId, PageKey};

// =============================================================================
// Group
// =============================================================================

#[derive(Debug, Default)]
struct GroupSlots {
    slots: Vec<Option<Arc<EntryCell>>>,
    index: HashMap<PageKey, usize>,
    free: Vec<usize>,
    retired: bool,
}

impl GroupSlots {
    fn insert(&mut self, cell: Arc<EntryCell>) {
        let key = cell.key();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(cell);
                slot
            },
            None => {
                self.slots.push(Some(cell));
                self.slots.len() - 1
            },
        };
        self.index.insert(key, slot);
    }
}

/// Entries sharing one backing object
#[derive(Debug)]
pub struct Group {
    id: GroupId,
    slots: RwLock<GroupSlots>,
}

impl Group {
    /// Create an empty group
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            slots: RwLock::new(GroupSlots::default()),
        }
    }

    /// Group identity
    #[inline(always)]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Look up an entry
    pub fn get(&self, key: PageKey) -> Option<Arc<EntryCell>> {
        let slots = self.slots.read();
        let slot = *slots.index.get(&key)?;
        slots.slots[slot].clone()
    }

    /// Look up an entry, inserting `init()` if the key is untracked
    ///
    /// Returns the cell and whether it was inserted by this call, or `None`
    /// once the group has been retired. `init` runs under the group lock.
    pub fn get_or_insert_with(
        &self,
        key: PageKey,
        init: impl FnOnce() -> EntryMeta,
    ) -> Option<(Arc<EntryCell>, bool)> {
        if let Some(cell) = self.get(key) {
            return Some((cell, false));
        }

        let mut slots = self.slots.write();
        if slots.retired {
            return None;
        }
        // Raced with another inserter
        if let Some(cell) = slots.index.get(&key).and_then(|&s| slots.slots[s].clone()) {
            return Some((cell, false));
        }

        let cell = Arc::new(EntryCell::new(key, init()));
        slots.insert(cell.clone());
        Some((cell, true))
    }

    /// Remove an entry, returning its final metadata
    pub fn remove(&self, key: PageKey) -> Option<EntryMeta> {
        let mut slots = self.slots.write();
        let slot = slots.index.remove(&key)?;
        let cell = slots.slots[slot].take();
        slots.free.push(slot);
        cell.map(|c| c.detach())
    }

    /// Refuse further inserts and detach every entry
    ///
    /// Returns the number of entries that were resident at detach time.
    pub fn retire(&self) -> usize {
        let mut slots = self.slots.write();
        slots.retired = true;
        slots
            .slots
            .iter()
            .flatten()
            .filter(|c| c.detach().state == EntryState::Resident)
            .count()
    }

    /// Has the group been retired?
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.slots.read().retired
    }

    /// Number of slots ever allocated (live or tombstoned)
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.read().slots.len()
    }

    /// Entry in slot `slot`, if the slot is live
    #[inline]
    pub fn slot(&self, slot: usize) -> Option<Arc<EntryCell>> {
        self.slots.read().slots.get(slot).cloned().flatten()
    }

    /// Number of tracked entries
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.read().index.len()
    }

    /// Is the group empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resident entries
    pub fn resident_len(&self) -> usize {
        self.cells()
            .iter()
            .filter(|c| c.load().state == EntryState::Resident)
            .count()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.cells().iter().map(|c| c.snapshot(self.id)).collect()
    }

    fn cells(&self) -> Vec<Arc<EntryCell>> {
        self.slots.read().slots.iter().flatten().cloned().collect()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Outcome of [`ScoreStore::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was created
    Inserted,
    /// An existing entry was overwritten; carries its previous state
    Updated(EntryState),
}

/// All tracked entries, by group
#[derive(Debug, Default)]
pub struct ScoreStore {
    groups: RwLock<HashMap<GroupId, Arc<Group>>>,
}

impl ScoreStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Group handle, if the group is known
    pub fn group(&self, group: GroupId) -> Option<Arc<Group>> {
        self.groups.read().get(&group).cloned()
    }

    /// Group handle, creating the group if needed
    pub fn group_or_create(&self, group: GroupId) -> Arc<Group> {
        if let Some(g) = self.group(group) {
            return g;
        }
        self.groups
            .write()
            .entry(group)
            .or_insert_with(|| Arc::new(Group::new(group)))
            .clone()
    }

    /// Entry cell, if tracked
    pub fn entry(&self, group: GroupId, key: PageKey) -> Option<Arc<EntryCell>> {
        self.group(group)?.get(key)
    }

    /// Snapshot of one entry
    pub fn get(&self, group: GroupId, key: PageKey) -> Option<EntrySnapshot> {
        self.entry(group, key).map(|c| c.snapshot(group))
    }

    /// Create or overwrite an entry
    ///
    /// The play count of an existing entry is never lowered.
    pub fn upsert(
        &self,
        group: GroupId,
        key: PageKey,
        score: i64,
        plays: u64,
        present: bool,
    ) -> Upsert {
        let state = EntryState::from_present(present);
        let meta = EntryMeta {
            score,
            plays,
            state,
        };

        // Retried while the entry or its group is concurrently removed
        loop {
            let Some((cell, inserted)) = self.group_or_create(group).get_or_insert_with(key, || meta)
            else {
                continue;
            };
            if inserted {
                return Upsert::Inserted;
            }

            let updated = cell.update_live(|current| {
                let previous = current.state;
                current.score = score;
                current.plays = current.plays.max(plays);
                current.state = state;
                Upsert::Updated(previous)
            });
            if let Some(updated) = updated {
                return updated;
            }
        }
    }

    /// Forget an entry
    pub fn remove(&self, group: GroupId, key: PageKey) -> Option<EntryMeta> {
        self.group(group)?.remove(key)
    }

    /// Forget a whole group
    ///
    /// The returned group is retired: its entries are frozen, so
    /// [`Group::resident_len`] on it is final.
    pub fn remove_group(&self, group: GroupId) -> Option<Arc<Group>> {
        let removed = self.groups.write().remove(&group)?;
        removed.retire();
        Some(removed)
    }

    /// Number of known groups
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Number of tracked entries in a group (0 if unknown)
    pub fn group_len(&self, group: GroupId) -> usize {
        self.group(group).map_or(0, |g| g.len())
    }

    /// Copy of every entry in a group
    pub fn snapshot(&self, group: GroupId) -> Vec<EntrySnapshot> {
        self.group(group).map(|g| g.snapshot()).unwrap_or_default()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.groups.write().clear();
    }
}
