//! # Stats Reporting
//!
//! Read-only text node polled by operators:
//!
//! ```text
//! Hits: 1024 | Misses: 77
//! Weighted average: -312
//! ```
//!
//! The second line only appears when the adaptive path is active. Writes to
//! the node are accepted and discarded. Rendering never allocates.
//!
//! [`StatsNode::open`] renders once and serves every later chunk from that
//! text, so a reader walking the output in small pieces sees one snapshot.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{self, Write};

use bitflags::bitflags;
use spin::RwLock;

use crate::aggregator::RunningStats;
use crate::config::ScoringMode;
use crate::error::{MlCacheError, MlCacheResult};

/// Capacity of the rendered stats text
pub const STATS_TEXT_CAP: usize = 128;

bitflags! {
    /// Access permissions of a stats node (octal, as in file modes)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeMode: u16 {
        /// Owner may read
        const OWNER_READ = 0o400;
        /// Owner may write
        const OWNER_WRITE = 0o200;
        /// Group may read
        const GROUP_READ = 0o040;
        /// Group may write
        const GROUP_WRITE = 0o020;
        /// Others may read
        const OTHER_READ = 0o004;
        /// Others may write
        const OTHER_WRITE = 0o002;
        /// 0444
        const READ_ONLY = Self::OWNER_READ.bits() | Self::GROUP_READ.bits() | Self::OTHER_READ.bits();
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Engine statistics at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Hits observed
    pub hits: u64,
    /// Misses observed
    pub misses: u64,
    /// Events scored (0 when counting only)
    pub round: u64,
    /// Weighted average score (0 when counting only)
    pub weighted_average: i64,
    /// Resident entries
    pub resident_count: u64,
    /// Known groups
    pub groups: usize,
    /// Active scoring mode
    pub mode: ScoringMode,
}

impl StatsSnapshot {
    /// Hit ratio in parts per thousand
    pub fn hit_permille(&self) -> u64 {
        let total = self.hits.wrapping_add(self.misses);
        if total == 0 {
            return 0;
        }
        ((self.hits as u128 * 1000) / total as u128) as u64
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hits: {} | Misses: {}", self.hits, self.misses)?;
        if self.mode.is_adaptive() {
            writeln!(f, "Weighted average: {}", self.weighted_average)?;
        }
        Ok(())
    }
}

// =============================================================================
// Stats Node
// =============================================================================

/// Read-only stats surface backed by the live counters
#[derive(Debug)]
pub struct StatsNode {
    name: &'static str,
    mode: NodeMode,
    scoring: ScoringMode,
    stats: Arc<RunningStats>,
}

impl StatsNode {
    /// Create a node exporting `stats`
    pub fn new(name: &'static str, scoring: ScoringMode, stats: Arc<RunningStats>) -> Self {
        Self {
            name,
            mode: NodeMode::READ_ONLY,
            scoring,
            stats,
        }
    }

    /// Node name
    #[inline(always)]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Node permissions
    #[inline(always)]
    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    /// Render the current text
    pub fn render(&self) -> heapless::String<STATS_TEXT_CAP> {
        let mut text = heapless::String::new();
        let hits = self.stats.hits();
        let misses = self.stats.misses();
        // Capacity covers the widest possible numbers
        let _ = writeln!(text, "Hits: {} | Misses: {}", hits, misses);
        if self.scoring.is_adaptive() {
            let _ = writeln!(text, "Weighted average: {}", self.stats.weighted_average());
        }
        text
    }

    /// Render once for a sequential reader
    pub fn open(&self) -> StatsReader {
        StatsReader {
            text: self.render(),
            pos: 0,
        }
    }

    /// Copy freshly rendered text starting at `offset` into `buf`; returns
    /// bytes copied
    ///
    /// Each call renders anew. Use [`StatsNode::open`] to read one snapshot
    /// in several chunks.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        copy_from(self.render().as_bytes(), offset, buf)
    }

    /// Accept and ignore a write; returns the full length
    pub fn write(&self, buf: &[u8]) -> usize {
        log::trace!("{}: ignoring {} byte write", self.name, buf.len());
        buf.len()
    }
}

/// One rendering of a stats node, consumed in order
#[derive(Debug, Clone)]
pub struct StatsReader {
    text: heapless::String<STATS_TEXT_CAP>,
    pos: usize,
}

impl StatsReader {
    /// Copy the next chunk into `buf`; returns 0 at the end
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = copy_from(self.text.as_bytes(), self.pos, buf);
        self.pos += len;
        len
    }

    /// The full rendered text
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

fn copy_from(bytes: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    if offset >= bytes.len() {
        return 0;
    }
    let len = (bytes.len() - offset).min(buf.len());
    buf[..len].copy_from_slice(&bytes[offset..offset + len]);
    len
}

// =============================================================================
// Registry
// =============================================================================

/// Host surface on which stats nodes are published
pub trait StatsRegistry: Send + Sync {
    /// Publish a node
    fn register(&self, node: Arc<StatsNode>) -> MlCacheResult<()>;

    /// Withdraw a node by name
    fn unregister(&self, name: &str) -> Option<Arc<StatsNode>>;
}

/// In-memory registry keyed by node name
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: RwLock<Vec<Arc<StatsNode>>>,
}

impl NodeTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// Find a node
    pub fn lookup(&self, name: &str) -> Option<Arc<StatsNode>> {
        self.nodes.read().iter().find(|n| n.name() == name).cloned()
    }

    /// Number of published nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatsRegistry for NodeTable {
    fn register(&self, node: Arc<StatsNode>) -> MlCacheResult<()> {
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|n| n.name() == node.name()) {
            return Err(MlCacheError::AlreadyRegistered);
        }
        log::debug!("NodeTable: registered {}", node.name());
        nodes.push(node);
        Ok(())
    }

    fn unregister(&self, name: &str) -> Option<Arc<StatsNode>> {
        let mut nodes = self.nodes.write();
        let pos = nodes.iter().position(|n| n.name() == name)?;
        log::debug!("NodeTable: removed {}", name);
        Some(nodes.remove(pos))
    }
}
