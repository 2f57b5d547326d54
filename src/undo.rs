//! Bounded undo/redo history of snapshot texts.
//!
//! Entries are complete snapshots. The cursor points at the entry matching
//! the live construction; entries before it are undo points, entries after
//! it are redo points. Storing a new entry drops every redo point.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::canonical::{fingerprint, SnapshotFingerprint};

/// One undo point.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    /// Encoded snapshot.
    pub snapshot: String,
    /// Fingerprint of `snapshot`.
    pub fingerprint: SnapshotFingerprint,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
}

impl UndoEntry {
    fn new(snapshot: String) -> Self {
        Self { fingerprint: fingerprint(&snapshot), snapshot, stored_at: Utc::now() }
    }
}

/// Snapshot stack with a cursor.
#[derive(Debug, Clone)]
pub struct UndoManager {
    entries: VecDeque<UndoEntry>,
    cursor: usize,
    max_depth: usize,
    enabled: bool,
}

impl UndoManager {
    /// Create an empty history keeping at most `max_depth` entries.
    pub fn new(max_depth: usize, enabled: bool) -> Self {
        Self { entries: VecDeque::new(), cursor: 0, max_depth: max_depth.max(1), enabled }
    }

    /// Whether undo points are recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop all entries and start over from `snapshot`.
    pub fn init(&mut self, snapshot: String) {
        self.entries.clear();
        self.entries.push_back(UndoEntry::new(snapshot));
        self.cursor = 0;
    }

    /// Record a new undo point after the cursor, dropping redo points and
    /// the oldest entries past the depth limit. Returns whether anything was stored.
    pub fn store(&mut self, snapshot: String) -> bool {
        if !self.enabled {
            return false;
        }
        if self.entries.is_empty() {
            self.init(snapshot);
            return true;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(UndoEntry::new(snapshot));
        self.cursor = self.entries.len() - 1;
        while self.entries.len() > self.max_depth {
            self.entries.pop_front();
            self.cursor -= 1;
        }
        debug!(entries = self.entries.len(), cursor = self.cursor, "stored undo point");
        true
    }

    /// Entry the live construction corresponds to.
    pub fn current(&self) -> Option<&UndoEntry> {
        self.entries.get(self.cursor)
    }

    /// Entry an undo would restore.
    pub fn peek_undo(&self) -> Option<&UndoEntry> {
        if self.undo_possible() {
            self.entries.get(self.cursor - 1)
        } else {
            None
        }
    }

    /// Entry a redo would restore.
    pub fn peek_redo(&self) -> Option<&UndoEntry> {
        if self.redo_possible() {
            self.entries.get(self.cursor + 1)
        } else {
            None
        }
    }

    /// Move the cursor one entry back.
    pub fn step_back(&mut self) {
        if self.undo_possible() {
            self.cursor -= 1;
        }
    }

    /// Move the cursor one entry forward.
    pub fn step_forward(&mut self) {
        if self.redo_possible() {
            self.cursor += 1;
        }
    }

    /// Whether there is an entry before the cursor.
    pub fn undo_possible(&self) -> bool {
        self.enabled && self.cursor > 0 && self.cursor < self.entries.len()
    }

    /// Whether there is an entry after the cursor.
    pub fn redo_possible(&self) -> bool {
        self.enabled && self.cursor + 1 < self.entries.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
