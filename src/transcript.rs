//! In-memory conversation state for one widget session.
//!
//! [`Transcript`] holds every displayed turn; [`ConversationHistory`] holds
//! the completed user/assistant exchanges that accompany fallback requests.
//! Both are bounded and evict their oldest entries first.

use std::collections::VecDeque;

use crate::types::{HistoryEntry, Turn};

/// Default number of turns kept in a transcript.
pub const DEFAULT_TRANSCRIPT_LIMIT: usize = 200;

/// Default number of exchanges sent as conversation history.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

//////////////////////////////////////////// Transcript ////////////////////////////////////////////

/// Ordered, append-only record of the turns shown in a session.
///
/// Turns are never deduplicated: appending the same content twice yields two
/// turns.  Once `limit` turns are held, each append evicts the oldest.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: VecDeque<Turn>,
    limit: usize,
}

impl Transcript {
    /// Creates an empty transcript holding at most `limit` turns.
    ///
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            turns: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Appends a turn, evicting the oldest turn when full.
    pub fn append(&mut self, turn: Turn) {
        if self.turns.len() >= self.limit {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Iterates over the turns in insertion order.
    pub fn all(&self) -> impl ExactSizeIterator<Item = &Turn> + '_ {
        self.turns.iter()
    }

    /// Removes every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Returns the most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Returns the number of turns held.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turns are held.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the maximum number of turns held.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSCRIPT_LIMIT)
    }
}

//////////////////////////////////////// ConversationHistory ///////////////////////////////////////

/// Bounded list of completed exchanges, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl ConversationHistory {
    /// Creates an empty history holding at most `limit` exchanges.
    ///
    /// A limit of zero disables history entirely.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Records a completed exchange.
    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry::new(user, assistant));
    }

    /// Returns a copy of the entries for a request body.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Iterates over the entries, oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
