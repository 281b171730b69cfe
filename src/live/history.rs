//! Transcript history: streamed deltas accumulated into discrete turns.
//!
//! Each entry carries an explicit state instead of the sentinel-string
//! matching the UI used to do:
//!
//! - `Placeholder`: a ready/stopped marker, replaced in place by the
//!   first delta that arrives.
//! - `Open`: the tail entry still receiving deltas.
//! - `Sealed`: completed; never mutated again.
//!
//! History is bounded to the most recent [`HISTORY_CAP`] entries, oldest
//! dropped first. The cursor follows the newest entry until the user
//! navigates backward, and is shifted on eviction so the same logical
//! entry stays selected when possible.

/// Maximum retained entries.
pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Placeholder,
    Open,
    Sealed,
}

#[derive(Debug, Clone)]
struct Entry {
    text: String,
    state: EntryState,
}

#[derive(Debug)]
pub struct TranscriptHistory {
    entries: Vec<Entry>,
    cursor: usize,
    /// While true the cursor tracks the newest entry; cleared when the
    /// user navigates backward, restored when they navigate back to the
    /// tail.
    follow: bool,
    cap: usize,
}

impl Default for TranscriptHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptHistory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            follow: true,
            cap: HISTORY_CAP,
        }
    }

    #[cfg(test)]
    fn with_capacity_limit(cap: usize) -> Self {
        let mut h = Self::new();
        h.cap = cap;
        h
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Text of the entry under the cursor, empty if there is none.
    pub fn current(&self) -> &str {
        self.entries
            .get(self.cursor)
            .map(|e| e.text.as_str())
            .unwrap_or("")
    }

    /// Text of an arbitrary entry, for the presentation layer's
    /// index-addressable view.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.text.as_str())
    }

    /// Append a placeholder marker (e.g. "Ready to assist..."). The next
    /// delta replaces it in place.
    pub fn push_placeholder(&mut self, text: impl Into<String>) {
        self.push_entry(Entry {
            text: text.into(),
            state: EntryState::Placeholder,
        });
    }

    /// Append an advisory entry (transient-transport notice, stop
    /// marker). Sealed immediately: deltas never extend it.
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.push_entry(Entry {
            text: text.into(),
            state: EntryState::Sealed,
        });
    }

    /// Apply a streamed output delta.
    pub fn on_delta(&mut self, text: &str) {
        match self.entries.last_mut() {
            None => self.push_entry(Entry {
                text: text.to_string(),
                state: EntryState::Open,
            }),
            Some(last) => match last.state {
                EntryState::Placeholder => {
                    last.text = text.to_string();
                    last.state = EntryState::Open;
                    self.follow_tail();
                }
                EntryState::Open => {
                    last.text.push_str(text);
                    self.follow_tail();
                }
                EntryState::Sealed => self.push_entry(Entry {
                    text: text.to_string(),
                    state: EntryState::Open,
                }),
            },
        }
    }

    /// Seal the current turn. The next delta starts a new entry.
    pub fn on_turn_complete(&mut self) {
        if let Some(last) = self.entries.last_mut() {
            if last.state == EntryState::Open {
                last.state = EntryState::Sealed;
            }
        }
    }

    /// Move the cursor by a signed offset, clamped to the valid range.
    pub fn navigate_by(&mut self, delta: i64) {
        if self.is_empty() {
            return;
        }
        let target = self.cursor as i64 + delta;
        self.navigate_to(target.max(0) as usize);
    }

    /// Jump to an absolute index, clamped to `[0, len-1]`.
    pub fn navigate_to(&mut self, index: usize) {
        if self.is_empty() {
            return;
        }
        let last = self.entries.len() - 1;
        self.cursor = index.min(last);
        self.follow = self.cursor == last;
    }

    fn push_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
        if self.entries.len() > self.cap {
            self.entries.remove(0);
            // Keep the same logical entry selected; a cursor already at 0
            // stays on the (new) oldest entry.
            self.cursor = self.cursor.saturating_sub(1);
        }
        self.follow_tail();
    }

    fn follow_tail(&mut self) {
        if self.follow && !self.entries.is_empty() {
            self.cursor = self.entries.len() - 1;
        }
    }
}
