//! Ordered, tagged pattern lists for cue detection.
//!
//! An agent without a protocol only tells us where we are through loose
//! textual cues. Each expectation is an ordered list of candidates, most
//! specific first; the first entry that matches anywhere in the buffer wins,
//! regardless of where later entries would have matched.

use regex::bytes::Regex;

/// A regex tagged with the cue it detects.
#[derive(Debug, Clone)]
pub struct TaggedPattern<T> {
    /// Cue reported when this pattern wins.
    pub tag: T,

    /// Pattern to search for.
    pub pattern: Regex,
}

/// A successful match from a [`MatcherList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternHit<T> {
    /// Position of the winning entry in its list.
    pub index: usize,

    /// Cue of the winning entry.
    pub tag: T,

    /// Byte offset where the match starts.
    pub start: usize,

    /// Byte offset where the match ends.
    pub end: usize,
}

/// Priority-ordered list of tagged patterns, evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct MatcherList<T> {
    entries: Vec<TaggedPattern<T>>,
}

impl<T: Copy> MatcherList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a candidate with lower priority than every existing one.
    pub fn with(mut self, tag: T, pattern: &str) -> Result<Self, regex::Error> {
        self.entries.push(TaggedPattern {
            tag,
            pattern: Regex::new(pattern)?,
        });
        Ok(self)
    }

    /// Return the earliest-listed entry that matches `data`.
    pub fn find(&self, data: &[u8]) -> Option<PatternHit<T>> {
        self.entries.iter().enumerate().find_map(|(index, entry)| {
            entry.pattern.find(data).map(|m| PatternHit {
                index,
                tag: entry.tag,
                start: m.start(),
                end: m.end(),
            })
        })
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no candidates.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Copy> Default for MatcherList<T> {
    fn default() -> Self {
        Self::new()
    }
}
