//! Change and delta types that flow between the editor and the CRDT.
//!
//! [`Change`] is editor-facing: a replacement of a native-offset range.
//! [`ChangeDelta`] is CRDT-facing: a sequence of retain/insert/delete ops,
//! applied left to right against a running cursor.

use crate::error::SyncError;
use crate::line_index::{LineIndex, Space};

/// A replacement of `[start, end)` in native offsets by `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub start: u64,
    pub end: u64,
    pub text: String,
}

impl Change {
    #[must_use]
    pub fn new(start: u64, end: u64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn insert(at: u64, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    #[must_use]
    pub fn delete(start: u64, end: u64) -> Self {
        Self::new(start, end, String::new())
    }
}

/// One CRDT-facing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    Retain(u64),
    Insert(String),
    Delete(u64),
}

/// An ordered list of retain/insert/delete ops over a sequence, as reported
/// by a CRDT text observer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDelta(pub Vec<DeltaOp>);

impl ChangeDelta {
    pub fn retain(&mut self, n: u64) {
        if n != 0 {
            self.0.push(DeltaOp::Retain(n));
        }
    }

    pub fn insert(&mut self, s: impl Into<String>) {
        let s = s.into();
        if !s.is_empty() {
            self.0.push(DeltaOp::Insert(s));
        }
    }

    pub fn delete(&mut self, n: u64) {
        if n != 0 {
            self.0.push(DeltaOp::Delete(n));
        }
    }

    /// Converts the delta into a list of `Change`s at the given offsets,
    /// advancing a running cursor as retains are consumed.
    #[must_use]
    pub fn into_changes(self, space: Space) -> Vec<(Change, Space)> {
        let mut changes = vec![];
        let mut position = 0u64;
        for op in self.0 {
            match op {
                DeltaOp::Retain(n) => position += n,
                DeltaOp::Delete(n) => {
                    changes.push((Change::delete(position, position + n), space));
                    position += n;
                }
                DeltaOp::Insert(s) => {
                    changes.push((Change::insert(position, s), space));
                }
            }
        }
        changes
    }
}

/// Sorts `changes` ascending by `start` and verifies they don't overlap.
///
/// # Errors
///
/// Returns [`SyncError::OverlappingEdit`] if a later change's `start` falls
/// before the previous change's `end`.
pub fn sort_non_overlapping(mut changes: Vec<Change>) -> Result<Vec<Change>, SyncError> {
    changes.sort_by_key(|c| c.start);
    for pair in changes.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(SyncError::OverlappingEdit);
        }
    }
    Ok(changes)
}

/// Splices a sorted, non-overlapping list of native-offset changes into
/// `text`, returning the resulting string.
///
/// # Errors
///
/// Returns [`SyncError::OverlappingEdit`] if the changes overlap.
pub fn apply_text_changes(text: &str, changes: &[Change]) -> Result<String, SyncError> {
    for pair in changes.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(SyncError::OverlappingEdit);
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for change in changes {
        let start = change.start as usize;
        let end = change.end as usize;
        result.push_str(&text[cursor..start]);
        result.push_str(&change.text);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    Ok(result)
}

/// Replaces every `\r\n` or lone `\n` in `text` with the CRDT's canonical
/// line ending (`\n`) or, for the editor-bound direction, `\r\n`.
#[must_use]
pub fn normalize(text: &str, use_crlf: bool) -> String {
    let eol = if use_crlf { "\r\n" } else { "\n" };
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' && chars.peek() == Some(&'\n') {
            chars.next();
            result.push_str(eol);
        } else if c == '\n' {
            result.push_str(eol);
        } else {
            result.push(c);
        }
    }
    result
}

#[must_use]
pub fn has_cr(text: &str) -> bool {
    text.as_bytes().contains(&b'\r')
}

/// Converts a native-space [`Change`] into a normalized-space one, using the
/// native document's line index to translate the endpoints.
#[must_use]
pub fn change_to_normalized(change: &Change, native_index: &LineIndex) -> Change {
    let start_pos = native_index.position_at(change.start);
    let end_pos = native_index.position_at(change.end);
    Change::new(
        native_index.offset_at(start_pos, Space::Normalized),
        native_index.offset_at(end_pos, Space::Normalized),
        normalize(&change.text, false),
    )
}
