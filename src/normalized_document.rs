//! Owns the native-text mirror of a shared CRDT text, and translates
//! offsets and positions between the editor's native space and the CRDT's
//! normalized (LF-only) space.

use crate::crdt::CrdtText;
use crate::delta::{apply_text_changes, change_to_normalized, has_cr, normalize, sort_non_overlapping, Change, ChangeDelta};
use crate::error::SyncError;
use crate::line_index::{LineIndex, Position, Space};

/// A local string mirror of a shared CRDT text, kept in native (editor)
/// offsets, plus a lazily rebuilt [`LineIndex`] for O(log n) position
/// queries.
///
/// Offsets throughout this crate are byte offsets into the UTF-8 text; a
/// binding that talks to an editor using UTF-16 columns converts at its own
/// boundary.
pub struct NormalizedDocument<C: CrdtText> {
    text: String,
    crdt: C,
    line_index: Option<LineIndex>,
}

impl<C: CrdtText> NormalizedDocument<C> {
    /// Creates a document mirroring `crdt`'s current content.
    #[must_use]
    pub fn new(crdt: C) -> Self {
        let text = crdt.to_string();
        Self {
            text,
            crdt,
            line_index: None,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn crdt(&self) -> &C {
        &self.crdt
    }

    pub fn crdt_mut(&mut self) -> &mut C {
        &mut self.crdt
    }

    fn index(&mut self) -> &LineIndex {
        if self.line_index.is_none() {
            self.line_index = Some(LineIndex::build(&self.text));
        }
        self.line_index.as_ref().expect("just populated")
    }

    fn invalidate(&mut self) {
        self.line_index = None;
    }

    /// Normalized offset → native offset.
    pub fn original_offset(&mut self, n: u64) -> u64 {
        let index = self.index();
        let (_, entry) = index.find_line(n, Space::Normalized);
        entry.native_offset + (n - entry.normalized_offset)
    }

    /// Native offset → normalized offset.
    pub fn normalized_offset(&mut self, o: u64) -> u64 {
        let index = self.index();
        let (_, entry) = index.find_line(o, Space::Native);
        entry.normalized_offset + (o - entry.native_offset)
    }

    pub fn original_offset_at(&mut self, position: Position) -> u64 {
        self.index().offset_at(position, Space::Native)
    }

    pub fn normalized_offset_at(&mut self, position: Position) -> u64 {
        self.index().offset_at(position, Space::Normalized)
    }

    pub fn position_at_normalized(&mut self, n: u64) -> Position {
        let native = self.original_offset(n);
        self.index().position_at(native)
    }

    pub fn position_at(&mut self, native_offset: u64) -> Position {
        self.index().position_at(native_offset)
    }

    /// Applies a sorted-or-not, non-overlapping list of native-offset
    /// changes from the editor: updates the text mirror in place and writes
    /// the normalized equivalent into the CRDT inside one transaction.
    ///
    /// # Errors
    /// Returns [`SyncError::OverlappingEdit`] if `changes` overlap, or
    /// whatever the CRDT transaction returns.
    pub fn apply_local_changes(&mut self, changes: Vec<Change>) -> Result<(), SyncError> {
        self.invalidate();
        let changes = sort_non_overlapping(changes)?;

        let mut delta: i64 = 0;
        let mut crdt_ops = Vec::with_capacity(changes.len());
        for change in &changes {
            let start = (change.start as i64 + delta) as u64;
            let end = (change.end as i64 + delta) as u64;
            let (ns, ne) = normalized_span(&self.text, start, end);

            self.text
                .replace_range(start as usize..end as usize, &change.text);
            delta += change.text.len() as i64 - (end as i64 - start as i64);

            crdt_ops.push((ns, ne, normalize(&change.text, false)));
        }

        self.crdt.transact(|crdt| {
            for (ns, ne, text) in &crdt_ops {
                if ne > ns {
                    crdt.delete(*ns, ne - ns)?;
                }
                if !text.is_empty() {
                    crdt.insert(*ns, text)?;
                }
            }
            Ok(())
        })
    }

    /// Replaces the whole text mirror and pushes the equivalent full-content
    /// replacement into the CRDT inside one transaction.
    ///
    /// # Errors
    /// Propagates whatever the CRDT transaction returns.
    pub fn replace_all(&mut self, new_text: String) -> Result<(), SyncError> {
        self.invalidate();
        let normalized = normalize(&new_text, false);
        self.text = new_text;

        self.crdt.transact(|crdt| {
            let len = crdt.length();
            if len > 0 {
                crdt.delete(0, len)?;
            }
            if !normalized.is_empty() {
                crdt.insert(0, &normalized)?;
            }
            Ok(())
        })
    }

    /// Replaces the text mirror from a resync, without writing back to the
    /// CRDT — used when the CRDT's content is authoritative and the editor
    /// buffer is being brought back in line with it.
    pub fn replace_all_without_propagating(&mut self, new_text: String) {
        self.invalidate();
        self.text = new_text;
    }

    /// Converts a normalized-space CRDT delta into native-offset `Change`s
    /// ready to hand to the editor, preserving the document's current
    /// line-ending style.
    #[must_use]
    pub fn translate_remote_delta(&mut self, delta: ChangeDelta) -> Vec<Change> {
        let use_crlf = has_cr(&self.text);
        delta
            .into_changes(Space::Normalized)
            .into_iter()
            .map(|(change, _)| {
                let start = self.original_offset(change.start);
                let end = self.original_offset(change.end);
                Change::new(start, end, normalize(&change.text, use_crlf))
            })
            .collect()
    }

    /// Applies already-translated native-offset changes (from
    /// [`Self::translate_remote_delta`]) to the text mirror, without
    /// touching the CRDT — the remote edit already landed there.
    ///
    /// # Errors
    /// Returns [`SyncError::OverlappingEdit`] if `changes` overlap.
    pub fn apply_remote_changes(&mut self, changes: &[Change]) -> Result<String, SyncError> {
        let after = apply_text_changes(&self.text, changes)?;
        self.invalidate();
        self.text = after.clone();
        Ok(after)
    }

    /// Converts one native-offset `Change` into normalized space without
    /// mutating the document, for callers that need to preview the CRDT
    /// side effect of an edit.
    pub fn preview_normalized(&mut self, change: &Change) -> Change {
        let index = self.index();
        change_to_normalized(change, index)
    }
}

/// Computes `(normalized_start, normalized_end)` for the native byte range
/// `[native_start, native_end)` via a single left-to-right scan of `text`,
/// counting every byte that isn't `\r`. Used instead of the (possibly
/// stale) line index cache right after it has been invalidated.
fn normalized_span(text: &str, native_start: u64, native_end: u64) -> (u64, u64) {
    let mut native_i = 0u64;
    let mut normalized_i = 0u64;
    let mut start = None;
    let mut end = None;

    for byte in text.bytes() {
        if native_i == native_start && start.is_none() {
            start = Some(normalized_i);
        }
        if native_i == native_end && end.is_none() {
            end = Some(normalized_i);
        }
        if byte != b'\r' {
            normalized_i += 1;
        }
        native_i += 1;
    }
    (start.unwrap_or(normalized_i), end.unwrap_or(normalized_i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::AutomergeText;

    #[test]
    fn new_mirrors_crdt_content() {
        let crdt = AutomergeText::new("hello\nworld");
        let doc = NormalizedDocument::new(crdt);
        assert_eq!(doc.text(), "hello\nworld");
    }

    #[test]
    fn apply_local_changes_updates_mirror_and_crdt() {
        let crdt = AutomergeText::new("hello world");
        let mut doc = NormalizedDocument::new(crdt);
        doc.apply_local_changes(vec![Change::new(5, 6, ",")]).unwrap();
        assert_eq!(doc.text(), "hello, world");
        assert_eq!(doc.crdt().to_string(), "hello, world");
    }

    #[test]
    fn apply_local_changes_normalizes_crlf_for_crdt() {
        let crdt = AutomergeText::new("ab");
        let mut doc = NormalizedDocument::new(crdt);
        doc.apply_local_changes(vec![Change::insert(1, "\r\n")]).unwrap();
        assert_eq!(doc.text(), "a\r\nb");
        assert_eq!(doc.crdt().to_string(), "a\nb");
    }

    #[test]
    fn translate_remote_delta_preserves_editor_crlf_style() {
        let crdt = AutomergeText::new("a\nb");
        let mut doc = NormalizedDocument::new(crdt);
        doc.replace_all_without_propagating("a\r\nb".to_string());

        let mut delta = ChangeDelta::default();
        delta.retain(2);
        delta.insert("X");
        let native_changes = doc.translate_remote_delta(delta);

        assert_eq!(native_changes, vec![Change::insert(3, "X")]);
    }

    #[test]
    fn replace_all_resets_mirror_and_crdt() {
        let crdt = AutomergeText::new("old");
        let mut doc = NormalizedDocument::new(crdt);
        doc.replace_all("new text".to_string()).unwrap();
        assert_eq!(doc.text(), "new text");
        assert_eq!(doc.crdt().to_string(), "new text");
    }

    #[test]
    fn offset_round_trip_holds_away_from_eol() {
        let crdt = AutomergeText::new("hallo,\nneue\nwelt");
        let mut doc = NormalizedDocument::new(crdt);
        for n in 0..=doc.index().length(Space::Normalized) {
            let native = doc.original_offset(n);
            let back = doc.normalized_offset(native);
            assert_eq!(back, n);
        }
    }

    #[test]
    fn apply_local_changes_rejects_overlap() {
        let crdt = AutomergeText::new("abcdef");
        let mut doc = NormalizedDocument::new(crdt);
        let changes = vec![Change::new(0, 3, "X"), Change::new(2, 4, "Y")];
        assert_eq!(doc.apply_local_changes(changes), Err(SyncError::OverlappingEdit));
    }
}
