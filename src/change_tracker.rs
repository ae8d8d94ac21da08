//! Tells the sync engine whether an editor-reported change is a genuine
//! local edit, or an echo of a remote edit the engine just applied.
//!
//! An editor can't distinguish its own `didChange` events from ones caused
//! by a remote edit the core just pushed into the buffer. We record every
//! remote edit as a `ChangeSet { before, after }` while its callback is in
//! flight, and compare the *result* of applying the editor's reported
//! changes against the recorded `after`. Comparing results rather than the
//! change lists themselves survives editor-side edit coalescing (adjacent
//! single-character inserts getting merged before they reach us).

use crate::delta::{apply_text_changes, Change, ChangeDelta};
use crate::error::SyncError;
use crate::line_index::Space;

/// A remote edit recorded between "applied to the editor" and "editor
/// acknowledged it".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub before: String,
    pub after: String,
}

/// Ordered list of in-flight remote `ChangeSet`s for one document.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Vec<ChangeSet>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> &[ChangeSet] {
        &self.pending
    }

    /// Pushes a new in-flight `ChangeSet`. Call this before handing the edit
    /// to the editor's `apply_edit`.
    pub fn begin(&mut self, before: String, after: String) {
        self.pending.push(ChangeSet { before, after });
    }

    /// Removes the most recently recorded `ChangeSet` matching `after`, once
    /// the editor has acknowledged the edit (successfully or not).
    pub fn complete(&mut self, after: &str) {
        if let Some(idx) = self.pending.iter().rposition(|cs| cs.after == after) {
            self.pending.remove(idx);
        }
    }

    /// Drops every in-flight `ChangeSet`. Used when a document is disposed;
    /// there is no longer anyone to acknowledge a pending remote edit.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Decides whether a candidate change list from the editor should be
    /// forwarded to the CRDT, or dropped as an echo of a recorded remote
    /// edit.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OverlappingEdit`] if `changes` overlap.
    pub fn should_apply(&self, changes: &[Change]) -> Result<bool, SyncError> {
        let mut sorted = changes.to_vec();
        sorted.sort_by_key(|c| c.start);

        for pending in &self.pending {
            let candidate = apply_text_changes(&pending.before, &sorted)?;
            if candidate == pending.after {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Splices `changes` into `text`, rejecting overlapping ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OverlappingEdit`] if `changes` overlap.
    pub fn apply_text_changes(text: &str, changes: &[Change]) -> Result<String, SyncError> {
        apply_text_changes(text, changes)
    }

    /// Records a `ChangeSet` for `changes` applied to `before`, runs
    /// `apply_fn`, then removes the entry regardless of whether `apply_fn`
    /// succeeded — an error must not leave the tracker thinking a remote
    /// edit is still in flight, or it will wrongly suppress the user's next
    /// genuine edit.
    ///
    /// # Errors
    ///
    /// Propagates whatever `apply_fn` returns.
    pub fn apply_changes<F, T, E>(
        &mut self,
        before: String,
        changes: &[Change],
        apply_fn: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let after = apply_text_changes(&before, changes).unwrap_or_else(|_| before.clone());
        self.begin(before, after.clone());
        let result = apply_fn();
        self.complete(&after);
        result
    }

    /// Converts a CRDT delta to a change list (relative to `content`, in the
    /// delta's own space) and records/applies it via [`Self::apply_changes`].
    ///
    /// # Errors
    ///
    /// Propagates whatever `apply_fn` returns.
    pub fn apply_delta<F, T, E>(
        &mut self,
        content: &str,
        delta: ChangeDelta,
        space: Space,
        apply_fn: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Vec<Change>) -> Result<T, E>,
    {
        let changes: Vec<Change> = delta.into_changes(space).into_iter().map(|(c, _)| c).collect();
        let before = content.to_string();
        let after = apply_text_changes(&before, &changes).unwrap_or_else(|_| before.clone());
        self.begin(before, after.clone());
        let result = apply_fn(changes);
        self.complete(&after);
        result
    }
}
