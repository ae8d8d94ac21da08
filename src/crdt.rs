// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The CRDT capability the sync engine depends on, plus an Automerge-backed
//! implementation of a single shared text object.
//!
//! Encapsulates `AutoCommit` so the rest of the crate never touches
//! Automerge internals directly.

use automerge::{
    patches::TextRepresentation, transaction::Transactable, AutoCommit, ObjType, Patch,
    PatchAction, PatchLog, ReadDoc, TextEncoding,
};

use crate::delta::ChangeDelta;
use crate::error::SyncError;

/// One batch of changes observed on a shared text, tagged with whether the
/// transaction that produced it originated locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrdtEvent {
    pub delta: ChangeDelta,
    pub local: bool,
}

/// The shared-sequence capability the sync engine requires from a CRDT.
///
/// Implementations must guarantee that `transact` runs its closure without
/// yielding to any other task, so that an observer watching the same text
/// sees the whole batch as a single event.
pub trait CrdtText {
    fn to_string(&self) -> String;

    /// # Errors
    /// Returns [`SyncError::CrdtTransactionFailed`] if the splice could not
    /// be applied.
    fn insert(&mut self, offset: u64, text: &str) -> Result<(), SyncError>;

    /// # Errors
    /// Returns [`SyncError::CrdtTransactionFailed`] if the splice could not
    /// be applied.
    fn delete(&mut self, offset: u64, length: u64) -> Result<(), SyncError>;

    /// Runs `f`, giving it exclusive synchronous access to `self`. Because
    /// the whole crate is single-threaded and cooperative, running `f`
    /// without an intervening `.await` is sufficient to make every splice
    /// it performs land in the same observer batch.
    ///
    /// # Errors
    /// Propagates whatever `f` returns.
    fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SyncError>) -> Result<T, SyncError>
    where
        Self: Sized,
    {
        f(self)
    }

    /// Byte length of the current content. Default implementation just
    /// measures `to_string()`; implementations backed by a length-tracking
    /// CRDT may override this to avoid materializing the whole string.
    fn length(&self) -> u64 {
        self.to_string().len() as u64
    }

    /// Registers a listener to be invoked with every [`CrdtEvent`] this text
    /// produces, including ones caused by this object's own `insert`/
    /// `delete` calls — implementations must tag those `local: true`.
    ///
    /// Replaces any previously registered listener.
    fn observe(&mut self, listener: Box<dyn FnMut(CrdtEvent)>);

    /// Unregisters the current listener, if any. After this call, further
    /// mutations produce no events until [`Self::observe`] is called again.
    fn unobserve(&mut self);
}

/// Automerge-backed implementation of [`CrdtText`] wrapping a single text
/// object inside an `AutoCommit` document.
pub struct AutomergeText {
    doc: AutoCommit,
    text_obj: automerge::ObjId,
    listener: Option<Box<dyn FnMut(CrdtEvent)>>,
}

impl std::fmt::Debug for AutomergeText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomergeText")
            .field("doc", &self.doc)
            .field("text_obj", &self.text_obj)
            .field("observed", &self.listener.is_some())
            .finish()
    }
}

impl AutomergeText {
    /// Creates a fresh document containing one empty text object, seeded
    /// with `initial_text`.
    #[must_use]
    pub fn new(initial_text: &str) -> Self {
        let mut doc = AutoCommit::new();
        let text_obj = doc
            .put_object(automerge::ROOT, "text", ObjType::Text)
            .expect("failed to create root text object");
        if !initial_text.is_empty() {
            doc.splice_text(&text_obj, 0, 0, initial_text)
                .expect("failed to seed initial text");
        }
        Self {
            doc,
            text_obj,
            listener: None,
        }
    }

    /// Loads a document previously produced by [`Self::save`].
    ///
    /// # Panics
    /// Panics if `bytes` is not a valid Automerge document, or does not
    /// contain a root `"text"` object — both are programmer errors, not
    /// runtime conditions callers can recover from.
    #[must_use]
    pub fn load(bytes: &[u8]) -> Self {
        let doc = AutoCommit::load(bytes).expect("failed to load Automerge document from bytes");
        let text_obj = doc
            .get(automerge::ROOT, "text")
            .expect("failed to look up root text object")
            .expect("document has no root text object")
            .1;
        Self {
            doc,
            text_obj,
            listener: None,
        }
    }

    #[must_use]
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    #[must_use]
    pub fn actor_id(&self) -> String {
        self.doc.get_actor().to_hex_string()
    }

    /// Applies a remote sync message, returning the resulting patches so the
    /// caller can translate them into a [`CrdtEvent`].
    pub fn receive_sync_message(
        &mut self,
        message: automerge::sync::Message,
        peer_state: &mut automerge::sync::State,
    ) -> Result<Vec<Patch>, SyncError> {
        use automerge::sync::SyncDoc;
        let mut patch_log = PatchLog::active(TextRepresentation::String(TextEncoding::default()));
        self.doc
            .sync()
            .receive_sync_message_log_patches(peer_state, message, &mut patch_log)
            .map_err(|e| SyncError::CrdtTransactionFailed(e.to_string()))?;
        Ok(self.doc.make_patches(&mut patch_log))
    }

    pub fn generate_sync_message(
        &mut self,
        peer_state: &mut automerge::sync::State,
    ) -> Option<automerge::sync::Message> {
        use automerge::sync::SyncDoc;
        self.doc.sync().generate_sync_message(peer_state)
    }
}

impl CrdtText for AutomergeText {
    fn to_string(&self) -> String {
        self.doc
            .text(&self.text_obj)
            .expect("failed to read text object content")
    }

    fn insert(&mut self, offset: u64, text: &str) -> Result<(), SyncError> {
        self.doc
            .splice_text(&self.text_obj, offset as usize, 0, text)
            .map_err(|e| SyncError::CrdtTransactionFailed(e.to_string()))?;
        if let Some(listener) = self.listener.as_mut() {
            let mut delta = ChangeDelta::default();
            delta.retain(offset);
            delta.insert(text);
            listener(CrdtEvent { delta, local: true });
        }
        Ok(())
    }

    fn delete(&mut self, offset: u64, length: u64) -> Result<(), SyncError> {
        self.doc
            .splice_text(&self.text_obj, offset as usize, length as isize, "")
            .map_err(|e| SyncError::CrdtTransactionFailed(e.to_string()))?;
        if let Some(listener) = self.listener.as_mut() {
            let mut delta = ChangeDelta::default();
            delta.retain(offset);
            delta.delete(length);
            listener(CrdtEvent { delta, local: true });
        }
        Ok(())
    }

    fn observe(&mut self, listener: Box<dyn FnMut(CrdtEvent)>) {
        self.listener = Some(listener);
    }

    fn unobserve(&mut self) {
        self.listener = None;
    }
}

/// Converts Automerge [`Patch`]es on the shared text object into a
/// [`ChangeDelta`], ignoring patches for any other part of the document.
#[must_use]
pub fn patches_to_delta(patches: &[Patch]) -> ChangeDelta {
    let mut delta = ChangeDelta::default();
    for patch in patches {
        match &patch.action {
            PatchAction::SpliceText { index, value, .. } => {
                delta.retain(*index as u64);
                delta.insert(value.make_string());
            }
            PatchAction::DeleteSeq { index, length } => {
                delta.retain(*index as u64);
                delta.delete(*length as u64);
            }
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_round_trips_initial_text() {
        let doc = AutomergeText::new("hello\nworld");
        assert_eq!(doc.to_string(), "hello\nworld");
    }

    #[test]
    fn insert_and_delete_mutate_content() {
        let mut doc = AutomergeText::new("hello");
        doc.insert(5, " world").unwrap();
        assert_eq!(doc.to_string(), "hello world");
        doc.delete(0, 6).unwrap();
        assert_eq!(doc.to_string(), "world");
    }

    #[test]
    fn save_and_load_round_trips() {
        let mut doc = AutomergeText::new("abc");
        let bytes = doc.save();
        let loaded = AutomergeText::load(&bytes);
        assert_eq!(loaded.to_string(), "abc");
    }

    #[test]
    fn observe_receives_local_events_until_unobserved() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut doc = AutomergeText::new("ab");
        let seen: Rc<RefCell<Vec<CrdtEvent>>> = Rc::new(RefCell::new(vec![]));

        let recorder = Rc::clone(&seen);
        doc.observe(Box::new(move |event| recorder.borrow_mut().push(event)));

        doc.insert(2, "c").unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].local);

        doc.unobserve();
        doc.insert(3, "d").unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn transact_runs_closure_once() {
        let mut doc = AutomergeText::new("");
        doc.transact(|d| {
            d.insert(0, "a")?;
            d.insert(1, "b")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(doc.to_string(), "ab");
    }
}
