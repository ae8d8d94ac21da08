//! Error surface for the synchronization core.
//!
//! Mirrors the categories the design separates: a programmer error that's
//! surfaced synchronously, a transient editor failure that gets retried
//! before being downgraded to a resync, a transport error that's propagated
//! unchanged, and a lifecycle error for use-after-dispose.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Caller submitted a change list with overlapping ranges.
    #[error("edit batch contains overlapping changes")]
    OverlappingEdit,

    /// The CRDT rejected or failed to apply a transaction.
    #[error("CRDT transaction failed: {0}")]
    CrdtTransactionFailed(String),

    /// The editor rejected `apply_edit`, e.g. because its buffer moved
    /// under the edit. Retried up to `max_edit_retries` before giving up.
    #[error("editor rejected the edit")]
    EditorRejectedEdit,

    /// A public operation was called after the document's CRDT observer was
    /// unsubscribed.
    #[error("document observer has been disposed")]
    ObserverDisposed,
}
