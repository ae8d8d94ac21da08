//! Tunables for the sync engine's retry and reconciliation behavior.
//!
//! Unlike the daemon's `AppConfig`, this is never loaded from a file — it's
//! a plain struct the embedder constructs and passes in.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Trailing-edge debounce, in milliseconds, before a detected
    /// editor/CRDT drift triggers a resync.
    pub resync_debounce_ms: u64,
    /// Maximum delay, in milliseconds, before a pending resync is forced
    /// even if edits keep arriving.
    pub resync_max_wait_ms: u64,
    /// Attempts at `apply_edit` before giving up and scheduling a resync.
    pub max_edit_retries: u32,
    /// Forced periodic reconciliation tick, in milliseconds.
    pub resync_timer_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_debounce_ms: 100,
            resync_max_wait_ms: 500,
            max_edit_retries: 20,
            resync_timer_ms: 10_000,
        }
    }
}
