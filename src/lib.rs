pub mod change_tracker;
pub mod config;
pub mod crdt;
pub mod delta;
pub mod editor;
pub mod error;
pub mod line_index;
pub mod logging;
pub mod normalized_document;
pub mod sync_engine;

pub use change_tracker::{ChangeSet, ChangeTracker};
pub use config::SyncConfig;
pub use crdt::{AutomergeText, CrdtEvent, CrdtText};
pub use delta::{Change, ChangeDelta, DeltaOp};
pub use editor::{Editor, EditorChangeEvent, EditorEdit};
pub use error::SyncError;
pub use line_index::{LineIndex, Position, Space};
pub use normalized_document::NormalizedDocument;
pub use sync_engine::{SyncEngine, SyncState};
