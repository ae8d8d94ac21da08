//! The editor capability the sync engine depends on.
//!
//! This is the abstract surface a concrete editor binding (a Neovim plugin,
//! an LSP client, a terminal UI) must implement. No transport, no wire
//! format — just the operations the engine calls.

use async_trait::async_trait;

use crate::line_index::Position;

/// A single replacement of `[start, end)` (in the editor's own offset space)
/// with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorEdit {
    pub start: u64,
    pub end: u64,
    pub replacement: String,
}

/// A batch of changes reported by the editor, e.g. from a `didChange`
/// notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorChangeEvent {
    pub changes: Vec<EditorEdit>,
}

impl EditorChangeEvent {
    #[must_use]
    pub fn new(changes: Vec<EditorEdit>) -> Self {
        Self { changes }
    }
}

/// A 0-based line/character position as reported by the editor. Distinct
/// from [`crate::line_index::Position`] only in name; kept separate so a
/// binding can convert at its own boundary (UTF-16 vs byte columns, etc.)
/// without the core needing to know which.
pub type EditorPosition = Position;

/// The editor capability the sync engine requires.
#[async_trait]
pub trait Editor {
    /// The editor's current buffer content, in its native encoding.
    fn text(&self) -> String;

    /// Applies `edits` to the live buffer. Returns `false` if the buffer
    /// moved under the edit (e.g. the user kept typing) and the caller
    /// should recompute and retry.
    async fn apply_edit(&mut self, edits: &[EditorEdit]) -> bool;
}

#[cfg(test)]
pub mod test_support {
    use super::{Editor, EditorEdit};
    use async_trait::async_trait;

    /// An in-memory [`Editor`] for tests: applies edits unconditionally
    /// unless told to reject the next N calls.
    #[derive(Debug, Default)]
    pub struct FakeEditor {
        pub text: String,
        pub reject_next: usize,
        pub apply_calls: usize,
    }

    impl FakeEditor {
        #[must_use]
        pub fn new(text: impl Into<String>) -> Self {
            Self {
                text: text.into(),
                reject_next: 0,
                apply_calls: 0,
            }
        }
    }

    #[async_trait]
    impl Editor for FakeEditor {
        fn text(&self) -> String {
            self.text.clone()
        }

        async fn apply_edit(&mut self, edits: &[EditorEdit]) -> bool {
            self.apply_calls += 1;
            if self.reject_next > 0 {
                self.reject_next -= 1;
                return false;
            }
            let mut result = String::with_capacity(self.text.len());
            let mut cursor = 0usize;
            let mut sorted = edits.to_vec();
            sorted.sort_by_key(|e| e.start);
            for edit in &sorted {
                result.push_str(&self.text[cursor..edit.start as usize]);
                result.push_str(&edit.replacement);
                cursor = edit.end as usize;
            }
            result.push_str(&self.text[cursor..]);
            self.text = result;
            true
        }
    }

    #[tokio::test]
    async fn fake_editor_applies_edits_in_order() {
        let mut editor = FakeEditor::new("hello world");
        let edits = vec![EditorEdit {
            start: 5,
            end: 6,
            replacement: ",".to_string(),
        }];
        assert!(editor.apply_edit(&edits).await);
        assert_eq!(editor.text, "hello, world");
    }

    #[tokio::test]
    async fn fake_editor_rejects_when_configured() {
        let mut editor = FakeEditor::new("abc");
        editor.reject_next = 1;
        let edits = vec![EditorEdit {
            start: 0,
            end: 0,
            replacement: "X".to_string(),
        }];
        assert!(!editor.apply_edit(&edits).await);
        assert_eq!(editor.text, "abc");
        assert!(editor.apply_edit(&edits).await);
        assert_eq!(editor.text, "Xabc");
    }
}
