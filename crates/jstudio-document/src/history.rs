//! Linear undo/redo over immutable, structurally-shared snapshots.
//!
//! A memento is produced by asking the document root for its state relative
//! to the previous memento; unchanged sub-objects keep the same [`Arc`], so
//! `commit` costs roughly one allocation per changed object rather than one
//! per object in the document.

use std::sync::Arc;

/// A linear undo stack of mementos of type `M`. `M` is document-specific
/// (each document type defines its own memento shape, typically one
/// `Vec<Arc<_>>` per folder) and is produced by the document root, not by
/// this type.
#[derive(Debug)]
pub struct History<M> {
    mementos: Vec<Arc<M>>,
    cursor: usize,
}

impl<M> History<M> {
    /// Start a history at `initial`, with nothing to undo or redo.
    pub fn new(initial: M) -> Self {
        Self { mementos: vec![Arc::new(initial)], cursor: 0 }
    }

    /// The memento the live document currently reflects.
    pub fn current(&self) -> &Arc<M> {
        &self.mementos[self.cursor]
    }

    /// Record `memento` as a new commit, discarding any redo tail.
    pub fn commit(&mut self, memento: M) {
        self.mementos.truncate(self.cursor + 1);
        self.mementos.push(Arc::new(memento));
        self.cursor += 1;
    }

    /// Step back one memento. Returns `false` if already at the oldest.
    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Step forward one memento. Returns `false` if already at the newest.
    pub fn redo(&mut self) -> bool {
        if self.cursor + 1 >= self.mementos.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.mementos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{Folder, FolderKey};

    const MATERIALS: FolderKey = FolderKey("materials");

    /// A document with a single materials folder, matching the ten-material
    /// edit scenario almost verbatim: committing after editing one element
    /// must reuse the snapshot pointers of every other element.
    #[derive(Debug, Clone)]
    struct MaterialsMemento {
        materials: Vec<Arc<i32>>,
    }

    #[test]
    fn editing_one_of_ten_materials_shares_every_other_snapshot() {
        let mut materials: Folder<i32> = Folder::new(MATERIALS);
        for v in 0..10 {
            materials.add(v);
        }
        let baseline = MaterialsMemento { materials: materials.next_snapshot(&[]) };
        let mut history = History::new(baseline);

        *materials.get_mut(3).unwrap() = -1;
        let next = MaterialsMemento { materials: materials.next_snapshot(&history.current().materials) };
        history.commit(next);

        let before = &history.mementos[0].materials;
        let after = &history.mementos[1].materials;
        for i in 0..10 {
            if i == 3 {
                assert!(!Arc::ptr_eq(&before[i], &after[i]));
            } else {
                assert!(Arc::ptr_eq(&before[i], &after[i]));
            }
        }
    }

    #[test]
    fn commit_after_undo_truncates_the_redo_tail() {
        let mut history = History::new(0i32);
        history.commit(1);
        history.commit(2);
        assert!(history.undo());
        assert_eq!(**history.current(), 1);
        history.commit(99);
        assert!(!history.can_redo());
        assert_eq!(**history.current(), 99);
    }

    #[test]
    fn undo_redo_respect_the_ends_of_the_stack() {
        let mut history = History::new(0i32);
        assert!(!history.can_undo());
        history.commit(1);
        assert!(history.undo());
        assert!(!history.undo());
        assert!(history.redo());
        assert!(!history.redo());
    }
}
