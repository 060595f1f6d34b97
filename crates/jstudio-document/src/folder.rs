//! Typed element collections with selection state, plus the reflective
//! interface a document node exposes over its (fixed) set of folders.

use std::sync::Arc;

/// A stable identifier for a folder's element type, used by serializers and
/// UI code that need to enumerate a node's folders without knowing their
/// concrete element types at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderKey(pub &'static str);

/// Type-erased view of a [`Folder`], for heterogeneous iteration over a
/// node's folders (see [`CollectionHost`]).
pub trait AnyFolder: std::fmt::Debug {
    /// Number of elements currently held.
    fn len(&self) -> usize;

    /// Whether the folder holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stable identifier for this folder's element type.
    fn key(&self) -> FolderKey;
}

/// An ordered collection of one element type, owned by exactly one document
/// node. Iteration order is construction order and is preserved across
/// serialization.
#[derive(Debug, Clone)]
pub struct Folder<T> {
    key: FolderKey,
    elements: Vec<T>,
    selected: std::collections::BTreeSet<usize>,
    active: Option<usize>,
}

impl<T> Folder<T> {
    /// An empty folder tagged with the given stable type identifier.
    pub fn new(key: FolderKey) -> Self {
        Self {
            key,
            elements: Vec::new(),
            selected: std::collections::BTreeSet::new(),
            active: None,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.elements.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }

    /// Append `element`, returning its index.
    pub fn add(&mut self, element: T) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// Remove the element at `index`, shifting later elements down and
    /// dropping any selection/active state that referred to it.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.elements.len() {
            return None;
        }
        let removed = self.elements.remove(index);
        self.selected = self
            .selected
            .iter()
            .filter_map(|&i| match i.cmp(&index) {
                std::cmp::Ordering::Less => Some(i),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(i - 1),
            })
            .collect();
        self.active = match self.active {
            Some(i) if i == index => None,
            Some(i) if i > index => Some(i - 1),
            other => other,
        };
        Some(removed)
    }

    /// Mark `index` selected and make it the active selection.
    pub fn select(&mut self, index: usize) {
        if index < self.elements.len() {
            self.selected.insert(index);
            self.active = Some(index);
        }
    }

    /// Clear selection state for `index`. If it was the active selection,
    /// the active selection becomes the next-lowest remaining selected
    /// index, if any.
    pub fn deselect(&mut self, index: usize) {
        self.selected.remove(&index);
        if self.active == Some(index) {
            self.active = self.selected.iter().next_back().copied();
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// The element most recently selected, if any selection is live.
    pub fn active_selection(&self) -> Option<usize> {
        self.active
    }
}

impl<T: Clone + PartialEq> Folder<T> {
    /// Produce this folder's contribution to a memento: one shared snapshot
    /// per element, reusing `previous`'s snapshot pointer wherever the
    /// element at that position is unchanged.
    ///
    /// `previous` need not have the same length as this folder; elements
    /// beyond its end (insertions) always get a fresh snapshot.
    pub fn next_snapshot(&self, previous: &[Arc<T>]) -> Vec<Arc<T>> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, element)| match previous.get(i) {
                Some(prev) if prev.as_ref() == element => Arc::clone(prev),
                _ => Arc::new(element.clone()),
            })
            .collect()
    }

    /// Overwrite this folder's live elements with `snapshot`'s contents.
    /// Selection state is not part of the memento and is left untouched.
    pub fn restore(&mut self, snapshot: &[Arc<T>]) {
        self.elements = snapshot.iter().map(|s| (**s).clone()).collect();
    }
}

impl<T: std::fmt::Debug> AnyFolder for Folder<T> {
    fn len(&self) -> usize {
        self.elements.len()
    }

    fn key(&self) -> FolderKey {
        self.key
    }
}

/// A document node's reflective interface over its fixed set of folders.
/// Every concrete document type (one per supported format) implements this
/// by listing its folders in construction order; the order returned here is
/// the order used for serialization and for equals-by-construction-order
/// comparisons.
pub trait CollectionHost {
    /// How many folders this node owns.
    fn num_folders(&self) -> usize;

    /// The folder at `index`, type-erased.
    fn folder_at(&self, index: usize) -> &dyn AnyFolder;

    /// The stable type identifier of the folder at `index`.
    fn folder_key_at(&self, index: usize) -> FolderKey {
        self.folder_at(index).key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: FolderKey = FolderKey("names");

    #[test]
    fn add_get_len_round_trip_in_construction_order() {
        let mut folder: Folder<String> = Folder::new(NAMES);
        folder.add("a".to_string());
        folder.add("b".to_string());
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.get(0).unwrap(), "a");
        assert_eq!(folder.get(1).unwrap(), "b");
    }

    #[test]
    fn remove_shifts_selection_and_active_index_down() {
        let mut folder: Folder<i32> = Folder::new(NAMES);
        folder.add(10);
        folder.add(20);
        folder.add(30);
        folder.select(2);
        folder.select(1);
        assert_eq!(folder.active_selection(), Some(1));
        folder.remove(0);
        assert_eq!(folder.len(), 2);
        assert!(folder.is_selected(0)); // was index 1
        assert!(folder.is_selected(1)); // was index 2
        assert_eq!(folder.active_selection(), Some(0));
    }

    #[test]
    fn deselect_active_falls_back_to_next_lowest_selected() {
        let mut folder: Folder<i32> = Folder::new(NAMES);
        folder.add(0);
        folder.add(1);
        folder.add(2);
        folder.select(0);
        folder.select(2);
        assert_eq!(folder.active_selection(), Some(2));
        folder.deselect(2);
        assert_eq!(folder.active_selection(), Some(0));
        assert!(!folder.is_selected(2));
    }

    #[test]
    fn next_snapshot_reuses_pointers_for_unchanged_elements() {
        let mut folder: Folder<i32> = Folder::new(NAMES);
        for v in 0..10 {
            folder.add(v);
        }
        let first = folder.next_snapshot(&[]);
        assert_eq!(first.len(), 10);

        *folder.get_mut(3).unwrap() = 999;
        let second = folder.next_snapshot(&first);

        for i in 0..10 {
            if i == 3 {
                assert!(!Arc::ptr_eq(&first[i], &second[i]));
                assert_eq!(*second[i], 999);
            } else {
                assert!(Arc::ptr_eq(&first[i], &second[i]));
            }
        }
    }

    #[test]
    fn restore_copies_snapshot_contents_back_into_live_elements() {
        let mut folder: Folder<i32> = Folder::new(NAMES);
        folder.add(1);
        folder.add(2);
        let snapshot = folder.next_snapshot(&[]);
        *folder.get_mut(0).unwrap() = 100;
        *folder.get_mut(1).unwrap() = 200;
        folder.restore(&snapshot);
        assert_eq!(folder.get(0).copied(), Some(1));
        assert_eq!(folder.get(1).copied(), Some(2));
    }
}
