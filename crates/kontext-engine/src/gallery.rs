use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use kontext_contracts::ImageRecord;

pub type SharedGallery = Rc<RefCell<GalleryStore>>;

/// Ordered, id-unique record store plus the multi-select set.
///
/// Order is newest first. Every selected id is present in the store.
#[derive(Debug, Default)]
pub struct GalleryStore {
    records: IndexMap<String, ImageRecord>,
    selection: BTreeSet<String>,
}

impl GalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedGallery {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Replaces the whole store; duplicates keep their first occurrence.
    pub fn hydrate(&mut self, records: Vec<ImageRecord>) -> usize {
        self.records.clear();
        self.selection.clear();
        for record in records {
            self.records.entry(record.id.clone()).or_insert(record);
        }
        self.records.len()
    }

    /// Inserts `records` ahead of everything already stored, keeping their relative order.
    ///
    /// Ids already present (or repeated in the batch) are skipped. Returns what was inserted.
    pub fn prepend(&mut self, records: Vec<ImageRecord>) -> Vec<ImageRecord> {
        let mut seen = HashSet::new();
        let fresh: Vec<ImageRecord> = records
            .into_iter()
            .filter(|record| {
                !self.records.contains_key(&record.id) && seen.insert(record.id.clone())
            })
            .collect();
        for (index, record) in fresh.iter().enumerate() {
            self.records
                .shift_insert(index, record.id.clone(), record.clone());
        }
        fresh
    }

    pub fn remove(&mut self, id: &str) -> Option<ImageRecord> {
        self.selection.remove(id);
        self.records.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.records.values().cloned().collect()
    }

    pub fn select(&mut self, id: &str) -> bool {
        if !self.records.contains_key(id) {
            return false;
        }
        self.selection.insert(id.to_string());
        true
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selection.remove(id)
    }

    /// Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selection.remove(id) {
            return false;
        }
        self.select(id)
    }

    pub fn select_all(&mut self) -> usize {
        self.selection = self.records.keys().cloned().collect();
        self.selection.len()
    }

    pub fn deselect_all(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    /// Selected ids in gallery order.
    pub fn selected_ids(&self) -> Vec<String> {
        self.records
            .keys()
            .filter(|id| self.selection.contains(*id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            url: format!("https://blob/{id}.png"),
            thumbnail_url: None,
            original_url: None,
            prompt: format!("prompt {id}"),
            model: "kontext".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn hydrate_replaces_and_dedupes() {
        let mut store = GalleryStore::new();
        store.hydrate(vec![record("old")]);
        store.select("old");

        let count = store.hydrate(vec![record("a"), record("b"), record("a")]);
        assert_eq!(count, 2);
        assert_eq!(store.ids(), vec!["a", "b"]);
        assert!(!store.has_selection());
    }

    #[test]
    fn prepend_keeps_batch_order_ahead_of_existing() {
        let mut store = GalleryStore::new();
        store.hydrate(vec![record("a"), record("b")]);

        let inserted = store.prepend(vec![record("x"), record("y"), record("a"), record("x")]);
        let inserted_ids: Vec<&str> = inserted.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(inserted_ids, vec!["x", "y"]);
        assert_eq!(store.ids(), vec!["x", "y", "a", "b"]);
    }

    #[test]
    fn remove_drops_selection_and_tolerates_missing() {
        let mut store = GalleryStore::new();
        store.hydrate(vec![record("a"), record("b")]);
        store.select("a");

        assert!(store.remove("a").is_some());
        assert!(!store.is_selected("a"));
        assert!(store.remove("a").is_none());
        assert_eq!(store.ids(), vec!["b"]);
    }

    #[test]
    fn selection_only_tracks_present_records() {
        let mut store = GalleryStore::new();
        store.hydrate(vec![record("a"), record("b"), record("c")]);

        assert!(!store.select("ghost"));
        assert!(store.toggle("c"));
        assert!(store.select("a"));
        assert_eq!(store.selected_ids(), vec!["a", "c"]);
        assert!(!store.toggle("c"));

        assert_eq!(store.select_all(), 3);
        store.deselect_all();
        assert_eq!(store.selection_len(), 0);
    }
}
