use std::cell::RefCell;
use std::rc::Rc;

use kontext_contracts::ImageRecord;

use crate::gallery::GalleryStore;
use crate::layout::LayoutState;

pub type PlaceholderId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Preview {
        data_url: String,
        file_name: String,
    },
}

/// Whatever draws the gallery. The store stays the source of truth; the surface only mirrors it.
pub trait RenderSurface {
    fn insert_placeholders(&self, count: usize) -> Vec<PlaceholderId>;

    fn remove_placeholder(&self, id: PlaceholderId);

    /// New cards go in front, hidden until [`RenderSurface::reveal_card`].
    fn prepend_cards(&self, records: &[ImageRecord]);

    /// Rebuilds every card from scratch, all visible.
    fn replace_cards(&self, records: &[ImageRecord]);

    fn reveal_card(&self, id: &str) -> bool;

    fn remove_card(&self, id: &str) -> bool;

    /// Re-syncs store-derived chrome (empty state, selection marks).
    fn refresh(&self, gallery: &GalleryStore);

    fn apply_layout(&self, layout: &LayoutState, columns_changed: bool);

    fn set_bulk_actions_visible(&self, visible: bool);

    fn set_generating(&self, busy: bool);

    fn set_enhancing(&self, busy: bool);

    fn set_upload_state(&self, state: UploadState);
}

/// Placeholders inserted for one request; each is removed exactly once, at the latest on drop.
pub struct PlaceholderBatch {
    surface: Rc<dyn RenderSurface>,
    ids: Vec<PlaceholderId>,
}

impl PlaceholderBatch {
    pub fn insert(surface: Rc<dyn RenderSurface>, count: usize) -> Self {
        let ids = surface.insert_placeholders(count);
        Self { surface, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(mut self) -> usize {
        self.remove_all()
    }

    fn remove_all(&mut self) -> usize {
        let removed = self.ids.len();
        for id in self.ids.drain(..) {
            self.surface.remove_placeholder(id);
        }
        removed
    }
}

impl Drop for PlaceholderBatch {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCard {
    pub record: ImageRecord,
    pub visible: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSlot {
    Placeholder(PlaceholderId),
    Card(SurfaceCard),
}

#[derive(Debug, Default)]
struct MemorySurfaceState {
    slots: Vec<SurfaceSlot>,
    next_placeholder: PlaceholderId,
    placeholders_inserted: usize,
    placeholders_removed: usize,
    refreshes: usize,
    layout: Option<LayoutState>,
    layout_applications: usize,
    column_changes: usize,
    empty_state_visible: bool,
    bulk_actions_visible: bool,
    generating: bool,
    enhancing: bool,
    upload_state: UploadState,
}

/// In-memory surface; the headless CLI renders from it and tests assert against it.
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: RefCell<MemorySurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        let surface = Self::default();
        surface.state.borrow_mut().empty_state_visible = true;
        surface
    }

    pub fn slots(&self) -> Vec<SurfaceSlot> {
        self.state.borrow().slots.clone()
    }

    pub fn card_ids(&self) -> Vec<String> {
        self.cards().into_iter().map(|card| card.record.id).collect()
    }

    pub fn visible_card_ids(&self) -> Vec<String> {
        self.cards()
            .into_iter()
            .filter(|card| card.visible)
            .map(|card| card.record.id)
            .collect()
    }

    pub fn cards(&self) -> Vec<SurfaceCard> {
        self.state
            .borrow()
            .slots
            .iter()
            .filter_map(|slot| match slot {
                SurfaceSlot::Card(card) => Some(card.clone()),
                SurfaceSlot::Placeholder(_) => None,
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.state
            .borrow()
            .slots
            .iter()
            .filter(|slot| matches!(slot, SurfaceSlot::Placeholder(_)))
            .count()
    }

    /// `(inserted, removed)` over the surface's lifetime.
    pub fn placeholder_totals(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.placeholders_inserted, state.placeholders_removed)
    }

    pub fn refresh_count(&self) -> usize {
        self.state.borrow().refreshes
    }

    pub fn layout(&self) -> Option<LayoutState> {
        self.state.borrow().layout
    }

    pub fn layout_applications(&self) -> usize {
        self.state.borrow().layout_applications
    }

    pub fn column_changes(&self) -> usize {
        self.state.borrow().column_changes
    }

    pub fn empty_state_visible(&self) -> bool {
        self.state.borrow().empty_state_visible
    }

    pub fn bulk_actions_visible(&self) -> bool {
        self.state.borrow().bulk_actions_visible
    }

    pub fn generating(&self) -> bool {
        self.state.borrow().generating
    }

    pub fn enhancing(&self) -> bool {
        self.state.borrow().enhancing
    }

    pub fn upload_state(&self) -> UploadState {
        self.state.borrow().upload_state.clone()
    }

    fn card_mut<'a>(slots: &'a mut [SurfaceSlot], id: &str) -> Option<&'a mut SurfaceCard> {
        slots.iter_mut().find_map(|slot| match slot {
            SurfaceSlot::Card(card) if card.record.id == id => Some(card),
            _ => None,
        })
    }
}

impl RenderSurface for MemorySurface {
    fn insert_placeholders(&self, count: usize) -> Vec<PlaceholderId> {
        let mut state = self.state.borrow_mut();
        let ids: Vec<PlaceholderId> = (0..count as PlaceholderId)
            .map(|offset| state.next_placeholder + offset)
            .collect();
        state.next_placeholder += count as PlaceholderId;
        state.placeholders_inserted += count;
        let mut slots: Vec<SurfaceSlot> = ids.iter().copied().map(SurfaceSlot::Placeholder).collect();
        slots.append(&mut state.slots);
        state.slots = slots;
        if count > 0 {
            state.empty_state_visible = false;
        }
        ids
    }

    fn remove_placeholder(&self, id: PlaceholderId) {
        let mut state = self.state.borrow_mut();
        let before = state.slots.len();
        state
            .slots
            .retain(|slot| !matches!(slot, SurfaceSlot::Placeholder(existing) if *existing == id));
        if state.slots.len() < before {
            state.placeholders_removed += 1;
        }
    }

    fn prepend_cards(&self, records: &[ImageRecord]) {
        let mut state = self.state.borrow_mut();
        let insert_at = state
            .slots
            .iter()
            .take_while(|slot| matches!(slot, SurfaceSlot::Placeholder(_)))
            .count();
        for (offset, record) in records.iter().enumerate() {
            state.slots.insert(
                insert_at + offset,
                SurfaceSlot::Card(SurfaceCard {
                    record: record.clone(),
                    visible: false,
                    selected: false,
                }),
            );
        }
        if !records.is_empty() {
            state.empty_state_visible = false;
        }
    }

    fn replace_cards(&self, records: &[ImageRecord]) {
        let mut state = self.state.borrow_mut();
        state
            .slots
            .retain(|slot| matches!(slot, SurfaceSlot::Placeholder(_)));
        state.slots.extend(records.iter().map(|record| {
            SurfaceSlot::Card(SurfaceCard {
                record: record.clone(),
                visible: true,
                selected: false,
            })
        }));
    }

    fn reveal_card(&self, id: &str) -> bool {
        let mut state = self.state.borrow_mut();
        match Self::card_mut(&mut state.slots, id) {
            Some(card) => {
                card.visible = true;
                true
            }
            None => false,
        }
    }

    fn remove_card(&self, id: &str) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.slots.len();
        state
            .slots
            .retain(|slot| !matches!(slot, SurfaceSlot::Card(card) if card.record.id == id));
        state.slots.len() < before
    }

    fn refresh(&self, gallery: &GalleryStore) {
        let mut state = self.state.borrow_mut();
        state.refreshes += 1;
        let has_placeholders = state
            .slots
            .iter()
            .any(|slot| matches!(slot, SurfaceSlot::Placeholder(_)));
        state.empty_state_visible = gallery.is_empty() && !has_placeholders;
        for slot in state.slots.iter_mut() {
            if let SurfaceSlot::Card(card) = slot {
                card.selected = gallery.is_selected(&card.record.id);
            }
        }
        state.bulk_actions_visible = gallery.has_selection();
    }

    fn apply_layout(&self, layout: &LayoutState, columns_changed: bool) {
        let mut state = self.state.borrow_mut();
        state.layout = Some(*layout);
        state.layout_applications += 1;
        if columns_changed {
            state.column_changes += 1;
        }
    }

    fn set_bulk_actions_visible(&self, visible: bool) {
        self.state.borrow_mut().bulk_actions_visible = visible;
    }

    fn set_generating(&self, busy: bool) {
        self.state.borrow_mut().generating = busy;
    }

    fn set_enhancing(&self, busy: bool) {
        self.state.borrow_mut().enhancing = busy;
    }

    fn set_upload_state(&self, state: UploadState) {
        self.state.borrow_mut().upload_state = state;
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
            prompt: String::new(),
            model: String::new(),
            timestamp: 0,
        }
    }

    #[test]
    fn placeholder_batch_removes_each_placeholder_once() {
        let memory = Rc::new(MemorySurface::new());
        let surface: Rc<dyn RenderSurface> = memory.clone();

        let batch = PlaceholderBatch::insert(Rc::clone(&surface), 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(memory.placeholder_count(), 3);
        assert_eq!(batch.clear(), 3);
        assert_eq!(memory.placeholder_count(), 0);

        {
            let _dropped = PlaceholderBatch::insert(Rc::clone(&surface), 2);
            assert_eq!(memory.placeholder_count(), 2);
        }
        assert_eq!(memory.placeholder_count(), 0);
        assert_eq!(memory.placeholder_totals(), (5, 5));
    }

    #[test]
    fn prepended_cards_start_hidden_behind_placeholders() {
        let memory = MemorySurface::new();
        memory.replace_cards(&[record("old")]);
        let ids = memory.insert_placeholders(1);
        memory.prepend_cards(&[record("new")]);

        assert!(matches!(memory.slots()[0], SurfaceSlot::Placeholder(_)));
        assert_eq!(memory.card_ids(), vec!["new", "old"]);
        assert_eq!(memory.visible_card_ids(), vec!["old"]);

        memory.remove_placeholder(ids[0]);
        assert!(memory.reveal_card("new"));
        assert!(!memory.reveal_card("ghost"));
        assert_eq!(memory.visible_card_ids(), vec!["new", "old"]);
    }

    #[test]
    fn refresh_mirrors_store_empty_state_and_selection() {
        let memory = MemorySurface::new();
        let mut store = GalleryStore::new();
        memory.refresh(&store);
        assert!(memory.empty_state_visible());

        store.hydrate(vec![record("a"), record("b")]);
        store.select("b");
        memory.replace_cards(&store.snapshot());
        memory.refresh(&store);
        assert!(!memory.empty_state_visible());
        assert!(memory.bulk_actions_visible());
        assert!(memory.cards()[1].selected);
        assert_eq!(memory.refresh_count(), 2);

        assert!(memory.remove_card("a"));
        assert!(!memory.remove_card("a"));
    }
}
