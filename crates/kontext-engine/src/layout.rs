//! Responsive column layout, zoom and view mode.
//!
//! Recomputes are deferred through the [`Scheduler`]; card reveals run as local tasks that
//! wait for the card's asset to settle.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use kontext_contracts::events::{EventPayload, EventWriter};
use kontext_contracts::ImageRecord;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::assets::{AssetLoader, AssetStatus};
use crate::gallery::SharedGallery;
use crate::scheduler::{Scheduler, TimerKey};
use crate::surface::RenderSurface;

pub const BASE_COLUMN_WIDTH: f64 = 350.0;
pub const MIN_ZOOM: u32 = 25;
pub const MAX_ZOOM: u32 = 300;
pub const DEFAULT_ZOOM: u32 = 100;
pub const DEFAULT_CONTAINER_WIDTH: u32 = 1200;

pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);
pub const ZOOM_SETTLE: Duration = Duration::from_millis(50);
pub const ASSET_SETTLE: Duration = Duration::from_millis(10);
pub const REVEAL_STAGGER: Duration = Duration::from_millis(100);

const SINGLE_COLUMN_GAP_PX: u32 = 16;
const MULTI_COLUMN_GAP_PX: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::List => "list",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "grid" => Some(Self::Grid),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Grid => Self::List,
            Self::List => Self::Grid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutState {
    pub columns: u32,
    pub zoom: u32,
    pub view: ViewMode,
    pub gap_px: u32,
}

pub fn clamp_zoom(zoom: u32) -> u32 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

pub fn column_gap(columns: u32) -> u32 {
    if columns <= 1 {
        SINGLE_COLUMN_GAP_PX
    } else {
        MULTI_COLUMN_GAP_PX
    }
}

/// Grid columns for a container `width` at `zoom` percent, between 1 and 4.
pub fn column_count(width: u32, zoom: u32) -> u32 {
    let factor = f64::from(clamp_zoom(zoom)) / 100.0;
    let width = f64::from(width);
    let by_unit = (width / (BASE_COLUMN_WIDTH * factor)).floor().max(1.0) as u32;
    let cap = if width <= 600.0 * factor {
        1
    } else if width <= 900.0 * factor {
        2
    } else if width <= 1200.0 * factor {
        3
    } else {
        4
    };
    by_unit.min(cap)
}

/// Starting geometry for a [`LayoutEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub zoom: u32,
    pub view: ViewMode,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_CONTAINER_WIDTH,
            zoom: DEFAULT_ZOOM,
            view: ViewMode::Grid,
        }
    }
}

#[derive(Debug)]
struct LayoutInner {
    width: u32,
    zoom: u32,
    view: ViewMode,
    columns: u32,
}

pub struct LayoutEngine {
    surface: Rc<dyn RenderSurface>,
    scheduler: Rc<Scheduler>,
    gallery: SharedGallery,
    assets: Rc<dyn AssetLoader>,
    events: EventWriter,
    inner: RefCell<LayoutInner>,
    reveals: RefCell<Vec<JoinHandle<()>>>,
}

impl LayoutEngine {
    pub fn new(
        surface: Rc<dyn RenderSurface>,
        scheduler: Rc<Scheduler>,
        gallery: SharedGallery,
        assets: Rc<dyn AssetLoader>,
        events: EventWriter,
        viewport: Viewport,
    ) -> Self {
        let Viewport { width, zoom, view } = viewport;
        let zoom = clamp_zoom(zoom);
        let columns = match view {
            ViewMode::Grid => column_count(width, zoom),
            ViewMode::List => 1,
        };
        Self {
            surface,
            scheduler,
            gallery,
            assets,
            events,
            inner: RefCell::new(LayoutInner {
                width,
                zoom,
                view,
                columns,
            }),
            reveals: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> LayoutState {
        let inner = self.inner.borrow();
        LayoutState {
            columns: inner.columns,
            zoom: inner.zoom,
            view: inner.view,
            gap_px: column_gap(inner.columns),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.borrow().width
    }

    /// Container resized; the recompute is debounced.
    pub fn on_resize(&self, width: u32) {
        self.inner.borrow_mut().width = width.max(1);
        self.scheduler
            .schedule(TimerKey::LayoutResize, RESIZE_DEBOUNCE);
    }

    /// Stores the clamped zoom; in list view it only takes effect on the way back to grid.
    pub fn set_zoom(&self, zoom: u32) -> u32 {
        let zoom = clamp_zoom(zoom);
        let view = {
            let mut inner = self.inner.borrow_mut();
            inner.zoom = zoom;
            inner.view
        };
        if view == ViewMode::Grid {
            self.scheduler.schedule(TimerKey::ZoomSettle, ZOOM_SETTLE);
        }
        zoom
    }

    pub fn toggle_view(&self) -> ViewMode {
        let next = self.inner.borrow().view.toggled();
        self.set_view(next);
        next
    }

    pub fn set_view(&self, view: ViewMode) -> bool {
        if self.inner.borrow().view == view {
            return false;
        }
        self.inner.borrow_mut().view = view;
        match view {
            ViewMode::List => {
                self.scheduler.cancel(&TimerKey::ZoomSettle);
                let changed = {
                    let mut inner = self.inner.borrow_mut();
                    let changed = inner.columns != 1;
                    inner.columns = 1;
                    changed
                };
                self.surface.apply_layout(&self.state(), changed);
            }
            ViewMode::Grid => {
                self.recompute();
            }
        }
        let mut payload = EventPayload::new();
        payload.insert("view".to_string(), Value::String(view.as_str().to_string()));
        self.events.record("view_mode_changed", payload);
        true
    }

    /// Handles layout timers; returns false for keys this engine does not own.
    pub fn on_timer(&self, key: &TimerKey) -> bool {
        match key {
            TimerKey::LayoutResize | TimerKey::ZoomSettle | TimerKey::AssetSettled => {
                self.recompute();
                true
            }
            TimerKey::CardRemoval(_) => false,
        }
    }

    pub fn recompute(&self) -> LayoutState {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            if inner.view == ViewMode::List {
                None
            } else {
                let columns = column_count(inner.width, inner.zoom);
                let changed = columns != inner.columns;
                inner.columns = columns;
                Some(changed)
            }
        };
        let state = self.state();
        if let Some(changed) = changed {
            self.surface.apply_layout(&state, changed);
            if changed {
                let mut payload = EventPayload::new();
                payload.insert("columns".to_string(), Value::from(state.columns));
                payload.insert("zoom".to_string(), Value::from(state.zoom));
                self.events.record("layout_recomputed", payload);
            }
        }
        state
    }

    /// Reveals freshly prepended cards once each asset settles, staggered by index.
    ///
    /// Must run inside a `tokio::task::LocalSet`.
    pub fn add_images(&self, records: &[ImageRecord]) {
        self.track_assets(records, true);
    }

    /// Re-lays out as each already-visible card's asset settles, with no stagger.
    ///
    /// Must run inside a `tokio::task::LocalSet`.
    pub fn settle_images(&self, records: &[ImageRecord]) {
        self.track_assets(records, false);
    }

    fn track_assets(&self, records: &[ImageRecord], reveal: bool) {
        let mut reveals = self.reveals.borrow_mut();
        reveals.retain(|handle| !handle.is_finished());
        for (index, record) in records.iter().enumerate() {
            let ready = self.assets.ready(record);
            let id = record.id.clone();
            let gallery = Rc::clone(&self.gallery);
            let surface = Rc::clone(&self.surface);
            let scheduler = Rc::clone(&self.scheduler);
            let stagger = REVEAL_STAGGER * index as u32;
            reveals.push(tokio::task::spawn_local(async move {
                // A failed asset still reveals its card, with the broken image.
                let _status: AssetStatus = ready.await;
                if reveal {
                    tokio::time::sleep(stagger).await;
                }
                if !gallery.borrow().contains(&id) {
                    return;
                }
                if reveal {
                    surface.reveal_card(&id);
                }
                scheduler.schedule(TimerKey::AssetSettled, ASSET_SETTLE);
            }));
        }
    }

    pub fn pending_reveals(&self) -> usize {
        self.reveals
            .borrow()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Waits for every reveal task spawned so far, including ones spawned while waiting.
    pub async fn settle_reveals(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.reveals.borrow_mut());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }
}
