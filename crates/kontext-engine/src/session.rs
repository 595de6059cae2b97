//! One gallery session: every component wired around a shared store.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use kontext_contracts::commands::Intent;
use kontext_contracts::events::{EventPayload, EventWriter};
use kontext_contracts::methods::{MethodRegistry, MethodSelector, ASPECT_RATIOS};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::assets::AssetLoader;
use crate::commands::{BatchOutcome, DeleteOutcome, GalleryCommands};
use crate::error::{anyhow_chain_text, error_chain_text, GenerationError, ValidationError};
use crate::gallery::{GalleryStore, SharedGallery};
use crate::gateway::{RemoteGateway, UploadFile};
use crate::layout::{LayoutEngine, ViewMode, Viewport};
use crate::notify::{NoticeLevel, Notifier, DEFAULT_NOTICE_TTL};
use crate::orchestrator::{
    GenerationForm, GenerationOrchestrator, GenerationOutcome, MAX_IMAGES_PER_REQUEST,
};
use crate::scheduler::{Scheduler, TimerKey};
use crate::surface::RenderSurface;
use crate::uploads::{DropOutcome, UploadPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub viewport: Viewport,
    pub notice_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }
}

/// The collaborators a session is built around.
pub struct SessionParts {
    pub gateway: Rc<dyn RemoteGateway>,
    pub surface: Rc<dyn RenderSurface>,
    pub notifier: Rc<dyn Notifier>,
    pub assets: Rc<dyn AssetLoader>,
    pub events: EventWriter,
    pub methods: MethodRegistry,
}

/// What the host should do after a dispatched intent.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionReply {
    Done,
    Noop,
    Busy,
    Generated(GenerationOutcome),
    Dropped(DropOutcome),
    Deleted(DeleteOutcome),
    BulkDeleted(Option<BatchOutcome>),
    ShowGallery,
    ShowLayout,
    ShowMethods,
    Help,
    Quit,
    Unknown(String),
}

pub struct Session {
    gateway: Rc<dyn RemoteGateway>,
    gallery: SharedGallery,
    surface: Rc<dyn RenderSurface>,
    scheduler: Rc<Scheduler>,
    layout: Rc<LayoutEngine>,
    uploads: UploadPipeline,
    orchestrator: GenerationOrchestrator,
    commands: GalleryCommands,
    notifier: Rc<dyn Notifier>,
    events: EventWriter,
    selector: MethodSelector,
    form: RefCell<GenerationForm>,
}

impl Session {
    pub fn new(parts: SessionParts, config: SessionConfig) -> Self {
        let SessionParts {
            gateway,
            surface,
            notifier,
            assets,
            events,
            methods,
        } = parts;
        let gallery = GalleryStore::shared();
        let scheduler = Rc::new(Scheduler::new());
        let layout = Rc::new(LayoutEngine::new(
            Rc::clone(&surface),
            Rc::clone(&scheduler),
            Rc::clone(&gallery),
            assets,
            events.clone(),
            config.viewport,
        ));
        let uploads = UploadPipeline::new(
            Rc::clone(&gateway),
            Rc::clone(&gallery),
            Rc::clone(&surface),
            Rc::clone(&layout),
            Rc::clone(&notifier),
            events.clone(),
        );
        let orchestrator = GenerationOrchestrator::new(
            Rc::clone(&gateway),
            Rc::clone(&gallery),
            Rc::clone(&surface),
            Rc::clone(&layout),
            Rc::clone(&notifier),
            events.clone(),
            methods.clone(),
        );
        let commands = GalleryCommands::new(
            Rc::clone(&gateway),
            Rc::clone(&gallery),
            Rc::clone(&surface),
            Rc::clone(&scheduler),
            Rc::clone(&notifier),
            events.clone(),
        );
        let mut form = GenerationForm::default();
        if methods.get(&form.method).is_none() {
            if let Some(first) = methods.first() {
                form.method = first.name.clone();
            }
        }

        let mut payload = EventPayload::new();
        payload.insert(
            "container_width".to_string(),
            Value::from(config.viewport.width),
        );
        payload.insert("zoom".to_string(), Value::from(config.viewport.zoom));
        payload.insert(
            "view".to_string(),
            Value::String(config.viewport.view.as_str().to_string()),
        );
        payload.insert("methods".to_string(), Value::from(methods.names()));
        events.record("session_started", payload);

        Self {
            gateway,
            gallery,
            surface,
            scheduler,
            layout,
            uploads,
            orchestrator,
            commands,
            notifier,
            events,
            selector: MethodSelector::new(Some(methods)),
            form: RefCell::new(form),
        }
    }

    pub fn gallery(&self) -> &SharedGallery {
        &self.gallery
    }

    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn uploads(&self) -> &UploadPipeline {
        &self.uploads
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn commands(&self) -> &GalleryCommands {
        &self.commands
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn form(&self) -> GenerationForm {
        self.form.borrow().clone()
    }

    pub fn set_prompt(&self, prompt: &str) {
        self.form.borrow_mut().prompt = prompt.to_string();
    }

    /// Loads remote history into the store. A failure leaves the gallery empty and is only logged.
    pub async fn hydrate(&self) -> usize {
        match self.gateway.fetch_history().await {
            Ok(records) => {
                let count = self.gallery.borrow_mut().hydrate(records);
                let snapshot = self.gallery.borrow().snapshot();
                self.surface.replace_cards(&snapshot);
                self.layout.settle_images(&snapshot);
                self.surface.refresh(&self.gallery.borrow());
                self.layout.recompute();
                let mut payload = EventPayload::new();
                payload.insert("count".to_string(), Value::from(count));
                self.events.record("history_loaded", payload);
                count
            }
            Err(err) => {
                self.surface.refresh(&self.gallery.borrow());
                let mut payload = EventPayload::new();
                payload.insert(
                    "error".to_string(),
                    Value::String(error_chain_text(&err, 2000)),
                );
                self.events.record("history_load_failed", payload);
                0
            }
        }
    }

    pub async fn generate(&self) -> Result<GenerationOutcome, GenerationError> {
        let form = self.form();
        let reference = self.uploads.staged_url();
        self.orchestrator.generate(&form, reference).await
    }

    /// Rewrites the form prompt in place when the enhancement succeeds.
    pub async fn enhance_prompt(&self) -> Result<Option<String>, GenerationError> {
        let prompt = self.form.borrow().prompt.clone();
        let reference = self.uploads.staged_url();
        let enhanced = self
            .orchestrator
            .enhance_prompt(&prompt, reference.as_deref())
            .await?;
        if let Some(text) = &enhanced {
            self.set_prompt(text);
        }
        Ok(enhanced)
    }

    pub fn set_method(&self, requested: &str) -> bool {
        match self.selector.select(Some(requested)) {
            Ok(selection) => {
                if let Some(reason) = &selection.fallback_reason {
                    self.notifier.notify(NoticeLevel::Info, reason);
                }
                self.form.borrow_mut().method = selection.method.name;
                selection.fallback_reason.is_none()
            }
            Err(message) => {
                self.notifier.notify(NoticeLevel::Error, &message);
                false
            }
        }
    }

    pub fn set_count(&self, count: Option<u64>) -> bool {
        match count {
            Some(count) if (1..=u64::from(MAX_IMAGES_PER_REQUEST)).contains(&count) => {
                self.form.borrow_mut().count = count as u32;
                true
            }
            _ => {
                let err = ValidationError::InvalidCount {
                    count: count.unwrap_or(0),
                    max: MAX_IMAGES_PER_REQUEST,
                };
                self.notifier.notify(NoticeLevel::Error, &err.to_string());
                false
            }
        }
    }

    pub fn set_aspect_ratio(&self, raw: &str) -> bool {
        let raw = raw.trim();
        if !ASPECT_RATIOS.contains(&raw) {
            self.notifier.notify(
                NoticeLevel::Error,
                &format!("Unsupported aspect ratio: {raw}"),
            );
            return false;
        }
        self.form.borrow_mut().aspect_ratio = raw.to_string();
        true
    }

    pub fn merge_params(&self, params: &Map<String, Value>) {
        self.form.borrow_mut().params.extend(params.clone());
    }

    /// Fires one timer key against whichever component owns it.
    pub fn fire(&self, key: &TimerKey) {
        if self.layout.on_timer(key) {
            return;
        }
        if let TimerKey::CardRemoval(id) = key {
            self.surface.remove_card(id);
        }
    }

    /// Fires every timer that is already due; returns how many fired.
    pub fn fire_due(&self) -> usize {
        let due = self.scheduler.take_due();
        for key in &due {
            self.fire(key);
        }
        due.len()
    }

    pub fn next_timer(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Resolves when a timer was scheduled since the last wakeup.
    pub async fn timers_changed(&self) {
        self.scheduler.changed().await;
    }

    /// Drives reveals and timers until nothing is pending.
    pub async fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        loop {
            self.layout.settle_reveals().await;
            let due = self.scheduler.wait_next().await;
            if due.is_empty() && self.layout.pending_reveals() == 0 {
                return fired;
            }
            for key in &due {
                self.fire(key);
            }
            fired += due.len();
        }
    }

    /// Reads dropped paths; returns the loaded files and how many could not be read.
    fn load_files(&self, paths: &[String]) -> (Vec<UploadFile>, usize) {
        let mut files = Vec::new();
        let mut unreadable = 0;
        for path in paths {
            match UploadFile::from_path(Path::new(path)) {
                Ok(file) => files.push(file),
                Err(err) => {
                    let mut payload = EventPayload::new();
                    payload.insert("path".to_string(), Value::String(path.clone()));
                    payload.insert(
                        "error".to_string(),
                        Value::String(anyhow_chain_text(&err, 2000)),
                    );
                    self.events.record("upload_failed", payload);
                    self.notifier
                        .notify(NoticeLevel::Error, &format!("Could not read {path}"));
                    unreadable += 1;
                }
            }
        }
        (files, unreadable)
    }

    pub async fn dispatch(&self, intent: &Intent) -> SessionReply {
        match intent.action.as_str() {
            "noop" => SessionReply::Noop,
            "generate" => {
                if let Some(prompt) = &intent.prompt {
                    self.set_prompt(prompt);
                }
                match self.generate().await {
                    Ok(outcome) => SessionReply::Generated(outcome),
                    Err(GenerationError::Busy) => SessionReply::Busy,
                    Err(GenerationError::Invalid(_)) => SessionReply::Done,
                }
            }
            "set_prompt" => {
                self.set_prompt(intent.arg_str("prompt").unwrap_or_default());
                SessionReply::Done
            }
            "set_method" => {
                self.set_method(intent.arg_str("method").unwrap_or_default());
                SessionReply::Done
            }
            "set_count" => {
                self.set_count(intent.arg_u64("count"));
                SessionReply::Done
            }
            "set_aspect_ratio" => {
                self.set_aspect_ratio(intent.arg_str("aspect_ratio").unwrap_or_default());
                SessionReply::Done
            }
            "set_params" => {
                if let Some(Value::Object(params)) = intent.command_args.get("params") {
                    self.merge_params(params);
                }
                SessionReply::Done
            }
            "enhance_prompt" => match self.enhance_prompt().await {
                Err(GenerationError::Busy) => SessionReply::Busy,
                _ => SessionReply::Done,
            },
            "stage_reference" => {
                let path = intent.arg_str("path").unwrap_or_default().to_string();
                if let Some(file) = self.load_files(&[path]).0.into_iter().next() {
                    let _ = self.uploads.stage_reference(file).await;
                }
                SessionReply::Done
            }
            "drop_reference" => {
                let (files, _) = self.load_files(&intent.arg_list("paths"));
                let _ = self.uploads.stage_dropped(files).await;
                SessionReply::Done
            }
            "clear_reference" => {
                self.uploads.clear_reference();
                SessionReply::Done
            }
            "drop_files" => {
                let (files, unreadable) = self.load_files(&intent.arg_list("paths"));
                match self.uploads.drop_loaded(files, unreadable).await {
                    Ok(outcome) => SessionReply::Dropped(outcome),
                    Err(_) => SessionReply::Done,
                }
            }
            "select" => {
                self.commands.select(&intent.arg_list("ids"));
                SessionReply::Done
            }
            "deselect" => {
                self.commands.deselect(&intent.arg_list("ids"));
                SessionReply::Done
            }
            "select_all" => {
                self.commands.select_all();
                SessionReply::Done
            }
            "deselect_all" => {
                self.commands.deselect_all();
                SessionReply::Done
            }
            "delete" => {
                let id = intent.arg_str("id").unwrap_or_default();
                SessionReply::Deleted(self.commands.delete(id).await)
            }
            "delete_selected" => match self.commands.delete_selected().await {
                Ok(outcome) => SessionReply::BulkDeleted(outcome),
                Err(_) => SessionReply::Done,
            },
            "use_prompt" => {
                let id = intent.arg_str("id").unwrap_or_default();
                if let Some(prompt) = self.commands.use_prompt(id) {
                    self.set_prompt(&prompt);
                }
                SessionReply::Done
            }
            "set_zoom" => {
                match intent.arg_u64("zoom") {
                    Some(zoom) => {
                        self.layout
                            .set_zoom(u32::try_from(zoom).unwrap_or(u32::MAX));
                    }
                    None => self
                        .notifier
                        .notify(NoticeLevel::Error, "Zoom must be a percentage"),
                }
                SessionReply::Done
            }
            "resize" => {
                match intent.arg_u64("width") {
                    Some(width) => self
                        .layout
                        .on_resize(u32::try_from(width).unwrap_or(u32::MAX)),
                    None => self
                        .notifier
                        .notify(NoticeLevel::Error, "Width must be a number of pixels"),
                }
                SessionReply::Done
            }
            "set_view" => {
                let raw = intent.arg_str("mode").unwrap_or_default();
                if raw.trim().is_empty() {
                    self.layout.toggle_view();
                } else if let Some(view) = ViewMode::parse(raw) {
                    self.layout.set_view(view);
                } else {
                    self.notifier
                        .notify(NoticeLevel::Error, &format!("Unknown view mode: {raw}"));
                }
                SessionReply::Done
            }
            "list" => SessionReply::ShowGallery,
            "layout" => SessionReply::ShowLayout,
            "list_methods" => SessionReply::ShowMethods,
            "help" => SessionReply::Help,
            "quit" => SessionReply::Quit,
            _ => SessionReply::Unknown(intent.raw.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use kontext_contracts::commands::parse_intent;
    use kontext_contracts::events::{event_types, read_events};
    use tokio::task::LocalSet;

    use super::*;
    use crate::assets::ImmediateAssets;
    use crate::notify::NotificationCenter;
    use crate::surface::MemorySurface;
    use crate::test_support::{record, temp_events, FakeGateway};

    struct Rig {
        gateway: Rc<FakeGateway>,
        memory: Rc<MemorySurface>,
        center: Rc<NotificationCenter>,
        session: Session,
    }

    fn rig(gateway: FakeGateway, events: EventWriter) -> Rig {
        let gateway = Rc::new(gateway);
        let memory = Rc::new(MemorySurface::new());
        let center = Rc::new(NotificationCenter::default());
        let session = Session::new(
            SessionParts {
                gateway: gateway.clone(),
                surface: memory.clone(),
                notifier: center.clone(),
                assets: Rc::new(ImmediateAssets),
                events,
                methods: MethodRegistry::default(),
            },
            SessionConfig::default(),
        );
        Rig {
            gateway,
            memory,
            center,
            session,
        }
    }

    async fn run(rig: &Rig, line: &str) -> SessionReply {
        rig.session.dispatch(&parse_intent(line)).await
    }

    #[tokio::test(start_paused = true)]
    async fn red_fox_flow_reveals_two_cards_at_the_front() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new()
            .with_history(vec![record("h1"), record("h2")])
            .with_delay(Duration::from_millis(200));
        gateway.queue_generation(Some(vec![record("fox1"), record("fox2")]));
        let rig = rig(gateway, events);

        LocalSet::new()
            .run_until(async {
                assert_eq!(rig.session.hydrate().await, 2);
                run(&rig, "/count 2").await;

                let generate = run(&rig, "a red fox");
                let observe = async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    assert_eq!(rig.memory.placeholder_count(), 2);
                    assert!(!rig.memory.empty_state_visible());
                };
                let (reply, ()) = futures::join!(generate, observe);
                assert!(matches!(
                    reply,
                    SessionReply::Generated(GenerationOutcome::Generated(ref rows)) if rows.len() == 2
                ));

                assert_eq!(
                    rig.session.gallery().borrow().ids(),
                    vec!["fox1", "fox2", "h1", "h2"]
                );
                assert_eq!(rig.memory.placeholder_count(), 0);
                rig.session.run_until_idle().await;
                assert_eq!(
                    rig.memory.visible_card_ids(),
                    vec!["fox1", "fox2", "h1", "h2"]
                );
            })
            .await;

        let success = rig
            .center
            .notices()
            .into_iter()
            .find(|notice| notice.level == NoticeLevel::Success)
            .map(|notice| notice.message)
            .unwrap_or_default();
        assert!(success.contains('2'));
        assert_eq!(rig.gateway.generation_requests.borrow()[0].prompt, "a red fox");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn hydrate_settles_without_stagger() -> anyhow::Result<()> {
        let mut idle = Vec::new();
        for size in [5, 50] {
            let (_temp, events) = temp_events()?;
            let history = (0..size).map(|n| record(&format!("h{n}"))).collect();
            let rig = rig(FakeGateway::new().with_history(history), events);
            let elapsed = LocalSet::new()
                .run_until(async {
                    assert_eq!(rig.session.hydrate().await, size);
                    assert_eq!(rig.memory.visible_card_ids().len(), size);
                    let started = Instant::now();
                    rig.session.run_until_idle().await;
                    started.elapsed()
                })
                .await;
            idle.push(elapsed);
        }
        assert_eq!(idle[0], idle[1]);
        assert!(idle[1] < crate::layout::REVEAL_STAGGER);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn drop_mixed_files_from_disk() -> anyhow::Result<()> {
        let (temp, events) = temp_events()?;
        let gateway = FakeGateway::new().with_history(Vec::new());
        gateway.fail_upload("b.png");
        let rig = rig(gateway, events);
        for name in ["a.png", "b.png", "c.txt"] {
            std::fs::write(temp.path().join(name), b"bytes")?;
        }
        let line = format!(
            "/drop {} {} {} {}",
            temp.path().join("a.png").display(),
            temp.path().join("b.png").display(),
            temp.path().join("c.txt").display(),
            temp.path().join("gone.png").display()
        );

        LocalSet::new()
            .run_until(async {
                rig.session.hydrate().await;
                let reply = run(&rig, &line).await;
                assert_eq!(
                    reply,
                    SessionReply::Dropped(DropOutcome {
                        added: 1,
                        failed: 1,
                        filtered: 1,
                        unreadable: 1
                    })
                );
                rig.session.run_until_idle().await;
            })
            .await;

        assert_eq!(rig.session.gallery().borrow().len(), 1);
        let messages = rig.center.messages();
        assert!(messages.contains(&"Successfully added 1 image(s) to gallery".to_string()));
        let unreadable = format!("Could not read {}", temp.path().join("gone.png").display());
        assert!(messages.contains(&unreadable));
        assert!(messages.contains(&"Failed to process 3 image(s)".to_string()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_delete_five_with_two_failures() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let ids = ["a", "b", "c", "d", "e", "f", "g"];
        let gateway = FakeGateway::new()
            .with_history(ids.iter().map(|id| record(id)).collect())
            .with_delay(Duration::from_millis(30));
        gateway.fail_delete("b");
        gateway.fail_delete("d");
        let rig = rig(gateway, events);

        LocalSet::new()
            .run_until(async {
                rig.session.hydrate().await;
                rig.session.run_until_idle().await;
                run(&rig, "/select a b c d e").await;
                let refreshes = rig.memory.refresh_count();

                let reply = run(&rig, "/delete_selected").await;
                assert_eq!(
                    reply,
                    SessionReply::BulkDeleted(Some(BatchOutcome {
                        requested: 5,
                        succeeded: 3,
                        failed: 2
                    }))
                );
                assert_eq!(rig.memory.refresh_count() - refreshes, 1);
                assert_eq!(rig.session.gallery().borrow().len(), ids.len() - 3);
                assert_eq!(rig.session.gallery().borrow().selected_ids(), vec!["b", "d"]);

                rig.session.run_until_idle().await;
                assert_eq!(rig.memory.card_ids(), vec!["b", "d", "f", "g"]);
            })
            .await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn timers_tolerate_records_removed_underneath() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new().with_history(vec![record("a"), record("b")]);
        let rig = rig(gateway, events);

        LocalSet::new()
            .run_until(async {
                rig.session.hydrate().await;
                run(&rig, "/delete a").await;
                run(&rig, "/delete a").await;
                rig.session.fire(&TimerKey::CardRemoval("a".to_string()));
                rig.session.run_until_idle().await;
            })
            .await;

        assert_eq!(rig.memory.card_ids(), vec!["b"]);
        assert_eq!(rig.session.gallery().borrow().ids(), vec!["b"]);
        Ok(())
    }

    #[tokio::test]
    async fn history_failure_is_logged_not_notified() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new(), events);

        assert_eq!(rig.session.hydrate().await, 0);
        assert!(rig.center.messages().is_empty());
        assert!(rig.memory.empty_state_visible());
        let types = event_types(&read_events(rig.session.events().path())?);
        assert_eq!(types, vec!["session_started", "history_load_failed"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn layout_commands_debounce_and_toggle() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new().with_history(Vec::new()), events);

        run(&rig, "/width 500").await;
        run(&rig, "/width 1000px").await;
        run(&rig, "/zoom 900%").await;
        assert_eq!(rig.session.layout().state().zoom, 300);
        assert_eq!(rig.session.run_until_idle().await, 2);
        assert_eq!(rig.session.layout().state().columns, 1);

        run(&rig, "/zoom 100").await;
        rig.session.run_until_idle().await;
        assert_eq!(rig.session.layout().state().columns, 2);

        run(&rig, "/view").await;
        assert_eq!(rig.session.layout().state().view, ViewMode::List);
        run(&rig, "/view grid").await;
        assert_eq!(rig.session.layout().state().view, ViewMode::Grid);
        run(&rig, "/view mosaic").await;
        assert_eq!(
            rig.center.last().map(|notice| notice.message),
            Some("Unknown view mode: mosaic".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn form_commands_update_the_next_request() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new();
        gateway.queue_generation(Some(vec![record("x")]));
        *gateway.enhanced.borrow_mut() = Some("an ornate brass owl".to_string());
        let rig = rig(gateway, events);

        run(&rig, "/method imagen9").await;
        assert_eq!(rig.session.form().method, "kontext");
        assert_eq!(
            rig.center.last().map(|notice| notice.message),
            Some("Requested method 'imagen9' is not available.".to_string())
        );

        run(&rig, "/method kontext-max-text-to-image").await;
        run(&rig, "/aspect 16:9").await;
        run(&rig, "/aspect 5:1").await;
        run(&rig, "/count 9").await;
        run(&rig, "/param kontext_max_output_format=PNG kontext_max_sync_mode=yes").await;
        run(&rig, "/prompt brass owl").await;
        run(&rig, "/enhance").await;
        assert_eq!(rig.session.form().prompt, "an ornate brass owl");

        LocalSet::new()
            .run_until(async {
                assert!(matches!(run(&rig, "/generate").await, SessionReply::Generated(_)));
            })
            .await;

        let sent = rig.gateway.generation_requests.borrow()[0].clone();
        assert_eq!(sent.prompt, "an ornate brass owl");
        assert_eq!(sent.aspect_ratio, "16:9");
        assert_eq!(sent.count, 1);
        assert_eq!(sent.params["kontext_max_output_format"], "png");
        assert_eq!(sent.params["kontext_max_sync_mode"], true);
        assert_eq!(sent.params["kontext_max_guidance_scale"], 3.5);
        Ok(())
    }

    #[tokio::test]
    async fn use_prompt_and_unknown_commands() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new().with_history(vec![record("a")]), events);

        LocalSet::new()
            .run_until(rig.session.hydrate())
            .await;
        assert_eq!(run(&rig, "/use a").await, SessionReply::Done);
        assert_eq!(rig.session.form().prompt, "prompt for a");
        assert_eq!(run(&rig, "/list").await, SessionReply::ShowGallery);
        assert_eq!(run(&rig, "   ").await, SessionReply::Noop);
        assert_eq!(
            run(&rig, "/teleport now").await,
            SessionReply::Unknown("/teleport now".to_string())
        );
        assert_eq!(run(&rig, "/quit").await, SessionReply::Quit);
        Ok(())
    }
}
