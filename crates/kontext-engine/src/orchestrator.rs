//! Generation and prompt-enhancement requests.
//!
//! One generation and one enhancement may be in flight at a time; a second request of the
//! same kind is rejected with [`GenerationError::Busy`], never queued.

use std::cell::Cell;
use std::rc::Rc;

use kontext_contracts::events::{EventPayload, EventWriter};
use kontext_contracts::methods::{resolve_params, MethodRegistry, DEFAULT_METHOD};
use kontext_contracts::prompts::{normalize_prompt, prompt_diff};
use kontext_contracts::ImageRecord;
use serde_json::{Map, Value};

use crate::error::{error_chain_text, GenerationError, ValidationError};
use crate::gallery::SharedGallery;
use crate::gateway::{GenerationRequest, RemoteGateway};
use crate::layout::LayoutEngine;
use crate::notify::{NoticeLevel, Notifier};
use crate::surface::{PlaceholderBatch, RenderSurface};

pub const MAX_IMAGES_PER_REQUEST: u32 = 4;
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

impl GenerationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// The generation form as the user last left it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationForm {
    pub prompt: String,
    pub count: u32,
    pub aspect_ratio: String,
    pub method: String,
    pub params: Map<String, Value>,
}

impl Default for GenerationForm {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            count: 1,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            method: DEFAULT_METHOD.to_string(),
            params: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Generated(Vec<ImageRecord>),
    Empty,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum BusyControl {
    Generate,
    Enhance,
}

/// Holds a busy flag for the duration of a request and clears it on every exit path.
struct BusyGuard<'a> {
    flag: &'a Cell<bool>,
    surface: &'a dyn RenderSurface,
    control: BusyControl,
}

impl<'a> BusyGuard<'a> {
    fn acquire(
        flag: &'a Cell<bool>,
        surface: &'a dyn RenderSurface,
        control: BusyControl,
    ) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        let guard = Self {
            flag,
            surface,
            control,
        };
        guard.show(true);
        Some(guard)
    }

    fn show(&self, busy: bool) {
        match self.control {
            BusyControl::Generate => self.surface.set_generating(busy),
            BusyControl::Enhance => self.surface.set_enhancing(busy),
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
        self.show(false);
    }
}

pub struct GenerationOrchestrator {
    gateway: Rc<dyn RemoteGateway>,
    gallery: SharedGallery,
    surface: Rc<dyn RenderSurface>,
    layout: Rc<LayoutEngine>,
    notifier: Rc<dyn Notifier>,
    events: EventWriter,
    methods: MethodRegistry,
    phase: Cell<GenerationPhase>,
    generating: Cell<bool>,
    enhancing: Cell<bool>,
}

impl GenerationOrchestrator {
    pub fn new(
        gateway: Rc<dyn RemoteGateway>,
        gallery: SharedGallery,
        surface: Rc<dyn RenderSurface>,
        layout: Rc<LayoutEngine>,
        notifier: Rc<dyn Notifier>,
        events: EventWriter,
        methods: MethodRegistry,
    ) -> Self {
        Self {
            gateway,
            gallery,
            surface,
            layout,
            notifier,
            events,
            methods,
            phase: Cell::new(GenerationPhase::Idle),
            generating: Cell::new(false),
            enhancing: Cell::new(false),
        }
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase.get()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.get()
    }

    pub fn is_enhancing(&self) -> bool {
        self.enhancing.get()
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub async fn generate(
        &self,
        form: &GenerationForm,
        reference_url: Option<String>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let Some(_busy) = BusyGuard::acquire(
            &self.generating,
            self.surface.as_ref(),
            BusyControl::Generate,
        ) else {
            self.log_rejected(&form.method, "busy");
            return Err(GenerationError::Busy);
        };

        self.phase.set(GenerationPhase::Validating);
        let request = match self.validate(form, reference_url) {
            Ok(request) => request,
            Err(err) => {
                self.phase.set(GenerationPhase::Idle);
                self.notifier.notify(NoticeLevel::Error, &err.to_string());
                self.log_rejected(&form.method, &err.to_string());
                return Err(err.into());
            }
        };

        self.phase.set(GenerationPhase::Submitting);
        let placeholders = PlaceholderBatch::insert(Rc::clone(&self.surface), request.count as usize);
        self.log_submitted(&request);
        let result = self.gateway.submit_generation(&request).await;
        placeholders.clear();

        let outcome = match result {
            Ok(records) if !records.is_empty() => {
                let returned = records.len();
                let inserted = self.gallery.borrow_mut().prepend(records);
                self.surface.prepend_cards(&inserted);
                self.layout.add_images(&inserted);
                self.refresh();
                self.phase.set(GenerationPhase::Succeeded);
                self.log_completed(&request, returned, inserted.len());
                self.notifier.notify(
                    NoticeLevel::Success,
                    &format!("Generated {returned} image(s) successfully!"),
                );
                GenerationOutcome::Generated(inserted)
            }
            Ok(_) => {
                self.refresh();
                self.phase.set(GenerationPhase::Succeeded);
                self.log_completed(&request, 0, 0);
                self.notifier
                    .notify(NoticeLevel::Info, "No images were generated");
                GenerationOutcome::Empty
            }
            Err(err) => {
                self.refresh();
                self.phase.set(GenerationPhase::Failed);
                let mut payload = EventPayload::new();
                payload.insert("method".to_string(), Value::String(request.method.clone()));
                payload.insert(
                    "error".to_string(),
                    Value::String(error_chain_text(&err, 2000)),
                );
                payload.insert("retryable".to_string(), Value::Bool(err.is_retryable()));
                self.events.record("generation_failed", payload);
                self.notifier.notify(
                    NoticeLevel::Error,
                    "Failed to generate images. Please try again.",
                );
                GenerationOutcome::Failed
            }
        };
        self.phase.set(GenerationPhase::Idle);
        Ok(outcome)
    }

    fn validate(
        &self,
        form: &GenerationForm,
        reference_url: Option<String>,
    ) -> Result<GenerationRequest, ValidationError> {
        let prompt = normalize_prompt(&form.prompt).ok_or(ValidationError::EmptyPrompt)?;
        if form.count == 0 || form.count > MAX_IMAGES_PER_REQUEST {
            return Err(ValidationError::InvalidCount {
                count: u64::from(form.count),
                max: MAX_IMAGES_PER_REQUEST,
            });
        }
        if self.methods.requires_reference(&form.method) && reference_url.is_none() {
            return Err(ValidationError::MissingReference {
                method: form.method.clone(),
            });
        }
        let params = self
            .methods
            .get(&form.method)
            .map(|method| resolve_params(method, &form.params))
            .unwrap_or_default();
        Ok(GenerationRequest {
            prompt,
            count: form.count,
            aspect_ratio: form.aspect_ratio.clone(),
            method: form.method.clone(),
            reference_url,
            params,
        })
    }

    /// Returns the rewritten prompt, or `Ok(None)` when the remote call failed.
    pub async fn enhance_prompt(
        &self,
        prompt: &str,
        reference_url: Option<&str>,
    ) -> Result<Option<String>, GenerationError> {
        let Some(_busy) = BusyGuard::acquire(
            &self.enhancing,
            self.surface.as_ref(),
            BusyControl::Enhance,
        ) else {
            return Err(GenerationError::Busy);
        };
        let Some(original) = normalize_prompt(prompt) else {
            self.notifier
                .notify(NoticeLevel::Error, "Please enter a prompt to improve");
            return Err(ValidationError::EmptyPrompt.into());
        };

        match self.gateway.enhance_prompt(&original, reference_url).await {
            Ok(enhanced) => {
                let mut payload = EventPayload::new();
                payload.insert("prompt".to_string(), Value::String(original.clone()));
                payload.insert("enhanced".to_string(), Value::String(enhanced.clone()));
                if let Some(diff) = prompt_diff(&original, &enhanced) {
                    payload.insert(
                        "diff".to_string(),
                        Value::Array(diff.into_iter().map(Value::String).collect()),
                    );
                }
                self.events.record("prompt_enhanced", payload);
                self.notifier
                    .notify(NoticeLevel::Success, "Prompt improved successfully!");
                Ok(Some(enhanced))
            }
            Err(err) => {
                let mut payload = EventPayload::new();
                payload.insert(
                    "error".to_string(),
                    Value::String(error_chain_text(&err, 2000)),
                );
                self.events.record("prompt_enhance_failed", payload);
                self.notifier.notify(
                    NoticeLevel::Error,
                    "Failed to improve prompt. Please try again.",
                );
                Ok(None)
            }
        }
    }

    fn refresh(&self) {
        self.surface.refresh(&self.gallery.borrow());
    }

    fn log_rejected(&self, method: &str, reason: &str) {
        let mut payload = EventPayload::new();
        payload.insert("method".to_string(), Value::String(method.to_string()));
        payload.insert("reason".to_string(), Value::String(reason.to_string()));
        self.events.record("generation_rejected", payload);
    }

    fn log_submitted(&self, request: &GenerationRequest) {
        let mut payload = EventPayload::new();
        payload.insert("method".to_string(), Value::String(request.method.clone()));
        payload.insert("count".to_string(), Value::from(request.count));
        payload.insert(
            "aspect_ratio".to_string(),
            Value::String(request.aspect_ratio.clone()),
        );
        payload.insert(
            "has_reference".to_string(),
            Value::Bool(request.reference_url.is_some()),
        );
        payload.insert("params".to_string(), Value::Object(request.params.clone()));
        self.events.record("generation_submitted", payload);
    }

    fn log_completed(&self, request: &GenerationRequest, returned: usize, inserted: usize) {
        let mut payload = EventPayload::new();
        payload.insert("method".to_string(), Value::String(request.method.clone()));
        payload.insert("returned".to_string(), Value::from(returned));
        payload.insert("inserted".to_string(), Value::from(inserted));
        self.events.record("generation_completed", payload);
    }
}
