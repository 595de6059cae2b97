use std::cell::RefCell;
use std::rc::Rc;

use kontext_contracts::events::{EventPayload, EventWriter};
use kontext_contracts::ImageRecord;
use serde_json::Value;

use crate::error::{error_chain_text, GatewayError, ValidationError};
use crate::gallery::SharedGallery;
use crate::gateway::{RemoteGateway, UploadFile};
use crate::layout::LayoutEngine;
use crate::notify::{NoticeLevel, Notifier};
use crate::surface::{RenderSurface, UploadState};

/// The one reference image generations and enhancements may point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedReference {
    pub url: String,
    pub preview: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropOutcome {
    pub added: usize,
    pub failed: usize,
    pub filtered: usize,
    /// Dropped paths that could not be read from disk.
    pub unreadable: usize,
}

impl DropOutcome {
    pub fn unprocessed(&self) -> usize {
        self.failed + self.filtered + self.unreadable
    }
}

pub struct UploadPipeline {
    gateway: Rc<dyn RemoteGateway>,
    gallery: SharedGallery,
    surface: Rc<dyn RenderSurface>,
    layout: Rc<LayoutEngine>,
    notifier: Rc<dyn Notifier>,
    events: EventWriter,
    staged: RefCell<Option<StagedReference>>,
}

impl UploadPipeline {
    pub fn new(
        gateway: Rc<dyn RemoteGateway>,
        gallery: SharedGallery,
        surface: Rc<dyn RenderSurface>,
        layout: Rc<LayoutEngine>,
        notifier: Rc<dyn Notifier>,
        events: EventWriter,
    ) -> Self {
        Self {
            gateway,
            gallery,
            surface,
            layout,
            notifier,
            events,
            staged: RefCell::new(None),
        }
    }

    pub fn staged(&self) -> Option<StagedReference> {
        self.staged.borrow().clone()
    }

    pub fn staged_url(&self) -> Option<String> {
        self.staged.borrow().as_ref().map(|staged| staged.url.clone())
    }

    /// Uploads a picked file and stages it as the reference.
    ///
    /// `Ok(None)` means the upload failed on the wire; the user has already been told.
    pub async fn stage_reference(
        &self,
        file: UploadFile,
    ) -> Result<Option<StagedReference>, ValidationError> {
        if !file.is_image() {
            let err = ValidationError::NotAnImage {
                mime_type: file.mime_type.clone(),
            };
            self.notifier.notify(NoticeLevel::Error, &err.to_string());
            return Err(err);
        }
        self.upload_reference(file).await
    }

    /// Same as [`UploadPipeline::stage_reference`] for files dropped on the reference slot.
    pub async fn stage_dropped(
        &self,
        files: Vec<UploadFile>,
    ) -> Result<Option<StagedReference>, ValidationError> {
        let Some(file) = files.into_iter().next() else {
            return Ok(None);
        };
        if !file.is_image() {
            self.notifier
                .notify(NoticeLevel::Error, "Please drop a valid image file");
            return Err(ValidationError::NotAnImage {
                mime_type: file.mime_type,
            });
        }
        self.upload_reference(file).await
    }

    async fn upload_reference(
        &self,
        file: UploadFile,
    ) -> Result<Option<StagedReference>, ValidationError> {
        self.surface.set_upload_state(UploadState::Uploading);
        match self.gateway.submit_upload(&file).await {
            Ok(url) => {
                let staged = StagedReference {
                    url,
                    preview: file.data_url(),
                    file_name: file.name.clone(),
                };
                *self.staged.borrow_mut() = Some(staged.clone());
                self.surface.set_upload_state(UploadState::Preview {
                    data_url: staged.preview.clone(),
                    file_name: staged.file_name.clone(),
                });
                self.log_upload("upload_completed", &file, Some(&staged.url), None);
                self.notifier
                    .notify(NoticeLevel::Success, "Image uploaded successfully!");
                Ok(Some(staged))
            }
            Err(GatewayError::Rejected(err)) => {
                self.restore_upload_state();
                self.notifier.notify(NoticeLevel::Error, &err.to_string());
                Err(err)
            }
            Err(GatewayError::Transport(err)) => {
                self.restore_upload_state();
                self.log_upload("upload_failed", &file, None, Some(&error_chain_text(&err, 2000)));
                self.notifier
                    .notify(NoticeLevel::Error, "Failed to upload image. Please try again.");
                Ok(None)
            }
        }
    }

    fn restore_upload_state(&self) {
        let state = match self.staged.borrow().as_ref() {
            Some(staged) => UploadState::Preview {
                data_url: staged.preview.clone(),
                file_name: staged.file_name.clone(),
            },
            None => UploadState::Idle,
        };
        self.surface.set_upload_state(state);
    }

    pub fn clear_reference(&self) {
        self.staged.borrow_mut().take();
        self.surface.set_upload_state(UploadState::Idle);
        self.notifier.notify(NoticeLevel::Info, "Image removed");
    }

    /// Uploads dropped files one by one and prepends each success to the gallery.
    pub async fn drop_into_gallery(
        &self,
        files: Vec<UploadFile>,
    ) -> Result<DropOutcome, ValidationError> {
        self.drop_loaded(files, 0).await
    }

    /// Like [`Self::drop_into_gallery`], with `unreadable` dropped paths that never loaded
    /// counted into the failure summary.
    pub async fn drop_loaded(
        &self,
        files: Vec<UploadFile>,
        unreadable: usize,
    ) -> Result<DropOutcome, ValidationError> {
        let total = files.len();
        let images: Vec<UploadFile> = files.into_iter().filter(UploadFile::is_image).collect();
        let mut outcome = DropOutcome {
            filtered: total - images.len(),
            unreadable,
            ..DropOutcome::default()
        };
        if images.is_empty() {
            let err = ValidationError::NoImageFiles;
            self.notifier.notify(NoticeLevel::Error, &err.to_string());
            return Err(err);
        }

        self.notifier.notify(
            NoticeLevel::Info,
            &format!("Processing {} image(s)...", images.len()),
        );
        for file in images {
            match self.gateway.submit_upload(&file).await {
                Ok(url) => {
                    let record = ImageRecord::uploaded(&url, &file.name);
                    let inserted = self.gallery.borrow_mut().prepend(vec![record]);
                    self.surface.prepend_cards(&inserted);
                    self.layout.add_images(&inserted);
                    self.log_upload("upload_completed", &file, Some(&url), None);
                    outcome.added += inserted.len();
                }
                Err(err) => {
                    self.log_upload("upload_failed", &file, None, Some(&error_chain_text(&err, 2000)));
                    outcome.failed += 1;
                }
            }
        }
        self.surface.refresh(&self.gallery.borrow());

        if outcome.added > 0 {
            self.notifier.notify(
                NoticeLevel::Success,
                &format!("Successfully added {} image(s) to gallery", outcome.added),
            );
        }
        if outcome.unprocessed() > 0 {
            self.notifier.notify(
                NoticeLevel::Error,
                &format!("Failed to process {} image(s)", outcome.unprocessed()),
            );
        }
        Ok(outcome)
    }

    fn log_upload(&self, event: &str, file: &UploadFile, url: Option<&str>, error: Option<&str>) {
        let mut payload = EventPayload::new();
        payload.insert("file_name".to_string(), Value::String(file.name.clone()));
        payload.insert("mime_type".to_string(), Value::String(file.mime_type.clone()));
        payload.insert("bytes".to_string(), Value::from(file.bytes.len()));
        if let Some(url) = url {
            payload.insert("url".to_string(), Value::String(url.to_string()));
        }
        if let Some(error) = error {
            payload.insert("error".to_string(), Value::String(error.to_string()));
        }
        self.events.record(event, payload);
    }
}
