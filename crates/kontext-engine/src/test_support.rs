use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use kontext_contracts::events::EventWriter;
use kontext_contracts::ImageRecord;
use tempfile::TempDir;

use crate::error::{GatewayError, TransportError};
use crate::gateway::{GenerationRequest, RemoteGateway, UploadFile};

pub fn record(id: &str) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        url: format!("https://blob.test/{id}.png"),
        thumbnail_url: Some(format!("https://blob.test/{id}_thumb.png")),
        original_url: None,
        prompt: format!("prompt for {id}"),
        model: "kontext".to_string(),
        timestamp: 1_700_000_000_000,
    }
}

pub fn image_file(name: &str) -> UploadFile {
    UploadFile::new(name, "image/png", b"\x89PNG".to_vec())
}

pub fn text_file(name: &str) -> UploadFile {
    UploadFile::new(name, "text/plain", b"notes".to_vec())
}

pub fn temp_events() -> anyhow::Result<(TempDir, EventWriter)> {
    let temp = tempfile::tempdir()?;
    let events = EventWriter::new(temp.path().join("events.jsonl"), "test-session");
    Ok((temp, events))
}

/// Scripted gateway. Each call takes the next queued answer; `delay` simulates latency.
#[derive(Default)]
pub struct FakeGateway {
    pub history: RefCell<Option<Vec<ImageRecord>>>,
    pub generations: RefCell<VecDeque<Option<Vec<ImageRecord>>>>,
    pub generation_requests: RefCell<Vec<GenerationRequest>>,
    pub enhanced: RefCell<Option<String>>,
    pub enhance_calls: Cell<usize>,
    pub failing_uploads: RefCell<HashSet<String>>,
    pub uploads: RefCell<Vec<String>>,
    pub failing_deletes: RefCell<HashSet<String>>,
    pub refused_deletes: RefCell<HashSet<String>>,
    pub deletes: RefCell<Vec<String>>,
    pub delay: Cell<Duration>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, records: Vec<ImageRecord>) -> Self {
        *self.history.borrow_mut() = Some(records);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.delay.set(delay);
        self
    }

    /// `None` makes that call fail with a 500.
    pub fn queue_generation(&self, result: Option<Vec<ImageRecord>>) {
        self.generations.borrow_mut().push_back(result);
    }

    pub fn fail_upload(&self, name: &str) {
        self.failing_uploads.borrow_mut().insert(name.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.borrow_mut().insert(id.to_string());
    }

    /// The server answers but reports `success: false`.
    pub fn refuse_delete(&self, id: &str) {
        self.refused_deletes.borrow_mut().insert(id.to_string());
    }

    pub fn generation_calls(&self) -> usize {
        self.generation_requests.borrow().len()
    }

    async fn latency(&self) {
        let delay = self.delay.get();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait(?Send)]
impl RemoteGateway for FakeGateway {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageRecord>, TransportError> {
        self.generation_requests.borrow_mut().push(request.clone());
        let next = self.generations.borrow_mut().pop_front();
        self.latency().await;
        match next {
            Some(Some(records)) => Ok(records),
            Some(None) => Err(TransportError::status("generate", 500, "model exploded")),
            None => Ok(Vec::new()),
        }
    }

    async fn enhance_prompt(
        &self,
        _prompt: &str,
        _reference_url: Option<&str>,
    ) -> Result<String, TransportError> {
        self.enhance_calls.set(self.enhance_calls.get() + 1);
        let enhanced = self.enhanced.borrow().clone();
        self.latency().await;
        enhanced.ok_or_else(|| TransportError::status("enhance-prompt", 502, "upstream down"))
    }

    async fn fetch_history(&self) -> Result<Vec<ImageRecord>, TransportError> {
        let history = self.history.borrow().clone();
        self.latency().await;
        history.ok_or_else(|| TransportError::status("history", 503, "unavailable"))
    }

    async fn submit_upload(&self, file: &UploadFile) -> Result<String, GatewayError> {
        self.uploads.borrow_mut().push(file.name.clone());
        let fails = self.failing_uploads.borrow().contains(&file.name);
        self.latency().await;
        if fails {
            return Err(TransportError::status("upload", 500, "disk full").into());
        }
        Ok(format!("https://blob.test/uploads/{}", file.name))
    }

    async fn delete_record(&self, id: &str) -> Result<bool, TransportError> {
        self.deletes.borrow_mut().push(id.to_string());
        let fails = self.failing_deletes.borrow().contains(id);
        self.latency().await;
        if fails {
            return Err(TransportError::status("history", 500, "locked"));
        }
        Ok(!self.refused_deletes.borrow().contains(id))
    }
}
