use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kontext_contracts::ImageRecord;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{GatewayError, TransportError};

/// Body of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(rename = "num_images")]
    pub count: u32,
    pub aspect_ratio: String,
    #[serde(rename = "model")]
    pub method: String,
    #[serde(rename = "image_url", skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a local file; the MIME type comes from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_type_for_path(path), bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }

    /// Inline `data:` URL used for the staged-reference preview.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

pub fn mime_type_for_path(path: &Path) -> String {
    match image::ImageFormat::from_path(path) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("svg") => "image/svg+xml".to_string(),
            Some("txt") | Some("md") => "text/plain".to_string(),
            Some("json") => "application/json".to_string(),
            _ => "application/octet-stream".to_string(),
        },
    }
}

/// The five remote operations the gallery depends on.
#[async_trait(?Send)]
pub trait RemoteGateway {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageRecord>, TransportError>;

    async fn enhance_prompt(
        &self,
        prompt: &str,
        reference_url: Option<&str>,
    ) -> Result<String, TransportError>;

    async fn fetch_history(&self) -> Result<Vec<ImageRecord>, TransportError>;

    /// Returns the remote URL of the stored asset.
    async fn submit_upload(&self, file: &UploadFile) -> Result<String, GatewayError>;

    /// `Ok(false)` means the server answered but refused the delete.
    async fn delete_record(&self, id: &str) -> Result<bool, TransportError>;
}
