use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use kontext_contracts::ImageRecord;
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::{Client as HttpClient, Response as HttpResponse, Url};
use serde_json::{json, Value};

use crate::assets::{AssetLoader, AssetStatus};
use crate::error::{truncate_text, GatewayError, TransportError, ValidationError};
use crate::gateway::{GenerationRequest, RemoteGateway, UploadFile};

pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const GENERATE_ENDPOINT: &str = "generate";
const ENHANCE_ENDPOINT: &str = "enhance-prompt";
const HISTORY_ENDPOINT: &str = "history";
const UPLOAD_ENDPOINT: &str = "upload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    /// `KONTEXT_API_BASE` and `KONTEXT_HTTP_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = non_empty_env("KONTEXT_API_BASE") {
            config.api_base = base;
        }
        if let Some(secs) =
            non_empty_env("KONTEXT_HTTP_TIMEOUT_SECS").and_then(|raw| raw.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs.max(1));
        }
        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        if !api_base.trim().is_empty() {
            self.api_base = api_base.trim().to_string();
        }
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `history/<id>` with the id percent-encoded as a single path segment.
    pub fn record_endpoint(&self, id: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.endpoint(HISTORY_ENDPOINT)).map_err(|err| {
            TransportError::payload(HISTORY_ENDPOINT, format!("invalid api base: {err}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| TransportError::payload(HISTORY_ENDPOINT, "api base cannot hold a path"))?
            .push(id);
        Ok(url)
    }
}

/// [`RemoteGateway`] over the JSON API served next to the web app.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn asset_probe(&self) -> HttpAssetProbe {
        HttpAssetProbe {
            http: self.http.clone(),
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;
        response_json_or_error(endpoint, response).await
    }
}

#[async_trait(?Send)]
impl RemoteGateway for HttpGateway {
    async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageRecord>, TransportError> {
        let payload = self
            .send(
                GENERATE_ENDPOINT,
                self.http
                    .post(self.config.endpoint(GENERATE_ENDPOINT))
                    .json(request),
            )
            .await?;
        records_field(GENERATE_ENDPOINT, &payload, "images")
    }

    async fn enhance_prompt(
        &self,
        prompt: &str,
        reference_url: Option<&str>,
    ) -> Result<String, TransportError> {
        let mut body = json!({ "prompt": prompt });
        if let Some(url) = reference_url {
            body["image_url"] = Value::String(url.to_string());
        }
        let payload = self
            .send(
                ENHANCE_ENDPOINT,
                self.http
                    .post(self.config.endpoint(ENHANCE_ENDPOINT))
                    .json(&body),
            )
            .await?;
        payload
            .get("enhancedPrompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TransportError::payload(ENHANCE_ENDPOINT, "missing enhancedPrompt"))
    }

    async fn fetch_history(&self) -> Result<Vec<ImageRecord>, TransportError> {
        let payload = self
            .send(
                HISTORY_ENDPOINT,
                self.http.get(self.config.endpoint(HISTORY_ENDPOINT)),
            )
            .await?;
        records_field(HISTORY_ENDPOINT, &payload, "images")
    }

    async fn submit_upload(&self, file: &UploadFile) -> Result<String, GatewayError> {
        if !file.is_image() {
            return Err(ValidationError::NotAnImage {
                mime_type: file.mime_type.clone(),
            }
            .into());
        }
        let part = MultipartPart::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|source| TransportError::Network {
                endpoint: UPLOAD_ENDPOINT.to_string(),
                source,
            })?;
        let form = MultipartForm::new().part("file", part);
        let payload = self
            .send(
                UPLOAD_ENDPOINT,
                self.http
                    .post(self.config.endpoint(UPLOAD_ENDPOINT))
                    .multipart(form),
            )
            .await?;
        let url = payload
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TransportError::payload(UPLOAD_ENDPOINT, "missing url"))?;
        Ok(url.to_string())
    }

    async fn delete_record(&self, id: &str) -> Result<bool, TransportError> {
        let url = self.config.record_endpoint(id)?;
        let payload = self.send(HISTORY_ENDPOINT, self.http.delete(url)).await?;
        Ok(payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true))
    }
}

/// Resolves once a card's thumbnail can be fetched.
#[derive(Debug, Clone)]
pub struct HttpAssetProbe {
    http: HttpClient,
}

impl AssetLoader for HttpAssetProbe {
    fn ready(&self, record: &ImageRecord) -> LocalBoxFuture<'static, AssetStatus> {
        let http = self.http.clone();
        let url = record.thumbnail().to_string();
        Box::pin(async move {
            if url.is_empty() || url.starts_with("data:") {
                return AssetStatus::Loaded;
            }
            match http.get(&url).send().await {
                Ok(response) if response.status().is_success() => AssetStatus::Loaded,
                _ => AssetStatus::Failed,
            }
        })
    }
}

async fn response_json_or_error(
    endpoint: &str,
    response: HttpResponse,
) -> Result<Value, TransportError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .map_err(|source| TransportError::Network {
            endpoint: endpoint.to_string(),
            source,
        })?;
    if !status.is_success() {
        return Err(TransportError::status(
            endpoint,
            code,
            truncate_text(&body, 512),
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        TransportError::payload(endpoint, format!("invalid JSON payload: {err}"))
    })
}

fn records_field(endpoint: &str, payload: &Value, key: &str) -> Result<Vec<ImageRecord>, TransportError> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(rows) => serde_json::from_value(rows.clone())
            .map_err(|err| TransportError::payload(endpoint, format!("invalid {key}: {err}"))),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
