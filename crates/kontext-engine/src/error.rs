//! Error taxonomy for the gallery core.
//!
//! Validation errors carry the exact user-facing message as their `Display`.
//! Transport errors carry diagnostic detail that only goes to the event log.

use anyhow::Error as AnyError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a prompt")]
    EmptyPrompt,
    #[error("Please upload an image for this model")]
    MissingReference { method: String },
    #[error("Please select a valid image file")]
    NotAnImage { mime_type: String },
    #[error("Please drop valid image files")]
    NoImageFiles,
    #[error("No images selected")]
    NoSelection,
    #[error("Image count must be between 1 and {max}")]
    InvalidCount { count: u64, max: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{endpoint} request failed ({status}): {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("{endpoint} request failed")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned an invalid payload: {detail}")]
    Payload { endpoint: String, detail: String },
}

impl TransportError {
    pub fn status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    pub fn payload(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Payload {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Network { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Payload { .. } => false,
        }
    }
}

/// Upload can fail before the network (not an image) or on the wire.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("a request is already in flight")]
    Busy,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Flattens an error and its causes into one line for the event log.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn anyhow_chain_text(err: &AnyError, max_chars: usize) -> String {
    error_chain_text(err.as_ref(), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
