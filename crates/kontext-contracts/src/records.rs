use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `model` value stamped on records that came from a user upload rather than a generation.
pub const USER_UPLOAD_MODEL: &str = "User Upload";

pub const UNKNOWN_MODEL_LABEL: &str = "Unknown Model";

pub const EMPTY_PROMPT_LABEL: &str = "No prompt";

/// One gallery entry, as persisted by the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl ImageRecord {
    /// Wraps a freshly uploaded asset so it can go straight into the gallery.
    pub fn uploaded(url: &str, file_name: &str) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: upload_id(now),
            url: url.to_string(),
            thumbnail_url: Some(url.to_string()),
            original_url: Some(url.to_string()),
            prompt: format!("Uploaded: {file_name}"),
            model: USER_UPLOAD_MODEL.to_string(),
            timestamp: now,
        }
    }

    pub fn is_upload(&self) -> bool {
        self.model == USER_UPLOAD_MODEL
    }

    pub fn full_url(&self) -> &str {
        if !self.url.is_empty() {
            return &self.url;
        }
        self.original_url.as_deref().unwrap_or("")
    }

    pub fn thumbnail(&self) -> &str {
        self.thumbnail_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.full_url())
    }

    pub fn display_prompt(&self) -> &str {
        if self.prompt.trim().is_empty() {
            EMPTY_PROMPT_LABEL
        } else {
            &self.prompt
        }
    }

    pub fn display_model(&self) -> &str {
        if self.model.trim().is_empty() {
            UNKNOWN_MODEL_LABEL
        } else {
            &self.model
        }
    }
}

fn upload_id(now_millis: i64) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("uploaded_{now_millis}_{suffix}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn history_payload_tolerates_extra_and_missing_fields() {
        let raw = json!({
            "id": "img_1",
            "url": "https://blob/img_1_full.jpg",
            "thumbnailUrl": "https://blob/img_1_thumb.jpg",
            "originalUrl": "https://fal/img.jpg",
            "prompt": "a red fox",
            "model": "kontext",
            "timestamp": 1_700_000_000_000_i64,
            "createdAt": "2023-11-14T22:13:20.000Z",
            "metadata": {"num_images": 1}
        });
        let record: ImageRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.thumbnail(), "https://blob/img_1_thumb.jpg");
        assert_eq!(record.timestamp, 1_700_000_000_000);

        let sparse: ImageRecord =
            serde_json::from_value(json!({"id": "temp_1", "url": "https://x/y.png"})).unwrap();
        assert_eq!(sparse.thumbnail(), "https://x/y.png");
        assert_eq!(sparse.display_prompt(), EMPTY_PROMPT_LABEL);
        assert_eq!(sparse.display_model(), UNKNOWN_MODEL_LABEL);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = ImageRecord::uploaded("https://fal/u.png", "cat.png");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["thumbnailUrl"], "https://fal/u.png");
        assert_eq!(value["originalUrl"], "https://fal/u.png");
        assert!(value.get("thumbnail_url").is_none());
    }

    #[test]
    fn uploaded_record_uses_sentinel_model_and_synthesized_prompt() {
        let record = ImageRecord::uploaded("https://fal/u.png", "cat.png");
        assert!(record.is_upload());
        assert_eq!(record.prompt, "Uploaded: cat.png");
        assert!(record.id.starts_with("uploaded_"));
        assert_eq!(record.id.rsplit('_').next().map(str::len), Some(9));

        let other = ImageRecord::uploaded("https://fal/u.png", "cat.png");
        assert_ne!(record.id, other.id);
    }
}
