//! Shapes of provider webhook callbacks.
//!
//! Only the envelope (`entry[].changes[].value`) is parsed eagerly. Items inside
//! `value` are decoded one by one so that a single malformed item cannot sink
//! the rest of the callback.

use serde::Deserialize;
use serde_json::Value;

pub const AUDIO_PLACEHOLDER: &str = "[Audio message]";
pub const VIDEO_PLACEHOLDER: &str = "[Video message]";

#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<CallbackEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<CallbackChange>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl CallbackChange {
    #[must_use]
    pub fn messages(&self) -> &[Value] {
        self.value.get("messages").and_then(Value::as_array).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn statuses(&self) -> &[Value] {
        self.value.get("statuses").and_then(Value::as_array).map_or(&[], Vec::as_slice)
    }

    /// Business phone number the callback was addressed to.
    #[must_use]
    pub fn phone_number_id(&self) -> Option<&str> {
        self.value.get("metadata").and_then(|m| m.get("phone_number_id")).and_then(Value::as_str)
    }

    #[must_use]
    pub fn carries_message_events(&self) -> bool {
        self.value.get("messages").is_some() || self.value.get("statuses").is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub image: Option<MediaBody>,
    #[serde(default)]
    pub document: Option<MediaBody>,
    #[serde(default)]
    pub video: Option<MediaBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaBody {
    #[serde(default)]
    pub caption: Option<String>,
}

impl InboundMessage {
    /// Extracts the content to store for this message.
    ///
    /// `raw` is the serialized item, stored as-is for kinds without a dedicated rule.
    #[must_use]
    pub fn content(&self, raw: &Value) -> String {
        match self.kind.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.clone()).unwrap_or_default(),
            "image" => caption_of(self.image.as_ref()).unwrap_or_default(),
            "document" => caption_of(self.document.as_ref()).unwrap_or_default(),
            "audio" => AUDIO_PLACEHOLDER.to_string(),
            "video" => caption_of(self.video.as_ref()).unwrap_or_else(|| VIDEO_PLACEHOLDER.to_string()),
            _ => raw.to_string(),
        }
    }
}

fn caption_of(media: Option<&MediaBody>) -> Option<String> {
    media.and_then(|m| m.caption.clone()).filter(|c| !c.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl StatusUpdate {
    /// First error title reported with a `failed` status, if any.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        self.errors.first().map(|e| {
            e.get("title")
                .or_else(|| e.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| e.to_string(), str::to_string)
        })
    }
}

/// Parses provider epoch-seconds timestamps, which arrive as strings.
#[must_use]
pub fn parse_epoch_seconds(value: Option<&str>) -> Option<time::OffsetDateTime> {
    let seconds = value?.trim().parse::<i64>().ok()?;
    time::OffsetDateTime::from_unix_timestamp(seconds).ok()
}
