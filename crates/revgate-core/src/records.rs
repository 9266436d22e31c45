//! On-disk record schemas for the trigger/response file protocol.
//!
//! Every record is a small JSON file in a shared temp directory. The
//! agent side writes triggers, the editor side writes acknowledgements
//! and responses, and each record is deleted by its reader once
//! consumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Wire value for the `system` field. The editor extension matches on
/// this to decide whether a trigger file is addressed to it.
pub const SYSTEM_NAME: &str = "review-gate-v2";

/// Wire value for the `editor` field.
pub const EDITOR_NAME: &str = "cursor";

/// Generates a unique trigger id of the form `{prefix}_{millis}_{hex}`.
///
/// The millisecond timestamp keeps ids roughly sortable; the random
/// suffix keeps concurrent requests from colliding.
pub fn new_trigger_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, millis, &uuid[..8])
}

/// A trigger written by the agent side to request editor attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub timestamp: DateTime<Utc>,
    pub system: String,
    pub editor: String,
    pub data: TriggerData,
    pub pid: u32,
    pub immediate_activation: bool,
}

impl TriggerRecord {
    pub fn new(data: TriggerData) -> Self {
        Self {
            timestamp: Utc::now(),
            system: SYSTEM_NAME.to_string(),
            editor: EDITOR_NAME.to_string(),
            data,
            pid: std::process::id(),
            immediate_activation: true,
        }
    }
}

/// Tool-specific payload carried inside a [`TriggerRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerData {
    pub tool: String,
    pub trigger_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent: Option<bool>,
    /// Additional tool arguments passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TriggerData {
    /// Creates a payload for `tool` with a freshly generated trigger id.
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            trigger_id: new_trigger_id(tool),
            message: None,
            title: None,
            context: None,
            mode: None,
            urgent: None,
            extra: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_urgent(mut self, urgent: bool) -> Self {
        self.urgent = Some(urgent);
        self
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Acknowledgement written by the editor when it has seen a trigger.
///
/// Unknown fields are ignored so the editor may attach its own
/// metadata without breaking older readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckRecord {
    #[serde(default)]
    pub acknowledged: bool,
}

/// A user response written by the editor side.
///
/// The answer may arrive under any of three keys depending on which
/// editor component produced it, so extraction goes through
/// [`ResponseRecord::answer`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ResponseRecord {
    /// Extracts the answer text: `user_input`, then `response`, then
    /// `message`. Empty strings do not count as answers.
    pub fn answer(&self) -> Option<&str> {
        non_empty(&self.user_input)
            .or_else(|| non_empty(&self.response))
            .or_else(|| non_empty(&self.message))
    }

    /// Whether this response belongs to `trigger_id`. Responses that
    /// carry no id at all are generic and match any request.
    pub fn matches(&self, trigger_id: &str) -> bool {
        match &self.trigger_id {
            Some(id) => id == trigger_id,
            None => true,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// A file attached to a user response, base64-encoded inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub base64_data: String,
}

/// A speech trigger dropped by the editor when the user records audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub data: SpeechTriggerData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechTriggerData {
    pub tool: String,
    pub trigger_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

/// Transcription result written back for a speech trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    pub timestamp: DateTime<Utc>,
    pub trigger_id: String,
    pub transcription: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: String,
}

impl SpeechResponse {
    pub fn transcribed(trigger_id: &str, transcription: String, source: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            trigger_id: trigger_id.to_string(),
            transcription,
            success: true,
            error: None,
            source: source.to_string(),
        }
    }

    pub fn failed(trigger_id: &str, error: String, source: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            trigger_id: trigger_id.to_string(),
            transcription: String::new(),
            success: false,
            error: Some(error),
            source: source.to_string(),
        }
    }
}
