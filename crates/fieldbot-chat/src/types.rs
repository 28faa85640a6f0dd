//! Completion API wire types and the prompt handed to a backend.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// What a caller asks a backend to complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub messages: Vec<Message>,
    /// Overrides the configured temperature.
    pub temperature: Option<f64>,
    /// Overrides the configured model name.
    pub model: Option<String>,
}

impl Prompt {
    /// A single user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            temperature: None,
            model: None,
        }
    }

    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(text));
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Request body for `foundationModels/v1/completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model_uri: String,
    pub completion_options: CompletionOptions,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Inline binary content, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub content: String,
    pub mime_type: String,
}

impl Attachment {
    pub fn jpeg(bytes: &[u8]) -> Self {
        Self {
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: "image/jpeg".into(),
        }
    }
}

/// Response body: either `result` or `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub result: Option<CompletionResult>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub message: AlternativeMessage,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlternativeMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub text: String,
}

impl CompletionResponse {
    /// Text of the first alternative, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.result
            .as_ref()?
            .alternatives
            .first()
            .map(|a| a.message.text.as_str())
            .filter(|t| !t.is_empty())
    }
}
