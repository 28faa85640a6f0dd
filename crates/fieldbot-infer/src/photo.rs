//! Field photo analysis through the vision model.

use std::sync::Arc;

use fieldbot_chat::{Attachment, CompletionBackend, CompletionError, Message, Prompt};
use serde_json::Value;
use tracing::{info, warn};

use crate::extractor::extract_json;

const VISION_MODEL: &str = fieldbot_chat::config::VISION_MODEL;
const VISION_TEMPERATURE: f64 = 0.6;

const PHOTO_PROMPT: &str = "Проанализируй фотографию от агронома.\n\
1. Определи тип работы (вспашка, сев, уборка и т.д.)\n\
2. Определи культуру\n\
3. Оцени качество работы\n\
4. Опиши состояние поля или культуры\n\
5. Укажи проблемы или особенности, которые видны на фото\n\n\
Верни только JSON с полями work_type, operation, culture_to, quality, \
field_condition, issues. Если значение определить нельзя, укажи null.";

/// What the model saw in a field photo. Absent observations are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoReport {
    pub work_type: Option<String>,
    pub operation: Option<String>,
    pub culture: Option<String>,
    pub quality: Option<String>,
    pub field_condition: Option<String>,
    pub issues: Option<String>,
}

impl PhotoReport {
    fn from_json(value: &Value) -> Self {
        Self {
            work_type: text_field(value, "work_type"),
            operation: text_field(value, "operation"),
            culture: text_field(value, "culture_to"),
            quality: text_field(value, "quality"),
            field_condition: text_field(value, "field_condition"),
            issues: text_field(value, "issues"),
        }
    }

    /// Reply text for the chat, one line per observation.
    pub fn summary(&self) -> String {
        let fields: [(&str, Option<&String>); 6] = [
            ("Тип работы", self.work_type.as_ref()),
            ("Операция", self.operation.as_ref()),
            ("Культура", self.culture.as_ref()),
            ("Качество", self.quality.as_ref()),
            ("Состояние поля", self.field_condition.as_ref()),
            ("Проблемы", self.issues.as_ref()),
        ];
        let lines: Vec<String> = fields
            .into_iter()
            .filter_map(|(label, value)| value.map(|v| format!("{}: {}", label, v)))
            .collect();

        if lines.is_empty() {
            "Анализ фото: на снимке не удалось определить полевые работы.".to_string()
        } else {
            format!("Анализ фото:\n{}", lines.join("\n"))
        }
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Sends photos to the vision model.
pub struct PhotoAnalyzer {
    backend: Arc<dyn CompletionBackend>,
}

impl PhotoAnalyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Analyze a JPEG photo, with the sender's caption if any.
    pub async fn analyze(
        &self,
        jpeg: &[u8],
        caption: Option<&str>,
    ) -> Result<PhotoReport, CompletionError> {
        let mut text = PHOTO_PROMPT.to_string();
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            text.push_str("\n\nПодпись к фото: ");
            text.push_str(caption.trim());
        }

        info!("Analyzing photo, {} bytes", jpeg.len());
        let prompt = Prompt {
            messages: vec![Message::user(text).with_attachment(Attachment::jpeg(jpeg))],
            temperature: Some(VISION_TEMPERATURE),
            model: Some(VISION_MODEL.to_string()),
        };
        let answer = self.backend.generate(&prompt).await?;

        let json = extract_json(&answer).ok_or_else(|| {
            warn!("No JSON in photo analysis");
            CompletionError::Malformed("no JSON in photo analysis".into())
        })?;
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CompletionError::Malformed(format!("photo analysis: {}", e)))?;
        Ok(PhotoReport::from_json(&value))
    }
}
