//! Remote extraction with rule-based fallback.
//!
//! The remote model is the preferred extractor. Every remote failure mode
//! (transport, non-2xx, error text, unparseable output) degrades to the
//! rule-based parser and is tagged as a fallback with its reason. `Err` is
//! reserved for local failures such as the cache file being unwritable.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use fieldbot_chat::{CompletionBackend, CompletionError, Prompt};
use fieldbot_core::{ExtractionResult, ReferenceData, Result};
use fieldbot_ingest::RuleParser;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::ExtractionCache;

/// Model answers that are error reports rather than data.
const ERROR_PREFIXES: &[&str] = &["Произошла ошибка", "Не удалось", "Ошибка"];

const EXTRACTION_TEMPERATURE: f64 = 0.1;

const SYSTEM_PROMPT: &str =
    "Анализируй сельскохозяйственные сообщения и извлекай структурированные данные.";

/// Worked examples shown to the model: message text and expected record.
const EXAMPLES: &[(&str, &str)] = &[
    (
        "Пахота зяби под мн тр\nПо Пу 26/488\nОтд 12 26/221",
        r#"{"work_type": "Пахота", "operation": "Пахота зяби", "culture_from": "зяби", "culture_to": "Многолетние", "pu_number": "26", "pu_area": "488", "department": "12", "department_number": "26", "department_area": "221", "date": "", "subdivision": "АОР", "val_day": "", "val_total": ""}"#,
    ),
    (
        "Предп культ под оз пш\nПо Пу 215/1015\nОтд 12 128/317\nОтд 16 123/529",
        r#"{"work_type": "Предпосевная культивация", "operation": "Предп культ", "culture_from": "культ", "culture_to": "Пшеница озимая товарная", "pu_number": "215", "pu_area": "1015", "department": "12, 16", "department_number": "128, 123", "department_area": "317, 529", "date": "", "subdivision": "АОР", "val_day": "", "val_total": ""}"#,
    ),
];

/// Why the rule-based parser produced the result instead of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No completion backend configured.
    NotConfigured,
    Transport,
    Timeout,
    Status { code: u16 },
    Unauthorized,
    Auth,
    /// The API answered with an `error` object or no alternatives.
    ApiError,
    /// The model's text starts with an error phrase.
    ErrorText,
    /// No `{ ... }` block in the model's text.
    NoJson,
    InvalidJson,
}

impl From<&CompletionError> for FallbackReason {
    fn from(e: &CompletionError) -> Self {
        match e {
            CompletionError::Transport(_) => FallbackReason::Transport,
            CompletionError::Timeout => FallbackReason::Timeout,
            CompletionError::Status { status, .. } => FallbackReason::Status { code: *status },
            CompletionError::Unauthorized => FallbackReason::Unauthorized,
            CompletionError::Auth(_) => FallbackReason::Auth,
            CompletionError::Api(_) | CompletionError::Malformed(_) => FallbackReason::ApiError,
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NotConfigured => write!(f, "remote extraction not configured"),
            FallbackReason::Transport => write!(f, "transport error"),
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::Status { code } => write!(f, "HTTP {}", code),
            FallbackReason::Unauthorized => write!(f, "unauthorized"),
            FallbackReason::Auth => write!(f, "authentication failed"),
            FallbackReason::ApiError => write!(f, "API error"),
            FallbackReason::ErrorText => write!(f, "model returned an error message"),
            FallbackReason::NoJson => write!(f, "no JSON in model output"),
            FallbackReason::InvalidJson => write!(f, "invalid JSON in model output"),
        }
    }
}

/// An extraction result tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Extraction {
    Remote {
        result: ExtractionResult,
    },
    Fallback {
        result: ExtractionResult,
        reason: FallbackReason,
    },
}

impl Extraction {
    pub fn result(&self) -> &ExtractionResult {
        match self {
            Extraction::Remote { result } | Extraction::Fallback { result, .. } => result,
        }
    }

    pub fn into_result(self) -> ExtractionResult {
        match self {
            Extraction::Remote { result } | Extraction::Fallback { result, .. } => result,
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Extraction::Remote { .. } => None,
            Extraction::Fallback { reason, .. } => Some(*reason),
        }
    }
}

/// Cached extraction through a completion backend, degrading to rules.
pub struct RemoteExtractor {
    backend: Option<Arc<dyn CompletionBackend>>,
    parser: RuleParser,
    reference: Arc<ReferenceData>,
    cache: Arc<ExtractionCache>,
}

impl RemoteExtractor {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        reference: Arc<ReferenceData>,
        cache: Arc<ExtractionCache>,
    ) -> Self {
        Self {
            backend,
            parser: RuleParser::new(reference.clone()),
            reference,
            cache,
        }
    }

    pub fn parser(&self) -> &RuleParser {
        &self.parser
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Extract records from a message, consulting the cache first.
    pub async fn extract(&self, text: &str) -> Result<Extraction> {
        self.extract_on(text, Local::now().date_naive()).await
    }

    /// Same as `extract`, processing as of `today`.
    pub async fn extract_on(&self, text: &str, today: NaiveDate) -> Result<Extraction> {
        if let Some(hit) = self.cache.get(text) {
            info!("Using cached extraction");
            return Ok(hit);
        }

        let extraction = match &self.backend {
            Some(backend) => self.ask_model(backend.as_ref(), text, today).await,
            None => self.fallback(text, today, FallbackReason::NotConfigured),
        };

        if let Err(e) = self.cache.put(text, &extraction) {
            error!("Failed to store extraction in cache: {}", e);
            return Err(e);
        }
        Ok(extraction)
    }

    async fn ask_model(
        &self,
        backend: &dyn CompletionBackend,
        text: &str,
        today: NaiveDate,
    ) -> Extraction {
        info!(
            "Sending message to model for analysis, {} chars",
            text.chars().count()
        );
        let prompt = Prompt::user(self.build_prompt(text))
            .with_system(SYSTEM_PROMPT)
            .with_temperature(EXTRACTION_TEMPERATURE);

        let answer = match backend.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Model request failed: {}", e);
                return self.fallback(text, today, FallbackReason::from(&e));
            }
        };

        let trimmed = answer.trim();
        if ERROR_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            warn!("Model returned an error: {}", truncate(trimmed, 200));
            return self.fallback(text, today, FallbackReason::ErrorText);
        }

        let Some(json) = extract_json(trimmed) else {
            error!("No JSON found in model output");
            return self.fallback(text, today, FallbackReason::NoJson);
        };

        match result_from_payload(json, today) {
            Some(result) => {
                info!(
                    "Model extraction parsed: {} operations",
                    result.records().len()
                );
                Extraction::Remote { result }
            }
            None => {
                error!("Invalid JSON in model output: {}", truncate(json, 200));
                self.fallback(text, today, FallbackReason::InvalidJson)
            }
        }
    }

    fn fallback(&self, text: &str, today: NaiveDate, reason: FallbackReason) -> Extraction {
        info!("Falling back to rule-based parser: {}", reason);
        Extraction::Fallback {
            result: self.parser.parse_on(text, today),
            reason,
        }
    }

    /// Instructions, reference catalogue, worked examples and the message.
    pub fn build_prompt(&self, text: &str) -> String {
        let reference = serde_json::json!({
            "subdivisions": self.reference.subdivisions,
            "operations": self.reference.operations,
            "cultures": self.reference.cultures,
        });

        let examples = EXAMPLES
            .iter()
            .map(|(message, analysis)| format!("СООБЩЕНИЕ: {}\nАНАЛИЗ: {}", message, analysis))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Ты - система разбора отчетов агрономов о полевых работах.\n\n\
             СПРАВОЧНЫЕ ДАННЫЕ:\n{reference}\n\n\
             ПРИМЕРЫ АНАЛИЗА:\n{examples}\n\n\
             Разбери сообщение ниже. В нем может быть одна или несколько операций. \
             Для каждой операции укажи тип работы, культуру, данные ПУ \
             (\"По Пу номер/площадь\") и отделений (\"Отд номер площадь/площадь\"). \
             Несколько отделений одной операции перечисляй через запятую.\n\n\
             СООБЩЕНИЕ ДЛЯ АНАЛИЗА:\n{text}\n\n\
             Верни только JSON вида {{\"operations\": [...], \"corrections\": \"...\"}}, \
             где каждая операция содержит поля work_type, operation, culture_from, \
             culture_to, pu_number, pu_area, department, department_number, \
             department_area, date, subdivision, val_day, val_total. \
             Отсутствующие значения - пустая строка.",
        )
    }
}

/// The JSON object inside model output: code fences stripped, then the
/// span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let mut body = text.trim();
    if let Some((_, rest)) = body.split_once("```json") {
        body = rest.split("```").next().unwrap_or(rest);
    } else if let Some((_, rest)) = body.split_once("```") {
        body = rest.split("```").next().unwrap_or(rest);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Build a result from the model's JSON: the `operations` list when present,
/// otherwise a single record from the top-level fields. Undated records get
/// the processing date.
fn result_from_payload(json: &str, today: NaiveDate) -> Option<ExtractionResult> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    if !value.is_object() {
        return None;
    }
    let mut result: ExtractionResult = serde_json::from_value(value).ok()?;

    if result.operations.is_empty() {
        result.operations.push(result.primary.clone());
    }
    if result.date_processed.is_empty() {
        result.date_processed = today.format(fieldbot_core::types::DATE_FORMAT).to_string();
    }
    for record in result.operations.iter_mut().filter(|r| r.date.is_empty()) {
        record.date = result.date_processed.clone();
    }
    result.primary = result.operations[0].clone();
    Some(result)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
