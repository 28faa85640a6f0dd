//! Operation records and extraction results shared by both extractors.
//!
//! Both the rule-based parser and the remote model produce the same JSON
//! shape, so the cache and the report sink never need to know which one
//! produced a result.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Top-level organizational unit used when a message names none.
pub const DEFAULT_SUBDIVISION: &str = "АОР";

/// Date format used throughout reports (`30.11.2024`).
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// One field operation extracted from a report.
///
/// Every field is always present; absent data is the empty string.
/// `department`, `department_number` and `department_area` may hold
/// comma-joined values aligned by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub work_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub operation: String,
    #[serde(deserialize_with = "lenient_string")]
    pub culture_from: String,
    #[serde(deserialize_with = "lenient_string")]
    pub culture_to: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pu_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pu_area: String,
    #[serde(deserialize_with = "lenient_string")]
    pub department: String,
    #[serde(deserialize_with = "lenient_string")]
    pub department_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub department_area: String,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub subdivision: String,
    #[serde(deserialize_with = "lenient_string")]
    pub val_day: String,
    #[serde(deserialize_with = "lenient_string")]
    pub val_total: String,
}

impl Default for OperationRecord {
    fn default() -> Self {
        Self {
            work_type: String::new(),
            operation: String::new(),
            culture_from: String::new(),
            culture_to: String::new(),
            pu_number: String::new(),
            pu_area: String::new(),
            department: String::new(),
            department_number: String::new(),
            department_area: String::new(),
            date: String::new(),
            subdivision: DEFAULT_SUBDIVISION.to_string(),
            val_day: String::new(),
            val_total: String::new(),
        }
    }
}

impl OperationRecord {
    /// Append a department triple, keeping the three fields aligned.
    pub fn push_department(&mut self, department: &str, number: &str, area: &str) {
        if self.department.is_empty() {
            self.department = department.to_string();
            self.department_number = number.to_string();
            self.department_area = area.to_string();
        } else {
            self.department.push_str(", ");
            self.department.push_str(department);
            self.department_number.push_str(", ");
            self.department_number.push_str(number);
            self.department_area.push_str(", ");
            self.department_area.push_str(area);
        }
    }

    /// Operation label, preferring the free label over the category.
    pub fn operation_label(&self) -> &str {
        if self.operation.is_empty() {
            &self.work_type
        } else {
            &self.operation
        }
    }
}

/// One or more operation records extracted from a single message.
///
/// Serializes with the first operation's fields promoted to the top level
/// next to the full `operations` list, for single-record consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionResult {
    pub operations: Vec<OperationRecord>,
    #[serde(flatten)]
    pub primary: OperationRecord,
    #[serde(
        deserialize_with = "lenient_notes",
        skip_serializing_if = "Option::is_none"
    )]
    pub corrections: Option<String>,
    pub date_processed: String,
}

impl ExtractionResult {
    /// Build a result from a list of operations, promoting the first one.
    /// An empty list yields a single default record.
    pub fn from_operations(mut operations: Vec<OperationRecord>, date_processed: String) -> Self {
        if operations.is_empty() {
            operations.push(OperationRecord::default());
        }
        Self {
            primary: operations[0].clone(),
            operations,
            corrections: None,
            date_processed,
        }
    }

    /// All records, in message order.
    pub fn records(&self) -> &[OperationRecord] {
        &self.operations
    }

    /// Date to report for a record: its own date, else the processing date.
    pub fn effective_date<'a>(&'a self, record: &'a OperationRecord) -> &'a str {
        if record.date.is_empty() {
            &self.date_processed
        } else {
            &record.date
        }
    }
}

/// Accept strings, numbers, booleans and null where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

/// Corrections arrive as a string, a list of notes, or an object.
fn lenient_notes<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = match value {
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => value_to_text(other),
    };
    Ok(if text.trim().is_empty() { None } else { Some(text) })
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_has_every_field() {
        let json = serde_json::to_value(OperationRecord::default()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 13);
        assert_eq!(obj["subdivision"], "АОР");
        assert_eq!(obj["pu_number"], "");
    }

    #[test]
    fn test_missing_and_null_fields_become_empty() {
        let record: OperationRecord = serde_json::from_value(serde_json::json!({
            "work_type": "Пахота",
            "pu_area": 488,
            "val_day": null,
        }))
        .unwrap();
        assert_eq!(record.work_type, "Пахота");
        assert_eq!(record.pu_area, "488");
        assert_eq!(record.val_day, "");
        assert_eq!(record.subdivision, "АОР");
    }

    #[test]
    fn test_push_department_keeps_alignment() {
        let mut record = OperationRecord::default();
        record.push_department("12", "128", "317");
        record.push_department("16", "123", "529");
        assert_eq!(record.department, "12, 16");
        assert_eq!(record.department_number, "128, 123");
        assert_eq!(record.department_area, "317, 529");
    }

    #[test]
    fn test_result_promotes_first_operation() {
        let mut first = OperationRecord::default();
        first.work_type = "Дискование".into();
        let mut second = OperationRecord::default();
        second.work_type = "Сев".into();

        let result = ExtractionResult::from_operations(vec![first, second], "01.04.2025".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["work_type"], "Дискование");
        assert_eq!(json["operations"].as_array().unwrap().len(), 2);
        assert!(json.get("corrections").is_none());

        let back: ExtractionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_empty_operations_yield_default_record() {
        let result = ExtractionResult::from_operations(Vec::new(), "01.04.2025".into());
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0], OperationRecord::default());
    }

    #[test]
    fn test_corrections_accept_list() {
        let result: ExtractionResult = serde_json::from_value(serde_json::json!({
            "operations": [],
            "corrections": ["мн тр → Многолетние травы", ""],
        }))
        .unwrap();
        assert_eq!(result.corrections.as_deref(), Some("мн тр → Многолетние травы"));
    }

    #[test]
    fn test_effective_date_falls_back_to_processing_date() {
        let result = ExtractionResult::from_operations(Vec::new(), "02.05.2025".into());
        assert_eq!(result.effective_date(&result.operations[0]), "02.05.2025");
    }
}
