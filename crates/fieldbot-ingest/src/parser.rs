//! Rule-based report parser.
//!
//! Splits a free-text field report into operation records using regex
//! patterns. Used directly when no model is configured and as the fallback
//! whenever the remote extractor fails.
//!
//! A typical report:
//!
//! ```text
//! 10.03 день
//! Предп культ под оз пш
//! По Пу 215/1015
//! Отд 12 128/317
//! Отд 16 123/529
//! ```

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use fieldbot_core::{ExtractionResult, OperationRecord, ReferenceData};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::normalize::Normalizer;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})(?:\.(\d{4}|\d{2}))?\b").unwrap());
static OPERATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[А-Яа-яЁё0-9\-\s]+$").unwrap());
static LEADING_WORDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[А-Яа-яЁё\s\-]+").unwrap());
static FIELD_INFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:Предп|диск|Пахота|Выравн)(?:ов|п)?(?:ание|а)?\s+(\w+(?:\s+\w+)?)\s+(?:под|на)?\s*(\w+(?:\s+\w+)?)?",
    )
    .unwrap()
});
static TARGET_CULTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|\s)под\s+(.+)$").unwrap());
static PU_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"По\s*Пу\s*(\d+)/(\d+)").unwrap());
static DEPARTMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Отд\s*(\d+)\s*(\d+)/(\d+)").unwrap());
static VAL_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Вал\s+за\s+день\s+(\d+(?:[\s,.]\d+)*)").unwrap());
static VAL_TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Вал\s+с\s+начала\s+(\d+(?:[\s,.]\d+)*)").unwrap());

/// Regex-driven extractor over report text.
#[derive(Debug, Clone)]
pub struct RuleParser {
    reference: Arc<ReferenceData>,
    normalizer: Normalizer,
}

impl RuleParser {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        let normalizer = Normalizer::new(reference.clone());
        Self {
            reference,
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Parse a report processed today.
    pub fn parse(&self, text: &str) -> ExtractionResult {
        self.parse_on(text, Local::now().date_naive())
    }

    /// Parse a report as if processed on `today`. Never fails; text with no
    /// recognizable content yields a single default record. Records without
    /// a date of their own carry the processing date.
    pub fn parse_on(&self, text: &str, today: NaiveDate) -> ExtractionResult {
        let date_processed = today.format(fieldbot_core::types::DATE_FORMAT).to_string();
        let lines: Vec<&str> = text.trim().lines().collect();

        // Message-wide header: date and subdivision.
        let mut template = OperationRecord::default();
        for line in &lines {
            if !self.is_data_line(line.trim()) {
                if let Some(date) = find_date(line, today.year()) {
                    template.date = date;
                }
            }
            if let Some(sub) = self.find_subdivision(line) {
                template.subdivision = sub.to_string();
            }
        }
        if template.date.is_empty() {
            template.date = date_processed.clone();
        }

        let mut operations = Vec::new();
        let mut current: Option<OperationRecord> = None;
        // Data lines seen before the first operation line.
        let mut leading: Vec<&str> = Vec::new();

        for raw in &lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let field_info = FIELD_INFO_RE.captures(line);
            let starts_operation = (OPERATION_RE.is_match(line) && !self.is_data_line(line))
                || (field_info.is_some() && line.contains("под"));

            if starts_operation {
                if let Some(done) = current.take() {
                    operations.push(done);
                }
                let mut op = template.clone();
                for early in leading.drain(..) {
                    apply_data_line(&mut op, early);
                }

                if OPERATION_RE.is_match(line) {
                    let label = operation_label(line);
                    op.work_type = label.clone();
                    op.operation = label;
                }
                if let Some(from) = field_info.as_ref().and_then(|c| c.get(1)) {
                    op.culture_from = strip_preposition(from.as_str());
                }
                let target = TARGET_CULTURE_RE
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .or_else(|| field_info.as_ref().and_then(|c| c.get(2)));
                if let Some(target) = target {
                    op.culture_to = self.normalizer.culture(target.as_str());
                }
                current = Some(op);
            }

            match current.as_mut() {
                Some(op) => apply_data_line(op, line),
                None => leading.push(line),
            }
        }

        if let Some(done) = current.take() {
            operations.push(done);
        }

        if operations.is_empty() {
            debug!("No operation boundaries found, using single-record mode");
            operations.push(self.single_record(&lines, template));
        }

        ExtractionResult::from_operations(operations, date_processed)
    }

    /// Fallback when no line opens an operation: the leading words of the
    /// first line label the record and data patterns are scanned everywhere.
    fn single_record(&self, lines: &[&str], mut op: OperationRecord) -> OperationRecord {
        if let Some(first) = lines.first() {
            if let Some(m) = LEADING_WORDS_RE.find(first.trim()) {
                let label = m.as_str().trim().to_string();
                op.work_type = label.clone();
                op.operation = label;
            }
        }
        for line in lines {
            apply_data_line(&mut op, line);
        }
        op
    }

    /// First catalogue subdivision mentioned in the line.
    fn find_subdivision(&self, line: &str) -> Option<&str> {
        let lower = line.to_lowercase();
        self.reference
            .subdivisions
            .iter()
            .find(|sub| lower.contains(&sub.to_lowercase()))
            .map(String::as_str)
    }

    /// Lines that carry figures or headers rather than a new operation.
    fn is_data_line(&self, line: &str) -> bool {
        PU_RE.is_match(line)
            || DEPARTMENT_RE.is_match(line)
            || VAL_DAY_RE.is_match(line)
            || VAL_TOTAL_RE.is_match(line)
            || self
                .reference
                .subdivisions
                .iter()
                .any(|sub| sub.to_lowercase() == line.to_lowercase())
    }
}

/// PU, department and yield figures found on a line.
fn apply_data_line(op: &mut OperationRecord, line: &str) {
    if let Some(caps) = PU_RE.captures(line) {
        op.pu_number = caps[1].to_string();
        op.pu_area = caps[2].to_string();
    }
    for caps in DEPARTMENT_RE.captures_iter(line) {
        op.push_department(&caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = VAL_DAY_RE.captures(line) {
        op.val_day = strip_spaces(&caps[1]);
    }
    if let Some(caps) = VAL_TOTAL_RE.captures(line) {
        op.val_total = strip_spaces(&caps[1]);
    }
}

/// `D.M`, `D.M.YY` or `D.M.YYYY`; the current year is used when omitted.
fn find_date(line: &str, current_year: i32) -> Option<String> {
    DATE_RE.captures_iter(line).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return None;
        }
        let year = match caps.get(3) {
            Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().ok()?,
            Some(y) => y.as_str().parse::<i32>().ok()?,
            None => current_year,
        };
        Some(format!("{}.{}.{}", &caps[1], &caps[2], year))
    })
}

/// Operation name without the "под <culture>" target clause.
fn operation_label(line: &str) -> String {
    match TARGET_CULTURE_RE.find(line) {
        Some(m) if m.start() > 0 => line[..m.start()].trim().to_string(),
        _ => line.trim().to_string(),
    }
}

fn strip_preposition(s: &str) -> String {
    let s = s.trim();
    for suffix in [" под", " на"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            return stripped.trim().to_string();
        }
    }
    s.to_string()
}

fn strip_spaces(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
