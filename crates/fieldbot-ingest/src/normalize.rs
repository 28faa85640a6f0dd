//! Abbreviation normalizer for culture and operation names.
//!
//! Agronomists write "мн тр", "оз пш", "предп культ"; reports need the
//! canonical catalogue names. Lookup order, first match wins:
//! exact direct table, substring direct table, reference abbreviations
//! (longest key), catalogue substring in either direction, then the token
//! itself capitalized.

use std::sync::Arc;

use fieldbot_core::ReferenceData;
use tracing::info;

/// Direct culture abbreviations, checked in order.
const CULTURE_TABLE: &[(&str, &str)] = &[
    ("оз", "Пшеница озимая товарная"),
    ("оз.", "Пшеница озимая товарная"),
    ("озимая", "Пшеница озимая товарная"),
    ("озим", "Пшеница озимая товарная"),
    ("пш", "Пшеница озимая товарная"),
    ("оз пш", "Пшеница озимая товарная"),
    ("мн", "Многолетние травы прошлых лет"),
    ("мн.", "Многолетние травы прошлых лет"),
    ("мн тр", "Многолетние травы прошлых лет"),
    ("многолетн", "Многолетние травы прошлых лет"),
    ("сах св", "Свекла сахарная"),
    ("сах", "Свекла сахарная"),
    ("св", "Свекла сахарная"),
    ("свекла", "Свекла сахарная"),
    ("соя", "Соя товарная"),
    ("сои", "Соя товарная"),
    ("зяби", "Зябь"),
    ("зябь", "Зябь"),
    ("кук", "Кукуруза товарная"),
    ("подс", "Подсолнечник товарный"),
    ("культ", "Пшеница озимая товарная"),
];

/// Direct operation abbreviations, checked in order.
const OPERATION_TABLE: &[(&str, &str)] = &[
    ("пахота", "Пахота"),
    ("пах", "Пахота"),
    ("диск", "Дискование"),
    ("дискование", "Дискование"),
    ("диск 2", "Дискование 2-е"),
    ("диск 2-е", "Дискование 2-е"),
    ("культ", "Культивация"),
    ("предп культ", "Предпосевная культивация"),
    ("предпосевная", "Предпосевная культивация"),
    ("выравнивание", "Выравнивание"),
    ("подкормка", "Подкормка"),
    ("2-я подкормка", "2-я подкормка"),
    ("сев", "Сев"),
    ("посев", "Посев"),
    ("уборка", "Уборка"),
];

/// A normalized name and whether it resolved to a known entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub value: String,
    /// False when no table or catalogue entry matched.
    pub known: bool,
}

impl Normalized {
    fn known(value: &str) -> Self {
        Self {
            value: value.to_string(),
            known: true,
        }
    }
}

/// Maps free-text abbreviations to canonical names.
#[derive(Debug, Clone)]
pub struct Normalizer {
    reference: Arc<ReferenceData>,
}

impl Normalizer {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self { reference }
    }

    /// Canonical culture name for a token. Never fails.
    pub fn culture(&self, token: &str) -> String {
        self.resolve_culture(token).value
    }

    /// Canonical operation name for a token. Never fails.
    pub fn operation(&self, token: &str) -> String {
        self.resolve_operation(token).value
    }

    pub fn resolve_culture(&self, token: &str) -> Normalized {
        let lower = token.trim().to_lowercase();
        if lower.is_empty() {
            return Normalized {
                value: String::new(),
                known: true,
            };
        }

        if let Some(found) = lookup_table(CULTURE_TABLE, &lower) {
            return found;
        }

        // Longest key wins: "горох тов" beats "горох".
        let abbreviation = self
            .reference
            .culture_abbreviations
            .iter()
            .filter(|(abbr, _)| lower.contains(abbr.as_str()))
            .max_by_key(|(abbr, _)| abbr.chars().count());
        if let Some((_, full_name)) = abbreviation {
            return Normalized::known(full_name);
        }

        if let Some(full_name) = lookup_catalogue(&self.reference.cultures, &lower) {
            return Normalized::known(full_name);
        }

        if token.chars().count() > 2 {
            info!("Unknown culture: '{}'", token);
        }
        unknown(token)
    }

    pub fn resolve_operation(&self, token: &str) -> Normalized {
        let lower = token.trim().to_lowercase();
        if lower.is_empty() {
            return Normalized {
                value: String::new(),
                known: true,
            };
        }

        if let Some(found) = lookup_table(OPERATION_TABLE, &lower) {
            return found;
        }

        if let Some(op) = lookup_catalogue(&self.reference.operations, &lower) {
            return Normalized::known(op);
        }

        if token.chars().count() > 2 {
            info!("Unknown operation: '{}'", token);
        }
        unknown(token)
    }
}

fn lookup_table(table: &[(&str, &str)], lower: &str) -> Option<Normalized> {
    if let Some((_, value)) = table.iter().find(|(key, _)| *key == lower) {
        return Some(Normalized::known(value));
    }
    table
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, value)| Normalized::known(value))
}

fn lookup_catalogue<'a>(catalogue: &'a [String], lower: &str) -> Option<&'a str> {
    catalogue
        .iter()
        .find(|name| {
            let name_lower = name.to_lowercase();
            name_lower.contains(lower) || lower.contains(&name_lower)
        })
        .map(String::as_str)
}

fn unknown(token: &str) -> Normalized {
    Normalized {
        value: capitalize(token.trim()),
        known: false,
    }
}

/// Upper-case the first character, lower-case the rest.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(ReferenceData::default()))
    }

    #[test]
    fn test_direct_abbreviations() {
        let n = normalizer();
        assert_eq!(n.culture("мн тр"), "Многолетние травы прошлых лет");
        assert_eq!(n.culture("  Сах Св "), "Свекла сахарная");
        assert_eq!(n.culture("оз пш"), "Пшеница озимая товарная");
    }

    #[test]
    fn test_substring_in_direct_table() {
        let n = normalizer();
        assert_eq!(n.culture("соя тов."), "Соя товарная");
    }

    #[test]
    fn test_reference_abbreviation_longest_key() {
        let n = normalizer();
        assert_eq!(n.culture("яч"), "Ячмень озимый");
        assert_eq!(n.culture("горох"), "Горох на зерно");
        assert_eq!(n.culture("горох тов"), "Горох товарный");
        assert_eq!(n.culture("сорго корм"), "Сорго кормовой");
    }

    #[test]
    fn test_catalogue_match() {
        let n = normalizer();
        let resolved = n.resolve_culture("люцерна");
        assert_eq!(resolved.value, "Люцерна");
        assert!(resolved.known);
    }

    #[test]
    fn test_unknown_culture_is_capitalized() {
        let n = normalizer();
        let resolved = n.resolve_culture("ТАБАК");
        assert_eq!(resolved.value, "Табак");
        assert!(!resolved.known);
    }

    #[test]
    fn test_blank_token() {
        let n = normalizer();
        assert_eq!(n.culture(""), "");
        assert_eq!(n.culture("   "), "");
    }

    #[test]
    fn test_operations() {
        let n = normalizer();
        assert_eq!(n.operation("Диск"), "Дискование");
        assert_eq!(n.operation("предп культ"), "Предпосевная культивация");
        assert_eq!(n.operation("Пахота зяби"), "Пахота");
        assert_eq!(n.operation("2-я подкормка"), "2-я подкормка");
        assert_eq!(n.operation("боронование"), "Боронование");
        let unknown = n.resolve_operation("мульчирование");
        assert_eq!(unknown.value, "Мульчирование");
        assert!(!unknown.known);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("пАХОТА"), "Пахота");
        assert_eq!(capitalize(""), "");
    }
}
