//! Reference catalogue: subdivisions, operations, cultures and abbreviations.
//!
//! Loaded once at startup from `reference_data.json` when present, otherwise
//! the built-in catalogue is used. Missing keys in the file fall back to the
//! built-in values.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub subdivisions: Vec<String>,
    pub operations: Vec<String>,
    pub cultures: Vec<String>,
    /// Subdivision → production units.
    pub pu_subdivisions: BTreeMap<String, Vec<String>>,
    /// Production unit → department numbers.
    pub departments: BTreeMap<String, Vec<String>>,
    pub operations_by_culture: BTreeMap<String, Vec<String>>,
    /// Abbreviation (lower case) → canonical culture name.
    pub culture_abbreviations: BTreeMap<String, String>,
}

impl ReferenceData {
    /// Load from a JSON file, falling back to the built-in catalogue.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(reference) => {
                    info!("Loaded reference data from {}", path.display());
                    reference
                }
                Err(e) => {
                    warn!("Invalid reference data in {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No reference data file, using built-in catalogue");
                Self::default()
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_map(items: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), strings(v)))
        .collect()
}

impl Default for ReferenceData {
    fn default() -> Self {
        let subdivisions = strings(&[
            "Центральное отделение",
            "Северное отделение",
            "Южное отделение",
            "Восточное отделение",
            "Западное отделение",
            "АО Кроноткинское",
            "Восход",
            "Колхоз Прогресс",
            "Мир",
            "СП Коломейцево",
        ]);

        let operations = strings(&[
            "Вспашка",
            "Боронование",
            "Культивация",
            "Культивация предпосевная",
            "Культивация сплошная",
            "Дискование",
            "Гербицидная обработка",
            "Гербицидная обработка сплошная",
            "Фунгицидная обработка",
            "Инсектицидная обработка",
            "Внесение удобрений",
            "Посев",
            "Уборка",
            "Кошение",
            "Скашивание",
            "Орошение",
            "Опрыскивание",
            "Сбор урожая",
            "Транспортировка",
            "Погрузка",
            "Разгрузка",
            "Плановое ТО",
            "Внеплановый ремонт",
            "Перегон техники",
        ]);

        let cultures = strings(&[
            "Вика+Тритикале",
            "Горох на зерно",
            "Горох товарный",
            "Гуар",
            "Конопля",
            "Кориандр",
            "Кукуруза кормовая",
            "Кукуруза семенная",
            "Кукуруза товарная",
            "Люцерна",
            "Многолетние злаковые травы",
            "Многолетние травы прошлых лет",
            "Многолетние травы текущего года",
            "Овес",
            "Подсолнечник кондитерский",
            "Подсолнечник семенной",
            "Подсолнечник товарный",
            "Просо",
            "Пшеница озимая на зеленый корм",
            "Пшеница озимая семенная",
            "Пшеница озимая товарная",
            "Рапс озимый",
            "Рапс яровой",
            "Свекла сахарная",
            "Сорго",
            "Сорго кормовой",
            "Сорго-суданковый гибрид",
            "Соя семенная",
            "Соя товарная",
            "Чистый пар",
            "Чумиза",
            "Ячмень озимый",
            "Ячмень озимый семенной",
        ]);

        let pu_subdivisions = string_map(&[
            ("АОР", &["Кавказ", "Север", "Центр", "Юг", "Рассвет"]),
            ("ТСК", &["Нет ПУ"]),
            ("АО Кроноткинское", &["Нет ПУ"]),
            ("Восход", &["Нет ПУ"]),
            ("Колхоз Прогресс", &["Нет ПУ"]),
            ("Мир", &["Нет ПУ"]),
            ("СП Коломейцево", &["Нет ПУ"]),
        ]);

        let departments = string_map(&[
            ("Кавказ", &["18", "19"]),
            ("Север", &["3", "7", "10", "20"]),
            ("Центр", &["1", "4", "5", "6", "9"]),
            ("Юг", &["11", "12", "16", "17"]),
            ("Рассвет", &[]),
        ]);

        let row_crop_ops: &[&str] = &[
            "Пахота",
            "Дискование",
            "Предпосевная культивация",
            "Сев",
            "Гербицидная обработка",
            "Междурядная обработка",
            "Уборка",
        ];
        let operations_by_culture = string_map(&[
            (
                "Пшеница озимая товарная",
                &[
                    "Пахота",
                    "Дискование",
                    "Выравнивание",
                    "Предпосевная культивация",
                    "Сев",
                    "Подкормка",
                    "2-я подкормка",
                    "Гербицидная обработка",
                    "Фунгицидная обработка",
                    "Уборка",
                    "Прикатывание посевов",
                ],
            ),
            ("Соя товарная", row_crop_ops),
            ("Подсолнечник товарный", row_crop_ops),
            ("Свекла сахарная", row_crop_ops),
            (
                "Многолетние травы",
                &[
                    "Пахота",
                    "Дискование",
                    "Предпосевная культивация",
                    "Сев",
                    "Уборка",
                    "Подкормка",
                ],
            ),
        ]);

        let culture_abbreviations = [
            ("мн тр", "Многолетние травы прошлых лет"),
            ("мн тр тек.года", "Многолетние травы текущего года"),
            ("мн зл", "Многолетние злаковые травы"),
            ("оз пш", "Пшеница озимая товарная"),
            ("оз пш сем", "Пшеница озимая семенная"),
            ("оз пш на зел", "Пшеница озимая на зеленый корм"),
            ("сах св", "Свекла сахарная"),
            ("соя", "Соя товарная"),
            ("соя сем", "Соя семенная"),
            ("подс", "Подсолнечник товарный"),
            ("подс сем", "Подсолнечник семенной"),
            ("подс кон", "Подсолнечник кондитерский"),
            ("яч", "Ячмень озимый"),
            ("оз яч", "Ячмень озимый"),
            ("оз яч сем", "Ячмень озимый семенной"),
            ("кук", "Кукуруза товарная"),
            ("кук корм", "Кукуруза кормовая"),
            ("кук сем", "Кукуруза семенная"),
            ("рапс", "Рапс яровой"),
            ("оз рапс", "Рапс озимый"),
            ("горох", "Горох на зерно"),
            ("горох тов", "Горох товарный"),
            ("вика+трит", "Вика+Тритикале"),
            ("сорго", "Сорго"),
            ("сорго корм", "Сорго кормовой"),
            ("гибрид", "Сорго-суданковый гибрид"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            subdivisions,
            operations,
            cultures,
            pu_subdivisions,
            departments,
            operations_by_culture,
            culture_abbreviations,
        }
    }
}
