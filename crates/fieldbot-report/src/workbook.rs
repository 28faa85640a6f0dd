//! Workbook rendering.
//!
//! Layout of the single sheet:
//!
//! ```text
//! row 1   B1:I1 "Легенда"
//! row 2-3 A2:A3 "Цветовое обозначение", B..I colored column swatches
//! row 5   B5:I5 "Фактические данные" (bold)
//! row 6   column headers
//! row 7+  one row per operation record
//! ```

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use fieldbot_core::{Error, ExtractionResult, Result};
use fieldbot_ingest::{Normalized, Normalizer};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use tracing::info;

pub const SHEET_NAME: &str = "Отчет агрономов";

const HEADERS: [&str; 8] = [
    "Дата",
    "Подразделение",
    "Операция",
    "Культура",
    "За день, га",
    "С начала операции, га",
    "Вал за день, ц",
    "Вал с начала, ц",
];

/// Legend swatch per column, same order as `HEADERS`.
const SWATCHES: [u32; 8] = [
    0xD9E1F2, 0x5B9BD5, 0xFF0000, 0x9933FF, 0xFF9966, 0x00FF00, 0xFF99CC, 0x99FF99,
];

const HEADER_FILL: u32 = 0xE2EFDA;

const FIRST_DATA_COL: u16 = 1;
const LAST_DATA_COL: u16 = 8;
const FIRST_DATA_ROW: u32 = 6;

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub date: String,
    pub subdivision: String,
    pub operation: Normalized,
    pub culture: Normalized,
    pub area_day: String,
    pub area_total: String,
    pub val_day: String,
    pub val_total: String,
}

impl ReportRow {
    fn numeric_cells(&self) -> [&str; 4] {
        [
            &self.area_day,
            &self.area_total,
            &self.val_day,
            &self.val_total,
        ]
    }
}

/// Flatten extraction results into rows, one per operation record, with
/// operation and culture names normalized.
pub fn report_rows(results: &[ExtractionResult], normalizer: &Normalizer) -> Vec<ReportRow> {
    results
        .iter()
        .flat_map(|result| {
            result.records().iter().map(move |record| ReportRow {
                date: result.effective_date(record).to_string(),
                subdivision: record.subdivision.clone(),
                operation: normalizer.resolve_operation(record.operation_label()),
                culture: normalizer.resolve_culture(&record.culture_to),
                // Reports carry one area figure per production unit; it fills
                // both area columns.
                area_day: record.pu_area.clone(),
                area_total: record.pu_area.clone(),
                val_day: record.val_day.clone(),
                val_total: record.val_total.clone(),
            })
        })
        .collect()
}

/// Writes the report workbook into the excel directory.
pub struct WorkbookWriter {
    excel_dir: PathBuf,
    normalizer: Normalizer,
}

impl WorkbookWriter {
    pub fn new(excel_dir: &Path, normalizer: Normalizer) -> Self {
        Self {
            excel_dir: excel_dir.to_path_buf(),
            normalizer,
        }
    }

    /// Render a fresh workbook named after the current time.
    pub fn render(&self, results: &[ExtractionResult]) -> Result<PathBuf> {
        self.render_at(results, Local::now().naive_local())
    }

    pub fn render_at(&self, results: &[ExtractionResult], now: NaiveDateTime) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.excel_dir)?;
        let path = self.excel_dir.join(format!(
            "Отчет_агрономов_{}.xlsx",
            now.format("%d.%m.%Y_%H-%M-%S")
        ));

        let rows = report_rows(results, &self.normalizer);
        write_workbook(&rows, &path).map_err(|e| Error::Report(e.to_string()))?;

        info!("Workbook written: {} ({} rows)", path.display(), rows.len());
        Ok(path)
    }
}

fn write_workbook(rows: &[ReportRow], path: &Path) -> std::result::Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    write_legend(sheet)?;

    let title = Format::new().set_bold().set_align(FormatAlign::Center);
    sheet.merge_range(4, FIRST_DATA_COL, 4, LAST_DATA_COL, "Фактические данные", &title)?;

    let header = Format::new().set_background_color(Color::RGB(HEADER_FILL));
    for (i, text) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(5, FIRST_DATA_COL + i as u16, *text, &header)?;
    }

    let plain = Format::new();
    let unknown = Format::new().set_background_color(Color::Yellow);
    let number = Format::new().set_num_format("#,##0");

    for (offset, row) in rows.iter().enumerate() {
        let r = FIRST_DATA_ROW + offset as u32;
        sheet.write_string(r, 1, &row.date)?;
        sheet.write_string(r, 2, &row.subdivision)?;
        write_name(sheet, r, 3, &row.operation, &plain, &unknown)?;
        write_name(sheet, r, 4, &row.culture, &plain, &unknown)?;

        for (i, cell) in row.numeric_cells().iter().enumerate() {
            let col = 5 + i as u16;
            match parse_number(cell) {
                Some(value) => sheet.write_number_with_format(r, col, value, &number)?,
                None if cell.is_empty() => continue,
                None => sheet.write_string(r, col, *cell)?,
            };
        }
    }

    sheet.set_column_width(0, 40)?;
    for col in FIRST_DATA_COL..=LAST_DATA_COL {
        sheet.set_column_width(col, 20)?;
    }

    workbook.save(path)
}

fn write_legend(sheet: &mut Worksheet) -> std::result::Result<(), XlsxError> {
    let centered = Format::new().set_align(FormatAlign::Center);
    sheet.merge_range(0, FIRST_DATA_COL, 0, LAST_DATA_COL, "Легенда", &centered)?;
    sheet.merge_range(1, 0, 2, 0, "Цветовое обозначение", &centered)?;

    for (i, (text, color)) in HEADERS.iter().zip(SWATCHES).enumerate() {
        let col = FIRST_DATA_COL + i as u16;
        let fill = Format::new().set_background_color(Color::RGB(color));
        sheet.write_string_with_format(1, col, *text, &fill)?;
        sheet.write_blank(2, col, &fill)?;
    }
    Ok(())
}

/// Unresolved names are highlighted for manual review.
fn write_name(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    name: &Normalized,
    plain: &Format,
    unknown: &Format,
) -> std::result::Result<(), XlsxError> {
    let format = if name.known { plain } else { unknown };
    sheet.write_string_with_format(row, col, &name.value, format)?;
    Ok(())
}

/// `"1 250"`, `"12,5"`, `"488"` as numbers; anything else stays text.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
