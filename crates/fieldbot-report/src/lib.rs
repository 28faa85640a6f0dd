//! FieldBot Report — the agronomist workbook.
//!
//! The workbook is regenerated in full from every archived message on each
//! render; nothing is edited in place.

pub mod workbook;

pub use workbook::{report_rows, ReportRow, WorkbookWriter, SHEET_NAME};
