//! Workbook model and xlsx codec
//!
//! The builders work against a plain value grid (`WorkbookDoc`). Rendering
//! to xlsx bytes and re-reading them implements the download → mutate →
//! upload append cycle: the artifact in object storage is the only full copy
//! of the workbook, memory holds one workbook at a time.
//!
//! Styling is not carried through the byte round-trip; header rows are
//! re-applied from the `SheetLayout` at every encode, which keeps the
//! observable artifact shape stable across append cycles.

use std::io::Cursor;
use std::sync::Arc;

use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, Workbook};
use tracing::debug;

use crate::error::ExportError;
use crate::storage::{ObjectStorage, XLSX_CONTENT_TYPE};

/// Hard limit the xlsx format places on sheet titles.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// A single cell value. Everything a report writes is either text or a
/// number; dates are pre-rendered to text by the builders.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

/// One sheet as a sparse 1-based grid.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<Option<CellValue>>>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Vec::new(),
        }
    }

    /// Write a cell. Rows and columns are 1-based, matching how the report
    /// layouts are specified.
    pub fn set(&mut self, row: u32, col: u16, value: CellValue) {
        debug_assert!(row >= 1 && col >= 1);
        let r = row as usize - 1;
        let c = col as usize - 1;
        if self.rows.len() <= r {
            self.rows.resize(r + 1, Vec::new());
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, None);
        }
        cells[c] = Some(value);
    }

    pub fn set_text(&mut self, row: u32, col: u16, text: impl Into<String>) {
        self.set(row, col, CellValue::Text(text.into()));
    }

    pub fn set_number(&mut self, row: u32, col: u16, value: f64) {
        self.set(row, col, CellValue::Number(value));
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.rows
            .get(row as usize - 1)
            .and_then(|cells| cells.get(col as usize - 1))
            .and_then(|cell| cell.as_ref())
    }

    /// First row at or below `start_row` whose first column is empty — the
    /// append point for data rows.
    pub fn next_row(&self, start_row: u32) -> u32 {
        let mut row = start_row;
        while self.get(row, 1).is_some() {
            row += 1;
        }
        row
    }

    fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        self.rows.iter().enumerate().flat_map(|(r, cells)| {
            cells.iter().enumerate().filter_map(move |(c, cell)| {
                cell.as_ref().map(|v| (r as u32 + 1, c as u16 + 1, v))
            })
        })
    }
}

/// Header styling for one sheet, re-applied on every encode.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub name: String,
    pub header_rows: Vec<u32>,
    pub header_fill: u32,
}

/// The workbook as an ordered list of sheets.
#[derive(Debug, Clone, Default)]
pub struct WorkbookDoc {
    sheets: Vec<Sheet>,
}

impl WorkbookDoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, name: &str) -> &mut Sheet {
        self.sheets.push(Sheet::new(name));
        self.sheets.last_mut().expect("just pushed")
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet, ExportError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| ExportError::Workbook(format!("sheet {name:?} missing from workbook")))
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Build a sheet title `"{base} - {suffix}"` clamped to the xlsx limit.
pub fn sheet_title(base: &str, suffix: &str) -> String {
    let full = format!("{} - {}", base, suffix);
    if full.chars().count() <= MAX_SHEET_NAME_LEN {
        return full;
    }
    full.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// Render the document to xlsx bytes, applying header styling from layouts.
pub fn encode(doc: &WorkbookDoc, layouts: &[SheetLayout]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();

    for sheet in &doc.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet.name)
            .map_err(|e| ExportError::Workbook(format!("bad sheet name {:?}: {e}", sheet.name)))?;

        let layout = layouts.iter().find(|l| l.name == sheet.name);
        let header_format = layout.map(|l| {
            Format::new()
                .set_bold()
                .set_background_color(Color::RGB(l.header_fill))
        });

        for (row, col, value) in sheet.iter_cells() {
            let (r, c) = (row - 1, col - 1);
            let styled = layout
                .map(|l| l.header_rows.contains(&row))
                .unwrap_or(false);
            let result = match (value, styled, header_format.as_ref()) {
                (CellValue::Text(s), true, Some(fmt)) => {
                    worksheet.write_string_with_format(r, c, s, fmt).map(|_| ())
                }
                (CellValue::Text(s), _, _) => worksheet.write_string(r, c, s).map(|_| ()),
                (CellValue::Number(n), true, Some(fmt)) => {
                    worksheet.write_number_with_format(r, c, *n, fmt).map(|_| ())
                }
                (CellValue::Number(n), _, _) => worksheet.write_number(r, c, *n).map(|_| ()),
            };
            result.map_err(|e| {
                ExportError::Workbook(format!("write {}!R{}C{} failed: {e}", sheet.name, row, col))
            })?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| ExportError::Workbook(format!("xlsx render failed: {e}")))
}

/// Re-read xlsx bytes into the value grid. Sheet order is preserved; styling
/// is not (it is re-applied on encode).
pub fn decode(bytes: &[u8]) -> Result<WorkbookDoc, ExportError> {
    let mut reader: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ExportError::Workbook(format!("xlsx open failed: {e}")))?;

    let names: Vec<String> = reader.sheet_names().to_vec();
    let mut doc = WorkbookDoc::new();

    for name in names {
        let range = reader
            .worksheet_range(&name)
            .map_err(|e| ExportError::Workbook(format!("sheet {name:?} read failed: {e}")))?;

        let sheet = doc.add_sheet(&name);
        if let Some((row0, col0)) = range.start() {
            for (r, cells) in range.rows().enumerate() {
                for (c, cell) in cells.iter().enumerate() {
                    let row = row0 + r as u32 + 1;
                    let col = (col0 as usize + c + 1) as u16;
                    match cell {
                        Data::Empty => {}
                        Data::String(s) => sheet.set_text(row, col, s.clone()),
                        Data::Float(f) => sheet.set_number(row, col, *f),
                        Data::Int(i) => sheet.set_number(row, col, *i as f64),
                        Data::Bool(b) => sheet.set_text(row, col, b.to_string()),
                        other => sheet.set_text(row, col, other.to_string()),
                    }
                }
            }
        }
    }

    Ok(doc)
}

// ==========================================================================
// Storage-backed workbook
// ==========================================================================

/// A workbook living in object storage, mutated through download → mutate →
/// upload cycles. One instance owns one key for the duration of a build.
pub struct StoredWorkbook {
    store: Arc<dyn ObjectStorage>,
    key: String,
    layouts: Vec<SheetLayout>,
    max_bytes: usize,
}

impl StoredWorkbook {
    /// Phase A: render the skeleton locally and upload it once.
    pub async fn create(
        store: Arc<dyn ObjectStorage>,
        key: String,
        doc: &WorkbookDoc,
        layouts: Vec<SheetLayout>,
        max_bytes: usize,
    ) -> Result<Self, ExportError> {
        let stored = Self {
            store,
            key,
            layouts,
            max_bytes,
        };
        stored.upload(doc).await?;
        Ok(stored)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Phase B step: pull the workbook, apply one batch of rows, push it
    /// back.
    pub async fn update<F>(&self, mutate: F) -> Result<(), ExportError>
    where
        F: FnOnce(&mut WorkbookDoc) -> Result<(), ExportError>,
    {
        let bytes = self.store.get(&self.key).await?;
        let mut doc = decode(&bytes)?;
        mutate(&mut doc)?;
        self.upload(&doc).await
    }

    async fn upload(&self, doc: &WorkbookDoc) -> Result<(), ExportError> {
        let bytes = encode(doc, &self.layouts)?;
        if bytes.len() > self.max_bytes {
            return Err(ExportError::StorageWrite {
                key: self.key.clone(),
                message: format!(
                    "artifact is {} bytes, exceeding the {} byte export limit",
                    bytes.len(),
                    self.max_bytes
                ),
            });
        }
        debug!("Uploading workbook {} ({} bytes)", self.key, bytes.len());
        self.store.put(&self.key, bytes, XLSX_CONTENT_TYPE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    fn layout(name: &str) -> SheetLayout {
        SheetLayout {
            name: name.to_string(),
            header_rows: vec![8],
            header_fill: 0xD3D3D3,
        }
    }

    #[test]
    fn test_set_get_one_based() {
        let mut sheet = Sheet::new("Logs");
        sheet.set_text(1, 1, "title");
        sheet.set_number(9, 2, 42.0);
        assert_eq!(sheet.get(1, 1), Some(&CellValue::Text("title".into())));
        assert_eq!(sheet.get(9, 2), Some(&CellValue::Number(42.0)));
        assert_eq!(sheet.get(9, 1), None);
    }

    #[test]
    fn test_next_row_skips_occupied_rows() {
        let mut sheet = Sheet::new("Logs");
        assert_eq!(sheet.next_row(9), 9);
        sheet.set_text(9, 1, "a");
        sheet.set_text(10, 1, "b");
        // occupancy is judged on the first column only
        sheet.set_text(11, 2, "ignored");
        assert_eq!(sheet.next_row(9), 11);
    }

    #[test]
    fn test_sheet_title_clamps_to_xlsx_limit() {
        assert_eq!(sheet_title("Top asked questions", "All"), "Top asked questions - All");
        let clamped = sheet_title("Detailed category breakdown", "Unanswered");
        assert_eq!(clamped.chars().count(), MAX_SHEET_NAME_LEN);
        assert!(clamped.starts_with("Detailed category breakdown"));
    }

    #[test]
    fn test_encode_decode_preserves_values_and_sheet_order() {
        let mut doc = WorkbookDoc::new();
        let first = doc.add_sheet("Logs");
        first.set_text(1, 1, "Answer Usage logs");
        first.set_text(8, 1, "Question");
        first.set_number(9, 9, 1.5);
        let second = doc.add_sheet("Summary");
        second.set_text(6, 1, "Metric");

        let bytes = encode(&doc, &[layout("Logs")]).unwrap();
        let round = decode(&bytes).unwrap();

        assert_eq!(round.sheet_names(), vec!["Logs", "Summary"]);
        let logs = round.sheet("Logs").unwrap();
        assert_eq!(logs.get(1, 1), Some(&CellValue::Text("Answer Usage logs".into())));
        assert_eq!(logs.get(9, 9), Some(&CellValue::Number(1.5)));
        assert_eq!(
            round.sheet("Summary").unwrap().get(6, 1),
            Some(&CellValue::Text("Metric".into()))
        );
    }

    #[test]
    fn test_sheet_mut_missing_is_workbook_error() {
        let mut doc = WorkbookDoc::new();
        doc.add_sheet("Logs");
        assert!(matches!(doc.sheet_mut("Other"), Err(ExportError::Workbook(_))));
    }

    #[tokio::test]
    async fn test_stored_workbook_append_cycles() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut doc = WorkbookDoc::new();
        let sheet = doc.add_sheet("Logs");
        sheet.set_text(8, 1, "Question");

        let stored = StoredWorkbook::create(
            store.clone(),
            "exports/1/evt/logs.xlsx".to_string(),
            &doc,
            vec![layout("Logs")],
            100 * 1024 * 1024,
        )
        .await
        .unwrap();

        // Three batches of 100/100/37 rows, appended through storage
        for batch in [100u32, 100, 37] {
            stored
                .update(|doc| {
                    let sheet = doc.sheet_mut("Logs")?;
                    let mut row = sheet.next_row(9);
                    for i in 0..batch {
                        sheet.set_text(row, 1, format!("q-{i}"));
                        row += 1;
                    }
                    Ok(())
                })
                .await
                .unwrap();
        }

        let bytes = store.object("exports/1/evt/logs.xlsx").unwrap();
        let final_doc = decode(&bytes).unwrap();
        let logs = final_doc.sheet("Logs").unwrap();
        // 237 data rows starting at row 9
        assert!(logs.get(9, 1).is_some());
        assert!(logs.get(245, 1).is_some());
        assert!(logs.get(246, 1).is_none());
        assert_eq!(logs.next_row(9), 246);
    }

    #[tokio::test]
    async fn test_stored_workbook_enforces_size_limit() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut doc = WorkbookDoc::new();
        doc.add_sheet("Logs").set_text(1, 1, "x");

        let result = StoredWorkbook::create(
            store,
            "exports/1/evt/logs.xlsx".to_string(),
            &doc,
            vec![],
            16, // absurdly small on purpose
        )
        .await;
        assert!(matches!(result, Err(ExportError::StorageWrite { .. })));
    }
}
