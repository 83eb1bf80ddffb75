//! Table detection from text positions, plus the JSON side store the rows
//! are written to. The page text only carries a marker per table.

use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pdfkb_core::error::{Error, Result};

/// Baselines closer than this belong to the same row.
const ROW_TOLERANCE: f32 = 2.0;
/// Cell starts closer than this belong to the same column.
const COLUMN_TOLERANCE: f32 = 4.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 1-based page number.
    pub page: u32,
    /// Position of the table on its page, from 0.
    pub index: usize,
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    pub fn marker(&self) -> String { format!("[TABLE_EXTRACTED_PAGE_{}_ID_{}]", self.page, self.index) }
}

/// A run of text shown at one position on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCell {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn decode_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]])).collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn shown_text(operand: Option<&Object>) -> String {
    match operand {
        Some(Object::String(bytes, _)) => decode_string(bytes),
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| match o {
                Object::String(bytes, _) => Some(decode_string(bytes)),
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

/// Text cells in drawing order, positioned by the text line matrix.
pub fn text_cells(operations: &[Operation]) -> Vec<TextCell> {
    let mut cells: Vec<TextCell> = Vec::new();
    let (mut x, mut y, mut leading) = (0f32, 0f32, 0f32);
    for op in operations {
        let operands = op.operands.as_slice();
        let shown = match op.operator.as_str() {
            "BT" => { x = 0.0; y = 0.0; None }
            "Td" | "TD" => {
                if let [tx, ty] = operands {
                    if let (Some(tx), Some(ty)) = (number(tx), number(ty)) {
                        x += tx;
                        y += ty;
                        if op.operator == "TD" { leading = -ty; }
                    }
                }
                None
            }
            "Tm" => {
                if let [.., e, f] = operands {
                    if let (Some(e), Some(f)) = (number(e), number(f)) { x = e; y = f; }
                }
                None
            }
            "TL" => { leading = operands.first().and_then(number).unwrap_or(leading); None }
            "T*" => { y -= leading; None }
            "Tj" | "TJ" => Some(shown_text(operands.first())),
            "'" => { y -= leading; Some(shown_text(operands.first())) }
            "\"" => { y -= leading; Some(shown_text(operands.get(2))) }
            _ => None,
        };
        let Some(text) = shown else { continue };
        match cells.last_mut() {
            Some(last) if last.x == x && last.y == y => last.text.push_str(&text),
            _ => cells.push(TextCell { x, y, text }),
        }
    }
    cells.retain(|c| !c.text.trim().is_empty());
    cells
}

/// Group cells into rows (top to bottom) and report runs of two or more
/// consecutive rows with the same column starts as tables.
pub fn detect_tables(mut cells: Vec<TextCell>, page: u32) -> Vec<ExtractedTable> {
    cells.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
    let mut rows: Vec<Vec<TextCell>> = Vec::new();
    for cell in cells {
        match rows.last_mut() {
            Some(row) if (row[0].y - cell.y).abs() <= ROW_TOLERANCE => row.push(cell),
            _ => rows.push(vec![cell]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.x.total_cmp(&b.x));
    }

    let aligned = |a: &[TextCell], b: &[TextCell]| {
        a.len() >= 2 && a.len() == b.len() && a.iter().zip(b).all(|(p, q)| (p.x - q.x).abs() <= COLUMN_TOLERANCE)
    };

    let mut tables = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        while end < rows.len() && aligned(&rows[start], &rows[end]) { end += 1; }
        if end - start >= 2 {
            let data = rows[start..end]
                .iter()
                .map(|row| row.iter().map(|c| c.text.trim().to_string()).collect())
                .collect();
            tables.push(ExtractedTable { page, index: tables.len(), rows: data });
        }
        start = end;
    }
    tables
}

/// Tables found on one page. Pages whose content cannot be decoded have none.
pub fn page_tables(doc: &Document, page: u32, page_id: ObjectId) -> Vec<ExtractedTable> {
    match doc.get_and_decode_page_content(page_id) {
        Ok(content) => detect_tables(text_cells(&content.operations), page),
        Err(e) => {
            debug!(page, error = %e, "page content unreadable, no tables");
            Vec::new()
        }
    }
}

/// One stored table, keyed by source file and position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub file: String,
    pub page: u32,
    pub table_index: usize,
    pub data: Vec<Vec<String>>,
}

/// Table rows on disk as a JSON array; each build replaces the whole file.
#[derive(Debug, Clone)]
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    pub fn replace(&self, file: &str, tables: &[ExtractedTable]) -> Result<usize> {
        let records: Vec<TableRecord> = tables
            .iter()
            .map(|t| TableRecord { file: file.to_string(), page: t.page, table_index: t.index, data: t.rows.clone() })
            .collect();
        let json = serde_json::to_string_pretty(&records).map_err(|e| Error::Operation(format!("encode tables: {}", e)))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        info!(path = %self.path.display(), tables = records.len(), "table store written");
        Ok(records.len())
    }

    /// Stored records; a store that was never written is empty.
    pub fn load(&self) -> Result<Vec<TableRecord>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&json).map_err(|e| Error::Operation(format!("decode {}: {}", self.path.display(), e)))
    }

    fn io_error(&self, e: std::io::Error) -> Error { Error::Operation(format!("{}: {}", self.path.display(), e)) }
}
