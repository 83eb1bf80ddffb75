//! PDF text extraction for knowledge-base builds.
//!
//! `pdf-extract` does the layout-aware pass; when it fails (odd fonts,
//! broken xref tables) the text operators are read page by page with `lopdf`.
//! Each page then contributes a `[TABLE_EXTRACTED_PAGE_<p>_ID_<i>]` marker
//! per detected table and an `[IMAGE_DESC: <caption>]` line per captioned
//! image, appended after the body text in page order.

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use pdfkb_core::config::{expand_path, ExtractionSettings};
use pdfkb_core::error::{Error, Result};

mod caption;
mod images;
mod tables;

pub use caption::{get_default_captioner, BlipCaptioner, FakeCaptioner, ImageCaptioner};
pub use tables::{ExtractedTable, TableRecord, TableStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: usize,
    pub tables: Vec<ExtractedTable>,
    pub image_captions: Vec<String>,
}

impl ExtractedDocument {
    pub fn char_count(&self) -> usize { self.text.chars().count() }
}

pub struct Extractor {
    captioner: Option<Box<dyn ImageCaptioner>>,
    min_image_side: u32,
    table_store: Option<TableStore>,
}

impl Extractor {
    /// Tables are detected only when `table_store` is given; images are
    /// described only when `captioner` is.
    pub fn new(captioner: Option<Box<dyn ImageCaptioner>>, min_image_side: u32, table_store: Option<TableStore>) -> Self {
        Self { captioner, min_image_side, table_store }
    }

    /// Plain text, no tables or captions.
    pub fn text_only() -> Self { Self::new(None, u32::MAX, None) }

    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        let table_store = settings.extract_tables.then(|| TableStore::new(expand_path(&settings.tables_db_path)));
        Self::new(get_default_captioner(settings), settings.min_image_side, table_store)
    }

    pub fn table_store(&self) -> Option<&TableStore> { self.table_store.as_ref() }

    /// Read `path` and return its text. A document without any extractable
    /// content (scanned, no captioner) is [`Error::EmptyDocument`].
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let display = path.display().to_string();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::NotFound(display)),
            Err(e) => return Err(Error::extraction(&display, e.to_string())),
        };
        self.extract_bytes(&display, &data)
    }

    /// Same as [`Extractor::extract`] for an in-memory file; `name` only labels errors.
    pub fn extract_bytes(&self, name: &str, data: &[u8]) -> Result<ExtractedDocument> {
        let started = Instant::now();
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(name, format!("not a readable PDF: {}", e)))?;
        let pages = doc.get_pages();

        let mut text = match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data)) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(file = name, error = %e, "pdf-extract failed, falling back to lopdf");
                extract_with_lopdf(name, &doc)
            }
            Err(_) => {
                warn!(file = name, "pdf-extract panicked, falling back to lopdf");
                extract_with_lopdf(name, &doc)
            }
        };

        let mut tables = Vec::new();
        let mut image_captions = Vec::new();
        for (&page, &page_id) in &pages {
            if self.table_store.is_some() {
                for table in tables::page_tables(&doc, page, page_id) {
                    text.push_str(&format!("\n{}\n", table.marker()));
                    tables.push(table);
                }
            }
            let Some(captioner) = &self.captioner else { continue };
            for image in images::page_images(&doc, page_id, self.min_image_side) {
                match captioner.caption(&image.image) {
                    Ok(caption) if !caption.is_empty() => {
                        text.push_str(&format!("\n[IMAGE_DESC: {}]\n", caption));
                        image_captions.push(caption);
                    }
                    Ok(_) => debug!(file = name, page, image = %image.name, "empty caption"),
                    Err(e) => warn!(file = name, page, image = %image.name, error = %e, "captioning failed"),
                }
            }
        }

        if text.trim().is_empty() {
            return Err(Error::EmptyDocument(name.to_string()));
        }
        let extracted = ExtractedDocument { text, page_count: pages.len(), tables, image_captions };
        info!(
            file = name,
            pages = extracted.page_count,
            chars = extracted.char_count(),
            tables = extracted.tables.len(),
            images = extracted.image_captions.len(),
            ms = started.elapsed().as_millis() as u64,
            "extracted text"
        );
        Ok(extracted)
    }

    /// Write `doc`'s tables to the side store, replacing what was there.
    /// Does nothing when table extraction is off.
    pub fn save_tables(&self, file: &str, doc: &ExtractedDocument) -> Result<usize> {
        match &self.table_store {
            Some(store) => store.replace(file, &doc.tables),
            None => Ok(0),
        }
    }
}

fn extract_with_lopdf(name: &str, doc: &lopdf::Document) -> String {
    let mut text = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(page_text) => {
                text.push_str("\n\n");
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => debug!(file = name, page, error = %e, "no text on page"),
        }
    }
    text
}
