use anyhow::Result;
use std::path::Path;
use tracing::info;

use pdfkb_core::chunker::Chunker;
use pdfkb_core::error::Error;
use pdfkb_core::traits::VectorStore;
use pdfkb_extract::Extractor;

/// Replace everything in `store` with the chunks of `text`.
///
/// The store is only cleared once chunking produced something to index.
pub fn build_knowledge_base<VS: VectorStore>(store: &mut VS, chunker: &Chunker, text: &str) -> Result<usize> {
    let chunks = chunker.chunk(text);
    if chunks.is_empty() {
        return Err(Error::EmptyDocument("document text produced no chunks".to_string()).into());
    }
    info!(chunks = chunks.len(), chars = text.chars().count(), "rebuilding knowledge base");
    store.clear()?;
    let added = store.add_documents(&chunks)?;
    info!(chunks = added, "knowledge base ready");
    Ok(added)
}

/// Extract `path` and rebuild the store from its text. Detected tables go
/// to the extractor's side store once the rebuild succeeded.
pub fn build_from_pdf<VS: VectorStore>(store: &mut VS, chunker: &Chunker, extractor: &Extractor, path: &Path) -> Result<usize> {
    let doc = extractor.extract(path)?;
    let added = build_knowledge_base(store, chunker, &doc.text)?;
    let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string());
    let tables = extractor.save_tables(&file, &doc)?;
    if tables > 0 {
        info!(tables, "tables stored");
    }
    Ok(added)
}
