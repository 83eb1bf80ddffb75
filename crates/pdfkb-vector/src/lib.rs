//! Vector store adapter over an on-disk LanceDB table.
//!
//! Every mutation is written straight to the database directory; there is no
//! in-memory mode. The async LanceDB client is driven from a private
//! current-thread runtime so callers stay synchronous.

use anyhow::{Result, anyhow, bail};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use pdfkb_core::config::{expand_path, EmbeddingSettings, VectorStoreSettings};
use pdfkb_core::error::Error;
use pdfkb_core::traits::{Embedder, VectorStore};
use pdfkb_core::types::{chunk_id, RetrievalResult};
use pdfkb_embed::get_default_embedder;

pub mod schema;
pub mod table;

use schema::{build_chunk_schema, vector_dim};
use table::{ensure_table, f32_column, open_db, recreate_table, sql_literal, string_column};

const EMBED_BATCH: usize = 32;

pub struct LanceVectorStore { rt: Runtime, db: Connection, table_name: String, embedder: Box<dyn Embedder> }

impl LanceVectorStore {
    pub fn open(db_path: &Path, table_name: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        std::fs::create_dir_all(db_path)?;
        let db = rt.block_on(open_db(db_path.to_string_lossy().as_ref()))?;
        rt.block_on(ensure_table(&db, table_name, build_chunk_schema(embedder.dim())))?;
        let store = Self { rt, db, table_name: table_name.to_string(), embedder };
        let stored_dim = store.rt.block_on(store.stored_dim())?;
        if stored_dim != Some(store.embedder.dim()) {
            warn!(table = table_name, ?stored_dim, embedder_dim = store.embedder.dim(), "stored vectors do not match the embedder; rebuild the knowledge base");
        }
        info!(path = %db_path.display(), table = table_name, "vector store opened");
        Ok(store)
    }

    /// Open the store named in configuration with the configured embedder.
    pub fn from_settings(store: &VectorStoreSettings, embedding: &EmbeddingSettings) -> Result<Self> {
        let embedder = get_default_embedder(embedding)?;
        Self::open(&expand_path(&store.db_path), &store.table, embedder)
    }

    async fn table(&self) -> Result<Table> { Ok(self.db.open_table(&self.table_name).execute().await?) }

    async fn stored_dim(&self) -> Result<Option<usize>> {
        let schema = self.table().await?.schema().await?;
        Ok(vector_dim(&schema))
    }

    async fn append(&self, batch: RecordBatch) -> Result<()> {
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table().await?.add(reader).execute().await?;
        Ok(())
    }

    async fn nearest(&self, query_vec: Vec<f32>, k: usize) -> Result<Vec<(String, f32)>> {
        let mut stream = self.table().await?.vector_search(query_vec)?.distance_type(DistanceType::L2).limit(k).execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let text = string_column(&batch, "text")?;
            let dist = f32_column(&batch, "_distance")?;
            for i in 0..batch.num_rows() { hits.push((text.value(i).to_string(), dist.value(i))); }
        }
        Ok(hits)
    }

    async fn lookup(&self, id: &str) -> Result<Option<String>> {
        let filter = format!("id = {}", sql_literal(id));
        let mut stream = self.table().await?.query().only_if(filter).limit(1).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            if batch.num_rows() == 0 { continue; }
            return Ok(Some(string_column(&batch, "text")?.value(0).to_string()));
        }
        Ok(None)
    }

    async fn row_count(&self) -> Result<usize> { Ok(self.table().await?.count_rows(None).await?) }

    async fn stored_ids(&self) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        let mut stream = self.table().await?.query().select(Select::columns(&["id"])).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            let col = string_column(&batch, "id")?;
            for i in 0..batch.num_rows() { ids.insert(col.value(i).to_string()); }
        }
        Ok(ids)
    }

    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let pb = ProgressBar::new(texts.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
            .map_err(|e| anyhow!("progress template: {}", e))?
            .progress_chars("#>-");
        pb.set_style(style);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let embs = self.embedder.embed_batch(batch)?;
            if embs.len() != batch.len() { bail!("embedder returned {} vectors for {} texts", embs.len(), batch.len()); }
            out.extend(embs);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        Ok(out)
    }

    fn to_record_batch(&self, ids: Vec<String>, texts: &[String], vectors: Vec<Vec<f32>>) -> Result<RecordBatch> {
        let dim = self.embedder.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) { bail!("embedding has {} dims, expected {}", bad.len(), dim); }
        let vectors = vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>()));
        Ok(RecordBatch::try_new(build_chunk_schema(dim), vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(texts.to_vec())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim as i32)),
        ])?)
    }
}

impl VectorStore for LanceVectorStore {
    fn add_documents(&mut self, texts: &[String]) -> Result<usize> {
        if texts.is_empty() { return Ok(0); }
        let ids: Vec<String> = (0..texts.len()).map(chunk_id).collect();
        let existing = self.rt.block_on(self.stored_ids())?;
        if let Some(dup) = ids.iter().find(|id| existing.contains(*id)) {
            return Err(Error::DuplicateId(dup.clone()).into());
        }
        let vectors = self.embed_all(texts)?;
        let batch = self.to_record_batch(ids, texts, vectors)?;
        self.rt.block_on(self.append(batch))?;
        info!(count = texts.len(), table = %self.table_name, "added chunks");
        Ok(texts.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.rt.block_on(recreate_table(&self.db, &self.table_name, build_chunk_schema(self.embedder.dim())))?;
        info!(table = %self.table_name, "collection cleared");
        Ok(())
    }

    fn search_with_score(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 || self.count()? == 0 { return Ok(RetrievalResult::default()); }
        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;
        let mut hits = self.rt.block_on(self.nearest(query_vec, k))?;
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(k, distances = ?hits.iter().map(|h| h.1).collect::<Vec<_>>(), "vector search");
        let (chunks, distances) = hits.into_iter().unzip();
        Ok(RetrievalResult { chunks, distances })
    }

    fn get_by_id(&self, id: &str) -> Result<Option<String>> {
        self.rt.block_on(self.lookup(id))
    }

    fn count(&self) -> Result<usize> {
        self.rt.block_on(self.row_count())
    }

    fn close(self) -> Result<()> {
        info!(table = %self.table_name, "vector store closed");
        drop(self.db);
        Ok(())
    }
}
