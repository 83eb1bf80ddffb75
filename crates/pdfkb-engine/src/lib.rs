//! Retrieval orchestration: question in, displayable answer out.
//!
//! [`QueryEngine`] owns a vector store and a generator. Each question runs
//! validate, help check, retrieve, summary augmentation, prompt assembly,
//! generate and post-process; any failure on the way becomes an
//! `"Error: ..."` answer instead of propagating.

use anyhow::Result;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use pdfkb_core::chunker::Chunker;
use pdfkb_core::config::Settings;
use pdfkb_core::traits::{GenerationParams, Generator, VectorStore};
use pdfkb_core::types::{chunk_id, Answer};
use pdfkb_generate::get_default_generator;
use pdfkb_vector::LanceVectorStore;

pub mod intent;
pub mod kb;
pub mod prompt;

pub use intent::Instruction;
pub use kb::{build_from_pdf, build_knowledge_base};
pub use pdfkb_extract::{Extractor, TableRecord, TableStore};

use intent::{is_help_request, is_summary_request, normalize};
use prompt::{build_context, build_prompt, EMPTY_GENERATION, HELP_TEXT, INVALID_QUESTION};

/// Chunks prepended for summary-style questions, in prepend order.
const INTRO_CHUNKS: [usize; 2] = [1, 0];

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0:#}")]
    Retrieval(anyhow::Error),

    #[error("{0:#}")]
    Generation(anyhow::Error),
}

impl QueryError {
    fn stage(&self) -> &'static str {
        match self {
            Self::Retrieval(_) => "retrieval",
            Self::Generation(_) => "generation",
        }
    }

    pub fn into_answer(self) -> Answer { Answer::without_sources(format!("Error: {}", self)) }
}

/// What the engine decided to do with a question before calling the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Terminal reply that needs neither retrieval nor generation.
    Reply(Answer),
    Generate(PreparedPrompt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
    pub instruction: Instruction,
    pub context_chunks: Vec<String>,
    pub prompt: String,
}

pub struct QueryEngine<VS, G> where VS: VectorStore, G: Generator {
    store: VS,
    generator: G,
    chunker: Chunker,
    params: GenerationParams,
    top_k: usize,
}

pub type DefaultQueryEngine = QueryEngine<LanceVectorStore, Box<dyn Generator>>;

impl<VS, G> QueryEngine<VS, G> where VS: VectorStore, G: Generator {
    pub fn new(store: VS, generator: G, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::new(settings.chunking.clone())?;
        Ok(Self { store, generator, chunker, params: settings.generation.params.clone(), top_k: settings.vector_store.top_k })
    }

    pub fn store(&self) -> &VS { &self.store }

    pub fn generator(&self) -> &G { &self.generator }

    /// Boundary method: always returns something to show the user.
    pub fn answer_question(&self, question: &str) -> Answer {
        self.try_answer(question).unwrap_or_else(|e| {
            warn!(stage = e.stage(), error = %e, "question failed");
            e.into_answer()
        })
    }

    pub fn try_answer(&self, question: &str) -> Result<Answer, QueryError> {
        let prepared = match self.plan(question)? {
            Plan::Reply(answer) => return Ok(answer),
            Plan::Generate(prepared) => prepared,
        };
        let generated = self.generator.generate(&prepared.prompt, &self.params).map_err(QueryError::Generation)?;
        let text = generated.trim();
        let text = if text.is_empty() { EMPTY_GENERATION.to_string() } else { text.to_string() };
        Ok(Answer { text, source_chunks: prepared.context_chunks })
    }

    /// Everything up to (not including) the model call.
    pub fn plan(&self, question: &str) -> Result<Plan, QueryError> {
        if question.trim().is_empty() {
            return Ok(Plan::Reply(Answer::without_sources(INVALID_QUESTION)));
        }
        let normalized = normalize(question);
        if is_help_request(&normalized) {
            debug!("help request");
            return Ok(Plan::Reply(Answer::without_sources(HELP_TEXT)));
        }

        let retrieved = self.store.search_with_score(question, self.top_k).map_err(QueryError::Retrieval)?;
        debug!(hits = retrieved.len(), best = ?retrieved.best_distance(), distances = ?retrieved.distances, "retrieved");
        let mut chunks = retrieved.chunks;
        if is_summary_request(&normalized) {
            self.prepend_intro_chunks(&mut chunks);
        }

        let instruction = Instruction::select(&normalized);
        debug!(?instruction, context_chunks = chunks.len(), "prompt assembled");
        let prompt = build_prompt(instruction, &build_context(&chunks), question);
        Ok(Plan::Generate(PreparedPrompt { instruction, context_chunks: chunks, prompt }))
    }

    /// Put the opening chunks (title, author, abstract) in front; lookups
    /// that fail are skipped.
    fn prepend_intro_chunks(&self, chunks: &mut Vec<String>) {
        for index in INTRO_CHUNKS {
            let id = chunk_id(index);
            match self.store.get_by_id(&id) {
                Ok(Some(text)) if !chunks.contains(&text) => chunks.insert(0, text),
                Ok(Some(_)) => {}
                Ok(None) => debug!(id = %id, "intro chunk absent"),
                Err(e) => warn!(id = %id, error = %e, "could not fetch intro chunk"),
            }
        }
    }

    /// Chunk `text` and replace the indexed document with it.
    pub fn rebuild(&mut self, text: &str) -> Result<usize> {
        build_knowledge_base(&mut self.store, &self.chunker, text)
    }

    /// Extract `path` and replace the indexed document with it.
    pub fn rebuild_from_pdf(&mut self, extractor: &Extractor, path: &Path) -> Result<usize> {
        build_from_pdf(&mut self.store, &self.chunker, extractor, path)
    }

    pub fn close(self) -> Result<()> {
        drop(self.generator);
        self.store.close()?;
        info!("query engine closed");
        Ok(())
    }
}

impl DefaultQueryEngine {
    /// Open the on-disk store and load the generator named in `settings`.
    pub fn open(settings: &Settings) -> Result<Self> {
        let store = LanceVectorStore::from_settings(&settings.vector_store, &settings.embedding)?;
        let generator = get_default_generator(&settings.generation)?;
        Self::new(store, generator, settings)
    }
}
