//! Domain types shared by the chunker, the vector store and the query engine.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Prefix of every positional chunk identifier.
pub const CHUNK_ID_PREFIX: &str = "chunk_";

/// Positional identifier of the chunk at `index` (`chunk_0`, `chunk_1`, ...).
pub fn chunk_id(index: usize) -> ChunkId {
    format!("{CHUNK_ID_PREFIX}{index}")
}

/// A substring of the source document that is independently indexed.
///
/// - `id`: positional identifier, see [`chunk_id`]; only stable while the
///   document text is unchanged
/// - `text`: the text payload of the chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
}

impl Chunk {
    /// Assign positional ids to an ordered list of chunk texts.
    pub fn from_texts(texts: &[String]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk { id: chunk_id(i), text: text.clone() })
            .collect()
    }
}

/// Nearest-neighbour hits for one query.
///
/// `chunks` and `distances` are parallel and ordered by ascending distance;
/// lower distance means more similar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<String>,
    pub distances: Vec<f32>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn len(&self) -> usize { self.chunks.len() }

    /// Distance of the best hit, if any.
    pub fn best_distance(&self) -> Option<f32> { self.distances.first().copied() }
}

/// What the engine hands back to its caller.
///
/// `source_chunks` is empty for answers that did not go through retrieval
/// (help text, invalid input, errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source_chunks: Vec<String>,
}

impl Answer {
    /// An answer that was produced without consulting the document.
    pub fn without_sources(text: impl Into<String>) -> Self {
        Self { text: text.into(), source_chunks: Vec::new() }
    }
}
