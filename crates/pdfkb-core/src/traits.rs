use crate::types::RetrievalResult;

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Persistent similarity index over the chunks of one document.
///
/// Mutations take `&mut self`: a rebuild (`clear` + `add_documents`) can never
/// run while a query holds the store.
pub trait VectorStore: Send + Sync {
    /// Embed `texts`, assign ids `chunk_0..chunk_n` and persist them.
    /// Fails if an id is already present or embedding fails.
    fn add_documents(&mut self, texts: &[String]) -> anyhow::Result<usize>;

    /// Drop the collection and recreate it empty.
    fn clear(&mut self) -> anyhow::Result<()>;

    /// Top-`k` nearest chunks to `query`, ascending by distance. An empty
    /// collection yields an empty result.
    fn search_with_score(&self, query: &str, k: usize) -> anyhow::Result<RetrievalResult>;

    /// Point lookup; `Ok(None)` when the id is absent.
    fn get_by_id(&self, id: &str) -> anyhow::Result<Option<String>>;

    /// Texts only, same ordering as [`VectorStore::search_with_score`].
    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<String>> {
        Ok(self.search_with_score(query, k)?.chunks)
    }

    fn count(&self) -> anyhow::Result<usize>;

    /// Release the backing store.
    fn close(self) -> anyhow::Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Decoding parameters for one generation call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub max_input_tokens: usize,
    pub max_length: usize,
    pub min_length: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
    pub length_penalty: f32,
    pub repetition_penalty: f32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_input_tokens: 1024,
            max_length: 200,
            min_length: 2,
            num_beams: 4,
            early_stopping: true,
            length_penalty: 1.0,
            repetition_penalty: 1.2,
            temperature: 0.5,
        }
    }
}

pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`; special tokens are stripped from the output.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}

impl<T: Generator + ?Sized> Generator for Box<T> {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> { (**self).generate(prompt, params) }
}
