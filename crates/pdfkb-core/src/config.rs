//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_VECTOR_STORE__TOP_K=5`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::Error;
use crate::traits::GenerationParams;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests, embedding hosts).
    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of every section, defaults filled in, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub generation: GenerationSettings,
    pub extraction: ExtractionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: "models/all-MiniLM-L6-v2".to_string(), max_len: 256, use_fake: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub db_path: String,
    pub table: String,
    pub top_k: usize,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self { db_path: "./kb_db".to_string(), table: "pdf_knowledge".to_string(), top_k: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model_dir: String,
    pub use_fake: bool,
    #[serde(flatten)]
    pub params: GenerationParams,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { model_dir: "models/flan-t5-base".to_string(), use_fake: false, params: GenerationParams::default() }
    }
}

/// PDF extraction extras: image captions and the side table store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub caption_images: bool,
    pub caption_model_dir: String,
    pub use_fake_captions: bool,
    /// Images narrower or shorter than this are ignored (bullets, rules, logos).
    pub min_image_side: u32,
    pub extract_tables: bool,
    pub tables_db_path: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            caption_images: true,
            caption_model_dir: "models/blip-image-captioning-large".to_string(),
            use_fake_captions: false,
            min_image_side: 32,
            extract_tables: true,
            tables_db_path: "./tables_db.json".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        if self.embedding.max_len == 0 {
            return Err(Error::invalid_config("embedding.max_len must be > 0"));
        }
        if self.vector_store.top_k == 0 {
            return Err(Error::invalid_config("vector_store.top_k must be > 0"));
        }
        if self.vector_store.table.trim().is_empty() {
            return Err(Error::invalid_config("vector_store.table must not be empty"));
        }
        let p = &self.generation.params;
        if p.num_beams == 0 {
            return Err(Error::invalid_config("generation.num_beams must be > 0"));
        }
        if p.max_length < p.min_length {
            return Err(Error::invalid_config(format!(
                "generation.max_length ({}) is below generation.min_length ({})",
                p.max_length, p.min_length
            )));
        }
        if p.max_input_tokens == 0 {
            return Err(Error::invalid_config("generation.max_input_tokens must be > 0"));
        }
        if p.temperature.is_nan() || p.temperature <= 0.0 {
            return Err(Error::invalid_config("generation.temperature must be > 0"));
        }
        if self.extraction.extract_tables && self.extraction.tables_db_path.trim().is_empty() {
            return Err(Error::invalid_config("extraction.tables_db_path must not be empty"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
