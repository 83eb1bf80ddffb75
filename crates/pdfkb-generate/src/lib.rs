//! Answer generation.
//!
//! [`T5Generator`] runs a local Flan-T5 checkpoint with deterministic beam
//! search; [`ExtractiveGenerator`] is the model-free fallback selected by
//! `generation.use_fake` or `APP_USE_FAKE_GENERATION=1`.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;

use pdfkb_core::config::{expand_path, GenerationSettings};
use pdfkb_core::traits::Generator;

pub mod beam;
mod extractive;
mod t5;

pub use extractive::ExtractiveGenerator;
pub use t5::{truncate_input, T5Generator};

fn fake_requested(settings: &GenerationSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_GENERATION").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_generator(settings: &GenerationSettings) -> Result<Box<dyn Generator>> {
    if fake_requested(settings) { info!("using ExtractiveGenerator"); return Ok(Box::new(ExtractiveGenerator)); }
    let dir = resolve_model_dir(&settings.model_dir)?;
    Ok(Box::new(T5Generator::load(&dir)?))
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_GEN_MODEL_DIR") { let p = expand_path(&dir); if p.exists() { return Ok(p); } }
    let p = expand_path(configured);
    if p.exists() { return Ok(p); }
    let parent = Path::new("..").join(&p);
    if parent.exists() { return Ok(parent); }
    Err(anyhow!("Could not locate generation model directory {}", p.display()))
}
