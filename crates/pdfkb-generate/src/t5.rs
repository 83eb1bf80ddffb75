use anyhow::{Result, anyhow};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use pdfkb_core::traits::{GenerationParams, Generator};
use pdfkb_embed::select_device;

use crate::beam::beam_search;

/// Flan-T5 style encoder-decoder run locally through candle.
pub struct T5Generator {
    model: Mutex<T5ForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
    start_token: u32,
    eos_token: u32,
}

impl T5Generator {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading generation model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let mut config: T5Config = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        // every beam re-runs the decoder over its whole prefix
        config.use_cache = false;
        let weights = model_dir.join("model.safetensors");
        // SAFETY: the weights file is not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = T5ForConditionalGeneration::load(vb, &config)?;
        let start_token = config.decoder_start_token_id.unwrap_or(config.pad_token_id) as u32;
        let eos_token = config.eos_token_id as u32;
        info!(vocab = config.vocab_size, "generation model loaded");
        Ok(Self { model: Mutex::new(model), tokenizer, device, start_token, eos_token })
    }

    fn encode_prompt(&self, prompt: &str, max_input_tokens: usize) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(prompt, true).map_err(|e| anyhow!("tokenize failed: {}", e))?;
        let ids = encoding.get_ids().to_vec();
        if ids.len() > max_input_tokens {
            debug!(tokens = ids.len(), max_input_tokens, "prompt truncated");
        }
        Ok(truncate_input(ids, max_input_tokens, self.eos_token))
    }
}

/// Keep at most `max` ids (at least one), ending in `eos` when anything was cut.
pub fn truncate_input(mut ids: Vec<u32>, max: usize, eos: u32) -> Vec<u32> {
    let max = max.max(1);
    if ids.len() > max {
        ids.truncate(max - 1);
        ids.push(eos);
    }
    ids
}

/// Detokenize generated ids without special tokens (pad, eos).
fn decode_answer(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    let text = tokenizer.decode(ids, true).map_err(|e| anyhow!("detokenize failed: {}", e))?;
    Ok(text.trim().to_string())
}

impl Generator for T5Generator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let started = Instant::now();
        let ids = self.encode_prompt(prompt, params.max_input_tokens)?;
        let input = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let mut model = self.model.lock().map_err(|_| anyhow!("generation model lock poisoned"))?;
        model.clear_kv_cache();
        let encoder_output = model.encode(&input)?;
        let device = &self.device;
        let tokens = beam_search(params, self.start_token, self.eos_token, |prefix| {
            let decoder_input = Tensor::new(prefix, device)?.unsqueeze(0)?;
            let logits = model.decode(&decoder_input, &encoder_output)?;
            Ok(logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
        })?;
        drop(model);

        let text = decode_answer(&self.tokenizer, &tokens)?;
        debug!(input_tokens = ids.len(), output_tokens = tokens.len(), ms = started.elapsed().as_millis() as u64, "generated");
        Ok(text)
    }
}
