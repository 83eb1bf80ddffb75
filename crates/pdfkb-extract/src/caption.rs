use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Module, VarBuilder};
use candle_transformers::models::blip::{BlipForConditionalGeneration, Config as BlipConfig};
use image::imageops::FilterType;
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use pdfkb_core::config::{expand_path, ExtractionSettings};
use pdfkb_embed::select_device;

/// Turns one picture into a short description.
pub trait ImageCaptioner: Send + Sync {
    fn caption(&self, image: &DynamicImage) -> Result<String>;
}

const IMAGE_SIZE: u32 = 384;
const BOS_TOKEN: u32 = 30522;
const SEP_TOKEN: u32 = 102;
const MAX_CAPTION_TOKENS: usize = 30;
const MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// BLIP image captioning (large checkpoint) with greedy decoding.
pub struct BlipCaptioner {
    model: Mutex<BlipForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
}

impl BlipCaptioner {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading image captioning model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config = BlipConfig::image_captioning_large();
        let weights = model_dir.join("model.safetensors");
        // SAFETY: the weights file is not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = BlipForConditionalGeneration::new(&config, vb)?;
        info!("image captioning model loaded");
        Ok(Self { model: Mutex::new(model), tokenizer, device })
    }

    /// `[3, 384, 384]` normalised pixel tensor.
    fn pixels(&self, image: &DynamicImage) -> Result<Tensor> {
        let rgb = image.resize_to_fill(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle).to_rgb8();
        let side = IMAGE_SIZE as usize;
        let data = Tensor::from_vec(rgb.into_raw(), (side, side, 3), &Device::Cpu)?.permute((2, 0, 1))?;
        let mean = Tensor::new(&MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&STD, &Device::Cpu)?.reshape((3, 1, 1))?;
        let normalised = (data.to_dtype(DType::F32)? / 255.)?.broadcast_sub(&mean)?.broadcast_div(&std)?;
        Ok(normalised.to_device(&self.device)?)
    }
}

impl ImageCaptioner for BlipCaptioner {
    fn caption(&self, image: &DynamicImage) -> Result<String> {
        let started = Instant::now();
        let pixels = self.pixels(image)?.unsqueeze(0)?;
        let mut model = self.model.lock().map_err(|_| anyhow!("captioning model lock poisoned"))?;
        model.reset_kv_cache();
        let image_embeds = model.vision_model().forward(&pixels)?;

        let mut tokens = vec![BOS_TOKEN];
        for step in 0..MAX_CAPTION_TOKENS {
            // the decoder keeps a kv cache, so only the newest token is fed after the first step
            let context = if step > 0 { &tokens[tokens.len() - 1..] } else { &tokens[..] };
            let input_ids = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = model.text_decoder().forward(&input_ids, &image_embeds)?.squeeze(0)?;
            let last = logits.get(logits.dim(0)? - 1)?;
            let next = last.argmax(0)?.to_scalar::<u32>()?;
            if next == SEP_TOKEN { break; }
            tokens.push(next);
        }
        drop(model);

        let caption = self.tokenizer.decode(&tokens[1..], true).map_err(|e| anyhow!("detokenize failed: {}", e))?;
        debug!(tokens = tokens.len() - 1, ms = started.elapsed().as_millis() as u64, "captioned image");
        Ok(caption.trim().to_string())
    }
}

/// Deterministic stand-in: size and overall brightness.
#[derive(Debug, Default, Clone)]
pub struct FakeCaptioner;

impl ImageCaptioner for FakeCaptioner {
    fn caption(&self, image: &DynamicImage) -> Result<String> {
        let gray = image.to_luma8();
        let pixels = u64::from(gray.width()) * u64::from(gray.height());
        let total: u64 = gray.pixels().map(|p| u64::from(p.0[0])).sum();
        let tone = if pixels > 0 && total / pixels >= 128 { "light" } else { "dark" };
        Ok(format!("a {} image of {}x{} pixels", tone, gray.width(), gray.height()))
    }
}

fn fake_requested(settings: &ExtractionSettings) -> bool {
    settings.use_fake_captions
        || std::env::var("APP_USE_FAKE_CAPTIONS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Captioner named by `settings`, or `None` when captioning is off or the
/// model cannot be loaded; extraction then proceeds without captions.
pub fn get_default_captioner(settings: &ExtractionSettings) -> Option<Box<dyn ImageCaptioner>> {
    if !settings.caption_images { return None; }
    if fake_requested(settings) { info!("using FakeCaptioner"); return Some(Box::new(FakeCaptioner)); }
    match resolve_model_dir(&settings.caption_model_dir).and_then(|dir| BlipCaptioner::load(&dir)) {
        Ok(captioner) => Some(Box::new(captioner)),
        Err(e) => {
            warn!(error = %e, "image captioning unavailable, images will be skipped");
            None
        }
    }
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    let p = expand_path(configured);
    if p.exists() { return Ok(p); }
    let parent = Path::new("..").join(&p);
    if parent.exists() { return Ok(parent); }
    Err(anyhow!("Could not locate captioning model directory {}", p.display()))
}
