use pdfkb_core::config::GenerationSettings;
use pdfkb_core::traits::{GenerationParams, Generator};
use pdfkb_generate::beam::beam_search;
use pdfkb_generate::{get_default_generator, ExtractiveGenerator};

#[test]
fn fake_setting_selects_extractive_generator() {
    let settings = GenerationSettings { use_fake: true, model_dir: "/nonexistent/model".into(), ..GenerationSettings::default() };
    let generator = get_default_generator(&settings).expect("fake generator needs no weights");
    let out = generator
        .generate("Context:\nValves are checked weekly.\n\nQuestion: How often are valves checked?\n\nAnswer:", &settings.params)
        .unwrap();
    assert_eq!(out, "Valves are checked weekly");
}

#[test]
fn missing_model_dir_is_an_error() {
    if std::env::var("APP_USE_FAKE_GENERATION").is_ok() { return; }
    let settings = GenerationSettings { model_dir: "/nonexistent/flan-t5".into(), ..GenerationSettings::default() };
    assert!(get_default_generator(&settings).is_err());
}

#[test]
fn extractive_output_respects_max_length() {
    let params = GenerationParams { max_length: 3, ..GenerationParams::default() };
    let out = ExtractiveGenerator
        .generate("Context:\nsolar panels charge the battery bank slowly\n\nQuestion: what charges the battery?", &params)
        .unwrap();
    assert_eq!(out, "solar panels charge");
}

#[test]
fn search_is_deterministic() {
    let params = GenerationParams::default();
    let logits = |prefix: &[u32]| -> anyhow::Result<Vec<f32>> {
        let n = prefix.len() as f32;
        Ok(vec![-10.0, n - 3.0, 1.0 / n, 0.5, 0.25])
    };
    let first = beam_search(&params, 0, 1, logits).unwrap();
    let second = beam_search(&params, 0, 1, logits).unwrap();
    assert_eq!(first, second);
    assert!(first.len() + 1 <= params.max_length);
}
