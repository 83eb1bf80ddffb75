use figment::{providers::{Format, Toml}, Figment};

use pdfkb_core::chunker::{Boundary, Chunker, ChunkingConfig};
use pdfkb_core::config::Config;

fn long_document() -> String {
    let mut text = String::from("Title: Foo. Author: Bar.\n\n");
    for i in 0..400 {
        text.push_str(&format!("Sentence number {i} talks about the body of the report. "));
        if i % 7 == 0 { text.push('\n'); }
    }
    text
}

#[test]
fn chunking_terminates_and_covers_the_text() {
    let text = long_document();
    for boundary in [Boundary::Whitespace, Boundary::Sentence] {
        for (size, overlap) in [(1000, 100), (200, 199), (50, 0), (1, 0)] {
            let chunker = Chunker::new(ChunkingConfig { chunk_size: size, overlap, boundary }).expect("config");
            let chunks = chunker.chunk(&text);
            assert!(!chunks.is_empty(), "non-empty input yields chunks ({size}/{overlap})");
            // every word of the document appears in some chunk
            for word in text.split_whitespace().step_by(37) {
                assert!(chunks.iter().any(|c| c.contains(word)), "missing {word:?} ({size}/{overlap})");
            }
            for c in &chunks {
                assert!(c.chars().count() <= size + 50, "chunk too long ({size}/{overlap})");
                assert!(!c.trim().is_empty());
            }
        }
    }
}

#[test]
fn first_chunk_holds_the_document_header() {
    let chunks = Chunker::default().chunk_document(&long_document());
    assert_eq!(chunks[0].id, "chunk_0");
    assert!(chunks[0].text.starts_with("Title: Foo. Author: Bar."));
}

#[test]
fn settings_default_when_sections_are_missing() {
    let config = Config::from_figment(Figment::new());
    let settings = config.settings().expect("defaults are valid");
    assert_eq!(settings.chunking.chunk_size, 1000);
    assert_eq!(settings.chunking.overlap, 100);
    assert_eq!(settings.vector_store.top_k, 3);
    assert_eq!(settings.vector_store.table, "pdf_knowledge");
    assert_eq!(settings.generation.params.num_beams, 4);
    assert_eq!(settings.generation.params.max_input_tokens, 1024);
    assert!((settings.generation.params.repetition_penalty - 1.2).abs() < 1e-6);
}

#[test]
fn settings_read_toml_overrides() {
    let toml = r#"
        [chunking]
        chunk_size = 400
        overlap = 40
        boundary = "sentence"

        [generation]
        num_beams = 2
        temperature = 0.9
    "#;
    let config = Config::from_figment(Figment::new().merge(Toml::string(toml)));
    let settings = config.settings().expect("valid");
    assert_eq!(settings.chunking.chunk_size, 400);
    assert_eq!(settings.chunking.boundary, Boundary::Sentence);
    assert_eq!(settings.generation.params.num_beams, 2);
    // untouched keys keep their defaults
    assert_eq!(settings.generation.params.max_length, 200);
    let top_k: usize = config.get("vector_store.top_k").unwrap_or(3);
    assert_eq!(top_k, 3);
}

#[test]
fn settings_reject_overlap_not_smaller_than_chunk() {
    let toml = "[chunking]\nchunk_size = 100\noverlap = 100\n";
    let config = Config::from_figment(Figment::new().merge(Toml::string(toml)));
    let err = config.settings().expect_err("overlap >= chunk_size is invalid");
    assert!(err.to_string().contains("overlap"));
}

#[test]
fn settings_reject_zero_beams() {
    let toml = "[generation]\nnum_beams = 0\n";
    let config = Config::from_figment(Figment::new().merge(Toml::string(toml)));
    assert!(config.settings().is_err());
}

#[test]
fn extraction_settings_default_and_validate() {
    let settings = Config::from_figment(Figment::new()).settings().expect("defaults are valid");
    assert!(settings.extraction.caption_images);
    assert!(settings.extraction.extract_tables);
    assert_eq!(settings.extraction.min_image_side, 32);

    let toml = "[extraction]\nextract_tables = true\ntables_db_path = \"  \"\n";
    let err = Config::from_figment(Figment::new().merge(Toml::string(toml))).settings().expect_err("blank table path");
    assert!(err.to_string().contains("tables_db_path"));

    let toml = "[extraction]\nextract_tables = false\ntables_db_path = \"\"\n";
    assert!(Config::from_figment(Figment::new().merge(Toml::string(toml))).settings().is_ok());
}
