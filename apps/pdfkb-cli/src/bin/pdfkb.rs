use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdfkb_core::chunker::Chunker;
use pdfkb_core::config::{expand_path, Config};
use pdfkb_core::traits::VectorStore;
use pdfkb_core::types::Answer;
use pdfkb_engine::{build_from_pdf, DefaultQueryEngine, Extractor, TableRecord, TableStore};
use pdfkb_vector::LanceVectorStore;

const PREVIEW_CHARS: usize = 300;
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Parser)]
#[command(name = "pdfkb", about = "Ask questions about a PDF using local models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and index a PDF, replacing the current knowledge base
    Build { pdf: PathBuf },
    /// Answer a single question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Ask questions interactively until quit/exit/q
    Chat,
    /// Show the tables stored by the last build
    Tables,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(io::stderr).init();
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

fn print_answer(answer: &Answer) {
    println!("\n💡 Answer: {}", answer.text);
    if answer.source_chunks.is_empty() { return; }
    println!("\n🔍 Sources:");
    for (i, chunk) in answer.source_chunks.iter().enumerate() {
        println!("  [{}] {}", i + 1, preview(chunk));
    }
}

fn print_tables(records: &[TableRecord]) {
    if records.is_empty() {
        println!("No tables found in database.");
        return;
    }
    for record in records {
        println!("\n📊 {} page {} table {}", record.file, record.page, record.table_index);
        for row in &record.data {
            println!("  | {} |", row.join(" | "));
        }
    }
}

fn chat(engine: &DefaultQueryEngine) -> Result<()> {
    println!("{}\n🎯 PDF Knowledge Base Ready!\n{}", "=".repeat(50), "=".repeat(50));
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\n❓ Ask a question about the PDF (or 'quit' to exit): ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let question = line?;
        let question = question.trim();
        if QUIT_WORDS.contains(&question.to_lowercase().as_str()) { break; }
        if question.is_empty() { continue; }
        print_answer(&engine.answer_question(question));
        println!("{}", "-".repeat(50));
    }
    println!("👋 Goodbye!");
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;

    match cli.command {
        Command::Build { pdf } => {
            let mut store = LanceVectorStore::from_settings(&settings.vector_store, &settings.embedding)?;
            let chunker = Chunker::new(settings.chunking.clone())?;
            let extractor = Extractor::from_settings(&settings.extraction);
            println!("📄 Building knowledge base from {}", pdf.display());
            let count = build_from_pdf(&mut store, &chunker, &extractor, &pdf)?;
            println!("✅ Knowledge base ready ({} chunks)", count);
            if let Some(tables) = extractor.table_store() {
                println!("📊 Tables saved to {}", tables.path().display());
            }
            store.close()?;
        }
        Command::Ask { question } => {
            let engine = DefaultQueryEngine::open(&settings)?;
            print_answer(&engine.answer_question(&question.join(" ")));
            engine.close()?;
        }
        Command::Chat => {
            let engine = DefaultQueryEngine::open(&settings)?;
            chat(&engine)?;
            engine.close()?;
        }
        Command::Tables => {
            let store = TableStore::new(expand_path(&settings.extraction.tables_db_path));
            print_tables(&store.load()?);
        }
    }
    Ok(())
}
