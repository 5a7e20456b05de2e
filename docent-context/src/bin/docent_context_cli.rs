use clap::Parser;
use docent_context::{DocumentLoader, TextLoader, split};
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;

/// A CLI tool to print the retrieval passages of a document as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input document. If not provided, reads plain text from stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Maximum passage length in characters.
    #[arg(short, long, default_value_t = docent_context::text::DEFAULT_MAX_SIZE)]
    max_size: usize,

    /// Characters shared by consecutive passages.
    #[arg(short, long, default_value_t = docent_context::text::DEFAULT_OVERLAP)]
    overlap: usize,
}

#[derive(Serialize)]
struct PassageOutput<'a> {
    source: &'a str,
    sequence: usize,
    start: usize,
    end: usize,
    overlap: usize,
    text: &'a str,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (source, text) = match &args.input {
        Some(path) => {
            let document = TextLoader.load_path(path)?;
            (document.source, document.text)
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            ("<stdin>".to_string(), buffer)
        }
    };

    let chunks = split(&text, args.max_size, args.overlap)?;
    let output: Vec<PassageOutput> = chunks
        .iter()
        .map(|c| PassageOutput {
            source: &source,
            sequence: c.sequence,
            start: c.start,
            end: c.end,
            overlap: c.overlap,
            text: &c.text,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
