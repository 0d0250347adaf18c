use chrono::Utc;
use clap::Parser;
use nearfile_context::{ChunkerConfig, SentenceChunker};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// Preview how a document is split into sentence-window chunks.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Sentences per chunk.
    #[arg(short, long, default_value_t = 4)]
    sentences: usize,

    /// Sentences shared between consecutive chunks.
    #[arg(short, long, default_value_t = 1)]
    overlap: usize,

    /// Longest sentence (in chars) before falling back to fixed-width pieces.
    #[arg(long, default_value_t = 2000)]
    max_sentence_chars: usize,

    /// Width (in chars) of fixed-width fallback pieces.
    #[arg(long, default_value_t = 800)]
    fallback_chars: usize,
}

#[derive(Serialize)]
struct ChunkPreview<'a> {
    index: usize,
    sentences: [usize; 2],
    degraded: bool,
    overlap_context: &'a str,
    text: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let (source, file_content) = if let Some(input_path) = args.input {
        let content = fs::read_to_string(&input_path)?;
        (input_path, content)
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (PathBuf::from("<stdin>"), buffer)
    };

    let config = ChunkerConfig {
        sentences_per_chunk: args.sentences,
        overlap_sentences: args.overlap,
        max_sentence_chars: args.max_sentence_chars,
        fallback_chunk_chars: args.fallback_chars,
    };
    let chunker = SentenceChunker::new(config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let chunks: Vec<_> = chunker.chunks(&source, &file_content, Utc::now()).collect();

    let previews: Vec<ChunkPreview> = chunks
        .iter()
        .map(|c| ChunkPreview {
            index: c.index,
            sentences: [c.sentence_start, c.sentence_end],
            degraded: c.degraded,
            overlap_context: &c.overlap_context,
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&previews)?;
    println!("{}", json_output);

    Ok(())
}
