use clap::{Parser, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use vault_search_context::{
    CharCounter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, RecursiveTextSplitter,
    SplitterConfig, TiktokenCounter, TokenCounter, WhitespaceCounter,
};

/// Unit used to measure chunk length
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Counter {
    /// BPE tokens (cl100k_base)
    Tiktoken,
    /// Unicode characters
    Chars,
    /// Whitespace separated words
    Words,
}

/// Chunk a text file the way the indexer does and print the chunks as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum chunk length, in counter units.
    #[arg(short = 's', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Units shared by consecutive chunks.
    #[arg(short = 'o', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// How chunk length is measured.
    #[arg(short, long, value_enum, default_value_t = Counter::Tiktoken)]
    counter: Counter,

    /// Comma-separated list of regex patterns for separators, most significant first.
    #[arg(short, long, value_delimiter = ',')]
    separators: Option<Vec<String>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let counter: Arc<dyn TokenCounter> = match args.counter {
        Counter::Tiktoken => Arc::new(TiktokenCounter::cl100k()?),
        Counter::Chars => Arc::new(CharCounter),
        Counter::Words => Arc::new(WhitespaceCounter),
    };

    let mut config = SplitterConfig::new(args.chunk_size, args.chunk_overlap);
    if let Some(separators) = args.separators {
        config = config.with_separators(separators);
    }

    let splitter = RecursiveTextSplitter::new(config, counter)?;
    let chunks = splitter.create_chunks(&file_content);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{}", json_output);

    Ok(())
}
