use clap::{Parser, Subcommand, ValueEnum};
use nearfile_retriever::Nearfile;
use nearfile_retriever::config::load_config;
use nearfile_retriever::retrieval::locator::FileLocator;
use nearfile_retriever::storage::QueryFilter;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Find, index and search local text files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./nearfile.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Index database path, overriding the configuration
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the file whose name best matches TARGET under ROOT
    Locate {
        root: PathBuf,
        target: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Print the directory tree under ROOT
    Tree {
        root: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Load, chunk, embed and store the given files
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Return the chunks most similar to QUERY
    Retrieve {
        query: String,
        /// Number of results (defaults to retrieval.default_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Only search chunks from files under this path
        #[arg(long)]
        path_prefix: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Delete expired records now
    Purge,
    /// Show index statistics
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(store) = args.store {
        config.store.path = store;
    }

    // Locating and listing need no model or index.
    match &args.command {
        Commands::Locate {
            root,
            target,
            format,
        } => return print_locate(&FileLocator::new(config.locator), root, target, *format),
        Commands::Tree { root, format } => {
            return print_tree(&FileLocator::new(config.locator), root, *format);
        }
        _ => {}
    }

    let default_k = config.retrieval.default_k;
    let nearfile = Nearfile::open(config).await?;

    match args.command {
        Commands::Locate { .. } | Commands::Tree { .. } => Ok(()),
        Commands::Ingest { paths, format } => {
            let report = nearfile.ingest(&paths).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary => {
                    println!(
                        "Ingested {} files ({} chunks)",
                        report.ingested_count, report.chunk_count
                    );
                    if report.degraded_documents > 0 {
                        println!(
                            "  {} files split without sentence boundaries",
                            report.degraded_documents
                        );
                    }
                    if report.replaced_sequences > 0 {
                        println!(
                            "  {} invalid byte sequences replaced",
                            report.replaced_sequences
                        );
                    }
                    for skipped in &report.skipped {
                        println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
                    }
                }
            }
            Ok(())
        }
        Commands::Retrieve {
            query,
            k,
            path_prefix,
            format,
        } => {
            let filter = match path_prefix {
                Some(prefix) => QueryFilter::path_prefix(prefix),
                None => QueryFilter::default(),
            };
            let hits = nearfile
                .retrieve_filtered(&query, k.unwrap_or(default_k), &filter)
                .await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
                OutputFormat::Summary => {
                    println!("Found {} chunks:", hits.len());
                    for hit in hits {
                        println!(
                            "  Score: {:.3} | File: {} | Chunk: {}",
                            hit.score,
                            hit.source_path.display(),
                            hit.chunk_index
                        );
                        println!(
                            "    {}",
                            hit.text.chars().take(100).collect::<String>().replace('\n', " ")
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Purge => {
            let purged = nearfile.purge_expired().await?;
            println!("Purged {purged} expired records");
            Ok(())
        }
        Commands::Stats { format } => {
            let stats = nearfile.stats().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Index Statistics:");
                    println!("  Live records: {}", stats.live_records);
                    println!("  Expired (not yet purged): {}", stats.expired_records);
                    println!("  Source files: {}", stats.distinct_sources);
                    println!(
                        "  Model: {}",
                        stats.model_id.as_deref().unwrap_or("(none)")
                    );
                    if let Some(dimension) = stats.dimension {
                        println!("  Dimension: {dimension}");
                    }
                    println!("  Retention: {} minutes", stats.retention_minutes);
                    if let Some(next) = stats.next_expiry {
                        println!("  Next expiry: {}", next.to_rfc3339());
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_locate(
    locator: &FileLocator,
    root: &Path,
    target: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let outcome = locator.locate(root, target)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Summary => {
            println!("{}", outcome.path.display());
            println!(
                "  score: {:.3} | depth: {} | scanned: {}",
                outcome.score, outcome.depth, outcome.candidates_scanned
            );
            for warning in &outcome.warnings {
                match &warning.path {
                    Some(p) => println!("  warning: {}: {}", p.display(), warning.reason),
                    None => println!("  warning: {}", warning.reason),
                }
            }
        }
    }
    Ok(())
}

fn print_tree(locator: &FileLocator, root: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let tree = locator.tree(root)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
        OutputFormat::Summary => {
            println!("{}", tree.root.display());
            print!("{}", tree.render());
            for warning in &tree.warnings {
                match &warning.path {
                    Some(p) => eprintln!("warning: {}: {}", p.display(), warning.reason),
                    None => eprintln!("warning: {}", warning.reason),
                }
            }
        }
    }
    Ok(())
}
