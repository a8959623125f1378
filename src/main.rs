use anyhow::Result;
use clap::{Parser, Subcommand};
use fylr_search::config::{BackendKind, Config};
use fylr_search::semantic::{Embedder, FileContent, SearchManager};
use fylr_search::telemetry;
use fylr_search::utils::{format_number, has_binary_extension, is_binary_content};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use walkdir::WalkDir;

/// fylr_search - find files by meaning
#[derive(Parser, Debug)]
#[command(name = "fylr_search")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Index path prefix (overrides config file)
    #[arg(long, value_name = "PREFIX", global = true)]
    index_path: Option<String>,

    /// Embedding backend (overrides config file)
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendKind>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a template configuration file and exit
    Init {
        #[arg(value_name = "FILE", default_value = "fylr_search.toml")]
        path: PathBuf,
    },

    /// Index files or directories
    Index {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },

    /// Search indexed files with a natural-language query
    Search {
        query: String,

        /// Number of results (defaults to search.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove files from the index
    Remove {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },

    /// Show index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle init before touching config or logging
    if let Command::Init { path } = &args.command {
        if path.exists() {
            eprintln!("Error: Config file already exists: {}", path.display());
            eprintln!("Remove it first or choose a different path.");
            std::process::exit(1);
        }

        Config::write_template(path)?;
        println!("✓ Generated config file: {}", path.display());
        println!("\nEdit the file to choose a backend and index location, then run:");
        println!("  fylr_search --config {} index <DIR>", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        telemetry::parse_level(&config.logging.level)?
    };
    telemetry::init_logging(log_level)?;

    info!(
        backend = ?config.backend.kind,
        index = %config.index.path_prefix,
        dimension = config.index.dimension,
        "Configuration loaded"
    );

    let mut manager = config.open_search_manager()?;

    match args.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Index { paths } => run_index(&mut manager, &config, &paths)?,
        Command::Search { query, k, json } => {
            let k = k.unwrap_or(config.search.default_k);
            let results = manager.search(&query, k);

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No matching files.");
            } else {
                for (rank, result) in results.iter().enumerate() {
                    println!(
                        "{:>2}. {:.3}  {}",
                        rank + 1,
                        result.relevance_score,
                        result.file_path
                    );
                }
            }
        }
        Command::Remove { paths } => {
            let mut failed = 0;
            for path in &paths {
                if !manager.remove_file(&index_key(path)) {
                    failed += 1;
                }
            }
            manager.flush()?;
            println!("Removed {} path(s), {} failed", paths.len() - failed, failed);
        }
        Command::Stats { json } => {
            let stats = manager.get_index_stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Files indexed:  {}", format_number(stats.total_files));
                println!("Index location: {}", stats.index_location.display());
                println!("Dimension:      {}", stats.dimension);
            }
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let base_config = if let Some(ref config_path) = args.config {
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse `fylr_search init {}` to generate a template.",
                config_path.display(),
                config_path.display()
            );
        }
        Config::from_file(config_path)?
    } else {
        match Config::from_default_locations()? {
            Some((config, _path)) => config,
            None => Config::default(),
        }
    };

    Ok(base_config
        .with_env_overrides()
        .with_overrides(args.index_path.clone(), args.backend))
}

/// Collect indexable files under the given paths
fn discover_files(paths: &[PathBuf], max_file_size: u64) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in paths {
        let root = root.canonicalize().unwrap_or_else(|_| root.clone());
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable path");
                    continue;
                }
            };

            if !entry.file_type().is_file() || has_binary_extension(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() <= max_file_size => files.push(entry.into_path()),
                Ok(meta) => debug!(path = %entry.path().display(), size = meta.len(), "Skipping large file"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata"),
            }
        }
    }

    files
}

/// Index key for a user-supplied path: canonical when the file still exists
fn index_key(path: &str) -> String {
    Path::new(path)
        .canonicalize()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn run_index<E: Embedder>(
    manager: &mut SearchManager<E>,
    config: &Config,
    paths: &[PathBuf],
) -> Result<()> {
    let files = discover_files(paths, config.index.max_file_size);
    info!(files = files.len(), "Discovered files to index");

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let batch_size = config.backend.batch_size.max(1);
    let mut indexed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for chunk in files.chunks(batch_size) {
        let mut batch = Vec::with_capacity(chunk.len());
        for path in chunk {
            match std::fs::read_to_string(path) {
                Ok(content) if !is_binary_content(&content) && !content.trim().is_empty() => {
                    batch.push(FileContent::new(path.to_string_lossy(), content));
                }
                Ok(_) => skipped += 1,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping non-text file");
                    skipped += 1;
                }
            }
        }

        if let Some(first) = batch.first() {
            progress.set_message(first.path.clone());
        }

        let results = manager.index_files_batched(&batch, batch_size);
        let ok = results.values().filter(|success| **success).count();
        indexed += ok;
        failed += results.len() - ok;
        progress.inc(chunk.len() as u64);
    }

    progress.finish_and_clear();
    manager.flush()?;

    println!(
        "Indexed {} file(s), {} skipped, {} failed. Index now holds {} file(s).",
        format_number(indexed),
        format_number(skipped),
        format_number(failed),
        format_number(manager.get_index_stats().total_files)
    );

    Ok(())
}
