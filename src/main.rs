//! vocab-fetch command line front end

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use vocab_fetch::wordlist::{self, DEFAULT_CHUNK_SIZE};
use vocab_fetch::{Config, ProgressReporter, Result, RunOutcome, VocabDownloader};

/// Command-line arguments for vocab-fetch
#[derive(Parser, Debug)]
#[command(name = "vocab-fetch")]
#[command(about = "Fetch dictionary entries and pronunciations for word lists")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "VOCAB_FETCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add phonetics and translations to a word list
    Enrich {
        /// Word list JSON file
        input: PathBuf,
        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Combine pronunciation clips of a word list into one audio file
    Audio {
        /// Word list JSON file
        input: PathBuf,
        /// Output file (defaults to the input with an .mp3 extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Enrich every pending file of a data root
    Catalog {
        /// Data root holding config.json
        #[arg(default_value = "data")]
        root: PathBuf,
    },
    /// Split a word list into numbered part files
    Split {
        /// Word list JSON file
        input: PathBuf,
        /// Words per part
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Set each list's size field to its word count
    FixSize {
        /// Word list JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Export word lists as CSV next to each input
    ExportCsv {
        /// Word list JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Progress bar fed by pipeline progress updates
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn report(&self, processed: usize, total: usize, label: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_position(processed as u64);
        self.bar.set_message(label.to_string());
        if processed == total {
            self.bar.finish();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Enrich { input, output } => {
            let downloader = start(config).await?;
            let output = output.unwrap_or_else(|| input.clone());
            let outcome = downloader
                .enrich_word_list(&input, &output, Arc::new(BarProgress::new()))
                .await?;
            report_outcome(&outcome);
        }
        Command::Audio { input, output } => {
            let downloader = start(config).await?;
            let output = output.unwrap_or_else(|| input.with_extension("mp3"));
            let outcome = downloader
                .synthesize_audio(&input, &output, Arc::new(BarProgress::new()))
                .await?;
            report_outcome(&outcome);
        }
        Command::Catalog { root } => {
            let downloader = start(config).await?;
            let report = downloader
                .process_catalog(&root, Arc::new(BarProgress::new()))
                .await?;
            println!(
                "catalog: {} enriched, {} failed, {} categories skipped{}",
                report.enriched.len(),
                report.failed.len(),
                report.skipped_categories.len(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            for (path, error) in &report.failed {
                println!("  failed {}: {}", path.display(), error);
            }
        }
        Command::Split { input, chunk_size } => {
            for part in wordlist::split_file(&input, chunk_size)? {
                println!("{}", part.display());
            }
        }
        Command::FixSize { inputs } => {
            for input in &inputs {
                let fix = wordlist::fix_size_file(input)?;
                if fix.changed() {
                    println!("{}: {:?} -> {}", input.display(), fix.old, fix.new);
                }
            }
        }
        Command::ExportCsv { inputs } => {
            for input in &inputs {
                export_one(input)?;
            }
        }
    }
    Ok(())
}

/// Build the downloader and cancel its run on Ctrl+C
async fn start(config: Config) -> Result<VocabDownloader> {
    let downloader = VocabDownloader::new(config).await?;
    tokio::spawn(vocab_fetch::run_with_shutdown(downloader.clone()));
    Ok(downloader)
}

fn export_one(input: &Path) -> Result<()> {
    match wordlist::export_csv(input)? {
        Some(csv) => println!("{}", csv.display()),
        None => println!("{}: no words", input.display()),
    }
    Ok(())
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(summary) => {
            println!(
                "wrote {} ({} of {} items, {} batches, final concurrency {})",
                summary.artifact.display(),
                summary.processed,
                summary.total,
                summary.batches,
                summary.final_limit
            );
            for failed in &summary.failed {
                println!("  skipped #{} {}: {}", failed.index, failed.key, failed.error);
            }
        }
        RunOutcome::Cancelled { processed, total } => {
            println!("cancelled after {processed} of {total} items; nothing written");
        }
    }
}
