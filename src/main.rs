//! Binary entry point for ingrisk.
//!
//! This binary provides the CLI interface for ingredient risk analysis.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ingrisk::config::IngriskConfig;
use ingrisk::observability::{self, InitOptions};
use ingrisk::rendering::{ReportFormat, render};
use ingrisk::services::AnalysisService;
use ingrisk::sources::{FileSource, IngredientSource, StdinSource, TextSource};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Ingrisk - cosmetic ingredient risk analysis with a self-growing knowledge base.
#[derive(Parser)]
#[command(name = "ingrisk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "INGRISK_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze an ingredient list.
    Analyze {
        /// Ingredient list text. Read from stdin when neither this nor --file is given.
        text: Option<String>,

        /// Read the ingredient text from a file.
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Extract the ingredient list from noisy text (OCR output, page dumps) first.
        #[arg(short, long)]
        extract: bool,

        /// Output format: markdown or json.
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Abort the request after this many seconds.
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },

    /// Look up an ingredient in the knowledge base.
    Lookup {
        /// Ingredient name.
        name: String,

        /// Also list this many nearest indexed ingredients.
        #[arg(short, long, default_value = "0")]
        similar: usize,
    },

    /// Rebuild the retrieval index from the knowledge store.
    Reindex,

    /// Show knowledge base status.
    Status,

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match IngriskConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = {
        let _guard = runtime.enter();
        match observability::init(
            &config.logging,
            &config.metrics,
            InitOptions {
                verbose: cli.verbose,
                metrics_expose: true,
            },
        ) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        }
    };

    let result = runtime.block_on(run_command(cli, config));
    // An abandoned analysis may still be blocked on the model.
    runtime.shutdown_timeout(Duration::from_secs(1));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli, config: IngriskConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Analyze {
            text,
            file,
            extract,
            format,
            timeout_secs,
        } => {
            let format = ReportFormat::parse(&format)?;
            let source: Box<dyn IngredientSource> = match (text, file) {
                (Some(text), _) => Box::new(TextSource::new(text)),
                (None, Some(path)) => Box::new(FileSource::new(path)),
                (None, None) => {
                    if std::io::stdin().is_terminal() {
                        bail!("no ingredient text given; pass TEXT, --file, or pipe it on stdin");
                    }
                    Box::new(StdinSource)
                },
            };
            cmd_analyze(config, source, extract, format, timeout_secs).await
        },
        Commands::Lookup { name, similar } => {
            blocking(move || cmd_lookup(&config, &name, similar)).await
        },
        Commands::Reindex => blocking(move || cmd_reindex(&config)).await,
        Commands::Status => blocking(move || cmd_status(&config)).await,
        Commands::Config { show } => cmd_config(&config, show),
    }
}

/// Runs blocking engine work off the async runtime.
async fn blocking<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("command task panicked")?
}

async fn cmd_analyze(
    config: IngriskConfig,
    source: Box<dyn IngredientSource>,
    extract: bool,
    format: ReportFormat,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let task = tokio::task::spawn_blocking(move || {
        let service = AnalysisService::from_config(&config)?;
        service.analyze_source(source.as_ref(), extract)
    });

    let findings = match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Ok(joined) => joined.context("analysis task panicked")??,
        Err(_) => bail!("analysis timed out after {timeout_secs}s"),
    };

    println!("{}", render(&findings, format)?);
    Ok(())
}

fn cmd_lookup(config: &IngriskConfig, name: &str, similar: usize) -> anyhow::Result<()> {
    let service = AnalysisService::from_config(config)?;

    match service.lookup(name) {
        Some(record) => {
            println!("{} ({})", name.trim().to_lowercase(), record.risk);
            println!("  {}", record.impact);
        },
        None => println!("{}: not in knowledge base", name.trim().to_lowercase()),
    }

    if similar > 0 {
        let matches = service.find_similar(name, similar)?;
        println!("\nNearest indexed ingredients:");
        for (i, hit) in matches.iter().enumerate() {
            println!(
                "{}. [{:.2}] {} ({})",
                i + 1,
                hit.score,
                hit.document.ingredient,
                hit.document.risk
            );
        }
    }
    Ok(())
}

fn cmd_reindex(config: &IngriskConfig) -> anyhow::Result<()> {
    let service = AnalysisService::from_config(config)?;
    let indexed = service
        .knowledge()
        .rebuild()
        .context("failed to rebuild retrieval index")?;
    println!("Reindexed {indexed} ingredients");
    Ok(())
}

fn cmd_status(config: &IngriskConfig) -> anyhow::Result<()> {
    let service = AnalysisService::from_config(config)?;
    let knowledge = service.knowledge();

    println!("Ingrisk Status");
    println!("==============");
    println!();
    println!("Knowledge store: {}", knowledge.store().location());
    println!("  Records: {}", knowledge.store().len());
    match config.index_path() {
        Some(path) => println!("Retrieval index: {}", path.display()),
        None => println!("Retrieval index: in-memory"),
    }
    println!("  Documents: {}", knowledge.index().count());
    println!("  Embedder: {}", config.embedding.backend.as_str());
    println!(
        "LLM provider: {}{}",
        config.llm.provider.as_str(),
        config
            .llm
            .model
            .as_deref()
            .map(|m| format!(" ({m})"))
            .unwrap_or_default()
    );
    Ok(())
}

fn cmd_config(config: &IngriskConfig, show: bool) -> anyhow::Result<()> {
    if show {
        print!("{}", config.to_redacted_toml()?);
    } else {
        println!("Use --show to display the effective configuration");
    }
    Ok(())
}
