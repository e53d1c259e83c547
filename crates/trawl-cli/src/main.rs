//! # trawl-cli
//!
//! Command line entry point for the Trawl dependency manager. Parses the
//! command, sets up logging, loads the run configuration, and drives the
//! engine to completion.

use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::error;

use trawl_core::{TracingNotifier, TrawlError};
use trawl_engine::RunReport;
use trawl_registry::RepositoryRegistry;

mod config;

use config::RunConfig;

/// Dependency resolution and artifact acquisition for JVM-style ecosystems
#[derive(Parser)]
#[command(name = "trawl", version, about = "Trawl dependency manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve modules and install their artifacts
    Install {
        /// Run configuration file
        #[arg(long, default_value = "trawl.json")]
        config: Utf8PathBuf,
        /// Install root, overriding the configuration
        #[arg(long)]
        root: Option<Utf8PathBuf>,
        /// Re-install artifacts even when unchanged
        #[arg(long)]
        overwrite: bool,
        /// Worker count for queries and transfers
        #[arg(long)]
        workers: Option<usize>,
    },
}

// Exit codes: 0 ok, 2 unresolved modules, 3 transfer failures,
// 4 configuration error
const EXIT_UNRESOLVED: u8 = 2;
const EXIT_TRANSFER: u8 = 3;
const EXIT_CONFIG: u8 = 4;

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Install {
            config,
            root,
            overwrite,
            workers,
        } => runtime.block_on(install(config, root, overwrite, workers, cli.verbose)),
    }
}

async fn install(
    config_path: Utf8PathBuf,
    root: Option<Utf8PathBuf>,
    overwrite: bool,
    workers: Option<usize>,
    verbose: bool,
) -> ExitCode {
    let registry = RepositoryRegistry::new();
    let engine = match RunConfig::load(&config_path)
        .and_then(|config| config.into_engine(&registry, root, overwrite, workers))
    {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // Ctrl-C aborts the run cleanly: in-flight work is discarded and no
    // state is persisted
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    match engine.run(Arc::new(TracingNotifier)).await {
        Ok(report) => summarize(&report, verbose),
        Err(TrawlError::Cancelled) => {
            error!("Run cancelled");
            ExitCode::FAILURE
        }
        Err(
            e @ (TrawlError::ConfigValidation { .. }
            | TrawlError::UnknownRepositoryType { .. }
            | TrawlError::DigestAlgorithmUnavailable { .. }),
        ) => {
            error!("{}", e);
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_TRANSFER)
        }
    }
}

fn summarize(report: &RunReport, verbose: bool) -> ExitCode {
    println!(
        "{} modules, {} installed, {} up to date, {} removed",
        report.chosen.len(),
        report.install.installed.len(),
        report.install.skipped.len(),
        report.install.removed.len(),
    );
    if verbose {
        // One line per module in its long display form: explicit modules
        // lead with '*', implicit with '+', identified with '!',
        // unidentified with '?'
        for (_, node) in report.graph.live_modules() {
            println!("  {}", node.describe(true));
        }
    }
    for unresolved in &report.unresolved {
        match &unresolved.cause {
            Some(cause) => eprintln!("Unresolved: {} ({})", unresolved.spec, cause),
            None => eprintln!("Unresolved: {}", unresolved.spec),
        }
    }
    for (artifact, error) in &report.install.failed {
        eprintln!("Failed: {}: {}", artifact.file, error);
    }

    if !report.unresolved.is_empty() {
        ExitCode::from(EXIT_UNRESOLVED)
    } else if !report.install.failed.is_empty() {
        ExitCode::from(EXIT_TRANSFER)
    } else {
        ExitCode::SUCCESS
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "trawl={level},trawl_core={level},trawl_engine={level},trawl_install={level},trawl_registry={level}"
        ))
        .with_target(false)
        .init();
}
