//! codehealer CLI
//!
//! Heals a Python repository (or a tar archive of one) in place.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use codehealer::debug::is_debug;
use codehealer::runner::OutputLine;
use codehealer::{resolve_target, HealConfig, HealReport, Healer, OpenAiBackend, Validate, VenvSandbox};

/// Self-healing loop for Python repositories.
#[derive(Parser, Debug)]
#[command(name = "codehealer", version, about)]
struct Cli {
    /// Repository directory, or a .tar, .tar.gz or .tgz archive of one.
    target: PathBuf,

    /// Maximum number of install/run attempts.
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// TOML configuration file.
    #[arg(short, long, env = "CODEHEALER_CONFIG")]
    config: Option<PathBuf>,

    /// Import packages and run the test suite after a successful heal.
    #[arg(long)]
    verify: bool,

    /// Generate a requirements file from imports when none exists.
    #[arg(long)]
    synthesize_manifest: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose || is_debug() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut config = match &cli.config {
        Some(path) => match HealConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => HealConfig::default(),
    };

    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }
    config.verify_after_heal |= cli.verify;
    config.synthesize_manifest |= cli.synthesize_manifest;

    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!("{}", warning);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let api_key = match config.backend.api_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Set {} before running codehealer.", config.backend.api_key_env);
            return 1;
        }
    };

    let target = match resolve_target(&cli.target) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if target.extracted {
        println!("Extracted archive to {}", target.root.display());
    }

    let backend = match OpenAiBackend::new(&config.backend, api_key) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            match line {
                OutputLine::Stdout(text) => println!("{}", text),
                OutputLine::Stderr(text) => eprintln!("{}", text),
            }
        }
    });

    let provider = VenvSandbox::new(target.root.clone(), config.sandbox_dir.clone(), config.python.clone());
    let healer = Healer::with_backend(provider, config, Arc::new(backend)).with_output(tx);

    tracing::info!(target = ?target.root, "starting codehealer");
    let outcome = healer.heal().await;

    // Closing the last sender lets the printer drain and exit.
    drop(healer);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "output printer failed");
    }

    match outcome {
        Ok(report) => {
            print_report(&report);
            if target.extracted {
                println!("Healed code is in {}", target.root.display());
            }
            if report.success {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_report(report: &HealReport) {
    println!("\n{}", "=".repeat(60));
    if report.success {
        println!("Healing succeeded");
    } else {
        println!("Healing failed");
    }
    println!("{}", "=".repeat(60));
    println!();
    println!("Phase: {}", report.phase);
    println!("Iterations: {}", report.iterations);

    if !report.applied.is_empty() {
        println!();
        println!("Files rewritten:");
        for path in &report.applied {
            println!("  {}", path.display());
        }
    }

    if !report.notes.is_empty() {
        println!();
        println!("Verification:");
        for note in &report.notes {
            println!("  {}", note);
        }
    }

    if !report.success && !report.log.is_empty() {
        println!();
        println!("Last output:");
        println!("{}", report.log.trim_end());
    }
}
