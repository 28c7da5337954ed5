// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! ipcbench CLI
//!
//! Runs benchmark sweeps over the method catalogue, the Rust transport
//! endpoints those sweeps launch, and the report over finished sweeps.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::endpoint::EndpointCommand;

/// ipcbench - Interprocess transport benchmark harness
#[derive(Parser)]
#[command(name = "ipcbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Method catalogue file (built-in catalogue when omitted and no
    /// ipcbench.yaml is present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every method and role combination in the catalogue
    Sweep {
        /// Only run the named method (repeatable)
        #[arg(short, long = "method")]
        methods: Vec<String>,

        /// Skip aggregation after the sweep
        #[arg(long)]
        no_report: bool,
    },

    /// Run one transport endpoint
    #[command(subcommand)]
    Endpoint(EndpointCommand),

    /// Aggregate a finished sweep
    Report {
        /// Sweep directory (latest sweep under the results directory when
        /// omitted)
        dir: Option<PathBuf>,

        /// Print only, do not write summary.json
        #[arg(long)]
        no_save: bool,
    },

    /// List catalogue methods and their combinations
    List,

    /// Validate a catalogue file
    Validate {
        /// Path to the catalogue file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over the flag.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sweep { methods, no_report } => {
            commands::sweep::execute(cli.config.as_deref(), methods, no_report).await
        }
        Commands::Endpoint(endpoint) => commands::endpoint::execute(endpoint).await,
        Commands::Report { dir, no_save } => {
            commands::report::execute(cli.config.as_deref(), dir, no_save).await
        }
        Commands::List => commands::list::execute(cli.config.as_deref()).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
