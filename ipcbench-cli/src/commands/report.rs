// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ipcbench report` command - Aggregate a finished sweep.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ipcbench_report::{render_table, Aggregator, SummaryReporter};

pub async fn execute(
    config_path: Option<&Path>,
    dir: Option<PathBuf>,
    no_save: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let sweep_dir = match dir {
        Some(dir) => dir,
        None => latest_sweep(&config.settings.results_dir)?,
    };
    tracing::info!(sweep_dir = %sweep_dir.display(), "Aggregating sweep");

    let summary = Aggregator::new()
        .with_catalogue(&config)
        .aggregate(&sweep_dir)?;

    if summary.throughput.is_empty() && summary.memory.is_empty() {
        println!("No usable metrics under {}", sweep_dir.display());
    } else {
        print!("{}", render_table(&summary));
    }

    if !no_save {
        let path = SummaryReporter::save(&summary)?;
        println!("Summary: {}", path.display());
    }

    Ok(())
}

/// Sweep directories are named by start time, so the greatest name is the
/// most recent.
fn latest_sweep(results_dir: &Path) -> anyhow::Result<PathBuf> {
    let entries = fs::read_dir(results_dir)
        .with_context(|| format!("reading results directory {}", results_dir.display()))?;

    let latest = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .max()
        .with_context(|| format!("no sweeps under {}", results_dir.display()))?;
    Ok(latest)
}
