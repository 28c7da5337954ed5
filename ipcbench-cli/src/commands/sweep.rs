// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ipcbench sweep` command - Run every combination, then aggregate.

use std::path::Path;

use ipcbench_core::RunCoordinator;
use ipcbench_report::{render_table, Aggregator, SummaryReporter};

pub async fn execute(
    config_path: Option<&Path>,
    methods: Vec<String>,
    no_report: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let coordinator = RunCoordinator::new(&config).with_method_filter(methods);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                      IPCBENCH SWEEP                          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let outcome = coordinator.run_sweep().await?;

    for run in &outcome.runs {
        let meta = &run.metadata;
        let status = if meta.timed_out {
            "TIMEOUT"
        } else if meta.sender.succeeded() && meta.receiver.succeeded() {
            "ok"
        } else {
            "FAILED"
        };
        println!(
            "  {:<44} {:<8} {:>8.2}s  {} file(s)",
            meta.tag.as_str(),
            status,
            meta.duration_secs,
            meta.copied_files.len()
        );
    }
    println!();
    println!("Results: {}", outcome.dir.display());

    if no_report {
        return Ok(());
    }

    let summary = Aggregator::new()
        .with_catalogue(&config)
        .aggregate(&outcome.dir)?;
    let path = SummaryReporter::save(&summary)?;

    println!();
    print!("{}", render_table(&summary));
    println!("Summary: {}", path.display());

    Ok(())
}
