// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ipcbench validate` command - Validate a catalogue file.

use std::path::Path;

use ipcbench_core::{ConfigLoader, RoleSet};

pub async fn execute(file: &Path) -> anyhow::Result<()> {
    tracing::info!(file = %file.display(), "Validating catalogue");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Catalogue is valid");
            println!();
            println!("Sweep Settings:");
            println!(
                "  Results Directory:  {}",
                config.settings.results_dir.display()
            );
            println!(
                "  Start Delay:        {}ms",
                config.settings.start_delay.as_millis()
            );
            println!(
                "  Completion Timeout: {}s",
                config.settings.completion_timeout.as_secs()
            );
            println!();
            println!("Methods ({}):", config.methods.len());
            for method in &config.methods {
                let roles = match &method.roles {
                    RoleSet::Languages(_) => "language variants",
                    RoleSet::Fixed { .. } => "fixed pair",
                };
                println!(
                    "  - {} ({}, {}, metrics: {} / {})",
                    method.name,
                    method.transport,
                    roles,
                    method.sender_metric,
                    method.receiver_metric
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Catalogue validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
