// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ipcbench list` command - List catalogue methods.
//!
//! Shows each method's transport and the combinations a sweep would run.

use std::path::Path;

use ipcbench_core::coordinator::viable_pairs;

pub async fn execute(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    if config.methods.is_empty() {
        println!("No methods defined in catalogue.");
        return Ok(());
    }

    println!("╔═════════════════════════╦═══════════════╦═══════╦═══════════════════════════════╗");
    println!("║ Method                  ║ Transport     ║ Runs  ║ Working directory             ║");
    println!("╠═════════════════════════╬═══════════════╬═══════╬═══════════════════════════════╣");

    let mut total = 0;
    for method in &config.methods {
        let pairs = viable_pairs(method);
        total += pairs.len();
        println!(
            "║ {:<23} ║ {:<13} ║ {:<5} ║ {:<29} ║",
            method.name.as_str(),
            method.transport.to_string(),
            pairs.len(),
            method.working_dir.display().to_string()
        );
    }

    println!("╚═════════════════════════╩═══════════════╩═══════╩═══════════════════════════════╝");
    println!();

    for method in &config.methods {
        for (sender, receiver) in viable_pairs(method) {
            println!("  {} : {} -> {}", method.name, sender, receiver);
        }
    }
    println!();
    println!(
        "Total: {} method(s), {} run(s) per sweep",
        config.methods.len(),
        total
    );

    Ok(())
}
