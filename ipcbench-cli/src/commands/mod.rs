// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::path::Path;

use anyhow::Context;
use ipcbench_core::{ConfigLoader, SweepConfig};

pub mod endpoint;
pub mod list;
pub mod report;
pub mod sweep;
pub mod validate;

/// Catalogue picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "ipcbench.yaml";

/// Load the catalogue from `--config`, then `./ipcbench.yaml`, then the
/// built-in catalogue rooted at the working directory.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SweepConfig> {
    if let Some(path) = path {
        return ConfigLoader::load_file(path)
            .with_context(|| format!("loading catalogue {}", path.display()));
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        tracing::debug!(file = DEFAULT_CONFIG_FILE, "Using catalogue from working directory");
        return ConfigLoader::load_file(local)
            .with_context(|| format!("loading catalogue {}", DEFAULT_CONFIG_FILE));
    }

    tracing::debug!("Using built-in catalogue");
    Ok(SweepConfig::builtin(".")?)
}
