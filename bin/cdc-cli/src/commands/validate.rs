// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_core::{Error, Result};
use cdc_target::TargetWriter;
use tracing::info;

/// Parses and validates the configuration, then pings every target —
/// the same two gates `sync` applies before it starts moving data,
/// surfaced standalone so a deployment can be checked without running it.
pub async fn run(config_path: &Path) -> Result<()> {
	let config = cdc_config::load(config_path)?;
	info!(targets = config.targets.len(), mappings = config.mappings.len(), "configuration parsed");

	let writers = cdc_engine::build_writers(&config).await?;
	for (name, writer) in &writers {
		writer.ping().await.map_err(|e| Error::Reachability { target: name.clone(), reason: e.to_string() })?;
		info!(target = %name, "target reachable");
	}

	println!("configuration valid, {} target(s) reachable", writers.len());
	Ok(())
}
