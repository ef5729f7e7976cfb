// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;
use std::time::Duration;

use cdc_core::{Error, Result};
use cdc_engine::SyncEngine;
use cdc_sync::InitialSyncRunner;
use cdc_target::TargetWriter;
use tracing::info;

use crate::cli::SyncMode;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run(config_path: &Path, mode: SyncMode, tables: Option<&[String]>) -> Result<()> {
	let config = cdc_config::load(config_path)?;

	match mode {
		SyncMode::Initial => run_initial(&config, tables).await,
		SyncMode::Incremental => run_streaming(config, tables, false).await,
		SyncMode::Full => run_streaming(config, tables, true).await,
	}
}

/// Selects the mappings `tables` names, or every configured mapping when
/// `tables` is `None`. Fails loudly if a requested table has no mapping.
fn scoped_mappings(config: &cdc_config::RootConfig, tables: Option<&[String]>) -> Result<Vec<cdc_config::TableMapping>> {
	let Some(names) = tables else {
		return Ok(config.mappings.clone());
	};
	let filtered: Vec<_> = config.mappings.iter().filter(|m| names.iter().any(|n| n == &m.source_table)).cloned().collect();
	if filtered.len() != names.len() {
		return Err(Error::configuration("one or more requested tables have no configured mapping"));
	}
	Ok(filtered)
}

/// Backfills the selected tables against every target, unconditionally —
/// `initial` is an explicit request to (re)run the baseline copy, unlike
/// `full`, which only backfills tables still pending.
async fn run_initial(config: &cdc_config::RootConfig, tables: Option<&[String]>) -> Result<()> {
	let mappings = scoped_mappings(config, tables)?;
	let source_id = config.source.db_path.to_string_lossy().into_owned();
	let targets = cdc_engine::build_writers(config).await?;
	for (name, writer) in &targets {
		writer.ping().await.map_err(|e| Error::Reachability { target: name.clone(), reason: e.to_string() })?;
	}

	std::fs::create_dir_all(&config.checkpoint_dir)
		.map_err(|e| Error::configuration(format!("creating checkpoint directory: {e}")))?;
	let checkpoint_path = config.checkpoint_dir.join("checkpoint.db");

	let runner =
		InitialSyncRunner::new(source_id, config.source.clone(), checkpoint_path, mappings, targets, config.batch_size);
	let handoff_id = runner.run().await?;
	println!("initial sync complete, handoff id {handoff_id}");
	Ok(())
}

/// Starts the engine and blocks until interrupted, then shuts down within
/// the grace deadline. `run_initial` controls whether pending backfills
/// run before the engine enters incremental streaming.
async fn run_streaming(config: cdc_config::RootConfig, tables: Option<&[String]>, run_initial: bool) -> Result<()> {
	let engine = SyncEngine::start(config, tables, run_initial).await?;
	info!("sync engine running, press ctrl-c to stop");

	tokio::signal::ctrl_c().await.map_err(|e| Error::Other(format!("waiting for ctrl-c: {e}")))?;

	info!("shutdown requested");
	engine.stop(SHUTDOWN_GRACE).await?;
	println!("sync engine stopped");
	Ok(())
}
