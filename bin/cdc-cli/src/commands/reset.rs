// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_checkpoint::CheckpointStore;
use cdc_core::{Error, Result};
use tracing::info;

/// Drops `table`'s initial-sync checkpoint across every target, so the
/// next `initial`/`full` run rescans it from the start. Leaves
/// incremental positions untouched — a table reset is a backfill concern.
pub fn run(config_path: &Path, table: &str) -> Result<()> {
	let config = cdc_config::load(config_path)?;
	if !config.mappings.iter().any(|m| m.source_table == table) {
		return Err(Error::configuration(format!("{table} is not in any configured mapping")));
	}

	let source_id = config.source.db_path.to_string_lossy().into_owned();
	let checkpoint_path = config.checkpoint_dir.join("checkpoint.db");
	let store = CheckpointStore::open(&checkpoint_path)?;
	let deleted = store.reset_table(&source_id, table)?;

	info!(table, deleted, "cleared initial-sync checkpoints");
	println!("cleared {deleted} checkpoint(s) for table {table}");
	Ok(())
}
