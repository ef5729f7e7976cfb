// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_audit::AuditStore;
use cdc_checkpoint::CheckpointStore;
use cdc_core::Result;

/// Reports backlog and per-target lag straight from the durable stores,
/// without connecting to any target — a status check should never block
/// on, or be gated by, a target being reachable.
pub fn run(config_path: &Path) -> Result<()> {
	let config = cdc_config::load(config_path)?;
	let source_id = config.source.db_path.to_string_lossy().into_owned();

	let checkpoint_path = config.checkpoint_dir.join("checkpoint.db");
	let store = CheckpointStore::open(&checkpoint_path)?;
	let audit = AuditStore::open(&config.source.db_path)?;

	let max_id = audit.max_id()?;
	let backlog = audit.count_unconsumed()?;
	let errors = store.recent_errors(200)?;

	println!("source: {source_id}");
	println!("max audit id: {max_id}");
	println!("unconsumed events: {backlog}");
	println!();
	println!("{:<24} {:>12} {:>8}  last error", "target", "last_audit_id", "lag");
	for target in &config.targets {
		let pos = store.load_position(&source_id, &target.name)?;
		let lag = (max_id - pos.last_audit_id).max(0);
		let last_error = errors.iter().find(|e| e.target_name == target.name).map(|e| e.message.as_str()).unwrap_or("-");
		println!("{:<24} {:>12} {:>8}  {}", target.name, pos.last_audit_id, lag, last_error);
	}

	Ok(())
}
