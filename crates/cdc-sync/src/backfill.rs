// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdc_audit::{AuditStore, row_from_rusqlite};
use cdc_checkpoint::CheckpointStore;
use cdc_config::{SourceConfig, TableMapping};
use cdc_core::{Error, InitialSyncCheckpoint, Result, Row, SyncStatus, TableOp, TargetOp};
use cdc_target::TargetWriter;
use cdc_transform::Transformer;
use rusqlite::{Connection, OpenFlags, params};
use serde_json::Value;
use tracing::{error, info, warn};

/// Drives the baseline copy described in the design's initial-sync
/// algorithm: pin the handoff id, then backfill each table against
/// every target independently, each with its own seek-pagination
/// cursor and checkpoint.
pub struct InitialSyncRunner {
	source_id: String,
	source_path: PathBuf,
	checkpoint_path: PathBuf,
	source: SourceConfig,
	mappings: Vec<TableMapping>,
	targets: HashMap<String, Arc<dyn TargetWriter>>,
	batch_size: usize,
}

impl InitialSyncRunner {
	pub fn new(
		source_id: impl Into<String>,
		source: SourceConfig,
		checkpoint_path: PathBuf,
		mappings: Vec<TableMapping>,
		targets: HashMap<String, Arc<dyn TargetWriter>>,
		batch_size: usize,
	) -> Self {
		InitialSyncRunner {
			source_id: source_id.into(),
			source_path: source.db_path.clone(),
			checkpoint_path,
			source,
			mappings,
			targets,
			batch_size,
		}
	}

	/// Runs the whole backfill to completion and returns the handoff id
	/// the incremental reader should resume from.
	pub async fn run(&self) -> Result<i64> {
		let handoff_id = self.pin_handoff()?;
		info!(handoff_id, "initial sync pinned handoff id");

		for mapping in &self.mappings {
			self.run_table(mapping).await;
		}

		self.finalize_handoff(handoff_id)?;
		Ok(handoff_id)
	}

	/// Reads and returns the current max audit id, pinning the boundary
	/// at which the incremental reader will begin. Idempotent to call
	/// more than once; callers persist the returned value themselves.
	pub fn pin_handoff(&self) -> Result<i64> {
		AuditStore::open(&self.source_path)?.max_id()
	}

	async fn run_table(&self, mapping: &TableMapping) {
		let pk_col = match self.effective_primary_key(mapping) {
			Ok(pk) => pk,
			Err(e) => {
				error!(table = %mapping.source_table, error = %e, "could not determine primary key, skipping table");
				return;
			}
		};

		let mut handles = Vec::with_capacity(self.targets.len());
		for (target_name, writer) in &self.targets {
			let job = BackfillJob {
				source_path: self.source_path.clone(),
				checkpoint_path: self.checkpoint_path.clone(),
				source_id: self.source_id.clone(),
				mapping: mapping.clone(),
				pk_col: pk_col.clone(),
				target_name: target_name.clone(),
				writer: writer.clone(),
				batch_size: self.batch_size,
			};
			handles.push(tokio::spawn(async move { (job.target_name.clone(), job.run().await) }));
		}

		for handle in handles {
			match handle.await {
				Ok((target_name, Ok(()))) => {
					info!(table = %mapping.source_table, target = %target_name, "backfill complete");
				}
				Ok((target_name, Err(e))) => {
					warn!(table = %mapping.source_table, target = %target_name, error = %e, "backfill failed, other targets continue");
					self.record_failure(&mapping.source_table, &target_name, &e);
				}
				Err(e) => error!(table = %mapping.source_table, error = %e, "backfill task panicked"),
			}
		}
	}

	fn record_failure(&self, table: &str, target_name: &str, error: &Error) {
		match CheckpointStore::open(&self.checkpoint_path) {
			Ok(store) => {
				let _ = store.record_error(&self.source_id, target_name, Some(table), None, error.kind(), 0, &error.to_string());
			}
			Err(e) => error!(error = %e, "could not open checkpoint store to record backfill failure"),
		}
	}

	/// Sets each target's incremental starting position to `handoff_id`,
	/// unless it is already further along — checkpoint monotonicity.
	fn finalize_handoff(&self, handoff_id: i64) -> Result<()> {
		let store = CheckpointStore::open(&self.checkpoint_path)?;
		for target_name in self.targets.keys() {
			let mut pos = store.load_position(&self.source_id, target_name)?;
			if pos.last_audit_id < handoff_id {
				pos.last_audit_id = handoff_id;
				store.save_position(&pos)?;
			}
		}
		Ok(())
	}

	/// Configured override, else the table's declared primary key, else
	/// the implicit row identifier, per the design's tiering.
	fn effective_primary_key(&self, mapping: &TableMapping) -> Result<String> {
		if let Some(pk) = self.source.primary_key_overrides.get(&mapping.source_table) {
			return Ok(pk.clone());
		}

		let conn = open_source_readonly(&self.source_path)?;
		if let Some(pk) = declared_primary_key(&conn, &mapping.source_table)? {
			return Ok(pk);
		}

		Ok("rowid".to_string())
	}
}

/// One table's backfill against one target: an independent
/// seek-pagination scan and checkpoint, so a slow or failing target
/// never blocks another's progress. Re-scanning the source once per
/// target trades source-read cost (cheap, local) for independence
/// (the part that actually needs to survive partial failure).
struct BackfillJob {
	source_path: PathBuf,
	checkpoint_path: PathBuf,
	source_id: String,
	mapping: TableMapping,
	pk_col: String,
	target_name: String,
	writer: Arc<dyn TargetWriter>,
	batch_size: usize,
}

impl BackfillJob {
	async fn run(self) -> Result<()> {
		let transformer = Transformer::new();

		loop {
			let checkpoint = self.load_or_init_checkpoint().await?;
			if checkpoint.status == SyncStatus::Completed {
				return Ok(());
			}

			let rows = self.fetch_batch(checkpoint.last_primary_key.clone()).await?;
			if rows.is_empty() {
				let mut done = checkpoint;
				done.status = SyncStatus::Completed;
				self.save_checkpoint(done).await?;
				return Ok(());
			}

			let mut ops = Vec::with_capacity(rows.len());
			for (i, row) in rows.iter().enumerate() {
				if let Some(transformed) = transformer.transform_row(row, &self.mapping)? {
					ops.push(TableOp {
						table: self.mapping.target_table().to_string(),
						op: TargetOp::Upsert(transformed),
						audit_id: i as i64,
					});
				}
			}

			if !ops.is_empty() {
				let outcome = self.writer.apply_batch(&ops).await?;
				if let Some((_, e)) = outcome.failed.into_iter().next() {
					return Err(Error::data(format!(
						"initial sync of {} into {} failed: {e}",
						self.mapping.source_table, self.target_name
					)));
				}
			}

			let last_pk = rows.last().and_then(|r| r.get(&self.pk_col)).cloned().ok_or_else(|| {
				Error::data(format!(
					"rows scanned from {} are missing primary key column {}",
					self.mapping.source_table, self.pk_col
				))
			})?;

			let mut advanced = checkpoint;
			advanced.last_primary_key = Some(pk_as_text(&last_pk));
			advanced.rows_copied += rows.len() as i64;
			self.save_checkpoint(advanced).await?;
		}
	}

	async fn load_or_init_checkpoint(&self) -> Result<InitialSyncCheckpoint> {
		let checkpoint_path = self.checkpoint_path.clone();
		let source_id = self.source_id.clone();
		let table = self.mapping.source_table.clone();
		let target_name = self.target_name.clone();

		tokio::task::spawn_blocking(move || -> Result<InitialSyncCheckpoint> {
			let store = CheckpointStore::open(&checkpoint_path)?;
			if let Some(cp) = store.load_initial_sync_checkpoint(&source_id, &table, &target_name)? {
				Ok(cp)
			} else {
				let cp = InitialSyncCheckpoint::new(source_id, table, target_name);
				store.save_initial_sync_checkpoint(&cp)?;
				Ok(cp)
			}
		})
		.await
		.map_err(|e| Error::Other(format!("checkpoint load task panicked: {e}")))?
	}

	async fn save_checkpoint(&self, checkpoint: InitialSyncCheckpoint) -> Result<()> {
		let checkpoint_path = self.checkpoint_path.clone();
		tokio::task::spawn_blocking(move || -> Result<()> {
			let store = CheckpointStore::open(&checkpoint_path)?;
			store.save_initial_sync_checkpoint(&checkpoint)
		})
		.await
		.map_err(|e| Error::Other(format!("checkpoint save task panicked: {e}")))?
	}

	async fn fetch_batch(&self, last_pk: Option<String>) -> Result<Vec<Row>> {
		let source_path = self.source_path.clone();
		let table = self.mapping.source_table.clone();
		let pk_col = self.pk_col.clone();
		let limit = self.batch_size;

		tokio::task::spawn_blocking(move || -> Result<Vec<Row>> {
			let conn = open_source_readonly(&source_path)?;
			scan_batch(&conn, &table, &pk_col, last_pk.as_deref(), limit)
		})
		.await
		.map_err(|e| Error::Other(format!("backfill scan task panicked: {e}")))?
	}
}

fn open_source_readonly(path: &Path) -> Result<Connection> {
	Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
		.map_err(|e| Error::Other(format!("opening source for backfill scan: {e}")))
}

/// Seek pagination: `WHERE pk > last ORDER BY pk LIMIT n`, never
/// offset-based, so a batch's cost does not grow with how far the scan
/// has already progressed.
fn scan_batch(conn: &Connection, table: &str, pk_col: &str, last_pk: Option<&str>, limit: usize) -> Result<Vec<Row>> {
	let quoted_table = quote_ident(table);
	let quoted_pk = quote_ident(pk_col);

	let sql = match last_pk {
		Some(_) => format!("SELECT * FROM {quoted_table} WHERE {quoted_pk} > ?1 ORDER BY {quoted_pk} ASC LIMIT ?2"),
		None => format!("SELECT * FROM {quoted_table} ORDER BY {quoted_pk} ASC LIMIT ?1"),
	};

	let mut stmt = conn.prepare(&sql).map_err(|e| Error::Other(format!("preparing backfill scan for {table}: {e}")))?;

	let mapped = match last_pk {
		Some(pk) => stmt.query_map(params![pk, limit as i64], row_from_rusqlite),
		None => stmt.query_map(params![limit as i64], row_from_rusqlite),
	}
	.map_err(|e| Error::Other(format!("scanning {table}: {e}")))?;

	let mut out = Vec::with_capacity(limit);
	for row in mapped {
		out.push(row.map_err(|e| Error::Other(format!("reading scanned row from {table}: {e}")))?);
	}
	Ok(out)
}

/// Finds the column SQLite's schema marks as the integer primary key
/// alias, if the table declares one.
fn declared_primary_key(conn: &Connection, table: &str) -> Result<Option<String>> {
	let sql = format!("PRAGMA table_info({})", quote_ident(table));
	let mut stmt = conn.prepare(&sql).map_err(|e| Error::Other(format!("reading schema for {table}: {e}")))?;
	let mut rows = stmt
		.query_map([], |row| {
			let name: String = row.get(1)?;
			let pk: i64 = row.get(5)?;
			Ok((name, pk))
		})
		.map_err(|e| Error::Other(format!("reading schema for {table}: {e}")))?;

	let mut best: Option<(i64, String)> = None;
	while let Some(entry) = rows.next().transpose().map_err(|e| Error::Other(format!("reading schema for {table}: {e}")))? {
		let (name, pk) = entry;
		if pk > 0 && best.as_ref().map(|(seq, _)| pk < *seq).unwrap_or(true) {
			best = Some((pk, name));
		}
	}
	Ok(best.map(|(_, name)| name))
}

fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn pk_as_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::sync::Mutex;

	use async_trait::async_trait;
	use cdc_config::FieldMapping;
	use cdc_target::BatchOutcome;
	use tempfile::tempdir;

	use super::*;

	struct RecordingWriter {
		applied: Mutex<Vec<TableOp>>,
	}

	#[async_trait]
	impl TargetWriter for RecordingWriter {
		async fn connect(&self) -> Result<()> {
			Ok(())
		}
		async fn disconnect(&self) -> Result<()> {
			Ok(())
		}
		async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
			self.applied.lock().unwrap().extend(ops.iter().cloned());
			Ok(BatchOutcome { applied: ops.iter().map(|op| op.audit_id).collect(), failed: vec![] })
		}
		async fn ping(&self) -> Result<()> {
			Ok(())
		}
	}

	fn seed_source(dir: &Path) -> PathBuf {
		let path = dir.join("source.db");
		let conn = Connection::open(&path).unwrap();
		conn.execute_batch(
			"CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
			 INSERT INTO users (name) VALUES ('a'), ('b'), ('c');",
		)
		.unwrap();
		path
	}

	fn mapping() -> TableMapping {
		TableMapping {
			source_table: "users".into(),
			target_table: Some("app_users".into()),
			primary_key: "id".into(),
			field_mappings: Vec::<FieldMapping>::new(),
			filter_condition: None,
		}
	}

	#[tokio::test]
	async fn backfill_copies_all_rows_in_seek_pagination_batches() {
		let dir = tempdir().unwrap();
		let source_path = seed_source(dir.path());
		let checkpoint_path = dir.path().join("checkpoint.db");

		let writer = Arc::new(RecordingWriter { applied: Mutex::new(Vec::new()) });
		let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
		targets.insert("t1".into(), writer.clone());

		let source = SourceConfig {
			db_path: source_path,
			journal_mode: "WAL".into(),
			tables: vec!["users".into()],
			primary_key_overrides: HashMap::new(),
		};

		let runner = InitialSyncRunner::new("src1", source, checkpoint_path.clone(), vec![mapping()], targets, 2);
		let handoff_id = runner.run().await.unwrap();
		assert_eq!(handoff_id, 0);

		assert_eq!(writer.applied.lock().unwrap().len(), 3);

		let store = CheckpointStore::open(&checkpoint_path).unwrap();
		let cp = store.load_initial_sync_checkpoint("src1", "users", "t1").unwrap().unwrap();
		assert_eq!(cp.status, SyncStatus::Completed);
		assert_eq!(cp.rows_copied, 3);
	}

	#[tokio::test]
	async fn backfill_is_resumable_from_a_saved_checkpoint() {
		let dir = tempdir().unwrap();
		let source_path = seed_source(dir.path());
		let checkpoint_path = dir.path().join("checkpoint.db");

		{
			let store = CheckpointStore::open(&checkpoint_path).unwrap();
			let mut cp = InitialSyncCheckpoint::new("src1", "users", "t1");
			cp.last_primary_key = Some("2".into());
			cp.rows_copied = 2;
			store.save_initial_sync_checkpoint(&cp).unwrap();
		}

		let writer = Arc::new(RecordingWriter { applied: Mutex::new(Vec::new()) });
		let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
		targets.insert("t1".into(), writer.clone());

		let source = SourceConfig {
			db_path: source_path,
			journal_mode: "WAL".into(),
			tables: vec!["users".into()],
			primary_key_overrides: HashMap::new(),
		};

		let runner = InitialSyncRunner::new("src1", source, checkpoint_path, vec![mapping()], targets, 10);
		runner.run().await.unwrap();

		assert_eq!(writer.applied.lock().unwrap().len(), 1);
	}

	struct FailingWriter;

	#[async_trait]
	impl TargetWriter for FailingWriter {
		async fn connect(&self) -> Result<()> {
			Ok(())
		}
		async fn disconnect(&self) -> Result<()> {
			Ok(())
		}
		async fn apply_batch(&self, _ops: &[TableOp]) -> Result<BatchOutcome> {
			Err(Error::Reachability { target: "unreachable-target".into(), reason: "connection refused".into() })
		}
		async fn ping(&self) -> Result<()> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn one_targets_failure_does_not_block_another_targets_backfill() {
		let dir = tempdir().unwrap();
		let source_path = seed_source(dir.path());
		let checkpoint_path = dir.path().join("checkpoint.db");

		let healthy = Arc::new(RecordingWriter { applied: Mutex::new(Vec::new()) });
		let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
		targets.insert("healthy".into(), healthy.clone());
		targets.insert("unreachable".into(), Arc::new(FailingWriter));

		let source = SourceConfig {
			db_path: source_path,
			journal_mode: "WAL".into(),
			tables: vec!["users".into()],
			primary_key_overrides: HashMap::new(),
		};

		let runner = InitialSyncRunner::new("src1", source, checkpoint_path.clone(), vec![mapping()], targets, 10);
		runner.run().await.unwrap();

		assert_eq!(healthy.applied.lock().unwrap().len(), 3);

		let store = CheckpointStore::open(&checkpoint_path).unwrap();
		let healthy_cp = store.load_initial_sync_checkpoint("src1", "users", "healthy").unwrap().unwrap();
		assert_eq!(healthy_cp.status, SyncStatus::Completed);

		let unreachable_cp = store.load_initial_sync_checkpoint("src1", "users", "unreachable").unwrap().unwrap();
		assert_eq!(unreachable_cp.status, SyncStatus::Running);

		let errors = store.recent_errors(10).unwrap();
		assert!(errors.iter().any(|e| e.target_name == "unreachable"));
	}
}
