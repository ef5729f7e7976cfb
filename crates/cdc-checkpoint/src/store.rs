// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_core::{InitialSyncCheckpoint, Result, SyncPosition, SyncStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::schema;
use crate::sqlite_err;

/// One row out of `sync_errors`, for status reporting.
#[derive(Debug, Clone)]
pub struct SyncErrorRecord {
	pub id: i64,
	pub source_id: String,
	pub target_name: String,
	pub table: Option<String>,
	pub audit_id: Option<i64>,
	pub error_kind: String,
	pub retry_count: u32,
	pub resolved: bool,
	pub message: String,
	pub occurred_at: DateTime<Utc>,
}

/// Durable progress store, on a local SQLite database distinct from the
/// source database the audit log lives in. `save_position` is an atomic
/// upsert per the design's contract; reads are point lookups.
pub struct CheckpointStore {
	conn: Connection,
}

impl CheckpointStore {
	pub fn open(path: &Path) -> Result<Self> {
		let conn = Connection::open(path).map_err(sqlite_err)?;
		schema::ensure_schema(&conn)?;
		Ok(CheckpointStore { conn })
	}

	pub fn save_position(&self, pos: &SyncPosition) -> Result<()> {
		let last_processed_at = pos.last_processed_at.map(|t| t.to_rfc3339());
		self.conn
			.execute(
				"INSERT INTO sync_positions (source_id, target_name, last_audit_id, total_events, last_processed_at) \
				 VALUES (?1, ?2, ?3, ?4, ?5) \
				 ON CONFLICT(source_id, target_name) DO UPDATE SET \
				 last_audit_id = excluded.last_audit_id, \
				 total_events = excluded.total_events, \
				 last_processed_at = excluded.last_processed_at",
				params![pos.source_id, pos.target_name, pos.last_audit_id, pos.total_events, last_processed_at],
			)
			.map_err(sqlite_err)?;
		Ok(())
	}

	/// Returns the saved position, or [`SyncPosition::zero`] if this
	/// `(source, target)` pair has never checkpointed — the audit reader
	/// resumes from the beginning in that case.
	pub fn load_position(&self, source_id: &str, target_name: &str) -> Result<SyncPosition> {
		self.conn
			.query_row(
				"SELECT source_id, target_name, last_audit_id, total_events, last_processed_at \
				 FROM sync_positions WHERE source_id = ?1 AND target_name = ?2",
				params![source_id, target_name],
				row_to_position,
			)
			.optional()
			.map_err(sqlite_err)?
			.map(Ok)
			.unwrap_or_else(|| Ok(SyncPosition::zero(source_id, target_name)))
	}

	pub fn save_initial_sync_checkpoint(&self, cp: &InitialSyncCheckpoint) -> Result<()> {
		self.conn
			.execute(
				"INSERT INTO initial_sync_checkpoints \
				 (source_id, table_name, target_name, last_primary_key, status, rows_copied) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
				 ON CONFLICT(source_id, table_name, target_name) DO UPDATE SET \
				 last_primary_key = excluded.last_primary_key, \
				 status = excluded.status, \
				 rows_copied = excluded.rows_copied",
				params![cp.source_id, cp.table, cp.target_name, cp.last_primary_key, cp.status.as_str(), cp.rows_copied],
			)
			.map_err(sqlite_err)?;
		Ok(())
	}

	pub fn load_initial_sync_checkpoint(
		&self,
		source_id: &str,
		table: &str,
		target_name: &str,
	) -> Result<Option<InitialSyncCheckpoint>> {
		self.conn
			.query_row(
				"SELECT source_id, table_name, target_name, last_primary_key, status, rows_copied \
				 FROM initial_sync_checkpoints WHERE source_id = ?1 AND table_name = ?2 AND target_name = ?3",
				params![source_id, table, target_name],
				row_to_initial_sync_checkpoint,
			)
			.optional()
			.map_err(sqlite_err)
	}

	/// Appends one `sync_errors` row. `error_kind` is `Error::kind()`'s
	/// stable label, not `Display` text, so status tooling can group or
	/// filter on it; `retry_count` is how many attempts had already been
	/// made against this event when this failure became final.
	pub fn record_error(
		&self,
		source_id: &str,
		target_name: &str,
		table: Option<&str>,
		audit_id: Option<i64>,
		error_kind: &str,
		retry_count: u32,
		message: &str,
	) -> Result<()> {
		self.conn
			.execute(
				"INSERT INTO sync_errors (source_id, target_name, table_name, audit_id, error_kind, retry_count, message, occurred_at) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
				params![source_id, target_name, table, audit_id, error_kind, retry_count, message, Utc::now().to_rfc3339()],
			)
			.map_err(sqlite_err)?;
		Ok(())
	}

	/// Marks every unresolved `sync_errors` row for this `(source,
	/// target, audit_id)` resolved — called once a previously-failing
	/// event applies cleanly on a later attempt.
	pub fn resolve_errors(&self, source_id: &str, target_name: &str, audit_id: i64) -> Result<usize> {
		self.conn
			.execute(
				"UPDATE sync_errors SET resolved = 1 \
				 WHERE source_id = ?1 AND target_name = ?2 AND audit_id = ?3 AND resolved = 0",
				params![source_id, target_name, audit_id],
			)
			.map_err(sqlite_err)
	}

	/// Drops every target's initial-sync checkpoint for `table`, so the
	/// next `initial`/`full` run rescans it from the beginning. Leaves
	/// `sync_positions` untouched — incremental streaming keeps its own
	/// per-target cursor, unaffected by a single table's backfill reset.
	pub fn reset_table(&self, source_id: &str, table: &str) -> Result<usize> {
		self.conn
			.execute(
				"DELETE FROM initial_sync_checkpoints WHERE source_id = ?1 AND table_name = ?2",
				params![source_id, table],
			)
			.map_err(sqlite_err)
	}

	/// Most recent errors across all sources/targets, newest first, for
	/// the status surface. Not partitioned by target — callers filter if
	/// they only want one.
	pub fn recent_errors(&self, limit: usize) -> Result<Vec<SyncErrorRecord>> {
		let mut stmt = self
			.conn
			.prepare(
				"SELECT id, source_id, target_name, table_name, audit_id, error_kind, retry_count, resolved, message, occurred_at \
				 FROM sync_errors ORDER BY id DESC LIMIT ?1",
			)
			.map_err(sqlite_err)?;
		let rows = stmt.query_map(params![limit as i64], row_to_error).map_err(sqlite_err)?;
		let mut out = Vec::with_capacity(limit);
		for row in rows {
			out.push(row.map_err(sqlite_err)?);
		}
		Ok(out)
	}
}

fn row_to_position(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncPosition> {
	let last_processed_at_str: Option<String> = row.get(4)?;
	Ok(SyncPosition {
		source_id: row.get(0)?,
		target_name: row.get(1)?,
		last_audit_id: row.get(2)?,
		total_events: row.get(3)?,
		last_processed_at: last_processed_at_str.and_then(|s| s.parse().ok()),
	})
}

fn row_to_initial_sync_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<InitialSyncCheckpoint> {
	let status_str: String = row.get(4)?;
	Ok(InitialSyncCheckpoint {
		source_id: row.get(0)?,
		table: row.get(1)?,
		target_name: row.get(2)?,
		last_primary_key: row.get(3)?,
		status: SyncStatus::from_str(&status_str).unwrap_or(SyncStatus::Running),
		rows_copied: row.get(5)?,
	})
}

fn row_to_error(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncErrorRecord> {
	let resolved_int: i64 = row.get(7)?;
	let occurred_at_str: String = row.get(9)?;
	Ok(SyncErrorRecord {
		id: row.get(0)?,
		source_id: row.get(1)?,
		target_name: row.get(2)?,
		table: row.get(3)?,
		audit_id: row.get(4)?,
		error_kind: row.get(5)?,
		retry_count: row.get(6)?,
		resolved: resolved_int != 0,
		message: row.get(8)?,
		occurred_at: occurred_at_str.parse().unwrap_or_else(|_| Utc::now()),
	})
}
