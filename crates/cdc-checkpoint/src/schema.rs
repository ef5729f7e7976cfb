// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::Result;
use rusqlite::Connection;

use crate::sqlite_err;

/// Creates the three checkpoint tables if they do not already exist.
/// Safe to call on every startup; this database is local metadata, kept
/// separate from the source database the audit log lives in.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
	conn.execute_batch(
		"
		CREATE TABLE IF NOT EXISTS sync_positions (
			source_id TEXT NOT NULL,
			target_name TEXT NOT NULL,
			last_audit_id INTEGER NOT NULL,
			total_events INTEGER NOT NULL,
			last_processed_at TEXT,
			PRIMARY KEY (source_id, target_name)
		);

		CREATE TABLE IF NOT EXISTS initial_sync_checkpoints (
			source_id TEXT NOT NULL,
			table_name TEXT NOT NULL,
			target_name TEXT NOT NULL,
			last_primary_key TEXT,
			status TEXT NOT NULL CHECK(status IN ('running','completed','failed')),
			rows_copied INTEGER NOT NULL,
			PRIMARY KEY (source_id, table_name, target_name)
		);

		CREATE TABLE IF NOT EXISTS sync_errors (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			source_id TEXT NOT NULL,
			target_name TEXT NOT NULL,
			table_name TEXT,
			audit_id INTEGER,
			error_kind TEXT NOT NULL DEFAULT 'other',
			retry_count INTEGER NOT NULL DEFAULT 0,
			resolved INTEGER NOT NULL DEFAULT 0,
			message TEXT NOT NULL,
			occurred_at TEXT NOT NULL
		);

		CREATE INDEX IF NOT EXISTS idx_sync_errors_target_time
		ON sync_errors(source_id, target_name, occurred_at);
		",
	)
	.map_err(sqlite_err)?;
	Ok(())
}
