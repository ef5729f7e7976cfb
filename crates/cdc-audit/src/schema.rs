// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::Result;
use rusqlite::Connection;

use crate::sqlite_err;

pub const TABLE_NAME: &str = "cdc_audit_log";

/// Creates the audit table and its two indexes if they do not already
/// exist, and asserts WAL mode. Safe to call on every startup.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
	conn.execute_batch(
		"
		CREATE TABLE IF NOT EXISTS cdc_audit_log (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			table_name TEXT NOT NULL,
			operation TEXT NOT NULL CHECK(operation IN ('INSERT','UPDATE','DELETE')),
			row_id TEXT NOT NULL,
			before_data TEXT,
			after_data TEXT,
			created_at TEXT NOT NULL,
			consumed_at TEXT,
			retry_count INTEGER NOT NULL DEFAULT 0
		);

		CREATE INDEX IF NOT EXISTS idx_cdc_audit_log_unconsumed
		ON cdc_audit_log(id) WHERE consumed_at IS NULL;

		CREATE INDEX IF NOT EXISTS idx_cdc_audit_log_table_created
		ON cdc_audit_log(table_name, created_at);
		",
	)
	.map_err(sqlite_err)?;

	assert_wal_mode(conn)?;
	Ok(())
}

fn assert_wal_mode(conn: &Connection) -> Result<()> {
	let mode: String = conn
		.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
		.map_err(sqlite_err)?;
	if mode.to_ascii_uppercase() != "WAL" {
		return Err(cdc_core::Error::configuration(format!(
			"could not enable WAL journal mode on source database (got '{mode}')"
		)));
	}
	Ok(())
}
