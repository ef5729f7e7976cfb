// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_core::{AuditRecord, Operation, Result, Row};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::schema;
use crate::sqlite_err;

/// Read-side handle onto the audit table, used by the audit reader and
/// by status/backlog reporting. The interception wrapper writes to the
/// same table but does so inside its own business transaction via
/// [`insert_record`], not through this type.
pub struct AuditStore {
	conn: Connection,
}

impl AuditStore {
	pub fn open(path: &Path) -> Result<Self> {
		let conn = Connection::open(path).map_err(sqlite_err)?;
		schema::ensure_schema(&conn)?;
		Ok(AuditStore { conn })
	}

	/// Returns up to `limit` records with `id > after_id`, in ascending
	/// id order, regardless of consumed state (consumed rows are
	/// retained per the data model; pruning is an operator concern).
	pub fn fetch_unconsumed(&self, after_id: i64, limit: usize) -> Result<Vec<AuditRecord>> {
		let mut stmt = self
			.conn
			.prepare(
				"SELECT id, table_name, operation, row_id, before_data, after_data, \
				 created_at, consumed_at, retry_count \
				 FROM cdc_audit_log \
				 WHERE id > ?1 AND consumed_at IS NULL \
				 ORDER BY id ASC LIMIT ?2",
			)
			.map_err(sqlite_err)?;

		let rows = stmt
			.query_map(params![after_id, limit as i64], row_to_record)
			.map_err(sqlite_err)?;

		let mut out = Vec::with_capacity(limit);
		for row in rows {
			out.push(row.map_err(sqlite_err)?);
		}
		Ok(out)
	}

	/// Marks the given audit ids as consumed now. Ids that are already
	/// consumed, or that do not exist, are silently ignored — replay
	/// after a crash must be able to re-mark ids it already marked.
	pub fn mark_consumed(&self, ids: &[i64]) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}
		let now = Utc::now().to_rfc3339();
		let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
		let sql = format!(
			"UPDATE cdc_audit_log SET consumed_at = ?1 WHERE id IN ({placeholders}) AND consumed_at IS NULL"
		);
		let mut stmt = self.conn.prepare(&sql).map_err(sqlite_err)?;
		let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&now];
		for id in ids {
			bound.push(id);
		}
		stmt.execute(bound.as_slice()).map_err(sqlite_err)?;
		Ok(())
	}

	/// Highest audit id currently in the table, or 0 if empty. Used to
	/// pin the initial-sync handoff boundary.
	pub fn max_id(&self) -> Result<i64> {
		self.conn
			.query_row("SELECT COALESCE(MAX(id), 0) FROM cdc_audit_log", [], |row| row.get(0))
			.map_err(sqlite_err)
	}

	pub fn count_unconsumed(&self) -> Result<i64> {
		self.conn
			.query_row("SELECT COUNT(*) FROM cdc_audit_log WHERE consumed_at IS NULL", [], |row| {
				row.get(0)
			})
			.map_err(sqlite_err)
	}

	/// Increments `retry_count` for one audit row, called once per apply
	/// attempt beyond the first. Ignores ids that don't exist — the row
	/// may since have been consumed and pruned by an operator.
	pub fn increment_retry_count(&self, id: i64) -> Result<()> {
		self.conn
			.execute("UPDATE cdc_audit_log SET retry_count = retry_count + 1 WHERE id = ?1", params![id])
			.map_err(sqlite_err)?;
		Ok(())
	}

	pub fn record_by_id(&self, id: i64) -> Result<Option<AuditRecord>> {
		self.conn
			.query_row(
				"SELECT id, table_name, operation, row_id, before_data, after_data, \
				 created_at, consumed_at, retry_count FROM cdc_audit_log WHERE id = ?1",
				params![id],
				row_to_record,
			)
			.optional()
			.map_err(sqlite_err)
	}
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
	let operation_str: String = row.get(2)?;
	let operation = Operation::from_str(&operation_str).unwrap_or(Operation::Insert);
	let before_json: Option<String> = row.get(4)?;
	let after_json: Option<String> = row.get(5)?;
	let created_at_str: String = row.get(6)?;
	let consumed_at_str: Option<String> = row.get(7)?;

	Ok(AuditRecord {
		id: row.get(0)?,
		table_name: row.get(1)?,
		operation,
		row_id: row.get(3)?,
		before_data: before_json.and_then(|s| serde_json::from_str::<Row>(&s).ok()),
		after_data: after_json.and_then(|s| serde_json::from_str::<Row>(&s).ok()),
		created_at: created_at_str.parse().unwrap_or_else(|_| Utc::now()),
		consumed_at: consumed_at_str.and_then(|s| s.parse().ok()),
		retry_count: row.get(8)?,
	})
}

/// Appends one audit record inside the caller's transaction — the same
/// transaction performing the business mutation, so both commit or roll
/// back together. Called by the interception wrapper, never directly by
/// application code.
pub fn insert_record(
	tx: &rusqlite::Transaction<'_>,
	table_name: &str,
	operation: Operation,
	row_id: &str,
	before: Option<&Row>,
	after: Option<&Row>,
) -> Result<i64> {
	let before_json = before.map(|r| serde_json::to_string(r)).transpose().map_err(|e| {
		cdc_core::Error::data(format!("serializing before-image for {table_name}:{row_id}: {e}"))
	})?;
	let after_json = after.map(|r| serde_json::to_string(r)).transpose().map_err(|e| {
		cdc_core::Error::data(format!("serializing after-image for {table_name}:{row_id}: {e}"))
	})?;
	let now = Utc::now().to_rfc3339();

	tx.execute(
		"INSERT INTO cdc_audit_log (table_name, operation, row_id, before_data, after_data, created_at, retry_count) \
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
		params![table_name, operation.as_str(), row_id, before_json, after_json, now],
	)
	.map_err(sqlite_err)?;

	Ok(tx.last_insert_rowid())
}
