// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;
use std::sync::Arc;

use cdc_core::{Operation, Result, Row};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

use crate::classify::{Classification, classify};
use crate::counters::Counters;
use crate::schema;
use crate::sqlite_err;
use crate::store;
use crate::value_convert::row_from_rusqlite;

/// Wraps a handle to the source database so every statement passes
/// through classification and, for DML against an allow-listed table,
/// atomic before/after-image capture into the audit log.
///
/// Tables participating in capture are expected to declare an
/// `INTEGER PRIMARY KEY`, so SQLite's `rowid` and the table's primary
/// key coincide — the same assumption the initial-sync design makes
/// about ROWID stability (see the design notes on implicit row
/// identifiers).
pub struct InterceptedConnection {
	conn: Connection,
	allow_list: Vec<String>,
	counters: Arc<Counters>,
}

impl InterceptedConnection {
	pub fn open(path: &Path, allow_list: Vec<String>) -> Result<Self> {
		let conn = Connection::open(path).map_err(sqlite_err)?;
		schema::ensure_schema(&conn)?;
		Ok(InterceptedConnection { conn, allow_list, counters: Arc::new(Counters::default()) })
	}

	pub fn counters(&self) -> Arc<Counters> {
		self.counters.clone()
	}

	fn is_allowed(&self, table: &str) -> bool {
		self.allow_list.is_empty() || self.allow_list.iter().any(|t| t == table)
	}

	/// Executes one statement through the wrapper contract, returning
	/// the number of rows affected.
	pub fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
		match classify(sql) {
			Classification::Other => {
				self.counters.record_other();
				self.conn.execute(sql, params_from_iter(params.iter())).map_err(sqlite_err)
			}
			Classification::Dml { table, .. } if !self.is_allowed(&table) => {
				self.counters.record_other();
				self.conn.execute(sql, params_from_iter(params.iter())).map_err(sqlite_err)
			}
			Classification::Dml { operation, table } => self.capture_and_execute(sql, &table, operation, params),
		}
	}

	/// Bulk form: submits `param_sets.len()` parameter tuples against
	/// the same statement, producing one audit row per affected row
	/// with ordering preserved, per the wrapper's batch-submission
	/// contract.
	pub fn execute_batch_params(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<usize> {
		let mut total = 0;
		for params in param_sets {
			total += self.execute(sql, params)?;
		}
		Ok(total)
	}

	fn capture_and_execute(
		&mut self,
		sql: &str,
		table: &str,
		operation: Operation,
		params: &[SqlValue],
	) -> Result<usize> {
		let tx = self.conn.transaction().map_err(sqlite_err)?;

		let affected = match operation {
			Operation::Insert => {
				let rowid_before_count = count_placeholders(sql);
				if rowid_before_count != params.len() {
					return Err(cdc_core::Error::capture(format!(
						"parameter count mismatch for INSERT into {table}"
					)));
				}
				tx.execute(sql, params_from_iter(params.iter())).map_err(sqlite_err)?;
				let rowid = tx.last_insert_rowid();
				let after = select_by_rowid(&tx, table, rowid)?;
				if let Some(after) = after {
					store::insert_record(&tx, table, operation, &rowid.to_string(), None, Some(&after))?;
				}
				1
			}
			Operation::Update => {
				let (where_clause, before_param_count) = split_where(sql);
				let where_params = &params[before_param_count.min(params.len())..];
				let before_rows = select_matching(&tx, table, where_clause, where_params)?;

				tx.execute(sql, params_from_iter(params.iter())).map_err(sqlite_err)?;

				for (rowid, before) in before_rows {
					if let Some(after) = select_by_rowid(&tx, table, rowid)? {
						store::insert_record(
							&tx,
							table,
							operation,
							&rowid.to_string(),
							Some(&before),
							Some(&after),
						)?;
					}
				}
				tx.changes() as usize
			}
			Operation::Delete => {
				let (where_clause, _) = split_where(sql);
				let before_rows = select_matching(&tx, table, where_clause, params)?;

				tx.execute(sql, params_from_iter(params.iter())).map_err(sqlite_err)?;

				for (rowid, before) in &before_rows {
					store::insert_record(&tx, table, operation, &rowid.to_string(), Some(before), None)?;
				}
				before_rows.len()
			}
		};

		tx.commit().map_err(sqlite_err)?;
		Ok(affected)
	}
}

/// Counts `?` placeholders. Treats the statement as using unnumbered
/// positional placeholders, which is the only form this wrapper
/// supports for capture; numbered (`?1`) or named (`:name`)
/// placeholders fall outside what the classifier can safely split
/// across a before/after predicate and should route through `Other`.
fn count_placeholders(sql: &str) -> usize {
	sql.chars().filter(|&c| c == '?').count()
}

/// Splits a statement into everything from its (case-insensitive,
/// first) `WHERE` keyword onward, plus how many `?` placeholders
/// preceded it — the boundary between an UPDATE's `SET` parameters and
/// its predicate parameters.
fn split_where(sql: &str) -> (&str, usize) {
	let upper = sql.to_ascii_uppercase();
	match upper.find("WHERE") {
		Some(pos) => (sql[pos..].trim_end_matches(';').trim(), count_placeholders(&sql[..pos])),
		None => ("", count_placeholders(sql)),
	}
}

fn select_matching(
	tx: &rusqlite::Transaction<'_>,
	table: &str,
	where_clause: &str,
	params: &[SqlValue],
) -> Result<Vec<(i64, Row)>> {
	let sql = format!("SELECT rowid, * FROM {table} {where_clause}");
	let mut stmt = tx.prepare(&sql).map_err(sqlite_err)?;
	let rows = stmt
		.query_map(params_from_iter(params.iter()), |row| {
			let rowid: i64 = row.get(0)?;
			let map = row_from_rusqlite(row)?;
			Ok((rowid, map))
		})
		.map_err(sqlite_err)?;

	let mut out = Vec::new();
	for row in rows {
		out.push(row.map_err(sqlite_err)?);
	}
	Ok(out)
}

fn select_by_rowid(tx: &rusqlite::Transaction<'_>, table: &str, rowid: i64) -> Result<Option<Row>> {
	let sql = format!("SELECT rowid, * FROM {table} WHERE rowid = ?1");
	tx.query_row(&sql, [rowid], row_from_rusqlite)
		.map(Some)
		.or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
		.map_err(sqlite_err)
}

#[cfg(test)]
mod tests {
	use cdc_core::Operation;
	use tempfile::tempdir;

	use super::*;
	use crate::AuditStore;

	fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("source.db");
		(dir, path)
	}

	fn create_users_table(conn: &mut InterceptedConnection) {
		conn.execute(
			"CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT)",
			&[],
		)
		.unwrap();
	}

	#[test]
	fn insert_produces_one_audit_row() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
		create_users_table(&mut wrapper);

		wrapper
			.execute(
				"INSERT INTO users(name,email) VALUES (?,?)",
				&[SqlValue::Text("Zhang".into()), SqlValue::Text("z@x.com".into())],
			)
			.unwrap();

		let store = AuditStore::open(&path).unwrap();
		let records = store.fetch_unconsumed(0, 10).unwrap();
		assert_eq!(records.len(), 1);
		let record = &records[0];
		assert_eq!(record.operation, Operation::Insert);
		assert_eq!(record.row_id, "1");
		assert!(record.before_data.is_none());
		let after = record.after_data.as_ref().unwrap();
		assert_eq!(after.get("name").unwrap(), "Zhang");
		assert_eq!(after.get("email").unwrap(), "z@x.com");
	}

	#[test]
	fn update_captures_before_and_after() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
		create_users_table(&mut wrapper);
		wrapper
			.execute(
				"INSERT INTO users(name,email) VALUES (?,?)",
				&[SqlValue::Text("Zhang".into()), SqlValue::Text("z@x.com".into())],
			)
			.unwrap();

		wrapper
			.execute("UPDATE users SET name=? WHERE id=?", &[SqlValue::Text("Li".into()), SqlValue::Integer(1)])
			.unwrap();

		let store = AuditStore::open(&path).unwrap();
		let records = store.fetch_unconsumed(1, 10).unwrap();
		assert_eq!(records.len(), 1);
		let record = &records[0];
		assert_eq!(record.operation, Operation::Update);
		assert_eq!(record.before_data.as_ref().unwrap().get("name").unwrap(), "Zhang");
		assert_eq!(record.after_data.as_ref().unwrap().get("name").unwrap(), "Li");
	}

	#[test]
	fn delete_captures_before_only() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
		create_users_table(&mut wrapper);
		wrapper
			.execute(
				"INSERT INTO users(name,email) VALUES (?,?)",
				&[SqlValue::Text("Zhang".into()), SqlValue::Text("z@x.com".into())],
			)
			.unwrap();

		wrapper.execute("DELETE FROM users WHERE id=?", &[SqlValue::Integer(1)]).unwrap();

		let store = AuditStore::open(&path).unwrap();
		let records = store.fetch_unconsumed(1, 10).unwrap();
		assert_eq!(records.len(), 1);
		let record = &records[0];
		assert_eq!(record.operation, Operation::Delete);
		assert!(record.after_data.is_none());
		assert_eq!(record.before_data.as_ref().unwrap().get("name").unwrap(), "Zhang");
	}

	#[test]
	fn non_dml_statements_are_classified_other() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec![]).unwrap();
		create_users_table(&mut wrapper);
		assert_eq!(wrapper.counters().other_count(), 1, "CREATE TABLE should count as OTHER");
	}

	#[test]
	fn table_outside_allow_list_is_not_captured() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec!["orders".into()]).unwrap();
		create_users_table(&mut wrapper);
		wrapper
			.execute(
				"INSERT INTO users(name,email) VALUES (?,?)",
				&[SqlValue::Text("Zhang".into()), SqlValue::Text("z@x.com".into())],
			)
			.unwrap();

		let store = AuditStore::open(&path).unwrap();
		assert_eq!(store.count_unconsumed().unwrap(), 0);
	}

	#[test]
	fn bulk_insert_preserves_ordering() {
		let (_dir, path) = setup();
		let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
		create_users_table(&mut wrapper);

		let batches = vec![
			vec![SqlValue::Text("A".into()), SqlValue::Text("a@x.com".into())],
			vec![SqlValue::Text("B".into()), SqlValue::Text("b@x.com".into())],
			vec![SqlValue::Text("C".into()), SqlValue::Text("c@x.com".into())],
		];
		wrapper.execute_batch_params("INSERT INTO users(name,email) VALUES (?,?)", &batches).unwrap();

		let store = AuditStore::open(&path).unwrap();
		let records = store.fetch_unconsumed(0, 10).unwrap();
		assert_eq!(records.len(), 3);
		let names: Vec<_> =
			records.iter().map(|r| r.after_data.as_ref().unwrap().get("name").unwrap().as_str().unwrap()).collect();
		assert_eq!(names, vec!["A", "B", "C"]);
	}
}
