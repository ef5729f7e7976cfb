// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;

use async_trait::async_trait;
use cdc_core::{Error, Result, Row, TableOp, TargetOp};
use serde_json::Value;
use tracing::warn;

use crate::writer::{BatchOutcome, TableSchema, TargetWriter};

/// Commercial-enterprise-SQL-server dialect: `MERGE ... WHEN MATCHED /
/// WHEN NOT MATCHED`, applied row-by-row per the design's contract for
/// this dialect (no multi-row `VALUES` form available through the
/// blocking OCI binding this crate wraps).
pub struct OracleWriter {
	pool: r2d2::Pool<ConnectionManager>,
	schemas: HashMap<String, TableSchema>,
}

impl OracleWriter {
	pub async fn connect(
		username: String,
		password: String,
		connect_string: String,
		max_connections: u32,
		schemas: HashMap<String, TableSchema>,
	) -> Result<Self> {
		let manager = ConnectionManager { username, password, connect_string };
		let pool = tokio::task::spawn_blocking(move || r2d2::Pool::builder().max_size(max_connections).build(manager))
			.await
			.map_err(|e| Error::Other(format!("oracle pool builder task panicked: {e}")))?
			.map_err(|e| Error::Reachability { target: "oracle".into(), reason: e.to_string() })?;
		Ok(OracleWriter { pool, schemas })
	}

	async fn run_blocking<F, T>(&self, f: F) -> Result<T>
	where
		F: FnOnce(&mut r2d2::PooledConnection<ConnectionManager>) -> Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let pool = self.pool.clone();
		tokio::task::spawn_blocking(move || {
			let mut conn = pool
				.get()
				.map_err(|e| Error::Reachability { target: "oracle".into(), reason: e.to_string() })?;
			f(&mut conn)
		})
		.await
		.map_err(|e| Error::Other(format!("oracle blocking task panicked: {e}")))?
	}
}

#[async_trait]
impl TargetWriter for OracleWriter {
	async fn connect(&self) -> Result<()> {
		self.ping().await
	}

	async fn disconnect(&self) -> Result<()> {
		// r2d2 pools have no explicit close; connections are dropped as the
		// pool itself is dropped.
		Ok(())
	}

	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
		let ops = ops.to_vec();
		let schemas = self.schemas.clone();
		self.run_blocking(move |conn| Ok(apply_batch_blocking(conn, &ops, &schemas))).await
	}

	async fn ping(&self) -> Result<()> {
		self.run_blocking(|conn| conn.ping().map_err(|e| Error::Reachability { target: "oracle".into(), reason: e.to_string() }))
			.await
	}
}

fn apply_batch_blocking(
	conn: &mut ::oracle::Connection,
	ops: &[TableOp],
	schemas: &HashMap<String, TableSchema>,
) -> BatchOutcome {
	let mut outcome = BatchOutcome::default();
	for op in ops {
		let result = match &op.op {
			TargetOp::Upsert(row) => schemas
				.get(&op.table)
				.ok_or_else(|| Error::configuration(format!("no schema registered for table {}", op.table)))
				.and_then(|schema| merge_row(conn, &op.table, &schema.primary_key_column, row)),
			TargetOp::Delete(key) => schemas
				.get(&op.table)
				.ok_or_else(|| Error::configuration(format!("no schema registered for table {}", op.table)))
				.and_then(|schema| delete_row(conn, &op.table, &schema.primary_key_column, key)),
		};
		match result {
			Ok(()) => outcome.applied.push(op.audit_id),
			Err(e) => {
				warn!(table = %op.table, audit_id = op.audit_id, error = %e, "oracle row apply failed");
				outcome.failed.push((op.audit_id, e));
			}
		}
	}
	outcome
}

fn merge_row(conn: &mut ::oracle::Connection, table: &str, pk_column: &str, row: &Row) -> Result<()> {
	let Some(pk_value) = row.get(pk_column) else {
		return Err(Error::data(format!("row for {table} is missing primary key column {pk_column}")));
	};

	let other_columns: Vec<&String> = row.keys().filter(|c| *c != pk_column).collect();

	let update_clause =
		other_columns.iter().map(|c| format!("t.{c} = :{c}")).collect::<Vec<_>>().join(", ");
	let insert_columns =
		std::iter::once(pk_column.to_string()).chain(other_columns.iter().map(|c| c.to_string())).collect::<Vec<_>>().join(", ");
	let insert_binds =
		std::iter::once(format!(":{pk_column}")).chain(other_columns.iter().map(|c| format!(":{c}"))).collect::<Vec<_>>().join(", ");

	let sql = format!(
		"MERGE INTO {table} t \
		 USING (SELECT :{pk_column} AS {pk_column} FROM dual) s \
		 ON (t.{pk_column} = s.{pk_column}) \
		 WHEN MATCHED THEN UPDATE SET {update_clause} \
		 WHEN NOT MATCHED THEN INSERT ({insert_columns}) VALUES ({insert_binds})"
	);

	let mut binds: Vec<(String, Bound)> = vec![(pk_column.to_string(), json_to_bound(pk_value.clone()))];
	for col in &other_columns {
		binds.push((col.to_string(), json_to_bound(row.get(*col).cloned().unwrap_or(Value::Null))));
	}
	let named: Vec<(&str, &dyn ::oracle::sql_type::ToSql)> = binds.iter().map(|(n, v)| (n.as_str(), v as &dyn ::oracle::sql_type::ToSql)).collect();

	conn.execute_named(&sql, &named).map_err(|e| Error::data(format!("oracle merge into {table} failed: {e}")))?;
	conn.commit().map_err(|e| Error::transient(format!("oracle commit after merge into {table}: {e}")))?;
	Ok(())
}

fn delete_row(conn: &mut ::oracle::Connection, table: &str, pk_column: &str, key: &Value) -> Result<()> {
	let sql = format!("DELETE FROM {table} WHERE {pk_column} = :pk");
	let bound = json_to_bound(key.clone());
	conn.execute_named(&sql, &[("pk", &bound as &dyn ::oracle::sql_type::ToSql)])
		.map_err(|e| Error::data(format!("oracle delete from {table} failed: {e}")))?;
	conn.commit().map_err(|e| Error::transient(format!("oracle commit after delete from {table}: {e}")))?;
	Ok(())
}

/// Owned stand-in value implementing `ToSql` by delegating to whichever
/// primitive type the JSON variant maps to, since Oracle binds are
/// statically typed and our rows are not.
enum Bound {
	Null,
	Int(i64),
	Float(f64),
	Text(String),
}

fn json_to_bound(value: Value) -> Bound {
	match value {
		Value::Null => Bound::Null,
		Value::Bool(b) => Bound::Int(if b { 1 } else { 0 }),
		Value::Number(n) if n.is_i64() => Bound::Int(n.as_i64().unwrap()),
		Value::Number(n) => Bound::Float(n.as_f64().unwrap_or_default()),
		Value::String(s) => Bound::Text(s),
		other => Bound::Text(other.to_string()),
	}
}

impl ::oracle::sql_type::ToSql for Bound {
	fn oratype(&self, conn: &::oracle::Connection) -> ::oracle::Result<::oracle::sql_type::OracleType> {
		match self {
			Bound::Null => Option::<i64>::None.oratype(conn),
			Bound::Int(v) => v.oratype(conn),
			Bound::Float(v) => v.oratype(conn),
			Bound::Text(v) => v.oratype(conn),
		}
	}

	fn to_sql(&self, val: &mut ::oracle::SqlValue) -> ::oracle::Result<()> {
		match self {
			Bound::Null => Option::<i64>::None.to_sql(val),
			Bound::Int(v) => v.to_sql(val),
			Bound::Float(v) => v.to_sql(val),
			Bound::Text(v) => v.to_sql(val),
		}
	}
}

/// `r2d2::ManageConnection` wrapper so the blocking Oracle driver can
/// live behind the same bounded-pool shape every target writer uses.
struct ConnectionManager {
	username: String,
	password: String,
	connect_string: String,
}

impl r2d2::ManageConnection for ConnectionManager {
	type Connection = ::oracle::Connection;
	type Error = ::oracle::Error;

	fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
		::oracle::Connection::connect(&self.username, &self.password, &self.connect_string)
	}

	fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
		conn.ping()
	}

	fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
		false
	}
}

