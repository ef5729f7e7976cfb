// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;

use async_trait::async_trait;
use cdc_core::{Error, Result, Row, TableOp, TargetOp};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlPoolOptions};
use sqlx::{Pool, QueryBuilder};
use tracing::warn;

use crate::writer::{BatchOutcome, TableSchema, TargetWriter};

/// Popular-OSS-SQL-server dialect: `INSERT ... ON DUPLICATE KEY UPDATE`
/// for upserts, batched where possible with a per-row fallback so one
/// bad row in a batch does not block the rest.
pub struct MySqlWriter {
	pool: Pool<MySql>,
	schemas: HashMap<String, TableSchema>,
}

impl MySqlWriter {
	pub async fn connect(database_url: &str, max_connections: u32, schemas: HashMap<String, TableSchema>) -> Result<Self> {
		let pool = MySqlPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await
			.map_err(|e| Error::Reachability { target: "mysql".into(), reason: e.to_string() })?;
		Ok(MySqlWriter { pool, schemas })
	}

	async fn apply_upserts(&self, table: &str, ops: &[(&TableOp, &Row)], outcome: &mut BatchOutcome) {
		match self.batched_upsert(table, ops).await {
			Ok(()) => outcome.applied.extend(ops.iter().map(|(op, _)| op.audit_id)),
			Err(e) => {
				warn!(table, error = %e, "batched upsert failed, falling back to per-row");
				for (op, row) in ops {
					match self.single_upsert(table, row).await {
						Ok(()) => outcome.applied.push(op.audit_id),
						Err(e) => outcome.failed.push((op.audit_id, e)),
					}
				}
			}
		}
	}

	async fn batched_upsert(&self, table: &str, ops: &[(&TableOp, &Row)]) -> Result<()> {
		let Some((_, first_row)) = ops.first() else { return Ok(()) };
		let columns: Vec<&String> = first_row.keys().collect();

		let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!("INSERT INTO {table} ("));
		builder.push(columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "));
		builder.push(") VALUES ");

		for (i, (_, row)) in ops.iter().enumerate() {
			if i > 0 {
				builder.push(", ");
			}
			builder.push("(");
			for (j, col) in columns.iter().enumerate() {
				if j > 0 {
					builder.push(", ");
				}
				bind_value(&mut builder, row.get(*col).cloned().unwrap_or(Value::Null));
			}
			builder.push(")");
		}

		builder.push(" ON DUPLICATE KEY UPDATE ");
		builder.push(
			columns.iter().map(|c| format!("{} = VALUES({})", quote_ident(c), quote_ident(c))).collect::<Vec<_>>().join(", "),
		);

		builder
			.build()
			.execute(&self.pool)
			.await
			.map_err(|e| Error::transient(format!("mysql batched upsert into {table}: {e}")))?;
		Ok(())
	}

	async fn single_upsert(&self, table: &str, row: &Row) -> Result<()> {
		let columns: Vec<&String> = row.keys().collect();
		let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!("INSERT INTO {table} ("));
		builder.push(columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "));
		builder.push(") VALUES (");
		for (i, col) in columns.iter().enumerate() {
			if i > 0 {
				builder.push(", ");
			}
			bind_value(&mut builder, row.get(*col).cloned().unwrap_or(Value::Null));
		}
		builder.push(") ON DUPLICATE KEY UPDATE ");
		builder.push(
			columns.iter().map(|c| format!("{} = VALUES({})", quote_ident(c), quote_ident(c))).collect::<Vec<_>>().join(", "),
		);

		builder
			.build()
			.execute(&self.pool)
			.await
			.map_err(|e| Error::data(format!("mysql upsert into {table} failed: {e}")))?;
		Ok(())
	}

	async fn apply_deletes(&self, table: &str, ops: &[(&TableOp, &Value)], outcome: &mut BatchOutcome) {
		let schema = self.schemas.get(table);
		let Some(schema) = schema else {
			for (op, _) in ops {
				outcome.failed.push((op.audit_id, Error::configuration(format!("no schema registered for table {table}"))));
			}
			return;
		};

		match self.batched_delete(table, &schema.primary_key_column, ops).await {
			Ok(()) => outcome.applied.extend(ops.iter().map(|(op, _)| op.audit_id)),
			Err(e) => {
				warn!(table, error = %e, "batched delete failed, falling back to per-row");
				for (op, key) in ops {
					match self.single_delete(table, &schema.primary_key_column, key).await {
						Ok(()) => outcome.applied.push(op.audit_id),
						Err(e) => outcome.failed.push((op.audit_id, e)),
					}
				}
			}
		}
	}

	async fn batched_delete(&self, table: &str, pk_column: &str, ops: &[(&TableOp, &Value)]) -> Result<()> {
		let mut builder: QueryBuilder<MySql> =
			QueryBuilder::new(format!("DELETE FROM {table} WHERE {} IN (", quote_ident(pk_column)));
		for (i, (_, key)) in ops.iter().enumerate() {
			if i > 0 {
				builder.push(", ");
			}
			bind_value(&mut builder, (*key).clone());
		}
		builder.push(")");

		builder
			.build()
			.execute(&self.pool)
			.await
			.map_err(|e| Error::transient(format!("mysql batched delete from {table}: {e}")))?;
		Ok(())
	}

	async fn single_delete(&self, table: &str, pk_column: &str, key: &Value) -> Result<()> {
		let mut builder: QueryBuilder<MySql> =
			QueryBuilder::new(format!("DELETE FROM {table} WHERE {} = ", quote_ident(pk_column)));
		bind_value(&mut builder, key.clone());
		builder
			.build()
			.execute(&self.pool)
			.await
			.map_err(|e| Error::data(format!("mysql delete from {table} failed: {e}")))?;
		Ok(())
	}
}

#[async_trait]
impl TargetWriter for MySqlWriter {
	async fn connect(&self) -> Result<()> {
		self.ping().await
	}

	async fn disconnect(&self) -> Result<()> {
		self.pool.close().await;
		Ok(())
	}

	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
		let mut outcome = BatchOutcome::default();

		let mut upserts_by_table: HashMap<&str, Vec<(&TableOp, &Row)>> = HashMap::new();
		let mut deletes_by_table: HashMap<&str, Vec<(&TableOp, &Value)>> = HashMap::new();

		for op in ops {
			match &op.op {
				TargetOp::Upsert(row) => upserts_by_table.entry(op.table.as_str()).or_default().push((op, row)),
				TargetOp::Delete(key) => deletes_by_table.entry(op.table.as_str()).or_default().push((op, key)),
			}
		}

		for (table, group) in upserts_by_table {
			self.apply_upserts(table, &group, &mut outcome).await;
		}
		for (table, group) in deletes_by_table {
			self.apply_deletes(table, &group, &mut outcome).await;
		}

		Ok(outcome)
	}

	async fn ping(&self) -> Result<()> {
		sqlx::query("SELECT 1")
			.execute(&self.pool)
			.await
			.map(|_| ())
			.map_err(|e| Error::Reachability { target: "mysql".into(), reason: e.to_string() })
	}
}

/// MySQL has no quoting-free way to guarantee a column/table name from
/// configuration is safe to interpolate; backtick-quoting and escaping
/// embedded backticks is the standard mitigation short of an allowlist.
fn quote_ident(name: &str) -> String {
	format!("`{}`", name.replace('`', "``"))
}

/// Binds one JSON value onto the builder as whichever native type
/// `sqlx`'s MySQL driver already knows how to encode, rather than
/// introducing a custom `Encode` impl for a dynamically-typed value.
fn bind_value(builder: &mut QueryBuilder<'_, MySql>, value: Value) {
	match value {
		Value::Null => {
			builder.push_bind(Option::<i64>::None);
		}
		Value::Bool(b) => {
			builder.push_bind(b);
		}
		Value::Number(n) if n.is_i64() => {
			builder.push_bind(n.as_i64().unwrap());
		}
		Value::Number(n) => {
			builder.push_bind(n.as_f64().unwrap_or_default());
		}
		Value::String(s) => {
			builder.push_bind(s);
		}
		other => {
			builder.push_bind(other.to_string());
		}
	}
}
