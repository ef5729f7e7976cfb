// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::Row;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value as JsonValue;

/// Converts one SQLite column value into the JSON representation used
/// throughout the rest of the pipeline.
pub fn value_from_sql(v: ValueRef<'_>) -> JsonValue {
	match v {
		ValueRef::Null => JsonValue::Null,
		ValueRef::Integer(i) => JsonValue::from(i),
		ValueRef::Real(f) => serde_json::Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
		ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
		ValueRef::Blob(b) => JsonValue::String(base16(b)),
	}
}

/// Converts a JSON value back into an owned SQLite value, for binding
/// as a statement parameter (used when re-applying captured values, and
/// by converters that typecast into a new value before upsert).
pub fn value_to_sql(v: &JsonValue) -> SqlValue {
	match v {
		JsonValue::Null => SqlValue::Null,
		JsonValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
		JsonValue::Number(n) => {
			if let Some(i) = n.as_i64() {
				SqlValue::Integer(i)
			} else if let Some(f) = n.as_f64() {
				SqlValue::Real(f)
			} else {
				SqlValue::Null
			}
		}
		JsonValue::String(s) => SqlValue::Text(s.clone()),
		other => SqlValue::Text(other.to_string()),
	}
}

fn base16(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Materializes an entire row from a `rusqlite::Row` into the
/// column-name-keyed map the rest of the system works with.
pub fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
	let mut out = Row::new();
	let stmt = row.as_ref();
	for (idx, name) in stmt.column_names().into_iter().enumerate() {
		let value = row.get_ref(idx)?;
		out.insert(name.to_string(), value_from_sql(value));
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_integer() {
		let sql = value_to_sql(&JsonValue::from(42));
		assert_eq!(sql, SqlValue::Integer(42));
	}

	#[test]
	fn round_trips_text() {
		let sql = value_to_sql(&JsonValue::String("hi".into()));
		assert_eq!(sql, SqlValue::Text("hi".into()));
	}

	#[test]
	fn null_stays_null() {
		assert_eq!(value_to_sql(&JsonValue::Null), SqlValue::Null);
	}
}
