// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::row::Row;

/// The DML kind a captured statement performed, matching the leading
/// keyword the wrapper classified it by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operation {
	Insert,
	Update,
	Delete,
}

impl Operation {
	pub fn as_str(self) -> &'static str {
		match self {
			Operation::Insert => "INSERT",
			Operation::Update => "UPDATE",
			Operation::Delete => "DELETE",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"INSERT" => Some(Operation::Insert),
			"UPDATE" => Some(Operation::Update),
			"DELETE" => Some(Operation::Delete),
			_ => None,
		}
	}
}

/// One row of the append-only audit table, as described in the
/// capture design: `id` is the monotonic ordering key and consumption
/// cursor, `before_data`/`after_data` hold the pre/post images required
/// by `operation`, and `consumed_at` is null until some target has
/// durably applied the corresponding change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
	pub id: i64,
	pub table_name: String,
	pub operation: Operation,
	pub row_id: String,
	pub before_data: Option<Row>,
	pub after_data: Option<Row>,
	pub created_at: DateTime<Utc>,
	pub consumed_at: Option<DateTime<Utc>>,
	pub retry_count: i64,
}

impl AuditRecord {
	/// Validates the invariant from the data model: before/after image
	/// presence is determined by `operation`, never both absent.
	pub fn is_well_formed(&self) -> bool {
		match self.operation {
			Operation::Insert => self.after_data.is_some(),
			Operation::Update => self.before_data.is_some() && self.after_data.is_some(),
			Operation::Delete => self.before_data.is_some(),
		}
	}
}
