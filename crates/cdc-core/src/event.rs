// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use chrono::{DateTime, Utc};

use crate::audit::{AuditRecord, Operation};
use crate::row::Row;

/// In-memory value object derived 1:1 from an [`AuditRecord`]. This is
/// what flows through the reader -> transformer -> target-writer
/// pipeline; audit rows never leave the audit-store boundary directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
	pub audit_id: i64,
	pub table_name: String,
	pub operation: Operation,
	pub row_id: String,
	pub before_data: Option<Row>,
	pub after_data: Option<Row>,
	pub created_at: DateTime<Utc>,
	pub retry_count: i64,
}

impl ChangeEvent {
	/// Globally unique (within a source) event identifier, per the
	/// data model's `"{id}:{table}:{row_id}"` convention.
	pub fn event_id(&self) -> String {
		format!("{}:{}:{}", self.audit_id, self.table_name, self.row_id)
	}
}

impl From<AuditRecord> for ChangeEvent {
	fn from(record: AuditRecord) -> Self {
		ChangeEvent {
			audit_id: record.id,
			table_name: record.table_name,
			operation: record.operation,
			row_id: record.row_id,
			before_data: record.before_data,
			after_data: record.after_data,
			created_at: record.created_at,
			retry_count: record.retry_count,
		}
	}
}
