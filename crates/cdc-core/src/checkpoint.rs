// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable incremental-sync progress for a single `(source, target)`
/// pair. `last_audit_id` only ever advances (checkpoint monotonicity);
/// it is the floor the audit reader resumes from after a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncPosition {
	pub source_id: String,
	pub target_name: String,
	pub last_audit_id: i64,
	pub total_events: i64,
	pub last_processed_at: Option<DateTime<Utc>>,
}

impl SyncPosition {
	pub fn zero(source_id: impl Into<String>, target_name: impl Into<String>) -> Self {
		SyncPosition {
			source_id: source_id.into(),
			target_name: target_name.into(),
			last_audit_id: 0,
			total_events: 0,
			last_processed_at: None,
		}
	}
}

/// Status of a single table's initial-sync backfill against a single
/// target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStatus {
	Running,
	Completed,
	Failed,
}

impl SyncStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			SyncStatus::Running => "running",
			SyncStatus::Completed => "completed",
			SyncStatus::Failed => "failed",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"running" => Some(SyncStatus::Running),
			"completed" => Some(SyncStatus::Completed),
			"failed" => Some(SyncStatus::Failed),
			_ => None,
		}
	}
}

/// Durable initial-sync progress for a single `(source, table, target)`
/// tuple: the seek-pagination cursor plus row counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitialSyncCheckpoint {
	pub source_id: String,
	pub table: String,
	pub target_name: String,
	pub last_primary_key: Option<String>,
	pub status: SyncStatus,
	pub rows_copied: i64,
}

impl InitialSyncCheckpoint {
	pub fn new(source_id: impl Into<String>, table: impl Into<String>, target_name: impl Into<String>) -> Self {
		InitialSyncCheckpoint {
			source_id: source_id.into(),
			table: table.into(),
			target_name: target_name.into(),
			last_primary_key: None,
			status: SyncStatus::Running,
			rows_copied: 0,
		}
	}
}
