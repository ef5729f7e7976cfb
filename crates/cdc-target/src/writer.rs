// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use async_trait::async_trait;
use cdc_core::{Error, Result, TableOp};

/// Per-table metadata a writer needs beyond what a [`TableOp`] already
/// carries: which column holds the primary key, for building the
/// `WHERE`/`ON` clause a delete or merge needs.
#[derive(Debug, Clone)]
pub struct TableSchema {
	pub primary_key_column: String,
}

/// Outcome of one `apply_batch` call. `applied` lists the audit ids
/// that landed durably; `failed` lists the ones that didn't, paired
/// with why, so the engine can retry or surface them without guessing
/// which half of a partially-applied batch needs replay.
#[derive(Debug, Default)]
pub struct BatchOutcome {
	pub applied: Vec<i64>,
	pub failed: Vec<(i64, Error)>,
}

impl BatchOutcome {
	pub fn max_applied(&self) -> Option<i64> {
		self.applied.iter().copied().max()
	}
}

/// Uniform interface every target dialect implements, per the design's
/// connect/disconnect/apply_batch/ping contract. The retry budget lives
/// in the engine, not here — a writer just reports what happened.
#[async_trait]
pub trait TargetWriter: Send + Sync {
	async fn connect(&self) -> Result<()>;
	async fn disconnect(&self) -> Result<()>;
	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome>;
	async fn ping(&self) -> Result<()>;
}
