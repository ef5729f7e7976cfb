// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

fn default_batch_size() -> usize {
	100
}

fn default_checkpoint_interval() -> u32 {
	10
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
	PathBuf::from("./checkpoints")
}

fn default_primary_key() -> String {
	"id".to_string()
}

fn default_max_batch_size() -> usize {
	1000
}

fn default_backlog_soft_threshold() -> i64 {
	1000
}

/// The frozen, immutable-for-a-run configuration root described in the
/// design's §6 configuration shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
	pub source: SourceConfig,
	pub targets: Vec<TargetConfig>,
	pub mappings: Vec<TableMapping>,
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	/// Ceiling the engine may widen `batch_size` to when the audit
	/// backlog exceeds `backlog_soft_threshold`. Never exceeded.
	#[serde(default = "default_max_batch_size")]
	pub max_batch_size: usize,
	/// Unconsumed-event count above which the poller starts fetching
	/// larger batches, up to `max_batch_size`, to work the backlog down.
	#[serde(default = "default_backlog_soft_threshold")]
	pub backlog_soft_threshold: i64,
	#[serde(default = "default_checkpoint_interval")]
	pub checkpoint_interval: u32,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default = "default_checkpoint_dir")]
	pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
	pub db_path: PathBuf,
	#[serde(default = "default_journal_mode")]
	pub journal_mode: String,
	#[serde(default)]
	pub tables: Vec<String>,
	#[serde(default)]
	pub primary_key_overrides: HashMap<String, String>,
}

fn default_journal_mode() -> String {
	"WAL".to_string()
}

impl SourceConfig {
	/// Empty allow-list means all tables are in scope, per the
	/// wrapper's classification contract.
	pub fn is_allowed(&self, table: &str) -> bool {
		self.tables.is_empty() || self.tables.iter().any(|t| t == table)
	}
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
	Mysql,
	Oracle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_backoff_factor")]
	pub backoff_factor: f64,
	#[serde(default = "default_max_delay_secs")]
	pub max_delay_secs: u64,
	/// When a target's error is not retryable (a data error) or its
	/// retry budget is exhausted: `false` (default) skips the offending
	/// row and keeps the target running; `true` halts the target
	/// entirely, per the design's "skipped only if policy permits, else
	/// the target halts" rule.
	#[serde(default)]
	pub halt_on_unrecoverable: bool,
}

fn default_max_retries() -> u32 {
	5
}

fn default_backoff_factor() -> f64 {
	0.5
}

fn default_max_delay_secs() -> u64 {
	60
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			max_retries: default_max_retries(),
			backoff_factor: default_backoff_factor(),
			max_delay_secs: default_max_delay_secs(),
			halt_on_unrecoverable: false,
		}
	}
}

impl RetryPolicy {
	/// `backoff_factor * 2^attempt`, capped at `max_delay`, as specified
	/// in the error-handling design.
	pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
		let secs = self.backoff_factor * 2f64.powi(attempt as i32);
		let capped = secs.min(self.max_delay_secs as f64).max(0.0);
		std::time::Duration::from_secs_f64(capped)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: TargetKind,
	pub connection: HashMap<String, String>,
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	#[serde(default)]
	pub retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
	pub source_field: String,
	pub target_field: Option<String>,
	pub converter: Option<String>,
	#[serde(default)]
	pub converter_params: HashMap<String, String>,
}

impl FieldMapping {
	pub fn target_field(&self) -> &str {
		self.target_field.as_deref().unwrap_or(&self.source_field)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableMapping {
	pub source_table: String,
	pub target_table: Option<String>,
	#[serde(default = "default_primary_key")]
	pub primary_key: String,
	#[serde(default)]
	pub field_mappings: Vec<FieldMapping>,
	pub filter_condition: Option<String>,
}

impl TableMapping {
	pub fn target_table(&self) -> &str {
		self.target_table.as_deref().unwrap_or(&self.source_table)
	}
}
