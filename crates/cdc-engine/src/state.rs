// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

/// Top-level lifecycle: `Idle -> InitialSyncing -> Incremental ->
/// Stopping -> Stopped`, with `Failed` reachable from any running state
/// once a non-retryable error exceeds its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	InitialSyncing,
	Incremental,
	Stopping,
	Stopped,
	Failed,
}

/// Per-target visibility for the status surface: how far behind the
/// source this target is, and its most recent recorded error, if any.
#[derive(Debug, Clone)]
pub struct TargetStatus {
	pub name: String,
	pub last_audit_id: i64,
	pub lag: i64,
	pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
	pub state: EngineState,
	pub backlog_size: i64,
	pub targets: Vec<TargetStatus>,
}
