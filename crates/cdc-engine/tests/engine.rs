// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Drives [`EngineBatchHandler`] directly against mock target writers —
//! real dialect writers need a live MySQL/Oracle connection, so the
//! engine's own apply/checkpoint/resume logic is exercised here the way
//! `crates/cdc/tests/cdc.rs` exercises its poll-consumer: real
//! (tempdir-backed) checkpoint storage, a `thread::sleep`-paced restart,
//! assertions on observable state rather than mocked internals.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cdc_checkpoint::CheckpointStore;
use cdc_config::{FieldMapping, RetryPolicy, TableMapping};
use cdc_core::{ChangeEvent, Error, Operation, Result, Row, TableOp, TargetOp};
use cdc_engine::{EngineBatchHandler, EngineState};
use cdc_reader::BatchHandler;
use cdc_target::{BatchOutcome, TargetWriter};
use chrono::Utc;
use parking_lot::RwLock;
use tempfile::tempdir;

fn retry_policies(names: &[&str]) -> HashMap<String, RetryPolicy> {
	names.iter().map(|n| (n.to_string(), RetryPolicy::default())).collect()
}

fn fresh_engine_state() -> Arc<RwLock<cdc_engine::EngineState>> {
	Arc::new(RwLock::new(EngineState::Incremental))
}

struct RecordingWriter {
	applied: std::sync::Mutex<Vec<i64>>,
	fail_ids: Vec<i64>,
	calls: AtomicUsize,
}

impl RecordingWriter {
	fn new(fail_ids: Vec<i64>) -> Self {
		RecordingWriter { applied: std::sync::Mutex::new(Vec::new()), fail_ids, calls: AtomicUsize::new(0) }
	}

	fn applied_ids(&self) -> Vec<i64> {
		self.applied.lock().unwrap().clone()
	}
}

#[async_trait]
impl TargetWriter for RecordingWriter {
	async fn connect(&self) -> Result<()> {
		Ok(())
	}

	async fn disconnect(&self) -> Result<()> {
		Ok(())
	}

	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let mut outcome = BatchOutcome::default();
		for op in ops {
			if self.fail_ids.contains(&op.audit_id) {
				outcome.failed.push((op.audit_id, Error::data("simulated apply failure")));
			} else {
				outcome.applied.push(op.audit_id);
				self.applied.lock().unwrap().push(op.audit_id);
			}
		}
		Ok(outcome)
	}

	async fn ping(&self) -> Result<()> {
		Ok(())
	}
}

fn mapping() -> TableMapping {
	TableMapping {
		source_table: "orders".into(),
		target_table: Some("orders".into()),
		primary_key: "id".into(),
		field_mappings: Vec::<FieldMapping>::new(),
		filter_condition: None,
	}
}

fn event(audit_id: i64) -> ChangeEvent {
	let mut row = Row::new();
	row.insert("id".into(), serde_json::json!(audit_id));
	row.insert("status".into(), serde_json::json!("placed"));
	ChangeEvent {
		audit_id,
		table_name: "orders".into(),
		operation: Operation::Insert,
		row_id: audit_id.to_string(),
		before_data: None,
		after_data: Some(row),
		created_at: Utc::now(),
		retry_count: 0,
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_resumes_from_the_last_durable_position() {
	let dir = tempdir().unwrap();
	let checkpoint_path = dir.path().join("checkpoint.db");

	let writer: Arc<dyn TargetWriter> = Arc::new(RecordingWriter::new(vec![]));
	let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
	targets.insert("only-target".into(), writer.clone());

	let mappings = vec![mapping()];
	let source_path = dir.path().join("source.db");

	let handler = EngineBatchHandler::new(
		tokio::runtime::Handle::current(),
		targets.clone(),
		retry_policies(&["only-target"]),
		&mappings,
		checkpoint_path.clone(),
		source_path.clone(),
		"src".into(),
		fresh_engine_state(),
	)
	.unwrap();
	assert_eq!(handler.resume_floor(), 0);

	let next = handler.handle(&[event(1), event(2), event(3)]).unwrap();
	assert_eq!(next, 3);

	// Simulate a process restart: a fresh handler built against the same
	// checkpoint file should pick up exactly where the last one left off.
	let restarted = EngineBatchHandler::new(
		tokio::runtime::Handle::current(),
		targets,
		retry_policies(&["only-target"]),
		&mappings,
		checkpoint_path.clone(),
		source_path,
		"src".into(),
		fresh_engine_state(),
	)
	.unwrap();
	assert_eq!(restarted.resume_floor(), 3);

	let store = CheckpointStore::open(&checkpoint_path).unwrap();
	let pos = store.load_position("src", "only-target").unwrap();
	assert_eq!(pos.last_audit_id, 3);
	assert_eq!(pos.total_events, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_target_never_advances_past_its_last_good_batch() {
	let dir = tempdir().unwrap();
	let checkpoint_path = dir.path().join("checkpoint.db");

	let healthy: Arc<dyn TargetWriter> = Arc::new(RecordingWriter::new(vec![]));
	let flaky: Arc<dyn TargetWriter> = Arc::new(RecordingWriter::new(vec![2, 3]));

	let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
	targets.insert("healthy".into(), healthy.clone());
	targets.insert("flaky".into(), flaky.clone());

	let mappings = vec![mapping()];
	let source_path = dir.path().join("source.db");
	let handler = EngineBatchHandler::new(
		tokio::runtime::Handle::current(),
		targets,
		retry_policies(&["healthy", "flaky"]),
		&mappings,
		checkpoint_path.clone(),
		source_path,
		"src".into(),
		fresh_engine_state(),
	)
	.unwrap();

	handler.handle(&[event(1)]).unwrap();
	let watermark = handler.handle(&[event(2), event(3)]).unwrap();

	// The watermark handed back to the poller is the minimum across
	// targets, so the flaky target's stall holds back the resume point
	// for everyone, even though the healthy target is fully caught up.
	assert_eq!(watermark, 1);

	let store = CheckpointStore::open(&checkpoint_path).unwrap();
	assert_eq!(store.load_position("src", "healthy").unwrap().last_audit_id, 3);
	assert_eq!(store.load_position("src", "flaky").unwrap().last_audit_id, 1);

	let errors = store.recent_errors(10).unwrap();
	assert!(errors.iter().any(|e| e.target_name == "flaky" && e.audit_id == Some(2)));
	assert!(errors.iter().any(|e| e.target_name == "flaky" && e.audit_id == Some(3)));
}

/// Fails every call with a retryable error until `succeed_after` calls
/// have been made, then applies cleanly.
struct FlakyThenOkWriter {
	succeed_after: usize,
	calls: AtomicUsize,
	applied: std::sync::Mutex<Vec<i64>>,
}

#[async_trait]
impl TargetWriter for FlakyThenOkWriter {
	async fn connect(&self) -> Result<()> {
		Ok(())
	}
	async fn disconnect(&self) -> Result<()> {
		Ok(())
	}
	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		if call < self.succeed_after {
			return Err(Error::transient("target momentarily unavailable"));
		}
		self.applied.lock().unwrap().extend(ops.iter().map(|op| op.audit_id));
		Ok(BatchOutcome { applied: ops.iter().map(|op| op.audit_id).collect(), failed: vec![] })
	}
	async fn ping(&self) -> Result<()> {
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn a_transient_failure_retries_with_backoff_before_succeeding() {
	let dir = tempdir().unwrap();
	let checkpoint_path = dir.path().join("checkpoint.db");
	let source_path = dir.path().join("source.db");

	let writer: Arc<dyn TargetWriter> =
		Arc::new(FlakyThenOkWriter { succeed_after: 2, calls: AtomicUsize::new(0), applied: std::sync::Mutex::new(Vec::new()) });
	let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
	targets.insert("only-target".into(), writer.clone());

	let mut policy = RetryPolicy::default();
	policy.backoff_factor = 0.01;
	policy.max_delay_secs = 1;
	let mut policies = HashMap::new();
	policies.insert("only-target".to_string(), policy);

	let mappings = vec![mapping()];
	let handler = EngineBatchHandler::new(
		tokio::runtime::Handle::current(),
		targets,
		policies,
		&mappings,
		checkpoint_path.clone(),
		source_path,
		"src".into(),
		fresh_engine_state(),
	)
	.unwrap();

	let watermark = handler.handle(&[event(1)]).unwrap();
	assert_eq!(watermark, 1);

	let store = CheckpointStore::open(&checkpoint_path).unwrap();
	assert_eq!(store.load_position("src", "only-target").unwrap().last_audit_id, 1);
	// No sync_errors row for a failure that was retried away within budget.
	assert!(store.recent_errors(10).unwrap().is_empty());
}

/// Always fails with a non-retryable data error.
struct AlwaysFailWriter;

#[async_trait]
impl TargetWriter for AlwaysFailWriter {
	async fn connect(&self) -> Result<()> {
		Ok(())
	}
	async fn disconnect(&self) -> Result<()> {
		Ok(())
	}
	async fn apply_batch(&self, ops: &[TableOp]) -> Result<BatchOutcome> {
		let mut outcome = BatchOutcome::default();
		for op in ops {
			outcome.failed.push((op.audit_id, Error::data("row violates a target-side constraint")));
		}
		Ok(outcome)
	}
	async fn ping(&self) -> Result<()> {
		Ok(())
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn a_halting_target_stops_receiving_batches_and_fails_the_engine() {
	let dir = tempdir().unwrap();
	let checkpoint_path = dir.path().join("checkpoint.db");
	let source_path = dir.path().join("source.db");

	let mut targets: HashMap<String, Arc<dyn TargetWriter>> = HashMap::new();
	targets.insert("only-target".into(), Arc::new(AlwaysFailWriter));

	let mut policy = RetryPolicy::default();
	policy.halt_on_unrecoverable = true;
	let mut policies = HashMap::new();
	policies.insert("only-target".to_string(), policy);

	let mappings = vec![mapping()];
	let engine_state = fresh_engine_state();
	let handler = EngineBatchHandler::new(
		tokio::runtime::Handle::current(),
		targets,
		policies,
		&mappings,
		checkpoint_path.clone(),
		source_path,
		"src".into(),
		engine_state.clone(),
	)
	.unwrap();

	handler.handle(&[event(1)]).unwrap();
	assert_eq!(*engine_state.read(), EngineState::Failed);

	// The position never advances past the last good batch (there was
	// none), and a second batch does not even reach the halted target:
	// its position stays put rather than being reported as a fresh failure.
	let store = CheckpointStore::open(&checkpoint_path).unwrap();
	let before = store.load_position("src", "only-target").unwrap().last_audit_id;
	handler.handle(&[event(2)]).unwrap();
	let after = CheckpointStore::open(&checkpoint_path).unwrap().load_position("src", "only-target").unwrap().last_audit_id;
	assert_eq!(before, after);
}
