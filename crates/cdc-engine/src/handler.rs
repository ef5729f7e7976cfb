// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use cdc_audit::AuditStore;
use cdc_checkpoint::CheckpointStore;
use cdc_config::{RetryPolicy, TableMapping};
use cdc_core::{ChangeEvent, Error, Result, SyncPosition, TableOp};
use cdc_reader::BatchHandler;
use cdc_target::{BatchOutcome, TargetWriter};
use cdc_transform::Transformer;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};

use crate::state::EngineState;

/// Bridges the reader's synchronous [`BatchHandler`] callback (invoked
/// from the poller's dedicated thread) onto the async apply path: per
/// event, transform against its table mapping, then fan the resulting
/// ops out to every target concurrently. A target's per-run position
/// only advances once it has applied the whole batch cleanly; the
/// watermark handed back to the poller is the minimum across targets,
/// so a lagging target is never skipped past.
///
/// Each target retries a failing batch with exponential backoff up to
/// its own `RetryPolicy::max_retries` before giving up. A non-retryable
/// (data) error skips straight to that decision: `halt_on_unrecoverable`
/// then governs whether the event is logged and skipped or the target
/// is halted outright. A target stops receiving batches once halted;
/// once every target is halted the engine state moves to `Failed`.
pub struct EngineBatchHandler {
	runtime: tokio::runtime::Handle,
	targets: HashMap<String, Arc<dyn TargetWriter>>,
	retry_policies: HashMap<String, RetryPolicy>,
	mappings_by_table: HashMap<String, TableMapping>,
	transformer: Transformer,
	checkpoint_path: PathBuf,
	source_path: PathBuf,
	source_id: String,
	positions: Mutex<HashMap<String, i64>>,
	halted: Mutex<HashSet<String>>,
	engine_state: Arc<RwLock<EngineState>>,
}

/// One target's outcome after its retry loop settles: either a clean or
/// partially-failed `apply_batch` result, or the call itself erroring on
/// every attempt. `attempts` is how many retries were actually spent,
/// for the retry-count recorded against the failing event(s).
struct TargetApplyResult {
	outcome: Option<BatchOutcome>,
	call_error: Option<Error>,
	attempts: u32,
}

impl EngineBatchHandler {
	pub fn new(
		runtime: tokio::runtime::Handle,
		targets: HashMap<String, Arc<dyn TargetWriter>>,
		retry_policies: HashMap<String, RetryPolicy>,
		mappings: &[TableMapping],
		checkpoint_path: PathBuf,
		source_path: PathBuf,
		source_id: String,
		engine_state: Arc<RwLock<EngineState>>,
	) -> Result<Self> {
		let mappings_by_table = mappings.iter().map(|m| (m.source_table.clone(), m.clone())).collect();

		let store = CheckpointStore::open(&checkpoint_path)?;
		let mut positions = HashMap::with_capacity(targets.len());
		for name in targets.keys() {
			positions.insert(name.clone(), store.load_position(&source_id, name)?.last_audit_id);
		}

		Ok(EngineBatchHandler {
			runtime,
			targets,
			retry_policies,
			mappings_by_table,
			transformer: Transformer::new(),
			checkpoint_path,
			source_path,
			source_id,
			positions: Mutex::new(positions),
			halted: Mutex::new(HashSet::new()),
			engine_state,
		})
	}

	/// The floor the incremental poller should resume from: the slowest
	/// *non-halted* target's durable position, so no running target
	/// misses events on restart. A halted target is excluded — it will
	/// never apply another batch, so holding the watermark at its
	/// position would stall every other target for nothing.
	pub fn resume_floor(&self) -> i64 {
		let halted = self.halted.lock();
		self.positions
			.lock()
			.iter()
			.filter(|(name, _)| !halted.contains(*name))
			.map(|(_, pos)| *pos)
			.min()
			.unwrap_or(0)
	}

	async fn apply(&self, batch: &[ChangeEvent]) -> Result<i64> {
		let mut ops: Vec<TableOp> = Vec::with_capacity(batch.len());
		for event in batch {
			let Some(mapping) = self.mappings_by_table.get(&event.table_name) else {
				continue;
			};
			if let Some(op) = self.transformer.transform(event, mapping)? {
				ops.push(op);
			}
		}
		let batch_max_id = batch.iter().map(|e| e.audit_id).max().unwrap_or(0);

		let mut handles = Vec::with_capacity(self.targets.len());
		for (name, writer) in &self.targets {
			if self.halted.lock().contains(name) {
				continue;
			}
			let name = name.clone();
			let writer = writer.clone();
			let ops = ops.clone();
			let policy = self.retry_policies.get(&name).cloned().unwrap_or_default();
			handles.push(tokio::spawn(async move {
				let result = apply_with_retry(&writer, &ops, &policy).await;
				(name, result)
			}));
		}

		for handle in handles {
			let (name, result) = handle.await.map_err(|e| Error::Other(format!("apply task panicked: {e}")))?;
			match result {
				TargetApplyResult { outcome: Some(outcome), attempts, .. } if outcome.failed.is_empty() => {
					self.advance_position(&name, batch_max_id, ops.len() as i64).await?;
					if attempts > 0 {
						self.resolve_errors_for_ids(&name, &outcome.applied).await;
					}
				}
				TargetApplyResult { outcome: Some(outcome), attempts, .. } => {
					for (id, err) in &outcome.failed {
						warn!(target = %name, audit_id = id, error = %err, attempts, "apply failed for event");
						self.handle_target_failure(&name, Some(*id), err, attempts).await?;
					}
				}
				TargetApplyResult { call_error: Some(e), attempts, .. } => {
					error!(target = %name, error = %e, attempts, "target apply_batch call failed");
					self.handle_target_failure(&name, None, &e, attempts).await?;
				}
				_ => unreachable!("apply_with_retry always returns either an outcome or a call error"),
			}
		}

		Ok(self.resume_floor())
	}

	async fn advance_position(&self, target_name: &str, new_id: i64, events_applied: i64) -> Result<()> {
		let stale = {
			let mut positions = self.positions.lock();
			let current = positions.entry(target_name.to_string()).or_insert(0);
			if new_id <= *current {
				true
			} else {
				*current = new_id;
				false
			}
		};
		if stale {
			return Ok(());
		}

		let checkpoint_path = self.checkpoint_path.clone();
		let pos = SyncPosition {
			source_id: self.source_id.clone(),
			target_name: target_name.to_string(),
			last_audit_id: new_id,
			total_events: events_applied,
			last_processed_at: Some(Utc::now()),
		};
		tokio::task::spawn_blocking(move || -> Result<()> {
			let store = CheckpointStore::open(&checkpoint_path)?;
			let mut existing = store.load_position(&pos.source_id, &pos.target_name)?;
			existing.last_audit_id = pos.last_audit_id;
			existing.total_events += pos.total_events;
			existing.last_processed_at = pos.last_processed_at;
			store.save_position(&existing)
		})
		.await
		.map_err(|e| Error::Other(format!("checkpoint save task panicked: {e}")))?
	}

	/// Bookkeeping for one event's final, unrecoverable failure against
	/// one target: bump the audit row's `retry_count`, log a
	/// `sync_errors` entry, then apply the halt-or-skip policy.
	async fn handle_target_failure(&self, target_name: &str, audit_id: Option<i64>, err: &Error, attempts: u32) -> Result<()> {
		if let Some(id) = audit_id {
			self.bump_retry_count(id).await;
		}
		self.record_error(target_name, audit_id, err, attempts).await?;

		let halt = self.retry_policies.get(target_name).map(|p| p.halt_on_unrecoverable).unwrap_or(false);
		if halt {
			self.halted.lock().insert(target_name.to_string());
			warn!(target = target_name, "target halted after unrecoverable apply failure");
			if self.targets.keys().all(|name| self.halted.lock().contains(name)) {
				*self.engine_state.write() = EngineState::Failed;
				error!("every target halted, engine entering failed state");
			}
		}
		Ok(())
	}

	async fn bump_retry_count(&self, audit_id: i64) {
		let source_path = self.source_path.clone();
		let result = tokio::task::spawn_blocking(move || -> Result<()> {
			AuditStore::open(&source_path)?.increment_retry_count(audit_id)
		})
		.await;
		match result {
			Ok(Ok(())) => {}
			Ok(Err(e)) => warn!(audit_id, error = %e, "failed to record retry count on audit row"),
			Err(e) => warn!(audit_id, error = %e, "retry count update task panicked"),
		}
	}

	/// Marks any prior `sync_errors` rows for these ids resolved, once a
	/// retry against this target has actually happened — most batches
	/// never retry, so this is skipped on the common path.
	async fn resolve_errors_for_ids(&self, target_name: &str, audit_ids: &[i64]) {
		if audit_ids.is_empty() {
			return;
		}
		let checkpoint_path = self.checkpoint_path.clone();
		let source_id = self.source_id.clone();
		let target_name = target_name.to_string();
		let ids = audit_ids.to_vec();
		let result = tokio::task::spawn_blocking(move || -> Result<()> {
			let store = CheckpointStore::open(&checkpoint_path)?;
			for id in ids {
				store.resolve_errors(&source_id, &target_name, id)?;
			}
			Ok(())
		})
		.await;
		if let Ok(Err(e)) = result {
			warn!(error = %e, "failed to resolve prior sync_errors rows");
		}
	}

	async fn record_error(&self, target_name: &str, audit_id: Option<i64>, err: &Error, retry_count: u32) -> Result<()> {
		let checkpoint_path = self.checkpoint_path.clone();
		let source_id = self.source_id.clone();
		let target_name = target_name.to_string();
		let kind = err.kind();
		let message = err.to_string();
		tokio::task::spawn_blocking(move || -> Result<()> {
			let store = CheckpointStore::open(&checkpoint_path)?;
			store.record_error(&source_id, &target_name, None, audit_id, kind, retry_count, &message)
		})
		.await
		.map_err(|e| Error::Other(format!("error log task panicked: {e}")))?
	}
}

/// Calls `apply_batch` against one target, retrying the whole batch with
/// exponential backoff while a retryable failure remains and the
/// policy's retry budget is not exhausted. A non-retryable (data) error
/// or an exhausted budget ends the loop immediately — the caller decides
/// from there whether to skip or halt.
async fn apply_with_retry(writer: &Arc<dyn TargetWriter>, ops: &[TableOp], policy: &RetryPolicy) -> TargetApplyResult {
	let mut attempt = 0u32;
	loop {
		match writer.apply_batch(ops).await {
			Ok(outcome) => {
				let should_retry =
					attempt < policy.max_retries && outcome.failed.iter().any(|(_, e)| e.is_retryable());
				if !should_retry {
					return TargetApplyResult { outcome: Some(outcome), call_error: None, attempts: attempt };
				}
				tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
				attempt += 1;
			}
			Err(e) => {
				if e.is_retryable() && attempt < policy.max_retries {
					tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
					attempt += 1;
					continue;
				}
				return TargetApplyResult { outcome: None, call_error: Some(e), attempts: attempt };
			}
		}
	}
}

impl BatchHandler for EngineBatchHandler {
	fn handle(&self, batch: &[ChangeEvent]) -> Result<i64> {
		self.runtime.block_on(self.apply(batch))
	}
}
