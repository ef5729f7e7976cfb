// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdc_audit::AuditStore;
use cdc_checkpoint::CheckpointStore;
use cdc_config::RootConfig;
use cdc_core::{Error, Result, SyncStatus};
use cdc_reader::{PollingReader, ReaderConfig};
use cdc_sync::InitialSyncRunner;
use cdc_target::TargetWriter;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::handler::EngineBatchHandler;
use crate::state::{EngineState, EngineStatus, TargetStatus};
use crate::writers::build_writers;

/// The top-level coordinator. One instance owns one source and every
/// target configured against it, and drives the lifecycle described in
/// the design's `Idle -> InitialSyncing -> Incremental -> Stopping ->
/// Stopped` state machine.
pub struct SyncEngine {
	config: RootConfig,
	mappings: Vec<cdc_config::TableMapping>,
	source_id: String,
	targets: HashMap<String, Arc<dyn TargetWriter>>,
	checkpoint_path: PathBuf,
	state: Arc<RwLock<EngineState>>,
	poller: Mutex<Option<PollingReader>>,
}

impl SyncEngine {
	/// Builds writers, verifies reachability, runs any pending initial
	/// sync, then starts the incremental poller. Returns once the engine
	/// is in the `Incremental` state and streaming.
	///
	/// `tables`, when given, scopes this run to a subset of the
	/// configured mappings — both the initial sync and the incremental
	/// stream only ever touch those source tables. `None` runs every
	/// configured mapping, which is what every CLI invocation does today.
	pub async fn start(config: RootConfig, tables: Option<&[String]>, run_initial: bool) -> Result<Self> {
		let mappings = match tables {
			Some(names) => {
				let filtered: Vec<_> =
					config.mappings.iter().filter(|m| names.iter().any(|n| n == &m.source_table)).cloned().collect();
				if filtered.len() != names.len() {
					return Err(Error::configuration(
						"one or more requested tables have no configured mapping".to_string(),
					));
				}
				filtered
			}
			None => config.mappings.clone(),
		};

		let source_id = source_id_for(&config);
		let targets = build_writers(&config).await?;

		for (name, writer) in &targets {
			writer.ping().await.map_err(|e| Error::Reachability { target: name.clone(), reason: e.to_string() })?;
		}

		std::fs::create_dir_all(&config.checkpoint_dir)
			.map_err(|e| Error::configuration(format!("creating checkpoint directory: {e}")))?;
		let checkpoint_path = config.checkpoint_dir.join("checkpoint.db");

		let engine = SyncEngine {
			config: config.clone(),
			mappings: mappings.clone(),
			source_id: source_id.clone(),
			targets: targets.clone(),
			checkpoint_path: checkpoint_path.clone(),
			state: Arc::new(RwLock::new(EngineState::Idle)),
			poller: Mutex::new(None),
		};

		if run_initial {
			*engine.state.write() = EngineState::InitialSyncing;
			engine.run_pending_initial_syncs().await?;
		}

		let retry_policies =
			config.targets.iter().map(|t| (t.name.clone(), t.retry_policy.clone())).collect();
		let handler = Arc::new(EngineBatchHandler::new(
			tokio::runtime::Handle::current(),
			targets,
			retry_policies,
			&mappings,
			checkpoint_path,
			config.source.db_path.clone(),
			source_id,
			engine.state.clone(),
		)?);
		let from_id = handler.resume_floor();

		let reader_config = ReaderConfig {
			batch_size: config.batch_size,
			max_batch_size: config.max_batch_size,
			backlog_soft_threshold: config.backlog_soft_threshold,
			..ReaderConfig::default()
		};
		let poller = PollingReader::start(config.source.db_path.clone(), reader_config, from_id, handler)?;
		*engine.poller.lock() = Some(poller);
		*engine.state.write() = EngineState::Incremental;

		info!(from_id, "sync engine entered incremental streaming");
		Ok(engine)
	}

	async fn run_pending_initial_syncs(&self) -> Result<()> {
		let store = CheckpointStore::open(&self.checkpoint_path)?;
		let mut pending = Vec::new();
		for mapping in &self.mappings {
			let all_targets_completed = self.targets.keys().all(|target_name| {
				matches!(
					store.load_initial_sync_checkpoint(&self.source_id, &mapping.source_table, target_name),
					Ok(Some(cp)) if cp.status == SyncStatus::Completed
				)
			});
			if !all_targets_completed {
				pending.push(mapping.clone());
			}
		}

		if pending.is_empty() {
			return Ok(());
		}

		info!(tables = pending.len(), "running initial sync for pending tables");
		let runner = InitialSyncRunner::new(
			self.source_id.clone(),
			self.config.source.clone(),
			self.checkpoint_path.clone(),
			pending,
			self.targets.clone(),
			self.config.batch_size,
		);
		runner.run().await?;
		Ok(())
	}

	/// Finishes the in-flight batch, bounded by `grace`, then persists
	/// checkpoints and stops accepting new batches. Stopping an already
	/// stopped engine is a no-op.
	pub async fn stop(&self, grace: Duration) -> Result<()> {
		*self.state.write() = EngineState::Stopping;

		let poller = self.poller.lock().take();
		if let Some(mut poller) = poller {
			let joined = tokio::time::timeout(grace, tokio::task::spawn_blocking(move || poller.stop())).await;
			match joined {
				Ok(result) => {
					result.map_err(|e| Error::Other(format!("poller stop task panicked: {e}")))??;
				}
				Err(_) => {
					warn!(?grace, "shutdown exceeded grace deadline, poller thread left running to finish its batch");
				}
			}
		}

		*self.state.write() = EngineState::Stopped;
		Ok(())
	}

	pub fn is_running(&self) -> bool {
		matches!(*self.state.read(), EngineState::InitialSyncing | EngineState::Incremental)
	}

	pub fn get_status(&self) -> Result<EngineStatus> {
		let store = CheckpointStore::open(&self.checkpoint_path)?;
		let audit = AuditStore::open(&self.config.source.db_path)?;
		let backlog_size = audit.count_unconsumed()?;
		let max_id = audit.max_id()?;
		let errors = store.recent_errors(200)?;

		let mut targets = Vec::with_capacity(self.targets.len());
		for name in self.targets.keys() {
			let pos = store.load_position(&self.source_id, name)?;
			let last_error = errors.iter().find(|e| &e.target_name == name).map(|e| e.message.clone());
			targets.push(TargetStatus {
				name: name.clone(),
				last_audit_id: pos.last_audit_id,
				lag: (max_id - pos.last_audit_id).max(0),
				last_error,
			});
		}

		Ok(EngineStatus { state: *self.state.read(), backlog_size, targets })
	}
}

fn source_id_for(config: &RootConfig) -> String {
	config.source.db_path.to_string_lossy().into_owned()
}
