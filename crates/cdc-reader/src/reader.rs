// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;
use std::time::Duration;

use cdc_audit::AuditStore;
use cdc_core::{ChangeEvent, Result};
use tracing::debug;

/// Tuning knobs for both the plain pull API and the background poller.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
	pub batch_size: usize,
	/// Ceiling `fetch_batch` may widen its limit to once the backlog
	/// crosses `backlog_soft_threshold`. Never exceeded.
	pub max_batch_size: usize,
	/// Unconsumed-row count above which `fetch_batch` requests
	/// `max_batch_size` rows instead of `batch_size`.
	pub backlog_soft_threshold: i64,
	pub poll_interval: Duration,
	pub max_poll_interval: Duration,
}

impl Default for ReaderConfig {
	fn default() -> Self {
		ReaderConfig {
			batch_size: 100,
			max_batch_size: 1000,
			backlog_soft_threshold: 1000,
			poll_interval: Duration::from_millis(200),
			max_poll_interval: Duration::from_secs(5),
		}
	}
}

/// Thin, stateless pull interface over the audit log: fetch the next
/// batch in ascending id order, mark ids consumed once downstream has
/// durably applied them. Holds its own connection, independent of the
/// interception wrapper's connection, so reading never blocks capture.
pub struct AuditReader {
	store: AuditStore,
	config: ReaderConfig,
}

impl AuditReader {
	pub fn open(path: &Path, config: ReaderConfig) -> Result<Self> {
		Ok(AuditReader { store: AuditStore::open(path)?, config })
	}

	/// Fetches up to `batch_size` unconsumed records with `id > after_id`,
	/// in ascending id order, translated into the pipeline's value type.
	/// Widens the limit toward `max_batch_size` when the backlog exceeds
	/// `backlog_soft_threshold`, so a falling-behind source is worked
	/// down faster instead of being polled at a fixed, possibly too-small
	/// batch size forever.
	pub fn fetch_batch(&self, after_id: i64) -> Result<Vec<ChangeEvent>> {
		let backlog = self.count_unconsumed()?;
		let limit = self.effective_batch_size(backlog);
		let records = self.store.fetch_unconsumed(after_id, limit)?;
		Ok(records.into_iter().map(ChangeEvent::from).collect())
	}

	/// `batch_size` normally, or `max_batch_size` once `backlog` exceeds
	/// `backlog_soft_threshold`.
	pub fn effective_batch_size(&self, backlog: i64) -> usize {
		if backlog > self.config.backlog_soft_threshold {
			let widened = self.config.max_batch_size.max(self.config.batch_size);
			debug!(backlog, widened, "backlog above soft threshold, widening fetch batch size");
			widened
		} else {
			self.config.batch_size
		}
	}

	pub fn mark_consumed(&self, ids: &[i64]) -> Result<()> {
		self.store.mark_consumed(ids)
	}

	pub fn max_id(&self) -> Result<i64> {
		self.store.max_id()
	}

	pub fn count_unconsumed(&self) -> Result<i64> {
		self.store.count_unconsumed()
	}

	pub fn config(&self) -> &ReaderConfig {
		&self.config
	}
}
