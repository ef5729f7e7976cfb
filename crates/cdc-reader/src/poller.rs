// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cdc_core::{ChangeEvent, Result};
use tracing::{debug, error, warn};

use crate::reader::{AuditReader, ReaderConfig};

/// Applies one batch of events and reports how far it is safe to
/// advance the consumed watermark. Implementations decide the
/// watermark themselves (e.g. the minimum id applied across several
/// targets), so a partial failure never gets marked consumed.
pub trait BatchHandler: Send + Sync {
	fn handle(&self, batch: &[ChangeEvent]) -> Result<i64>;
}

/// Drives an [`AuditReader`] on a dedicated thread: fetch, hand the
/// batch to a [`BatchHandler`], mark consumed up to the watermark it
/// returns, repeat. Backs off its poll interval geometrically while the
/// log is empty and resets to the floor the moment it sees work, so an
/// idle source costs nothing and a busy one is not throttled.
pub struct PollingReader {
	running: Arc<AtomicBool>,
	stop: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl PollingReader {
	/// Starts polling immediately in the background, beginning after
	/// `from_id`. Returns the controller; call `stop` to join the thread.
	pub fn start(
		path: PathBuf,
		config: ReaderConfig,
		from_id: i64,
		handler: Arc<dyn BatchHandler>,
	) -> Result<Self> {
		let reader = AuditReader::open(&path, config.clone())?;
		let running = Arc::new(AtomicBool::new(true));
		let stop = Arc::new(AtomicBool::new(false));

		let running_thread = running.clone();
		let stop_thread = stop.clone();
		let position = AtomicI64::new(from_id);

		let handle = thread::Builder::new()
			.name("cdc-audit-poller".into())
			.spawn(move || {
				let mut interval = config.poll_interval;
				while !stop_thread.load(Ordering::Relaxed) {
					let after_id = position.load(Ordering::Relaxed);
					match reader.fetch_batch(after_id) {
						Ok(batch) if batch.is_empty() => {
							interval = (interval * 2).min(config.max_poll_interval);
						}
						Ok(batch) => {
							let ids: Vec<i64> = batch.iter().map(|e| e.audit_id).collect();
							debug!(count = batch.len(), after_id, "polled audit batch");
							match handler.handle(&batch) {
								Ok(watermark) => {
									let consumed: Vec<i64> =
										ids.into_iter().filter(|id| *id <= watermark).collect();
									if let Err(e) = reader.mark_consumed(&consumed) {
										error!(error = %e, "failed to mark audit rows consumed");
									} else {
										position.store(watermark, Ordering::Relaxed);
									}
								}
								Err(e) => {
									warn!(error = %e, "batch handler failed, will retry without advancing");
								}
							}
							interval = config.poll_interval;
						}
						Err(e) => {
							error!(error = %e, "failed to poll audit log");
							interval = (interval * 2).min(config.max_poll_interval);
						}
					}
					sleep_in_slices(interval, &stop_thread);
				}
				running_thread.store(false, Ordering::Relaxed);
			})
			.map_err(|e| cdc_core::Error::Other(format!("failed to spawn poller thread: {e}")))?;

		Ok(PollingReader { running, stop, handle: Some(handle) })
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Relaxed)
	}

	/// Requests the poll loop stop and joins the thread. Idempotent:
	/// stopping an already-stopped reader is a no-op.
	pub fn stop(&mut self) -> Result<()> {
		self.stop.store(true, Ordering::Relaxed);
		if let Some(handle) = self.handle.take() {
			handle.join().map_err(|_| cdc_core::Error::Other("poller thread panicked".into()))?;
		}
		Ok(())
	}
}

impl Drop for PollingReader {
	fn drop(&mut self) {
		let _ = self.stop();
	}
}

/// Sleeps in short slices so a stop request lands promptly instead of
/// waiting out a multi-second backoff interval.
fn sleep_in_slices(total: Duration, stop: &AtomicBool) {
	const SLICE: Duration = Duration::from_millis(50);
	let mut remaining = total;
	while remaining > Duration::ZERO {
		if stop.load(Ordering::Relaxed) {
			return;
		}
		let step = remaining.min(SLICE);
		thread::sleep(step);
		remaining -= step;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use cdc_audit::InterceptedConnection;
	use rusqlite::types::Value as SqlValue;
	use tempfile::tempdir;

	use super::*;

	struct CollectingHandler {
		seen: Mutex<Vec<ChangeEvent>>,
	}

	impl BatchHandler for CollectingHandler {
		fn handle(&self, batch: &[ChangeEvent]) -> Result<i64> {
			let mut seen = self.seen.lock().unwrap();
			seen.extend_from_slice(batch);
			Ok(batch.iter().map(|e| e.audit_id).max().unwrap_or(0))
		}
	}

	#[test]
	fn poller_lifecycle_starts_and_stops() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("source.db");
		{
			let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
			wrapper.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
		}

		let handler = Arc::new(CollectingHandler { seen: Mutex::new(Vec::new()) });
		let config = ReaderConfig { poll_interval: Duration::from_millis(20), ..ReaderConfig::default() };
		let mut poller = PollingReader::start(path, config, 0, handler).unwrap();

		assert!(poller.is_running());
		thread::sleep(Duration::from_millis(60));
		assert!(poller.is_running());

		poller.stop().unwrap();
		assert!(!poller.is_running());
	}

	#[test]
	fn poller_delivers_inserted_rows() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("source.db");
		{
			let mut wrapper = InterceptedConnection::open(&path, vec!["users".into()]).unwrap();
			wrapper.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
			wrapper.execute("INSERT INTO users(name) VALUES (?)", &[SqlValue::Text("A".into())]).unwrap();
		}

		let handler = Arc::new(CollectingHandler { seen: Mutex::new(Vec::new()) });
		let config = ReaderConfig { poll_interval: Duration::from_millis(20), ..ReaderConfig::default() };
		let mut poller = PollingReader::start(path, config, 0, handler.clone()).unwrap();

		thread::sleep(Duration::from_millis(200));
		poller.stop().unwrap();

		assert_eq!(handler.seen.lock().unwrap().len(), 1);
	}
}
