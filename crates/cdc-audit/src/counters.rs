// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::sync::atomic::{AtomicU64, Ordering};

/// Structured counters exposed through the `status` CLI surface,
/// tracking statements the wrapper could not (or chose not to) capture.
#[derive(Debug, Default)]
pub struct Counters {
	other: AtomicU64,
	uncaptured_fallback: AtomicU64,
}

impl Counters {
	pub fn record_other(&self) {
		self.other.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_uncaptured_fallback(&self) {
		self.uncaptured_fallback.fetch_add(1, Ordering::Relaxed);
	}

	pub fn other_count(&self) -> u64 {
		self.other.load(Ordering::Relaxed)
	}

	pub fn uncaptured_fallback_count(&self) -> u64 {
		self.uncaptured_fallback.load(Ordering::Relaxed)
	}
}
