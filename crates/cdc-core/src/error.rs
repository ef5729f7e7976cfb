// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error taxonomy from the design's error-handling section: each
/// variant maps to one of the categories callers are expected to branch
/// on (configuration / reachability / transient / data / capture).
#[derive(Debug, Error)]
pub enum Error {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("target {target} unreachable: {reason}")]
	Reachability { target: String, reason: String },

	#[error("transient apply error: {0}")]
	Transient(String),

	#[error("data error: {0}")]
	Data(String),

	#[error("capture error: {0}")]
	Capture(String),

	#[error("{0}")]
	Other(String),
}

impl Error {
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::Transient(_) | Error::Reachability { .. })
	}

	/// A short, stable label for the error's category, used to populate
	/// `sync_errors.error_kind` without leaking `Display` text (which can
	/// change wording) into a column callers may filter or group on.
	pub fn kind(&self) -> &'static str {
		match self {
			Error::Configuration(_) => "configuration",
			Error::Reachability { .. } => "reachability",
			Error::Transient(_) => "transient",
			Error::Data(_) => "data",
			Error::Capture(_) => "capture",
			Error::Other(_) => "other",
		}
	}

	pub fn configuration(msg: impl Into<String>) -> Self {
		Error::Configuration(msg.into())
	}

	pub fn data(msg: impl Into<String>) -> Self {
		Error::Data(msg.into())
	}

	pub fn capture(msg: impl Into<String>) -> Self {
		Error::Capture(msg.into())
	}

	pub fn transient(msg: impl Into<String>) -> Self {
		Error::Transient(msg.into())
	}
}
