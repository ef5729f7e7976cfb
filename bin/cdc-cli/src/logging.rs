// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer's background thread alive; drop it
/// only at process exit, or buffered lines never flush.
pub struct LoggingGuard {
	_file_guard: Option<WorkerGuard>,
}

/// Initializes the global tracing subscriber once for the process. Never
/// panics on a bad filter string — falls back to "info" rather than
/// aborting a CLI invocation over a typo in `--log-level`.
pub fn init(log_level: &str, log_file: Option<&Path>) -> LoggingGuard {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	match log_file {
		Some(path) => {
			let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
			let filename = path.file_name().and_then(|f| f.to_str()).unwrap_or("cdc-sync.log");
			let appender = tracing_appender::rolling::never(dir, filename);
			let (writer, guard) = tracing_appender::non_blocking(appender);
			let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init();
			LoggingGuard { _file_guard: Some(guard) }
		}
		None => {
			let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
			LoggingGuard { _file_guard: None }
		}
	}
}
