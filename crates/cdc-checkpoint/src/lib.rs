// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Durable progress tracking on a local metadata database, distinct
//! from the source database the audit log lives in: incremental sync
//! positions, initial-sync backfill checkpoints, and an error log for
//! the status surface.

mod schema;
mod store;

pub use store::{CheckpointStore, SyncErrorRecord};

use cdc_core::Error;

pub(crate) fn sqlite_err(e: rusqlite::Error) -> Error {
	use rusqlite::ffi::ErrorCode;
	if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &e {
		if matches!(sqlite_err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
			return Error::transient(e.to_string());
		}
	}
	Error::Other(e.to_string())
}
