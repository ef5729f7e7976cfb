// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! The audit store and the interception wrapper that writes to it.
//!
//! [`AuditStore`] owns the schema and the low-level row access the
//! reader crate builds on; [`InterceptedConnection`] is the write path
//! every business statement passes through.

mod classify;
mod counters;
mod schema;
mod store;
mod value_convert;
mod wrapper;

pub use classify::Classification;
pub use counters::Counters;
pub use store::AuditStore;
pub use value_convert::{row_from_rusqlite, value_from_sql, value_to_sql};
pub use wrapper::InterceptedConnection;

use cdc_core::Error;

/// `rusqlite` errors cross the crate boundary as `Error::Other` unless
/// they are recognizably transient (locking, busy database), in which
/// case they are retryable per the design's error taxonomy.
pub(crate) fn sqlite_err(e: rusqlite::Error) -> Error {
	use rusqlite::ffi::ErrorCode;
	if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &e {
		if matches!(sqlite_err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
			return Error::transient(e.to_string());
		}
	}
	Error::Other(e.to_string())
}
