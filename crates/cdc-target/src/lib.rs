// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Dialect-parameterized target writers behind one shared [`TargetWriter`]
//! trait: a MySQL-dialect writer using `INSERT ... ON DUPLICATE KEY
//! UPDATE`, and an Oracle-dialect writer using row-by-row `MERGE`,
//! dispatched onto a blocking thread pool since the driver it wraps is
//! synchronous.

mod mysql;
mod oracle;
mod writer;

pub use mysql::MySqlWriter;
pub use oracle::OracleWriter;
pub use writer::{BatchOutcome, TableSchema, TargetWriter};
