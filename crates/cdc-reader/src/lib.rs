// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Pull API over the audit log (`AuditReader`) plus a dedicated-thread
//! poll loop (`PollingReader`) that drives a pluggable [`BatchHandler`]
//! at an adaptive interval.

mod poller;
mod reader;

pub use poller::{BatchHandler, PollingReader};
pub use reader::{AuditReader, ReaderConfig};
