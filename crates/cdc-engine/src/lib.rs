// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! The sync engine: builds target writers from configuration, runs any
//! pending initial sync, then drives the incremental poll loop with a
//! [`handler::EngineBatchHandler`] that fans each batch out to every
//! target and advances checkpoints independently per target.

mod engine;
mod handler;
mod state;
mod writers;

pub use engine::SyncEngine;
pub use handler::EngineBatchHandler;
pub use state::{EngineState, EngineStatus, TargetStatus};
pub use writers::{build_schemas, build_writers, target_primary_key_column};
