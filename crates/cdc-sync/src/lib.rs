// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Baseline backfill: pins the handoff id, then for each `(table,
//! target)` pair independently seek-paginates the source table and
//! upserts into that target, checkpointing progress as it goes.

mod backfill;

pub use backfill::InitialSyncRunner;
