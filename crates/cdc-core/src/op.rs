// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use serde_json::Value;

use crate::row::Row;

/// The tagged union a target writer's `apply_batch` consumes, produced
/// by the transformer from a [`crate::event::ChangeEvent`]. Each op
/// carries everything the writer needs to act without consulting the
/// source again.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOp {
	Upsert(Row),
	Delete(Value),
}

/// One op addressed at a specific target table, the unit `apply_batch`
/// operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOp {
	pub table: String,
	pub op: TargetOp,
	/// The originating audit id, carried through so a partial batch
	/// failure can report which events did and did not land.
	pub audit_id: i64,
}
