// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::BTreeMap;

use serde_json::Value;

/// A row's field values, keyed by column name. `BTreeMap` keeps field
/// order deterministic across serialization round-trips, which matters
/// for audit-row diffs and golden-file tests.
pub type Row = BTreeMap<String, Value>;
