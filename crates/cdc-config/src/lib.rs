// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

//! Declarative, hierarchical configuration for a sync run: parsed from
//! TOML, `${NAME}` environment interpolation resolved at load time,
//! then validated and frozen before the engine starts.

mod interpolate;
mod model;
mod validate;

pub use interpolate::interpolate_env;
pub use model::{
	FieldMapping, RetryPolicy, RootConfig, SourceConfig, TableMapping, TargetConfig, TargetKind,
};

use std::path::Path;

use cdc_core::{Error, Result};

/// Load, interpolate and validate a configuration file. Any failure here
/// is a configuration error and is fatal at startup, per the design's
/// error taxonomy.
pub fn load(path: &Path) -> Result<RootConfig> {
	let raw = std::fs::read_to_string(path)
		.map_err(|e| Error::configuration(format!("reading {}: {e}", path.display())))?;
	load_str(&raw)
}

/// As [`load`], but from an in-memory TOML document. Exposed separately
/// so tests and the `init` subcommand template can exercise the parse
/// and validation path without touching the filesystem.
pub fn load_str(raw: &str) -> Result<RootConfig> {
	let interpolated = interpolate_env(raw)?;
	let config: RootConfig = toml::from_str(&interpolated)
		.map_err(|e| Error::configuration(format!("parsing configuration: {e}")))?;
	validate::validate(&config)?;
	Ok(config)
}
