// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::Path;

use cdc_core::{Error, Result};
use tracing::info;

use crate::template::TEMPLATE;

/// Writes the starter template to `path`. Refuses to clobber an existing
/// file — `init` is for bootstrapping a new deployment, not resetting one.
pub fn run(path: &Path) -> Result<()> {
	if path.exists() {
		return Err(Error::configuration(format!("{} already exists, refusing to overwrite", path.display())));
	}
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent).map_err(|e| Error::configuration(format!("creating {}: {e}", parent.display())))?;
	}
	std::fs::write(path, TEMPLATE).map_err(|e| Error::configuration(format!("writing {}: {e}", path.display())))?;
	info!(path = %path.display(), "wrote configuration template");
	println!("wrote {}", path.display());
	Ok(())
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	#[test]
	fn writes_a_loadable_template() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("cdc.toml");
		run(&path).unwrap();

		let raw = std::fs::read_to_string(&path).unwrap();
		unsafe { std::env::set_var("MYSQL_PASSWORD", "secret") };
		let config = cdc_config::load_str(&raw).unwrap();
		unsafe { std::env::remove_var("MYSQL_PASSWORD") };
		assert_eq!(config.targets.len(), 1);
		assert_eq!(config.mappings.len(), 1);
	}

	#[test]
	fn refuses_to_overwrite_existing_file() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("cdc.toml");
		std::fs::write(&path, "existing").unwrap();

		let err = run(&path).unwrap_err();
		assert!(err.to_string().contains("already exists"));
	}
}
