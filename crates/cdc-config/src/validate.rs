// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashSet;

use cdc_core::{Error, Result};

use crate::model::RootConfig;

const KNOWN_CONVERTERS: &[&str] = &["lowercase", "uppercase", "trim", "default", "typecast"];

/// Pre-flight validation run once at load time, before the engine ever
/// touches a connection. Every failure here is a `Error::Configuration`,
/// fatal at start per the error-handling design.
pub fn validate(config: &RootConfig) -> Result<()> {
	if config.targets.is_empty() {
		return Err(Error::configuration("at least one target must be configured"));
	}
	if config.mappings.is_empty() {
		return Err(Error::configuration("at least one table mapping must be configured"));
	}
	if config.source.journal_mode.to_uppercase() != "WAL" {
		return Err(Error::configuration(format!(
			"source.journal_mode must be WAL, got {}",
			config.source.journal_mode
		)));
	}
	if config.max_batch_size < config.batch_size {
		return Err(Error::configuration(format!(
			"max_batch_size ({}) must be >= batch_size ({})",
			config.max_batch_size, config.batch_size
		)));
	}

	let mut seen_targets = HashSet::new();
	for target in &config.targets {
		if !seen_targets.insert(target.name.as_str()) {
			return Err(Error::configuration(format!("duplicate target name: {}", target.name)));
		}
	}

	for mapping in &config.mappings {
		if !config.source.is_allowed(&mapping.source_table) {
			return Err(Error::configuration(format!(
				"mapping references table '{}' which is not in source.tables",
				mapping.source_table
			)));
		}
		for field in &mapping.field_mappings {
			let Some(converter) = &field.converter else {
				continue;
			};
			if !KNOWN_CONVERTERS.contains(&converter.as_str()) {
				return Err(Error::configuration(format!(
					"unknown converter '{converter}' on {}.{}",
					mapping.source_table, field.source_field
				)));
			}
			match converter.as_str() {
				"default" if !field.converter_params.contains_key("value") => {
					return Err(Error::configuration(format!(
						"converter 'default' on {}.{} requires a 'value' parameter",
						mapping.source_table, field.source_field
					)));
				}
				"typecast" => {
					let target_type = field.converter_params.get("target_type");
					match target_type.map(String::as_str) {
						Some("int") | Some("float") | Some("str") | Some("bool") => {}
						_ => {
							return Err(Error::configuration(format!(
								"converter 'typecast' on {}.{} requires target_type in {{int,float,str,bool}}",
								mapping.source_table, field.source_field
							)));
						}
					}
				}
				_ => {}
			}
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use crate::load_str;

	#[test]
	fn rejects_unknown_converter() {
		let toml = r#"
            [source]
            db_path = "/tmp/source.db"
            tables = ["users"]

            [[targets]]
            name = "mysql-primary"
            type = "mysql"
            connection = { host = "localhost" }

            [[mappings]]
            source_table = "users"
            [[mappings.field_mappings]]
            source_field = "email"
            converter = "reverse"
        "#;
		let err = load_str(toml).unwrap_err();
		assert!(err.to_string().contains("unknown converter"));
	}

	#[test]
	fn rejects_non_wal_journal_mode() {
		let toml = r#"
            [source]
            db_path = "/tmp/source.db"
            journal_mode = "DELETE"
            tables = ["users"]

            [[targets]]
            name = "mysql-primary"
            type = "mysql"
            connection = { host = "localhost" }

            [[mappings]]
            source_table = "users"
        "#;
		let err = load_str(toml).unwrap_err();
		assert!(err.to_string().contains("journal_mode"));
	}

	#[test]
	fn accepts_minimal_valid_config() {
		let toml = r#"
            [source]
            db_path = "/tmp/source.db"
            tables = ["users"]

            [[targets]]
            name = "mysql-primary"
            type = "mysql"
            connection = { host = "localhost", user = "root", password = "secret", database = "app" }

            [[mappings]]
            source_table = "users"
            [[mappings.field_mappings]]
            source_field = "email"
            converter = "lowercase"
        "#;
		let config = load_str(toml).unwrap();
		assert_eq!(config.targets.len(), 1);
		assert_eq!(config.batch_size, 100);
	}
}
