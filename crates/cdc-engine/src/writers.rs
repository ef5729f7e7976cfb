// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;
use std::sync::Arc;

use cdc_config::{RootConfig, TableMapping, TargetConfig, TargetKind};
use cdc_core::{Error, Result};
use cdc_target::{MySqlWriter, OracleWriter, TableSchema, TargetWriter};

/// Constructs one writer per configured target, connected and ready.
/// Reachability is the caller's concern (`ping` each after this
/// returns) — construction only fails on configuration problems.
pub async fn build_writers(config: &RootConfig) -> Result<HashMap<String, Arc<dyn TargetWriter>>> {
	let schemas = build_schemas(&config.mappings);

	let mut out = HashMap::with_capacity(config.targets.len());
	for target in &config.targets {
		let writer = build_writer(target, schemas.clone()).await?;
		out.insert(target.name.clone(), writer);
	}
	Ok(out)
}

async fn build_writer(target: &TargetConfig, schemas: HashMap<String, TableSchema>) -> Result<Arc<dyn TargetWriter>> {
	match target.kind {
		TargetKind::Mysql => {
			let url = connection_field(target, "database_url")?;
			let max_connections = connection_field(target, "max_connections").ok().and_then(|v| v.parse().ok()).unwrap_or(10);
			let writer = MySqlWriter::connect(&url, max_connections, schemas).await?;
			Ok(Arc::new(writer))
		}
		TargetKind::Oracle => {
			let username = connection_field(target, "username")?;
			let password = connection_field(target, "password")?;
			let connect_string = connection_field(target, "connect_string")?;
			let max_connections = connection_field(target, "max_connections").ok().and_then(|v| v.parse().ok()).unwrap_or(5);
			let writer = OracleWriter::connect(username, password, connect_string, max_connections, schemas).await?;
			Ok(Arc::new(writer))
		}
	}
}

fn connection_field(target: &TargetConfig, key: &str) -> Result<String> {
	target
		.connection
		.get(key)
		.cloned()
		.ok_or_else(|| Error::configuration(format!("target {} is missing connection.{key}", target.name)))
}

/// One [`TableSchema`] per mapping, shared by every target writer since
/// column layout comes from the mapping, not the dialect.
pub fn build_schemas(mappings: &[TableMapping]) -> HashMap<String, TableSchema> {
	mappings
		.iter()
		.map(|m| (m.target_table().to_string(), TableSchema { primary_key_column: target_primary_key_column(m) }))
		.collect()
}

/// The mapping's `primary_key` names a *source* field; if field mappings
/// rename it, the target's primary key column is whatever it was
/// renamed to. Un-renamed (or no field mappings at all) means identity.
pub fn target_primary_key_column(mapping: &TableMapping) -> String {
	if mapping.field_mappings.is_empty() {
		return mapping.primary_key.clone();
	}
	mapping
		.field_mappings
		.iter()
		.find(|fm| fm.source_field == mapping.primary_key)
		.map(|fm| fm.target_field().to_string())
		.unwrap_or_else(|| mapping.primary_key.clone())
}

#[cfg(test)]
mod tests {
	use cdc_config::FieldMapping;

	use super::*;

	fn mapping(field_mappings: Vec<FieldMapping>) -> TableMapping {
		TableMapping {
			source_table: "users".into(),
			target_table: Some("app_users".into()),
			primary_key: "id".into(),
			field_mappings,
			filter_condition: None,
		}
	}

	#[test]
	fn identity_primary_key_when_no_field_mappings() {
		let m = mapping(vec![]);
		assert_eq!(target_primary_key_column(&m), "id");
	}

	#[test]
	fn follows_rename_when_pk_field_is_mapped() {
		let m = mapping(vec![FieldMapping {
			source_field: "id".into(),
			target_field: Some("user_id".into()),
			converter: None,
			converter_params: Default::default(),
		}]);
		assert_eq!(target_primary_key_column(&m), "user_id");
	}

	#[test]
	fn build_schemas_covers_every_mapping() {
		let mappings = vec![mapping(vec![])];
		let schemas = build_schemas(&mappings);
		assert_eq!(schemas.get("app_users").unwrap().primary_key_column, "id");
	}
}
