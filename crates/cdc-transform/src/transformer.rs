// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_config::TableMapping;
use cdc_core::{ChangeEvent, Operation, Result, Row, TableOp, TargetOp};
use serde_json::Value;

use crate::{convert, filter};

/// Applies one table mapping's filter, rename and conversion rules to
/// a change event. Stateless — every call is independent, so the same
/// `Transformer` is shared across threads without synchronization.
#[derive(Debug, Default, Clone, Copy)]
pub struct Transformer;

impl Transformer {
	pub fn new() -> Self {
		Transformer
	}

	/// Returns `None` when the row-filter predicate drops the row,
	/// otherwise the op the target writer should apply.
	pub fn transform(&self, event: &ChangeEvent, mapping: &TableMapping) -> Result<Option<TableOp>> {
		let reference_row = match event.operation {
			Operation::Insert | Operation::Update => event.after_data.as_ref(),
			Operation::Delete => event.before_data.as_ref(),
		};

		if let Some(condition) = &mapping.filter_condition {
			let passes = match reference_row {
				Some(row) => filter::evaluate(condition, row)?,
				None => true,
			};
			if !passes {
				return Ok(None);
			}
		}

		let op = match event.operation {
			Operation::Insert | Operation::Update => {
				let source_row = reference_row.ok_or_else(|| {
					cdc_core::Error::data(format!(
						"{} event for {} carries no after-image",
						event.operation.as_str(),
						event.table_name
					))
				})?;
				TargetOp::Upsert(self.apply_mapping(source_row, mapping)?)
			}
			Operation::Delete => TargetOp::Delete(self.delete_key(event, mapping)),
		};

		Ok(Some(TableOp { table: mapping.target_table().to_string(), op, audit_id: event.audit_id }))
	}

	/// As [`Transformer::transform`], but for a bare row with no audit
	/// envelope — the initial-sync backfill path, which reads rows
	/// directly off the source table rather than off the audit log.
	pub fn transform_row(&self, row: &Row, mapping: &TableMapping) -> Result<Option<Row>> {
		if let Some(condition) = &mapping.filter_condition {
			if !filter::evaluate(condition, row)? {
				return Ok(None);
			}
		}
		Ok(Some(self.apply_mapping(row, mapping)?))
	}

	fn apply_mapping(&self, source: &Row, mapping: &TableMapping) -> Result<Row> {
		let mut out = Row::new();
		if mapping.field_mappings.is_empty() {
			return Ok(source.clone());
		}
		for field in &mapping.field_mappings {
			let value = source.get(&field.source_field).cloned().unwrap_or(Value::Null);
			let value = match &field.converter {
				Some(name) => convert::apply(name, &field.converter_params, value)?,
				None => value,
			};
			out.insert(field.target_field().to_string(), value);
		}
		Ok(out)
	}

	fn delete_key(&self, event: &ChangeEvent, mapping: &TableMapping) -> Value {
		if let Some(before) = &event.before_data {
			if let Some(v) = before.get(&mapping.primary_key) {
				return v.clone();
			}
		}
		match event.row_id.parse::<i64>() {
			Ok(i) => Value::from(i),
			Err(_) => Value::String(event.row_id.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use cdc_config::FieldMapping;
	use chrono::Utc;

	use super::*;

	fn mapping(filter_condition: Option<&str>, field_mappings: Vec<FieldMapping>) -> TableMapping {
		TableMapping {
			source_table: "users".into(),
			target_table: Some("app_users".into()),
			primary_key: "id".into(),
			field_mappings,
			filter_condition: filter_condition.map(str::to_string),
		}
	}

	fn event(operation: Operation, before: Option<Row>, after: Option<Row>) -> ChangeEvent {
		ChangeEvent {
			audit_id: 1,
			table_name: "users".into(),
			operation,
			row_id: "1".into(),
			before_data: before,
			after_data: after,
			created_at: Utc::now(),
			retry_count: 0,
		}
	}

	fn row(pairs: &[(&str, Value)]) -> Row {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn insert_becomes_upsert_with_renamed_fields() {
		let fields = vec![FieldMapping {
			source_field: "name".into(),
			target_field: Some("full_name".into()),
			converter: None,
			converter_params: Default::default(),
		}];
		let mapping = mapping(None, fields);
		let after = row(&[("name", Value::String("Zhang".into()))]);
		let event = event(Operation::Insert, None, Some(after));

		let op = Transformer::new().transform(&event, &mapping).unwrap().unwrap();
		assert_eq!(op.table, "app_users");
		match op.op {
			TargetOp::Upsert(row) => assert_eq!(row.get("full_name").unwrap(), "Zhang"),
			_ => panic!("expected upsert"),
		}
	}

	#[test]
	fn delete_uses_primary_key_from_before_image() {
		let mapping = mapping(None, vec![]);
		let before = row(&[("id", Value::from(7)), ("name", Value::String("Zhang".into()))]);
		let event = event(Operation::Delete, Some(before), None);

		let op = Transformer::new().transform(&event, &mapping).unwrap().unwrap();
		assert_eq!(op.op, TargetOp::Delete(Value::from(7)));
	}

	#[test]
	fn filter_drops_row_that_does_not_match() {
		let mapping = mapping(Some("active = 'false'"), vec![]);
		let after = row(&[("active", Value::String("true".into()))]);
		let event = event(Operation::Update, None, Some(after));

		assert!(Transformer::new().transform(&event, &mapping).unwrap().is_none());
	}

	#[test]
	fn no_field_mappings_passes_row_through_unchanged() {
		let mapping = mapping(None, vec![]);
		let after = row(&[("name", Value::String("Zhang".into()))]);
		let event = event(Operation::Insert, None, Some(after.clone()));

		let op = Transformer::new().transform(&event, &mapping).unwrap().unwrap();
		match op.op {
			TargetOp::Upsert(row) => assert_eq!(row, after),
			_ => panic!("expected upsert"),
		}
	}
}
