// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::collections::HashMap;

use cdc_core::{Error, Result};
use serde_json::Value;

/// Applies one named converter to a single field value, per the
/// transformer's rule set. Unknown converter names are rejected at
/// configuration load time; reaching one here would be a defect, so it
/// is treated as a data error rather than silently passed through.
pub fn apply(name: &str, params: &HashMap<String, String>, value: Value) -> Result<Value> {
	match name {
		"lowercase" => Ok(string_map(value, |s| s.to_lowercase())),
		"uppercase" => Ok(string_map(value, |s| s.to_uppercase())),
		"trim" => Ok(string_map(value, |s| s.trim().to_string())),
		"default" => Ok(apply_default(value, params)),
		"typecast" => apply_typecast(value, params),
		other => Err(Error::data(format!("unknown converter '{other}'"))),
	}
}

fn string_map(value: Value, f: impl FnOnce(&str) -> String) -> Value {
	match value {
		Value::String(s) => Value::String(f(&s)),
		other => other,
	}
}

fn is_null_or_empty(value: &Value) -> bool {
	matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

fn apply_default(value: Value, params: &HashMap<String, String>) -> Value {
	if !is_null_or_empty(&value) {
		return value;
	}
	match params.get("value") {
		Some(v) => Value::String(v.clone()),
		None => value,
	}
}

fn apply_typecast(value: Value, params: &HashMap<String, String>) -> Result<Value> {
	let target_type = params
		.get("target_type")
		.ok_or_else(|| Error::data("typecast converter requires a 'target_type' parameter"))?;

	match target_type.as_str() {
		"int" => as_i64(&value).map(Value::from).ok_or_else(|| cast_error(&value, target_type)),
		"float" => as_f64(&value).and_then(|f| serde_json::Number::from_f64(f).map(Value::Number)).ok_or_else(|| cast_error(&value, target_type)),
		"str" => Ok(Value::String(as_string(&value))),
		"bool" => as_bool(&value).map(Value::Bool).ok_or_else(|| cast_error(&value, target_type)),
		other => Err(Error::data(format!("unsupported typecast target '{other}'"))),
	}
}

fn cast_error(value: &Value, target_type: &str) -> Error {
	Error::data(format!("cannot typecast {value} to {target_type}"))
}

fn as_i64(v: &Value) -> Option<i64> {
	v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn as_f64(v: &Value) -> Option<f64> {
	v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn as_string(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

fn as_bool(v: &Value) -> Option<bool> {
	match v {
		Value::Bool(b) => Some(*b),
		Value::Number(n) => n.as_i64().map(|i| i != 0),
		Value::String(s) => match s.to_ascii_lowercase().as_str() {
			"true" | "1" | "yes" => Some(true),
			"false" | "0" | "no" => Some(false),
			_ => None,
		},
		_ => None,
	}
}
