// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::{Error, Result, Row};
use serde_json::Value;

/// Evaluates a `filter_condition` against a row. Supported grammar is
/// deliberately narrow — one comparison of a field against a literal:
/// `field OP literal`, `OP` one of `= != > < >= <=`, literal a quoted
/// string or a bare number. Anything else is a configuration error
/// caught at load time, not at apply time, but this function still
/// returns one defensively if reached with a malformed condition.
pub fn evaluate(condition: &str, row: &Row) -> Result<bool> {
	let (field, op, literal) = parse(condition)?;
	let Some(actual) = row.get(&field) else {
		// A field the filter references but the row doesn't have is
		// treated as null, which only `!=` can satisfy.
		return Ok(compare(&Value::Null, op, &literal));
	};
	Ok(compare(actual, op, &literal))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
	Eq,
	Ne,
	Gt,
	Lt,
	Ge,
	Le,
}

fn parse(condition: &str) -> Result<(String, Op, Value)> {
	// Longer operators are tried first so `>=`/`<=`/`!=`/`==` aren't
	// misread as their single-character prefix.
	const OPERATORS: [(&str, Op); 7] = [
		(">=", Op::Ge),
		("<=", Op::Le),
		("!=", Op::Ne),
		("==", Op::Eq),
		("=", Op::Eq),
		(">", Op::Gt),
		("<", Op::Lt),
	];
	let trimmed = condition.trim();
	for (token, op) in OPERATORS {
		if let Some(pos) = trimmed.find(token) {
			let field = trimmed[..pos].trim().to_string();
			let literal_str = trimmed[pos + token.len()..].trim();
			return Ok((field, op, parse_literal(literal_str)));
		}
	}
	Err(Error::configuration(format!("unparsable filter condition: '{condition}'")))
}

fn parse_literal(s: &str) -> Value {
	let unquoted = s.trim();
	if (unquoted.starts_with('\'') && unquoted.ends_with('\'') && unquoted.len() >= 2)
		|| (unquoted.starts_with('"') && unquoted.ends_with('"') && unquoted.len() >= 2)
	{
		return Value::String(unquoted[1..unquoted.len() - 1].to_string());
	}
	if let Ok(i) = unquoted.parse::<i64>() {
		return Value::from(i);
	}
	if let Ok(f) = unquoted.parse::<f64>() {
		return Value::from(f);
	}
	match unquoted {
		"true" => Value::Bool(true),
		"false" => Value::Bool(false),
		"null" => Value::Null,
		other => Value::String(other.to_string()),
	}
}

fn compare(actual: &Value, op: Op, literal: &Value) -> bool {
	match op {
		Op::Eq => actual == literal,
		Op::Ne => actual != literal,
		Op::Gt | Op::Lt | Op::Ge | Op::Le => {
			let (Some(a), Some(b)) = (as_f64(actual), as_f64(literal)) else {
				return false;
			};
			match op {
				Op::Gt => a > b,
				Op::Lt => a < b,
				Op::Ge => a >= b,
				Op::Le => a <= b,
				_ => unreachable!(),
			}
		}
	}
}

fn as_f64(v: &Value) -> Option<f64> {
	v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(pairs: &[(&str, Value)]) -> Row {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn equality_on_string() {
		let r = row(&[("status", Value::String("active".into()))]);
		assert!(evaluate("status = 'active'", &r).unwrap());
		assert!(!evaluate("status = 'inactive'", &r).unwrap());
	}

	#[test]
	fn numeric_comparison() {
		let r = row(&[("age", Value::from(42))]);
		assert!(evaluate("age >= 18", &r).unwrap());
		assert!(!evaluate("age < 18", &r).unwrap());
	}

	#[test]
	fn missing_field_is_null() {
		let r = row(&[]);
		assert!(evaluate("deleted_at != 'x'", &r).unwrap());
		assert!(!evaluate("deleted_at = 'x'", &r).unwrap());
	}

	#[test]
	fn unparsable_condition_is_configuration_error() {
		let r = row(&[]);
		assert!(evaluate("garbage", &r).is_err());
	}
}
