// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::Operation;

/// Result of classifying one submitted statement by its leading
/// keyword, per the wrapper's contract: INSERT/UPDATE/DELETE against a
/// single named table, or OTHER for anything else (including DML this
/// classifier cannot confidently resolve to one table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
	Dml { operation: Operation, table: String },
	Other,
}

/// Best-effort, single-table classifier. This is intentionally not a
/// full SQL parser: multi-table statements (joins in UPDATE/DELETE,
/// `INSERT ... SELECT`) fall back to `Other`, matching the design's
/// documented failure mode ("If classification cannot determine a
/// table ... the wrapper falls back to executing without capture").
pub fn classify(sql: &str) -> Classification {
	let trimmed = sql.trim_start();
	let mut words = trimmed.split_whitespace();
	let Some(first) = words.next() else {
		return Classification::Other;
	};

	match first.to_ascii_uppercase().as_str() {
		"INSERT" => classify_insert(trimmed),
		"UPDATE" => classify_update(trimmed),
		"DELETE" => classify_delete(trimmed),
		_ => Classification::Other,
	}
}

fn classify_insert(sql: &str) -> Classification {
	let upper = sql.to_ascii_uppercase();
	let Some(into_pos) = upper.find("INTO") else {
		return Classification::Other;
	};
	let after_into = sql[into_pos + 4..].trim_start();
	if upper[..into_pos].trim() != "INSERT" {
		// e.g. "INSERT OR REPLACE INTO" is still single-table; only
		// reject if something odd preceded INTO beyond INSERT/OR/REPLACE.
		let prefix = upper[..into_pos].trim();
		if !prefix.split_whitespace().all(|w| matches!(w, "INSERT" | "OR" | "REPLACE" | "IGNORE")) {
			return Classification::Other;
		}
	}
	match next_identifier(after_into) {
		Some(table) => Classification::Dml { operation: Operation::Insert, table },
		None => Classification::Other,
	}
}

fn classify_update(sql: &str) -> Classification {
	let after_update = sql["UPDATE".len()..].trim_start();
	match next_identifier(after_update) {
		Some(table) => Classification::Dml { operation: Operation::Update, table },
		None => Classification::Other,
	}
}

fn classify_delete(sql: &str) -> Classification {
	let upper = sql.to_ascii_uppercase();
	let Some(from_pos) = upper.find("FROM") else {
		return Classification::Other;
	};
	if !upper["DELETE".len()..from_pos].trim().is_empty() {
		return Classification::Other;
	}
	let after_from = sql[from_pos + 4..].trim_start();
	match next_identifier(after_from) {
		Some(table) => Classification::Dml { operation: Operation::Delete, table },
		None => Classification::Other,
	}
}

/// Pulls the first bare or quoted identifier off the front of `s`, the
/// way a single-table statement names its table right after the
/// INSERT INTO / UPDATE / DELETE FROM keyword.
fn next_identifier(s: &str) -> Option<String> {
	let s = s.trim_start();
	let mut chars = s.char_indices();
	let (_, first) = chars.next()?;
	if first == '"' || first == '`' || first == '[' {
		let close = match first {
			'[' => ']',
			other => other,
		};
		let end = s[1..].find(close)? + 1;
		return Some(s[1..end].to_string());
	}
	let end = s
		.char_indices()
		.find(|(_, c)| c.is_whitespace() || *c == '(' || *c == ';')
		.map(|(i, _)| i)
		.unwrap_or(s.len());
	if end == 0 {
		return None;
	}
	Some(s[..end].to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_simple_insert() {
		assert_eq!(
			classify("INSERT INTO users(name,email) VALUES (?,?)"),
			Classification::Dml { operation: Operation::Insert, table: "users".into() }
		);
	}

	#[test]
	fn classifies_simple_update() {
		assert_eq!(
			classify("UPDATE users SET name=? WHERE id=?"),
			Classification::Dml { operation: Operation::Update, table: "users".into() }
		);
	}

	#[test]
	fn classifies_simple_delete() {
		assert_eq!(
			classify("DELETE FROM users WHERE id=?"),
			Classification::Dml { operation: Operation::Delete, table: "users".into() }
		);
	}

	#[test]
	fn classifies_select_as_other() {
		assert_eq!(classify("SELECT * FROM users"), Classification::Other);
	}

	#[test]
	fn classifies_insert_or_replace() {
		assert_eq!(
			classify("INSERT OR REPLACE INTO users(id,name) VALUES (?,?)"),
			Classification::Dml { operation: Operation::Insert, table: "users".into() }
		);
	}

	#[test]
	fn classifies_quoted_table_name() {
		assert_eq!(
			classify("UPDATE \"user accounts\" SET name=? WHERE id=?"),
			Classification::Dml { operation: Operation::Update, table: "user accounts".into() }
		);
	}
}
