// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use cdc_core::{Error, Result};

/// Replaces every `${NAME}` occurrence in `raw` with the value of the
/// `NAME` environment variable. An unset variable is a configuration
/// error, not a silent empty-string substitution — a missing secret
/// should fail loudly at startup rather than produce a malformed
/// connection string downstream.
pub fn interpolate_env(raw: &str) -> Result<String> {
	let mut out = String::with_capacity(raw.len());
	let bytes = raw.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
			let Some(end) = raw[i + 2..].find('}') else {
				return Err(Error::configuration(format!(
					"unterminated environment variable reference at byte {i}"
				)));
			};
			let name = &raw[i + 2..i + 2 + end];
			let value = std::env::var(name)
				.map_err(|_| Error::configuration(format!("environment variable {name} is not set")))?;
			out.push_str(&value);
			i += 2 + end + 1;
		} else {
			let ch = raw[i..].chars().next().expect("non-empty slice");
			out.push(ch);
			i += ch.len_utf8();
		}
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn leaves_plain_text_untouched() {
		assert_eq!(interpolate_env("batch_size = 100").unwrap(), "batch_size = 100");
	}

	#[test]
	fn substitutes_known_variable() {
		unsafe { std::env::set_var("CDC_TEST_HOST", "db.internal") };
		assert_eq!(interpolate_env("host = \"${CDC_TEST_HOST}\"").unwrap(), "host = \"db.internal\"");
		unsafe { std::env::remove_var("CDC_TEST_HOST") };
	}

	#[test]
	fn errors_on_missing_variable() {
		unsafe { std::env::remove_var("CDC_TEST_MISSING_VAR") };
		assert!(interpolate_env("x = \"${CDC_TEST_MISSING_VAR}\"").is_err());
	}

	#[test]
	fn errors_on_unterminated_reference() {
		assert!(interpolate_env("x = \"${OPEN").is_err());
	}
}
