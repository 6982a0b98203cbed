//! Identity normalization: turns any caller-supplied identity string
//! (certificate CN, native-auth username, header value) into a canonical
//! username, idempotently.

use std::sync::OnceLock;

use regex::Regex;

fn trailing_paren_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\s*\([^()]*\)\s*$").unwrap())
}

fn leading_backslash_residue_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^[A-Za-z]\\").unwrap())
}

fn whitespace_run_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn strip_surrounding_quotes(s: &str) -> &str {
	let s = s.trim();
	for quote in ['"', '\''] {
		if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
			return &s[1..s.len() - 1];
		}
	}
	s
}

fn strip_trailing_annotation(s: &str) -> &str {
	match trailing_paren_re().find(s) {
		Some(m) => &s[..m.start()],
		None => s,
	}
}

/// Normalize a caller-supplied identity string to a canonical username.
///
/// Rules, applied in order: strip surrounding quotes; strip any trailing
/// `(...)` annotation; if `DOMAIN\user`, keep `user`; if `user@realm`, keep
/// `user`; remove a leading `[A-Za-z]\` residue; collapse internal
/// whitespace runs to a single space. Idempotent: `normalize(normalize(x))
/// == normalize(x)`.
pub fn normalize(input: &str) -> String {
	let mut s = strip_surrounding_quotes(input).trim().to_string();
	s = strip_trailing_annotation(&s).trim().to_string();

	if let Some(idx) = s.rfind('\\') {
		s = s[idx + 1..].to_string();
	}

	if let Some(idx) = s.find('@') {
		s = s[..idx].to_string();
	}

	s = leading_backslash_residue_re().replace(&s, "").to_string();
	s = whitespace_run_re().replace_all(s.trim(), " ").to_string();
	s
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_quotes() {
		assert_eq!(normalize("\"jdoe\""), "jdoe");
		assert_eq!(normalize("'jdoe'"), "jdoe");
	}

	#[test]
	fn strips_trailing_annotation() {
		assert_eq!(normalize("John Smith (Contractor)"), "John Smith");
	}

	#[test]
	fn keeps_user_from_domain_prefix() {
		assert_eq!(normalize("CORP\\jdoe"), "jdoe");
	}

	#[test]
	fn keeps_user_from_realm_suffix() {
		assert_eq!(normalize("jdoe@corp.example.com"), "jdoe");
	}

	#[test]
	fn strips_leading_single_letter_backslash_residue() {
		assert_eq!(normalize("x\\jdoe"), "jdoe");
	}

	#[test]
	fn collapses_internal_whitespace() {
		assert_eq!(normalize("  John   Smith  "), "John Smith");
	}

	#[test]
	fn is_idempotent_across_samples() {
		let samples = [
			"\"CORP\\jdoe (Smartcard)\"",
			"jdoe@CORP.EXAMPLE.COM",
			"  Jane   Doe (Contractor) ",
			"plainuser",
			"",
			"'x\\weird@realm (note)'",
		];
		for s in samples {
			let once = normalize(s);
			let twice = normalize(&once);
			assert_eq!(once, twice, "not idempotent for {s:?}");
		}
	}
}
