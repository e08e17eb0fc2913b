// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Validation and sanitization helpers shared by all table row types.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// Maximum length of email addresses per the schema.
pub const MAX_EMAIL_LENGTH: usize = 100;

/// Model errors.
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Result type for this module.
pub type ModelResult<T> = Result<T, ModelError>;

/// Escapes the characters of `s` that have special meaning in HTML.
pub fn no_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            ch => escaped.push(ch),
        }
    }
    escaped
}

/// Compiled code patterns keyed by their maximum length.
static CODE_PATTERNS: LazyLock<Mutex<HashMap<usize, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Gets the pattern that matches codes of 1 to `max_len` characters.
fn code_pattern(max_len: usize) -> ModelResult<Regex> {
    let mut patterns = CODE_PATTERNS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(re) = patterns.get(&max_len) {
        return Ok(re.clone());
    }

    let pattern = format!("^[A-Z0-9_+.-]{{1,{}}}$", max_len);
    let re = Regex::new(&pattern).map_err(|e| ModelError(format!("Bad code pattern: {}", e)))?;
    patterns.insert(max_len, re.clone());
    Ok(re)
}

/// Checks that the code `value` of `field` has between 1 and `max_len` characters and only
/// contains uppercase letters, digits and the `_+.-` symbols.
pub fn check_code(field: &str, value: &str, max_len: usize) -> ModelResult<()> {
    if !code_pattern(max_len)?.is_match(value) {
        return Err(ModelError(format!(
            "Invalid {} '{}': must have 1 to {} uppercase letters, digits or _+.- symbols",
            field, value, max_len
        )));
    }
    Ok(())
}

/// Checks that `value` of `field` has between `min` and `max` characters.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> ModelResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ModelError(format!(
            "Invalid {}: length must be between {} and {} but is {}",
            field, min, max, len
        )));
    }
    Ok(())
}

/// Checks that `value` of `field` is a percentage in the `[0, 100]` range.
pub fn check_percentage(field: &str, value: f64) -> ModelResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ModelError(format!("Invalid {}: {} is not a percentage", field, value)));
    }
    Ok(())
}

/// Checks that `value` looks like an email address.
///
/// Email addresses can have many formats and attempting to validate them fully is futile, so
/// this only does some minimal validation.
pub fn check_email(value: &str) -> ModelResult<()> {
    if value.trim().is_empty() {
        return Err(ModelError("Email address cannot be empty".to_owned()));
    }
    if value.len() > MAX_EMAIL_LENGTH {
        return Err(ModelError("Email address is too long".to_owned()));
    }
    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !value.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ModelError(format!("Email does not look like a valid address '{}'", value))),
    }
}

/// Rounds `value` to `decimals` decimal positions.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_html() {
        assert_eq!("plain text", no_html("plain text"));
        assert_eq!(
            "&lt;b&gt;&quot;O&#39;Brien&quot;&lt;/b&gt; &amp;",
            no_html("<b>\"O'Brien\"</b> &amp;")
        );
    }

    #[test]
    fn test_check_code_ok() {
        for code in ["A", "EUR", "IVA21", "R.E.", "A-B_C+1", "1234567890"] {
            check_code("code", code, 10).unwrap();
        }
    }

    #[test]
    fn test_check_code_errors() {
        for code in ["", "eur", "A B", "ÑA", "A/B", "12345678901", "A\n"] {
            let err = check_code("the-code", code, 10).unwrap_err();
            assert!(err.0.contains("Invalid the-code"), "Unexpected error for {:?}: {}", code, err);
        }
        check_code("code", "ABCD", 3).unwrap_err();
    }

    #[test]
    fn test_check_code_patterns_per_length() {
        check_code("code", "ABCDEFG", 7).unwrap();
        check_code("code", "ABCDEFG", 6).unwrap_err();
        check_code("code", "ABCDEF", 7).unwrap();
        check_code("code", "ABCDEFGH", 7).unwrap_err();

        let patterns = CODE_PATTERNS.lock().unwrap();
        assert_eq!("^[A-Z0-9_+.-]{1,7}$", patterns[&7].as_str());
        assert_eq!("^[A-Z0-9_+.-]{1,6}$", patterns[&6].as_str());
    }

    #[test]
    fn test_check_length() {
        check_length("name", "a", 1, 3).unwrap();
        check_length("name", "ñññ", 1, 3).unwrap();
        check_length("name", "", 1, 3).unwrap_err();
        check_length("name", "abcd", 1, 3).unwrap_err();
        check_length("name", "", 0, 3).unwrap();
    }

    #[test]
    fn test_check_percentage() {
        check_percentage("rate", 0.0).unwrap();
        check_percentage("rate", 21.0).unwrap();
        check_percentage("rate", 100.0).unwrap();
        check_percentage("rate", -0.01).unwrap_err();
        check_percentage("rate", 100.01).unwrap_err();
        check_percentage("rate", f64::NAN).unwrap_err();
    }

    #[test]
    fn test_check_email() {
        check_email("someone@example.com").unwrap();
        check_email("").unwrap_err();
        check_email("no-at-sign").unwrap_err();
        check_email("@example.com").unwrap_err();
        check_email("two words@example.com").unwrap_err();
        check_email(&format!("{}@example.com", "a".repeat(MAX_EMAIL_LENGTH))).unwrap_err();
    }

    #[test]
    fn test_round_to() {
        assert_eq!(1.23, round_to(1.2345, 2));
        assert_eq!(1.24, round_to(1.2368, 2));
        assert_eq!(-2.0, round_to(-1.5, 0));
        assert_eq!(10.0, round_to(9.99999, 3));
    }
}
