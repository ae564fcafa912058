use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::errors::{ValidationError, ValidationIssue, ValidationResult};

/// Identifiers become key segments, so separators and whitespace are rejected.
/// A leading `_` is reserved for internal keys.
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.@][A-Za-z0-9_\-\.@]{0,127}$").expect("identifier pattern"));

/// Returns `true` if the provided string parses as a URL with a scheme.
pub fn is_valid_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

/// Returns `true` if the provided string is usable as a user or document identifier.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(value)
}

/// Validates an identifier supplied by a caller.
pub fn check_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(ValidationError::single(
            field,
            "identifier",
            format!("'{value}' is not a valid identifier"),
        ))
    }
}

/// Pushes a `required` issue when the trimmed text is empty, and a `length` issue when too long.
pub fn check_text(issues: &mut Vec<ValidationIssue>, field: &str, value: &str, max: usize) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        issues.push(ValidationIssue::new(field, "required", format!("{field} must not be empty")));
    } else if trimmed.chars().count() > max {
        issues.push(ValidationIssue::new(
            field,
            "length",
            format!("{field} must be at most {max} characters"),
        ));
    }
}

/// Pushes a `url` issue when the optional value is present and does not parse.
pub fn check_optional_url(issues: &mut Vec<ValidationIssue>, field: &str, value: Option<&str>) {
    if let Some(raw) = value
        && !is_valid_url(raw)
    {
        issues.push(ValidationIssue::new(field, "url", format!("{field} must be a valid URL")));
    }
}
