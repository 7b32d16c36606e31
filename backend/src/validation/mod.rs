//! Per-column value validation.
//!
//! A rule's line specification may carry checks that run against each row
//! before it is mapped:
//!
//! | type     | passes when                              |
//! |----------|------------------------------------------|
//! | `number` | the cell parses as an integer            |
//! | `string` | the cell is non-empty                    |
//! | `email`  | the cell contains `@`                    |
//! | `regex`  | `pattern` matches somewhere in the cell  |
//!
//! Checks for columns missing from the headers are skipped. A cell missing
//! from a short row is validated as the empty string.

use regex::Regex;

use crate::error::ValidationError;
use crate::models::{Validation, ValidationKind};

/// Check one cell against one validation entry.
pub fn validate_value(validation: &Validation, value: &str) -> Result<(), ValidationError> {
    let field = || validation.field.clone();

    match validation.kind {
        ValidationKind::Number => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| ValidationError::NotANumber {
                field: field(),
                value: value.to_string(),
            }),
        ValidationKind::String if value.is_empty() => {
            Err(ValidationError::EmptyString { field: field() })
        }
        ValidationKind::String => Ok(()),
        ValidationKind::Email if !value.contains('@') => Err(ValidationError::InvalidEmail {
            field: field(),
            value: value.to_string(),
        }),
        ValidationKind::Email => Ok(()),
        ValidationKind::Regex => {
            let pattern = validation.pattern.as_deref().unwrap_or_default();
            let re = Regex::new(pattern).map_err(|e| ValidationError::InvalidPattern {
                field: field(),
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            if re.is_match(value) {
                Ok(())
            } else {
                Err(ValidationError::PatternMismatch {
                    field: field(),
                    pattern: pattern.to_string(),
                    value: value.to_string(),
                })
            }
        }
    }
}

/// Validate a row. The first failing check is returned.
pub fn validate_line(
    line: &[String],
    headers: &[String],
    validations: &[Validation],
) -> Result<(), ValidationError> {
    for validation in validations {
        for (i, header) in headers.iter().enumerate() {
            if header.trim() != validation.field {
                continue;
            }
            let value = line.get(i).map(String::as_str).unwrap_or("");
            validate_value(validation, value)?;
        }
    }
    Ok(())
}

/// Validate every row, reporting the 1-based data row that failed.
pub fn validate_rows(
    rows: &[Vec<String>],
    headers: &[String],
    validations: &[Validation],
) -> Result<(), (usize, ValidationError)> {
    if validations.is_empty() {
        return Ok(());
    }
    rows.iter()
        .enumerate()
        .try_for_each(|(i, row)| validate_line(row, headers, validations).map_err(|e| (i + 1, e)))
}
