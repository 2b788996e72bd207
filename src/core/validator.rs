//! PL-007: Pre-flight validation against the input file.
//!
//! Two passes run before any write:
//! 1. header cross-check (mapping vs. input columns, mapped fields vs. type map)
//! 2. row check over every data row (coercibility, non-empty key)
//!
//! Lenient mode logs anomalies and keeps going; strict mode stops at the first.

use super::coerce;
use super::error::LoadError;
use super::mapper::short_name;
use super::types::*;
use chrono_tz::Tz;
use std::collections::HashSet;
use tracing::warn;

/// Result of the header cross-check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputCheck {
    pub warnings: Vec<String>,
    /// Mapped source columns missing from the input; excluded from row checks.
    pub ignored: HashSet<String>,
}

/// Cross-check the mapping against the input header and the resolved type map.
pub fn validate_against_input(
    mapping: &FieldMapping,
    kind: RecordKind,
    types: &TypeMap,
    headers: &[String],
    mode: ValidationMode,
) -> Result<InputCheck, LoadError> {
    let mut check = InputCheck::default();
    let mapped: HashSet<&str> = mapping.values().map(String::as_str).collect();

    for column in headers {
        if !mapped.contains(column.as_str()) {
            report(
                &mut check.warnings,
                mode,
                format!("input column '{}' is not mapped and will be ignored", column),
            )?;
        }
    }

    for (remote, column) in mapping {
        if !headers.iter().any(|h| h == column) {
            report(
                &mut check.warnings,
                mode,
                format!(
                    "column '{}' mapped to '{}' is not in the input",
                    column, remote
                ),
            )?;
            check.ignored.insert(column.clone());
        }
    }

    for remote in mapping.keys() {
        if remote.starts_with(EVENT_ATTRIBUTES_PREFIX) {
            continue;
        }
        let short = short_name(remote, kind);
        if !types.contains_key(short) {
            return Err(LoadError::Config(format!(
                "{} field '{}' is not defined on the platform",
                kind, remote
            )));
        }
    }

    Ok(check)
}

/// Anomalies in one data row (1-based `index`). Empty = clean.
pub fn check_row(
    index: usize,
    row: &SourceRow,
    mapping: &FieldMapping,
    kind: RecordKind,
    types: &TypeMap,
    tz: Tz,
    ignored: &HashSet<String>,
) -> Vec<String> {
    let mut problems = Vec::new();

    for (remote, column) in mapping {
        if ignored.contains(column) {
            continue;
        }
        let Some(raw) = row.get(column) else {
            continue;
        };
        let Some(ty) = types.get(short_name(remote, kind)).copied() else {
            continue;
        };
        if !coerce::is_coercible(raw, ty, tz) {
            problems.push(format!(
                "row {}: value '{}' in column '{}' is not a valid {} for '{}'",
                index, raw, column, ty, remote
            ));
        }
    }

    let key_present = mapping
        .get(kind.key_field())
        .and_then(|column| row.get(column))
        .is_some_and(|v| !v.trim().is_empty());
    if !key_present {
        problems.push(format!(
            "row {}: key field '{}' is empty",
            index,
            kind.key_field()
        ));
    }

    problems
}

/// Row check over every row. Returns the number of warnings raised.
pub fn validate_rows<I>(
    rows: I,
    mapping: &FieldMapping,
    kind: RecordKind,
    types: &TypeMap,
    tz: Tz,
    check: &InputCheck,
    mode: ValidationMode,
) -> Result<usize, LoadError>
where
    I: IntoIterator<Item = Result<SourceRow, LoadError>>,
{
    let mut warnings = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        let row = row?;
        for problem in check_row(i + 1, &row, mapping, kind, types, tz, &check.ignored) {
            report(&mut warnings, mode, problem)?;
        }
    }
    Ok(warnings.len())
}

fn report(
    warnings: &mut Vec<String>,
    mode: ValidationMode,
    message: String,
) -> Result<(), LoadError> {
    match mode {
        ValidationMode::Strict => Err(LoadError::Validation(message)),
        ValidationMode::Lenient => {
            warn!("{}", message);
            warnings.push(message);
            Ok(())
        }
    }
}
