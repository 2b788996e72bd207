//! PL-005: Record mapping from one source row to one nested target record.
//!
//! Pure function of (row, mapping, kind, type map, timezone). Dotted remote
//! field names become nested objects; typed fields are coerced and omitted
//! when coercion fails.

use super::coerce;
use super::types::*;
use chrono_tz::Tz;
use serde_json::Value;

/// Type-lookup name for a remote field: strip a leading `customAttributes.`
/// or `location.` segment, and alias the key field to `id` (custom events
/// keep their own key name).
pub fn short_name(remote: &str, kind: RecordKind) -> &str {
    let short = remote
        .strip_prefix(CUSTOM_ATTRIBUTES_PREFIX)
        .or_else(|| remote.strip_prefix("location."))
        .unwrap_or(remote);
    if kind != RecordKind::CustomEvent && short == kind.key_field() {
        "id"
    } else {
        short
    }
}

/// Build the target record for one row.
pub fn map_record(
    row: &SourceRow,
    mapping: &FieldMapping,
    kind: RecordKind,
    types: &TypeMap,
    tz: Tz,
) -> TargetRecord {
    let mut record = TargetRecord::new();

    for (remote, column) in mapping {
        let Some(raw) = row.get(column) else {
            continue;
        };
        let declared = types.get(short_name(remote, kind)).copied();

        let value = match declared {
            Some(_) if raw.is_empty() => continue,
            Some(ty) => match coerce::coerce(raw, ty, tz) {
                Some(v) => v,
                None => continue,
            },
            None => Value::String(raw.clone()),
        };

        let path: Vec<&str> = remote.split('.').collect();
        record = set_path(record, &path, value);
    }

    record
}

/// Place `value` at `path`, creating intermediate objects. A non-object
/// already sitting on an intermediate segment is replaced.
pub fn set_path(mut record: TargetRecord, path: &[&str], value: Value) -> TargetRecord {
    match path {
        [] => record,
        [leaf] => {
            record.insert((*leaf).to_string(), value);
            record
        }
        [head, rest @ ..] => {
            let child = match record.remove(*head) {
                Some(Value::Object(existing)) => existing,
                _ => TargetRecord::new(),
            };
            let child = set_path(child, rest, value);
            record.insert((*head).to_string(), Value::Object(child));
            record
        }
    }
}

/// The record's key value, when present and not blank.
pub fn key_value(record: &TargetRecord, kind: RecordKind) -> Option<String> {
    match record.get(kind.key_field())? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Rename top-level keys per the kind's API alias table.
pub fn wire_payload(record: TargetRecord, kind: RecordKind) -> TargetRecord {
    let spec = kind.spec();
    record
        .into_iter()
        .map(|(k, v)| (spec.api_name(&k).to_string(), v))
        .collect()
}
