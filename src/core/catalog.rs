//! PL-006: Type catalog (remote field name → declared type, per kind).
//!
//! Users and accounts read the platform's attribute metadata; custom events
//! and preferences use built-in tables and never touch the network.

use super::api::PlatformApi;
use super::error::LoadError;
use super::types::*;
use crate::transport::Transport;
use serde::Deserialize;
use tracing::{debug, info};

/// Present on every user but absent from the user metadata endpoint.
const USER_IMPLICIT_FIELDS: [(&str, FieldType); 2] = [
    ("sfdcContactId", FieldType::String),
    ("globalUnsubscribe", FieldType::Boolean),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeMeta {
    api_name: String,
    #[serde(rename = "type", default)]
    field_type: Option<String>,
}

/// Resolve the type map for `kind`.
pub fn resolve<T: Transport>(kind: RecordKind, api: &PlatformApi<T>) -> Result<TypeMap, LoadError> {
    let spec = kind.spec();
    let mut types: TypeMap = match spec.schema {
        SchemaSource::BuiltIn(table) => table
            .iter()
            .map(|(name, ty)| (name.to_string(), *ty))
            .collect(),
        SchemaSource::Remote(path) => fetch_remote(kind, path, api)?,
    };

    if kind == RecordKind::User {
        for (name, ty) in USER_IMPLICIT_FIELDS {
            types.entry(name.to_string()).or_insert(ty);
        }
    }

    // Lookups alias the key field to its wire name; accept metadata that
    // lists it under the record name.
    for (field, wire) in spec.api_aliases {
        if let Some(ty) = types.get(*field).copied() {
            types.entry(wire.to_string()).or_insert(ty);
        }
    }

    debug!(kind = %kind, fields = types.len(), "type catalog resolved");
    Ok(types)
}

fn fetch_remote<T: Transport>(
    kind: RecordKind,
    path: &str,
    api: &PlatformApi<T>,
) -> Result<TypeMap, LoadError> {
    info!(kind = %kind, url = %api.url(path), "fetching field metadata");
    let response = api
        .get(path)
        .map_err(|e| LoadError::SchemaFetch(format!("{} metadata: {}", kind, e)))?;

    match response.status {
        401 | 403 => {
            return Err(LoadError::Authentication(format!(
                "HTTP {} reading {} metadata; check apiKey",
                response.status, kind
            )))
        }
        s if !response.success() => {
            return Err(LoadError::SchemaFetch(format!(
                "HTTP {} reading {} metadata: {}",
                s,
                kind,
                response.body.trim()
            )))
        }
        _ => {}
    }

    parse_metadata(&response.body)
        .map_err(|e| LoadError::SchemaFetch(format!("{} metadata: {}", kind, e)))
}

/// Parse a metadata body: a bare array of `{apiName, type}` objects, or an
/// object wrapping one under any field.
pub fn parse_metadata(body: &str) -> Result<TypeMap, String> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;

    let items = match json {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(obj) => obj
            .into_iter()
            .find_map(|(_, v)| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| "no attribute list in response".to_string())?,
        _ => return Err("expected an array of attributes".to_string()),
    };

    let mut types = TypeMap::new();
    for item in items {
        let meta: AttributeMeta =
            serde_json::from_value(item).map_err(|e| format!("bad attribute entry: {}", e))?;
        let ty = meta
            .field_type
            .as_deref()
            .map(FieldType::from_remote)
            .unwrap_or(FieldType::String);
        types.insert(meta.api_name, ty);
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::ScriptedTransport;
    use crate::transport::TransportError;

    const USER_META: &str = r#"[
        {"apiName": "id", "type": "STRING"},
        {"apiName": "title", "type": "STRING"},
        {"apiName": "signUpDate", "type": "DATE_TIME"},
        {"apiName": "score", "type": "NUMBER"},
        {"apiName": "tier", "type": "STRING"}
    ]"#;

    #[test]
    fn test_pl006_builtin_no_network() {
        let t = ScriptedTransport::new();
        let api = PlatformApi::new("http://x", "k", &t);
        let types = resolve(RecordKind::CustomEvent, &api).unwrap();
        assert_eq!(types["date"], FieldType::DateTime);
        assert_eq!(types["identifyId"], FieldType::String);
        let types = resolve(RecordKind::UserPreferences, &api).unwrap();
        assert_eq!(types["id"], FieldType::String);
        assert_eq!(types["guidedTours"], FieldType::Boolean);
        assert!(t.sent().is_empty());
    }

    #[test]
    fn test_pl006_user_remote_augmented() {
        let t = ScriptedTransport::new().reply(200, USER_META);
        let api = PlatformApi::new("http://x/v1", "k", &t);
        let types = resolve(RecordKind::User, &api).unwrap();
        assert_eq!(types["signUpDate"], FieldType::DateTime);
        assert_eq!(types["score"], FieldType::Number);
        assert_eq!(types["sfdcContactId"], FieldType::String);
        assert_eq!(types["globalUnsubscribe"], FieldType::Boolean);
        assert_eq!(t.sent()[0].url, "http://x/v1/users/attributes");
    }

    #[test]
    fn test_pl006_user_augment_keeps_remote_type() {
        let body = r#"[{"apiName": "identifyId", "type": "STRING"},
                       {"apiName": "globalUnsubscribe", "type": "STRING"}]"#;
        let t = ScriptedTransport::new().reply(200, body);
        let api = PlatformApi::new("http://x", "k", &t);
        let types = resolve(RecordKind::User, &api).unwrap();
        assert_eq!(types["globalUnsubscribe"], FieldType::String);
        // key field listed under its record name is reachable by its wire alias
        assert_eq!(types["id"], FieldType::String);
    }

    #[test]
    fn test_pl006_account_not_augmented() {
        let body = r#"{"data": [{"apiName": "id", "type": "STRING"}]}"#;
        let t = ScriptedTransport::new().reply(200, body);
        let api = PlatformApi::new("http://x", "k", &t);
        let types = resolve(RecordKind::Account, &api).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(t.sent()[0].url, "http://x/accounts/attributes");
    }

    #[test]
    fn test_pl006_auth_error() {
        for status in [401, 403] {
            let t = ScriptedTransport::new().reply(status, "denied");
            let api = PlatformApi::new("http://x", "bad", &t);
            let err = resolve(RecordKind::User, &api).unwrap_err();
            assert!(matches!(err, LoadError::Authentication(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_pl006_schema_fetch_error() {
        let t = ScriptedTransport::new().reply(500, "boom");
        let api = PlatformApi::new("http://x", "k", &t);
        let err = resolve(RecordKind::Account, &api).unwrap_err();
        assert!(matches!(err, LoadError::SchemaFetch(ref m) if m.contains("500")));
    }

    #[test]
    fn test_pl006_transport_error_is_schema_fetch() {
        let t = ScriptedTransport::new().fail(TransportError::Connect("refused".into()));
        let api = PlatformApi::new("http://x", "k", &t);
        let err = resolve(RecordKind::User, &api).unwrap_err();
        assert!(matches!(err, LoadError::SchemaFetch(_)));
    }

    #[test]
    fn test_pl006_garbage_body() {
        let t = ScriptedTransport::new().reply(200, "<html>");
        let api = PlatformApi::new("http://x", "k", &t);
        assert!(matches!(
            resolve(RecordKind::User, &api),
            Err(LoadError::SchemaFetch(_))
        ));
    }

    #[test]
    fn test_pl006_parse_metadata_shapes() {
        let types = parse_metadata(r#"[{"apiName": "a", "type": "BOOLEAN"}, {"apiName": "b"}]"#)
            .unwrap();
        assert_eq!(types["a"], FieldType::Boolean);
        assert_eq!(types["b"], FieldType::String);
        assert!(parse_metadata(r#"{"count": 3}"#).is_err());
        assert!(parse_metadata("42").is_err());
        assert!(parse_metadata(r#"[{"type": "STRING"}]"#).is_err());
    }
}
