//! PL-003: Config parsing and validation.
//!
//! Parses pxload.yaml (or JSON) and validates it for one record kind:
//! - apiKey, productKey and fieldMappings must be present
//! - dataCenter and timezone must name something known
//! - the kind's mapping must be an object with >= 2 entries including the key field
//! - every mapped remote field must be in the kind's catalog or under a
//!   custom-attribute prefix

use super::error::LoadError;
use super::types::*;
use std::path::Path;

/// Upper bound on `http.timeoutSeconds` (one day).
pub const MAX_TIMEOUT_SECONDS: f64 = 86_400.0;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<LoaderConfig, LoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LoadError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse a config document from a string (YAML or JSON).
pub fn parse_config(text: &str) -> Result<LoaderConfig, LoadError> {
    serde_yaml_ng::from_str(text).map_err(|e| LoadError::Config(format!("parse error: {}", e)))
}

/// Validate a parsed config for `kind`. Returns a list of errors (empty = valid).
pub fn validate_config(config: &LoaderConfig, kind: RecordKind) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        errors.push(ValidationError::new("missing required key 'apiKey'"));
    }

    let has_product_key = config
        .product_key
        .as_ref()
        .is_some_and(|pk| pk.to_vec().iter().any(|k| !k.trim().is_empty()));
    if !has_product_key {
        errors.push(ValidationError::new("missing required key 'productKey'"));
    }

    if let Some(ref dc) = config.data_center {
        if let Err(e) = dc.parse::<DataCenter>() {
            errors.push(ValidationError::new(e));
        }
    }

    if let Some(ref tz) = config.timezone {
        if tz.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ValidationError::new(format!("unknown timezone '{}'", tz)));
        }
    }

    if config.http.timeout_seconds <= 0.0 || !config.http.timeout_seconds.is_finite() {
        errors.push(ValidationError::new("http.timeoutSeconds must be positive"));
    } else if config.http.timeout_seconds > MAX_TIMEOUT_SECONDS {
        errors.push(ValidationError::new(format!(
            "http.timeoutSeconds must be at most {}",
            MAX_TIMEOUT_SECONDS
        )));
    }
    if config.http.backoff_factor < 0.0 || !config.http.backoff_factor.is_finite() {
        errors.push(ValidationError::new("http.backoffFactor must not be negative"));
    }

    match field_mapping(config, kind) {
        Ok(mapping) => validate_mapping(&mapping, kind, &mut errors),
        Err(e) => errors.push(e),
    }

    errors
}

/// Validate run options against the kind.
pub fn validate_options(options: &LoadOptions) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if options.insert_missing && options.kind == RecordKind::UserPreferences {
        errors.push(ValidationError::new(
            "insert-missing is not supported for USER_PREFERENCES",
        ));
    }
    if options.start_row == 0 {
        errors.push(ValidationError::new("start row is 1-based and must be >= 1"));
    }
    if let Some(last) = options.last_row {
        if last < options.start_row {
            errors.push(ValidationError::new(format!(
                "last row {} is before start row {}",
                last, options.start_row
            )));
        }
    }
    errors
}

/// Validate config and options together and resolve the run settings.
pub fn run_settings(
    config: &LoaderConfig,
    options: &LoadOptions,
) -> Result<RunSettings, LoadError> {
    let mut errors = validate_config(config, options.kind);
    errors.extend(validate_options(options));
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
        return Err(LoadError::Config(joined.join("; ")));
    }

    let mapping =
        field_mapping(config, options.kind).map_err(|e| LoadError::Config(e.message))?;
    let timezone = match config.timezone {
        Some(ref tz) => tz
            .parse::<chrono_tz::Tz>()
            .map_err(|_| LoadError::Config(format!("unknown timezone '{}'", tz)))?,
        None => chrono_tz::UTC,
    };
    let base_url = match (&config.base_url, &config.data_center) {
        (Some(url), _) if !url.trim().is_empty() => url.trim().to_string(),
        (_, Some(dc)) => dc
            .parse::<DataCenter>()
            .map_err(LoadError::Config)?
            .base_url()
            .to_string(),
        _ => DataCenter::default().base_url().to_string(),
    };

    Ok(RunSettings {
        api_key: config.api_key.clone().unwrap_or_default(),
        product_keys: config
            .product_key
            .as_ref()
            .map(|pk| pk.to_vec().into_iter().filter(|k| !k.trim().is_empty()).collect())
            .unwrap_or_default(),
        base_url,
        timezone,
        mapping,
        http: config.http.clone(),
    })
}

/// Extract the kind's mapping from the raw document.
pub fn field_mapping(
    config: &LoaderConfig,
    kind: RecordKind,
) -> Result<FieldMapping, ValidationError> {
    let mappings = config
        .field_mappings
        .as_ref()
        .ok_or_else(|| ValidationError::new("missing required key 'fieldMappings'"))?;

    let raw = mappings
        .iter()
        .find(|(name, _)| name.parse::<RecordKind>().ok() == Some(kind))
        .map(|(_, v)| v)
        .ok_or_else(|| ValidationError::new(format!("no field mapping for {}", kind)))?;

    let entries = match raw {
        serde_yaml_ng::Value::Mapping(m) => m,
        serde_yaml_ng::Value::Null => {
            return Err(ValidationError::new(format!(
                "no field mapping for {}",
                kind
            )))
        }
        _ => {
            return Err(ValidationError::new(format!(
                "field mapping for {} must be an object",
                kind
            )))
        }
    };

    let mut mapping = FieldMapping::new();
    for (k, v) in entries {
        let remote = scalar_to_string(k).ok_or_else(|| {
            ValidationError::new(format!("field mapping for {} has a non-scalar key", kind))
        })?;
        let column = scalar_to_string(v).ok_or_else(|| {
            ValidationError::new(format!(
                "field mapping for {}: '{}' must map to a column name",
                kind, remote
            ))
        })?;
        mapping.insert(remote, column);
    }
    Ok(mapping)
}

fn validate_mapping(mapping: &FieldMapping, kind: RecordKind, errors: &mut Vec<ValidationError>) {
    let spec = kind.spec();

    if mapping.len() < 2 {
        errors.push(ValidationError::new(format!(
            "field mapping for {} needs at least 2 entries, got {}",
            kind,
            mapping.len()
        )));
    }

    if !mapping.contains_key(spec.key_field) {
        errors.push(ValidationError::new(format!(
            "field mapping for {} is missing key field '{}'",
            kind, spec.key_field
        )));
    }

    for (remote, column) in mapping {
        if column.trim().is_empty() {
            errors.push(ValidationError::new(format!(
                "field mapping for {}: '{}' maps to an empty column name",
                kind, remote
            )));
        }
        if is_custom_attribute(remote) {
            continue;
        }
        if !spec.has_field(remote) {
            errors.push(ValidationError::new(format!(
                "field mapping for {}: unknown field '{}'",
                kind, remote
            )));
        }
    }
}

/// Custom account/user attributes and event attributes bypass the catalog.
pub fn is_custom_attribute(remote: &str) -> bool {
    remote.starts_with(CUSTOM_ATTRIBUTES_PREFIX) || remote.starts_with(EVENT_ATTRIBUTES_PREFIX)
}

/// Convert a scalar YAML value to a string (column names may look numeric).
fn scalar_to_string(val: &serde_yaml_ng::Value) -> Option<String> {
    match val {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
