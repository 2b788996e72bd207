//! PL-001: Record kinds, field catalogs, and the config document schema.
//!
//! Per-kind metadata (key field, field catalog, API aliases, endpoints) is a
//! static `KindSpec` selected by `RecordKind`. Config types derive Deserialize
//! so a YAML or JSON document maps straight onto them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Record kinds
// ============================================================================

/// The four record kinds the loader knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    User,
    Account,
    CustomEvent,
    UserPreferences,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        Self::User,
        Self::Account,
        Self::CustomEvent,
        Self::UserPreferences,
    ];

    /// Static metadata for this kind.
    pub fn spec(self) -> &'static KindSpec {
        match self {
            Self::User => &USER_SPEC,
            Self::Account => &ACCOUNT_SPEC,
            Self::CustomEvent => &CUSTOM_EVENT_SPEC,
            Self::UserPreferences => &USER_PREFERENCES_SPEC,
        }
    }

    pub fn key_field(self) -> &'static str {
        self.spec().key_field
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Account => write!(f, "ACCOUNT"),
            Self::CustomEvent => write!(f, "CUSTOM_EVENT"),
            Self::UserPreferences => write!(f, "USER_PREFERENCES"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "USER" | "USERS" => Ok(Self::User),
            "ACCOUNT" | "ACCOUNTS" => Ok(Self::Account),
            "CUSTOM_EVENT" | "CUSTOM_EVENTS" | "EVENT" | "EVENTS" => Ok(Self::CustomEvent),
            "USER_PREFERENCES" | "PREFERENCES" => Ok(Self::UserPreferences),
            _ => Err(format!(
                "unknown record kind '{}' (expected user, account, custom_event, user_preferences)",
                s
            )),
        }
    }
}

/// Where a kind's type table comes from.
#[derive(Debug)]
pub enum SchemaSource {
    /// Fetched from the platform's metadata endpoint (path relative to base URL).
    Remote(&'static str),
    /// Fixed table shipped with the loader.
    BuiltIn(&'static [(&'static str, FieldType)]),
}

/// Immutable per-kind metadata.
#[derive(Debug)]
pub struct KindSpec {
    /// Natural identifier of the record.
    pub key_field: &'static str,
    /// Known remote field names (dotted paths allowed).
    pub fields: &'static [&'static str],
    /// Top-level renames applied to the wire payload.
    pub api_aliases: &'static [(&'static str, &'static str)],
    /// Collection endpoint, relative to the base URL.
    pub endpoint: &'static str,
    pub schema: SchemaSource,
}

impl KindSpec {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(&name)
    }

    /// Wire name for a top-level record key.
    pub fn api_name<'a>(&self, field: &'a str) -> &'a str {
        self.api_aliases
            .iter()
            .find(|(from, _)| *from == field)
            .map(|(_, to)| *to)
            .unwrap_or(field)
    }
}

const LOCATION_FIELDS: [&str; 10] = [
    "location.countryName",
    "location.countryCode",
    "location.stateName",
    "location.stateCode",
    "location.city",
    "location.street",
    "location.postalCode",
    "location.continent",
    "location.regionName",
    "location.timeZone",
];

const fn concat_fields<const N: usize>(
    head: &[&'static str],
    tail: &[&'static str],
) -> [&'static str; N] {
    let mut out = [""; N];
    let mut i = 0;
    while i < head.len() {
        out[i] = head[i];
        i += 1;
    }
    let mut j = 0;
    while j < tail.len() {
        out[i + j] = tail[j];
        j += 1;
    }
    out
}

const USER_BASE_FIELDS: [&str; 21] = [
    "identifyId",
    "type",
    "gender",
    "email",
    "firstName",
    "lastName",
    "lastSeenDate",
    "signUpDate",
    "firstVisitDate",
    "title",
    "phone",
    "score",
    "role",
    "subscriptionId",
    "accountId",
    "numberOfVisits",
    "createDate",
    "lastModifiedDate",
    "sfdcContactId",
    "globalUnsubscribe",
    "lastInboundEmailDate",
];

const USER_FIELDS: [&str; 31] = concat_fields(&USER_BASE_FIELDS, &LOCATION_FIELDS);

const ACCOUNT_BASE_FIELDS: [&str; 16] = [
    "id",
    "name",
    "trackedSubscriptionId",
    "sfdcId",
    "lastSeenDate",
    "dunsNumber",
    "industry",
    "numberOfEmployees",
    "sicCode",
    "website",
    "naicsCode",
    "plan",
    "numberOfUsers",
    "createDate",
    "lastModifiedDate",
    "parentGroupId",
];

const ACCOUNT_FIELDS: [&str; 26] = concat_fields(&ACCOUNT_BASE_FIELDS, &LOCATION_FIELDS);

static USER_SPEC: KindSpec = KindSpec {
    key_field: "identifyId",
    fields: &USER_FIELDS,
    api_aliases: &[("identifyId", "id")],
    endpoint: "users",
    schema: SchemaSource::Remote("users/attributes"),
};

static ACCOUNT_SPEC: KindSpec = KindSpec {
    key_field: "id",
    fields: &ACCOUNT_FIELDS,
    api_aliases: &[],
    endpoint: "accounts",
    schema: SchemaSource::Remote("accounts/attributes"),
};

static CUSTOM_EVENT_SPEC: KindSpec = KindSpec {
    key_field: "identifyId",
    fields: &[
        "identifyId",
        "accountId",
        "eventName",
        "date",
        "url",
        "referrer",
        "remoteHost",
    ],
    api_aliases: &[],
    endpoint: "events/custom",
    schema: SchemaSource::BuiltIn(&[
        ("identifyId", FieldType::String),
        ("accountId", FieldType::String),
        ("eventName", FieldType::String),
        ("date", FieldType::DateTime),
        ("url", FieldType::String),
        ("referrer", FieldType::String),
        ("remoteHost", FieldType::String),
    ]),
};

static USER_PREFERENCES_SPEC: KindSpec = KindSpec {
    key_field: "identifyId",
    fields: &[
        "identifyId",
        "globalUnsubscribe",
        "productUpdates",
        "guidedTours",
        "surveys",
        "onboardingBot",
        "trackUsage",
    ],
    api_aliases: &[("identifyId", "id")],
    endpoint: "users/preferences",
    schema: SchemaSource::BuiltIn(&[
        ("id", FieldType::String),
        ("globalUnsubscribe", FieldType::Boolean),
        ("productUpdates", FieldType::Boolean),
        ("guidedTours", FieldType::Boolean),
        ("surveys", FieldType::Boolean),
        ("onboardingBot", FieldType::Boolean),
        ("trackUsage", FieldType::Boolean),
    ]),
};

/// Free-form attribute prefixes accepted without catalog checks.
pub const CUSTOM_ATTRIBUTES_PREFIX: &str = "customAttributes.";
pub const EVENT_ATTRIBUTES_PREFIX: &str = "attributes.";

// ============================================================================
// Field types
// ============================================================================

/// Declared value type of a remote field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    DateTime,
    Number,
    Boolean,
}

impl FieldType {
    /// Map a metadata-endpoint type name. Unknown names are treated as strings.
    pub fn from_remote(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "DATE" | "DATE_TIME" | "DATETIME" => Self::DateTime,
            "NUMBER" | "NUMERIC" | "INTEGER" | "LONG" | "DOUBLE" | "FLOAT" => Self::Number,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            _ => Self::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::DateTime => write!(f, "DATE_TIME"),
            Self::Number => write!(f, "NUMBER"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// Short remote field name → declared type.
pub type TypeMap = IndexMap<String, FieldType>;

/// Remote field (dotted path) → source column, in document order.
pub type FieldMapping = IndexMap<String, String>;

/// One input line: column → raw text.
pub type SourceRow = IndexMap<String, String>;

/// Nested record built for one row.
pub type TargetRecord = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Config document (pxload.yaml / pxload.json)
// ============================================================================

/// Root configuration document. Every field is optional at parse time so
/// missing keys surface as configuration errors rather than parse errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Platform API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Product key(s) scoping user/account writes
    #[serde(default)]
    pub product_key: Option<ProductKeys>,

    /// Named deployment region
    #[serde(default)]
    pub data_center: Option<String>,

    /// Explicit base URL (overrides the data center)
    #[serde(default)]
    pub base_url: Option<String>,

    /// IANA zone applied to dates without an offset
    #[serde(default)]
    pub timezone: Option<String>,

    /// Per-kind field mappings, kept raw until validated
    #[serde(default)]
    pub field_mappings: Option<IndexMap<String, serde_yaml_ng::Value>>,

    /// HTTP client tuning
    #[serde(default)]
    pub http: HttpSettings,
}

/// Product key: a single key or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductKeys {
    Single(String),
    Multiple(Vec<String>),
}

impl ProductKeys {
    /// Expand to a list of keys.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }
}

/// Request timeout and retry tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSettings {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_timeout_seconds() -> f64 {
    8.0
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_factor() -> f64 {
    0.3
}

/// Deployment region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataCenter {
    #[default]
    Us,
    Eu,
    Us2,
}

impl DataCenter {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Us => "https://api.aptrinsic.com/v1",
            Self::Eu => "https://api-eu.aptrinsic.com/v1",
            Self::Us2 => "https://api-us2.aptrinsic.com/v1",
        }
    }
}

impl FromStr for DataCenter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(Self::Us),
            "EU" => Ok(Self::Eu),
            "US2" => Ok(Self::Us2),
            other => Err(format!("unknown data center '{}' (expected US, EU, US2)", other)),
        }
    }
}

/// A validated config document, resolved for one record kind.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub api_key: String,
    pub product_keys: Vec<String>,
    pub base_url: String,
    pub timezone: chrono_tz::Tz,
    pub mapping: FieldMapping,
    pub http: HttpSettings,
}

// ============================================================================
// Run options and results
// ============================================================================

/// Validation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Print anomalies and continue.
    #[default]
    Lenient,
    /// Abort on the first anomaly.
    Strict,
}

/// Options supplied per run (from the command line).
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub kind: RecordKind,
    pub insert_missing: bool,
    pub dry_run: bool,
    pub mode: ValidationMode,
    /// 1-based index of the first data row to load
    pub start_row: usize,
    /// Inclusive 1-based index of the last data row to load
    pub last_row: Option<usize>,
}

impl LoadOptions {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            insert_missing: false,
            dry_run: false,
            mode: ValidationMode::Lenient,
            start_row: 1,
            last_row: None,
        }
    }

    /// Whether the 1-based data row `index` falls inside the load window.
    pub fn in_window(&self, index: usize) -> bool {
        index >= self.start_row && self.last_row.is_none_or(|last| index <= last)
    }
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounters {
    pub updated: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub errored: u64,
}

/// Final report of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub counters: LoadCounters,
    pub dry_run: bool,
    pub warnings: usize,
    pub duration: std::time::Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Load complete: {} updated, {} inserted, {} skipped, {} errors (dry run: {})",
            self.counters.updated,
            self.counters.inserted,
            self.counters.skipped,
            self.counters.errored,
            self.dry_run
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
