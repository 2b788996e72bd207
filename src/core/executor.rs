//! PL-013: Executor, the orchestration loop for a load run.
//!
//! catalog → header check → row validation (all rows) → for each row in the
//! window: map → key → PUT/POST → classify → counters + error sink
//!
//! Rows are processed strictly in input order, one at a time. A row whose
//! mapped record has no key value stops the run; every other per-row
//! failure is counted, logged and written to the error sink.

use super::api::PlatformApi;
use super::catalog;
use super::error::LoadError;
use super::errorlog::{extract_error_message, ErrorLog};
use super::input::InputTable;
use super::mapper;
use super::types::*;
use super::validator::{self, InputCheck};
use crate::transport::{Method, Transport};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};

/// Actor-type marker attached to every custom event.
pub const EVENT_USER_TYPE: &str = "USER";

/// Everything one run needs besides the API.
pub struct LoadJob<'a> {
    pub settings: &'a RunSettings,
    pub options: &'a LoadOptions,
    pub input: &'a InputTable,
}

/// Result of the pre-flight pass.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub types: TypeMap,
    pub check: InputCheck,
    /// Header warnings plus row warnings.
    pub warnings: usize,
}

/// Outcome of loading a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// PUT answered 204.
    Updated,
    /// POST answered 201 (insert-missing fallback or custom event).
    Inserted,
    /// PUT answered 404 and insert-missing is off.
    Skipped,
    /// Any other status, or the transport gave up.
    Failed {
        status: Option<u16>,
        message: String,
    },
    /// Dry run: the request was logged, not sent.
    DryRun,
}

/// Resolve the type map and validate the input header and every row.
pub fn preflight<T: Transport>(
    job: &LoadJob,
    api: &PlatformApi<T>,
) -> Result<Preflight, LoadError> {
    let kind = job.options.kind;
    let mapping = &job.settings.mapping;
    let types = catalog::resolve(kind, api)?;

    let check = validator::validate_against_input(
        mapping,
        kind,
        &types,
        job.input.headers(),
        job.options.mode,
    )?;
    let row_warnings = validator::validate_rows(
        job.input.rows()?,
        mapping,
        kind,
        &types,
        job.settings.timezone,
        &check,
        job.options.mode,
    )?;

    let warnings = check.warnings.len() + row_warnings;
    info!(kind = %kind, warnings, "pre-flight validation complete");
    Ok(Preflight {
        types,
        check,
        warnings,
    })
}

/// Run pre-flight then load every row in the window.
pub fn load<T: Transport>(job: &LoadJob, api: &PlatformApi<T>) -> Result<RunSummary, LoadError> {
    let start = Instant::now();
    let pre = preflight(job, api)?;

    let error_log = ErrorLog::new(job.input.path(), job.input.headers(), job.input.delimiter());
    let ctx = RowCtx {
        job,
        api,
        types: &pre.types,
    };

    let mut counters = LoadCounters::default();
    for (i, row) in job.input.rows()?.enumerate() {
        let index = i + 1;
        if job.options.last_row.is_some_and(|last| index > last) {
            break;
        }
        if !job.options.in_window(index) {
            continue;
        }
        let row = row?;
        match process_row(&ctx, index, &row)? {
            RowOutcome::Updated => counters.updated += 1,
            RowOutcome::Inserted => counters.inserted += 1,
            RowOutcome::Skipped => counters.skipped += 1,
            RowOutcome::Failed { status, message } => {
                counters.errored += 1;
                error!(row = index, status = ?status, "{}", message);
                error_log
                    .append(&row, &message)
                    .map_err(|e| LoadError::Io(std::io::Error::other(e)))?;
            }
            RowOutcome::DryRun => {}
        }
    }

    let summary = RunSummary {
        counters,
        dry_run: job.options.dry_run,
        warnings: pre.warnings,
        duration: start.elapsed(),
    };
    if counters.errored > 0 {
        warn!(path = %error_log.path().display(), "failed rows written to error log");
    }
    info!(elapsed_ms = summary.duration.as_millis() as u64, "{}", summary);
    Ok(summary)
}

/// Shared context for processing rows.
struct RowCtx<'a, T> {
    job: &'a LoadJob<'a>,
    api: &'a PlatformApi<T>,
    types: &'a TypeMap,
}

/// Map one row and send it, returning its outcome. Only a missing key is fatal.
fn process_row<T: Transport>(
    ctx: &RowCtx<T>,
    index: usize,
    row: &SourceRow,
) -> Result<RowOutcome, LoadError> {
    let settings = ctx.job.settings;
    let options = ctx.job.options;
    let kind = options.kind;

    let record = mapper::map_record(row, &settings.mapping, kind, ctx.types, settings.timezone);
    let Some(key) = mapper::key_value(&record, kind) else {
        let message = format!(
            "mapped record has no value for key field '{}'; check the {} field mapping",
            kind.key_field(),
            kind
        );
        error!(row = index, "{}", message);
        return Err(LoadError::RowFatal {
            row: index,
            message,
        });
    };

    let payload = request_payload(record, kind, &settings.product_keys);
    let endpoint = kind.spec().endpoint;

    if kind == RecordKind::CustomEvent {
        let url = ctx.api.url(endpoint);
        return Ok(send_expecting(ctx, Method::Post, url, payload, 201, RowOutcome::Inserted));
    }

    let url = ctx.api.record_url(endpoint, &key)?;
    if options.dry_run {
        return Ok(dry_run(Method::Put, &url, &payload));
    }

    let request = ctx.api.request(Method::Put, url, Some(payload.clone()));
    match ctx.api.send(&request) {
        Ok(resp) if resp.status == 204 => Ok(RowOutcome::Updated),
        Ok(resp) if resp.status == 404 => {
            if options.insert_missing && kind != RecordKind::UserPreferences {
                let url = ctx.api.url(endpoint);
                Ok(send_expecting(ctx, Method::Post, url, payload, 201, RowOutcome::Inserted))
            } else {
                info!(row = index, key = %key, "{} not found; skipped", kind);
                Ok(RowOutcome::Skipped)
            }
        }
        Ok(resp) => Ok(RowOutcome::Failed {
            status: Some(resp.status),
            message: extract_error_message(resp.status, &resp.body),
        }),
        Err(e) => Ok(RowOutcome::Failed {
            status: None,
            message: e.to_string(),
        }),
    }
}

/// Send (or, in a dry run, log) one request; `expected` is the only success status.
fn send_expecting<T: Transport>(
    ctx: &RowCtx<T>,
    method: Method,
    url: String,
    payload: Value,
    expected: u16,
    success: RowOutcome,
) -> RowOutcome {
    if ctx.job.options.dry_run {
        return dry_run(method, &url, &payload);
    }
    let request = ctx.api.request(method, url, Some(payload));
    match ctx.api.send(&request) {
        Ok(resp) if resp.status == expected => success,
        Ok(resp) => RowOutcome::Failed {
            status: Some(resp.status),
            message: extract_error_message(resp.status, &resp.body),
        },
        Err(e) => RowOutcome::Failed {
            status: None,
            message: e.to_string(),
        },
    }
}

fn dry_run(method: Method, url: &str, payload: &Value) -> RowOutcome {
    info!(method = %method, endpoint = %url, payload = %payload, "dry run");
    RowOutcome::DryRun
}

/// Wire body for a record: aliases applied, product key(s) and markers added.
pub fn request_payload(record: TargetRecord, kind: RecordKind, product_keys: &[String]) -> Value {
    let mut payload = mapper::wire_payload(record, kind);
    match kind {
        RecordKind::CustomEvent => {
            let key = product_keys.first().cloned().unwrap_or_default();
            payload.insert("propertyKey".to_string(), Value::String(key));
            payload.insert(
                "userType".to_string(),
                Value::String(EVENT_USER_TYPE.to_string()),
            );
        }
        RecordKind::User | RecordKind::Account => {
            let keys = product_keys.iter().cloned().map(Value::String).collect();
            payload.insert("propertyKeys".to_string(), Value::Array(keys));
        }
        RecordKind::UserPreferences => {}
    }
    Value::Object(payload)
}
