//! PL-017: CLI subcommands: init, fields, validate, load.

use crate::core::api::LiveApi;
use crate::core::error::LoadError;
use crate::core::executor::{self, LoadJob};
use crate::core::input::{self, InputTable};
use crate::core::parser;
use crate::core::types::{LoadOptions, RecordKind, RunSettings, SchemaSource, ValidationMode};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter pxload.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List the known fields of a record kind
    Fields {
        /// Record kind (user, account, custom_event, user_preferences)
        #[arg(short, long)]
        kind: RecordKind,
    },

    /// Run the pre-flight checks without writing anything
    Validate {
        /// Path to pxload.yaml
        #[arg(short, long, default_value = "pxload.yaml")]
        config: PathBuf,

        /// Record kind (user, account, custom_event, user_preferences)
        #[arg(short, long)]
        kind: RecordKind,

        /// Delimited input file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Abort on the first anomaly instead of warning
        #[arg(long)]
        strict: bool,

        /// Input field delimiter
        #[arg(long, default_value = ",", value_parser = input::parse_delimiter)]
        delimiter: u8,
    },

    /// Load rows into the platform
    Load {
        /// Path to pxload.yaml
        #[arg(short, long, default_value = "pxload.yaml")]
        config: PathBuf,

        /// Record kind (user, account, custom_event, user_preferences)
        #[arg(short, long)]
        kind: RecordKind,

        /// Delimited input file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Create records the update reports as missing (not for user_preferences)
        #[arg(long)]
        insert_missing: bool,

        /// Abort on the first anomaly instead of warning
        #[arg(long)]
        strict: bool,

        /// Log the requests instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// First data row to load (1-based)
        #[arg(long, default_value_t = 1)]
        start_row: usize,

        /// Last data row to load (inclusive)
        #[arg(long)]
        last_row: Option<usize>,

        /// Input field delimiter
        #[arg(long, default_value = ",", value_parser = input::parse_delimiter)]
        delimiter: u8,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), LoadError> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Fields { kind } => {
            cmd_fields(kind);
            Ok(())
        }
        Commands::Validate {
            config,
            kind,
            input,
            strict,
            delimiter,
        } => {
            let mut options = LoadOptions::new(kind);
            options.mode = mode(strict);
            cmd_validate(&config, &input, &options, delimiter)
        }
        Commands::Load {
            config,
            kind,
            input,
            insert_missing,
            strict,
            dry_run,
            start_row,
            last_row,
            delimiter,
        } => {
            let options = LoadOptions {
                kind,
                insert_missing,
                dry_run,
                mode: mode(strict),
                start_row,
                last_row,
            };
            cmd_load(&config, &input, &options, delimiter)
        }
    }
}

fn mode(strict: bool) -> ValidationMode {
    if strict {
        ValidationMode::Strict
    } else {
        ValidationMode::Lenient
    }
}

const TEMPLATE: &str = r#"# pxload configuration
apiKey: "<your API key>"

# One key, or a list of keys
productKey: "AP-XXXXXXXXXX-2"

# US (default), EU or US2. baseUrl overrides the data center.
dataCenter: US

# Applied to dates without an offset
timezone: UTC

# remote field: input column
fieldMappings:
  USER:
    identifyId: id
    email: email
    firstName: first_name
    lastName: last_name
    signUpDate: signup
  ACCOUNT:
    id: account_id
    name: account_name
  CUSTOM_EVENT:
    identifyId: id
    eventName: event
    date: timestamp
  USER_PREFERENCES:
    identifyId: id
    globalUnsubscribe: unsubscribed

http:
  timeoutSeconds: 8
  maxRetries: 5
  backoffFactor: 0.3
"#;

fn cmd_init(path: &Path) -> Result<(), LoadError> {
    let config_path = path.join("pxload.yaml");
    if config_path.exists() {
        return Err(LoadError::Config(format!(
            "{} already exists",
            config_path.display()
        )));
    }

    std::fs::create_dir_all(path)?;
    std::fs::write(&config_path, TEMPLATE)?;

    println!("Initialized pxload project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_fields(kind: RecordKind) {
    let spec = kind.spec();
    println!("{} (key: {})", kind, spec.key_field);
    for field in spec.fields {
        println!("  {}", field);
    }
    for (from, to) in spec.api_aliases {
        println!("  alias: {} -> {}", from, to);
    }
    match spec.schema {
        SchemaSource::Remote(path) => println!("  types: fetched from {}", path),
        SchemaSource::BuiltIn(table) => println!("  types: built-in ({} fields)", table.len()),
    }
}

/// Parse and validate the config, then open the input.
fn prepare(
    config: &Path,
    input: &Path,
    options: &LoadOptions,
    delimiter: u8,
) -> Result<(RunSettings, InputTable), LoadError> {
    let document = parser::parse_config_file(config)?;
    let settings = parser::run_settings(&document, options)?;
    let table = InputTable::open(input, delimiter)?;
    Ok((settings, table))
}

fn cmd_validate(
    config: &Path,
    input: &Path,
    options: &LoadOptions,
    delimiter: u8,
) -> Result<(), LoadError> {
    let (settings, table) = prepare(config, input, options, delimiter)?;
    let api = LiveApi::connect(&settings)?;
    let job = LoadJob {
        settings: &settings,
        options,
        input: &table,
    };
    let pre = executor::preflight(&job, &api)?;
    println!(
        "OK: {} mapping for {} ({} fields, {} warning(s))",
        options.kind,
        input.display(),
        settings.mapping.len(),
        pre.warnings
    );
    Ok(())
}

fn cmd_load(
    config: &Path,
    input: &Path,
    options: &LoadOptions,
    delimiter: u8,
) -> Result<(), LoadError> {
    let (settings, table) = prepare(config, input, options, delimiter)?;
    let api = LiveApi::connect(&settings)?;
    let job = LoadJob {
        settings: &settings,
        options,
        input: &table,
    };
    let summary = executor::load(&job, &api)?;
    println!("{}", summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS_CONFIG: &str = r#"
apiKey: k-123
productKey: AP-1
baseUrl: http://127.0.0.1:9
fieldMappings:
  CUSTOM_EVENT:
    identifyId: who
    eventName: what
    date: when
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_pl017_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("project");
        cmd_init(&sub).unwrap();
        let written = std::fs::read_to_string(sub.join("pxload.yaml")).unwrap();
        let config = parser::parse_config(&written).unwrap();
        assert_eq!(config.field_mappings.unwrap().len(), 4);
    }

    #[test]
    fn test_pl017_init_template_validates() {
        let config = parser::parse_config(TEMPLATE).unwrap();
        for kind in RecordKind::ALL {
            let errors = parser::validate_config(&config, kind);
            assert!(errors.is_empty(), "{}: {:?}", kind, errors);
        }
    }

    #[test]
    fn test_pl017_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pxload.yaml"), "exists").unwrap();
        let result = cmd_init(dir.path());
        assert!(matches!(result, Err(LoadError::Config(_))));
    }

    #[test]
    fn test_pl017_validate_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", EVENTS_CONFIG);
        let input = write(dir.path(), "events.csv", "who,what,when\nfred,login,2024-01-01\n");
        let options = LoadOptions::new(RecordKind::CustomEvent);
        cmd_validate(&config, &input, &options, b',').unwrap();
    }

    #[test]
    fn test_pl017_validate_strict_rejects_bad_row() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", EVENTS_CONFIG);
        let input = write(dir.path(), "events.csv", "who,what,when\nfred,login,someday\n");
        let mut options = LoadOptions::new(RecordKind::CustomEvent);
        options.mode = ValidationMode::Strict;
        let err = cmd_validate(&config, &input, &options, b',').unwrap_err();
        assert!(matches!(err, LoadError::Validation(_)));
    }

    #[test]
    fn test_pl017_validate_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", "productKey: AP-1\n");
        let input = write(dir.path(), "events.csv", "who,what\nfred,login\n");
        let options = LoadOptions::new(RecordKind::CustomEvent);
        let err = cmd_validate(&config, &input, &options, b',').unwrap_err();
        assert!(matches!(err, LoadError::Config(ref m) if m.contains("apiKey")));
    }

    #[test]
    fn test_pl017_load_dry_run_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", EVENTS_CONFIG);
        let input = write(
            dir.path(),
            "events.tsv",
            "who\twhat\twhen\nfred\tlogin\t2024-01-01\nann\tlogout\t2024-01-02\n",
        );
        let mut options = LoadOptions::new(RecordKind::CustomEvent);
        options.dry_run = true;
        cmd_load(&config, &input, &options, b'\t').unwrap();
        assert!(!dir.path().join("events_error.tsv").exists());
    }

    #[test]
    fn test_pl017_load_insert_missing_preferences_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", EVENTS_CONFIG);
        let input = write(dir.path(), "prefs.csv", "id,tours\na,yes\n");
        let mut options = LoadOptions::new(RecordKind::UserPreferences);
        options.insert_missing = true;
        let err = cmd_load(&config, &input, &options, b',').unwrap_err();
        assert!(matches!(err, LoadError::Config(ref m) if m.contains("insert-missing")));
    }

    #[test]
    fn test_pl017_dispatch_fields_and_init() {
        dispatch(Commands::Fields {
            kind: RecordKind::UserPreferences,
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        dispatch(Commands::Init {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        assert!(dir.path().join("pxload.yaml").exists());
    }

    #[test]
    fn test_pl017_dispatch_load_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "pxload.yaml", EVENTS_CONFIG);
        let input = write(dir.path(), "events.csv", "who,what,when\nfred,login,2024-01-01\n");
        dispatch(Commands::Load {
            config,
            kind: RecordKind::CustomEvent,
            input,
            insert_missing: false,
            strict: true,
            dry_run: true,
            start_row: 1,
            last_row: None,
            delimiter: b',',
        })
        .unwrap();
    }

    #[test]
    fn test_pl017_cli_parses_kind_and_delimiter() {
        use clap::Parser;

        #[derive(Parser)]
        struct TestCli {
            #[command(subcommand)]
            command: Commands,
        }

        let cli = TestCli::try_parse_from([
            "pxload",
            "load",
            "-k",
            "custom-event",
            "-i",
            "events.csv",
            "--delimiter",
            "tab",
            "--start-row",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Load {
                kind,
                delimiter,
                start_row,
                last_row,
                ..
            } => {
                assert_eq!(kind, RecordKind::CustomEvent);
                assert_eq!(delimiter, b'\t');
                assert_eq!(start_row, 3);
                assert_eq!(last_row, None);
            }
            _ => panic!("expected load"),
        }
        assert!(TestCli::try_parse_from(["pxload", "fields", "-k", "widgets"]).is_err());
    }
}
