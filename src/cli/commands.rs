//! CLI command implementations
//!
//! `replay` builds a fresh in-memory record store, applies every mutation
//! read from stdin in its own retried transaction, then scans one page of
//! the index. `plan` is a dry run of extraction and delta planning.

use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::index::{
    IndexDefinition, IndexError, IndexMaintainerFactory, RefcountIndexConfig,
    RefcountIndexMaintainerFactory, ScanProperties, ScanRange,
};
use crate::kv::MemoryKv;
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::record::{plan_update, StoredRecord};
use crate::store::RecordStore;
use crate::tuple::{Element, Tuple};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_lines, read_request, write_error, write_response};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace assigned to the index (required, non-empty)
    pub namespace: Vec<String>,

    /// Index name (required)
    pub index_name: String,

    /// Extra attempts for a conflicting transaction (optional, default 5)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: usize,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Index tuning (optional)
    #[serde(default)]
    pub index: RefcountIndexConfig,
}

fn default_retry_limit() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.namespace.is_empty() {
            return Err(CliError::config_error("namespace must not be empty"));
        }
        if self.index_name.is_empty() {
            return Err(CliError::config_error("index_name must not be empty"));
        }
        self.severity()?;
        self.index
            .validate()
            .map_err(|e| CliError::config_error(format!("Index config error: {}", e.message())))?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level.parse().map_err(CliError::config_error)
    }

    /// Make `log_level` the process-wide minimum severity
    pub fn apply_log_level(&self) -> CliResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }

    /// Index definition for the configured namespace
    pub fn index_definition(&self) -> IndexDefinition {
        let subspace = self
            .namespace
            .iter()
            .fold(Tuple::new(), |tuple, part| tuple.push(part.as_str()));
        IndexDefinition::refcount(self.index_name.clone(), subspace)
    }
}

/// Scan and rebuild options of one replay
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub limit: Option<usize>,
    pub reverse: bool,
    /// Base64 continuation token
    pub continuation: Option<String>,
    pub rebuild: bool,
}

/// One mutation line on stdin
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Mutation {
    Insert { id: String, record: StoredRecord },
    Update { id: String, record: StoredRecord },
    Delete { id: String },
}

/// `plan` request body
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub old: Option<StoredRecord>,
    #[serde(default)]
    pub new: Option<StoredRecord>,
}

/// Parse command line arguments and run the command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let result = match cmd {
        Command::Replay {
            config,
            limit,
            reverse,
            continuation,
            rebuild,
        } => replay(
            &config,
            &ReplayOptions {
                limit,
                reverse,
                continuation,
                rebuild,
            },
        ),
        Command::Plan => plan(),
    };

    if let Err(e) = &result {
        write_error(e)?;
    }
    result
}

/// Replay mutations from stdin and print one scan page
pub fn replay(config_path: &Path, options: &ReplayOptions) -> CliResult<()> {
    let config = Config::load(config_path)?;
    config.apply_log_level()?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("path", &config_path.display().to_string())],
    );

    let stdin = io::stdin();
    let data = replay_from(&config, options, stdin.lock())?;
    write_response(data)
}

/// Replay mutations from `input` against a fresh store
pub fn replay_from<R: BufRead>(
    config: &Config,
    options: &ReplayOptions,
    input: R,
) -> CliResult<Value> {
    let factory = RefcountIndexMaintainerFactory::new(config.index.clone());
    let maintainer = factory.create(config.index_definition())?;
    let store = RecordStore::new(MemoryKv::new(), maintainer, config.retry_limit);

    let mut applied = Vec::new();
    for line in read_lines(input) {
        let mutation: Mutation = serde_json::from_value(line?)
            .map_err(|e| CliError::invalid_input(format!("Invalid mutation: {}", e)))?;
        let (id, outcome) = match &mutation {
            Mutation::Insert { id, record } | Mutation::Update { id, record } => {
                (id, store.save(id, record)?)
            }
            Mutation::Delete { id } => (id, store.delete(id)?),
        };
        applied.push(json!({
            "id": id,
            "kind": outcome.kind.as_str(),
            "summary": outcome.summary,
        }));
    }

    let rebuilt = if options.rebuild {
        Some(store.rebuild()?)
    } else {
        None
    };

    let continuation = match &options.continuation {
        Some(token) => Some(
            URL_SAFE_NO_PAD
                .decode(token)
                .map_err(|e| CliError::invalid_input(format!("Invalid continuation: {}", e)))?,
        ),
        None => None,
    };
    let properties = ScanProperties {
        limit: options.limit,
        reverse: options.reverse,
    };

    let maintainer = store.maintainer();
    let mut tx = store.kv().begin().map_err(IndexError::from)?;
    let mut cursor = maintainer.scan(
        &mut tx,
        &ScanRange::all(),
        continuation.as_deref(),
        properties,
    )?;
    let mut entries = Vec::new();
    for entry in cursor.by_ref() {
        entries.push(entry?.to_json());
    }
    let next = cursor.continuation().map(|token| URL_SAFE_NO_PAD.encode(token));
    drop(cursor);

    let report = maintainer.verify(&mut tx)?;

    Ok(json!({
        "index": maintainer.index().name,
        "applied": applied,
        "rebuilt_references": rebuilt,
        "entries": entries,
        "continuation": next,
        "consistency": {
            "live_counters": report.live_counters,
            "zero_markers": report.zero_markers,
            "total_references": report.total_references,
            "collisions": report.collisions.iter().map(Element::to_json).collect::<Vec<_>>(),
            "malformed": report.malformed.iter().map(Element::to_json).collect::<Vec<_>>(),
        },
        "metrics": maintainer.metrics().snapshot(),
    }))
}

/// Plan the counter operations for one request on stdin
pub fn plan() -> CliResult<()> {
    let request = read_request()?;
    write_response(plan_from(request)?)
}

/// Plan the counter operations for one `{old, new}` request
pub fn plan_from(request: Value) -> CliResult<Value> {
    let request: PlanRequest = serde_json::from_value(request)
        .map_err(|e| CliError::invalid_input(format!("Invalid plan request: {}", e)))?;
    let ops = plan_update(request.old.as_ref(), request.new.as_ref())?;
    let ops: Vec<Value> = ops
        .iter()
        .map(|op| {
            json!({
                "op": if op.is_commutative() { "increment" } else { "decrement" },
                "key": op.key().to_json(),
            })
        })
        .collect();
    Ok(json!({ "operations": ops }))
}
