//! CLI command implementations
//!
//! Every command loads a `Config`, binds one backend adapter from it, and
//! opens a `DocumentStore` against the default collection. The
//! wire shape is JSON-lines: one request object in, one response object
//! out, always. `start` reads a line per request until stdin closes;
//! `query` reads exactly one line and exits; `explain` never touches a
//! backend at all, since parsing is backend-independent.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::backends::{Adapter, IndexKind, IndexSpec, MemoryAdapter, RemoteAdapter, SqliteAdapter};
use crate::backends::remote::RemoteConfig;
use crate::ql::{self, ParamBinding, ParamMap, StatementSerialize};
use crate::store::{DocumentStore, StoreConfig};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, read_requests, write_error, write_response};

/// Configuration file structure: which backend to bind, the default
/// collection, and its initial indexes ("configuration recognized
/// options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend to bind: "memory", "sqlite", or "remote".
    pub backend: String,

    /// SQLite database path (backend = "sqlite"). ":memory:" is accepted.
    #[serde(default)]
    pub path: Option<String>,

    /// Remote document-service base URL (backend = "remote").
    #[serde(default)]
    pub base_url: Option<String>,

    /// Default collection name.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Indexes created on the default collection when the store opens.
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
}

fn default_collection() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub kind: String,
    pub fields: Vec<String>,
}

impl IndexConfig {
    fn into_spec(self) -> CliResult<IndexSpec> {
        let kind = match self.kind.as_str() {
            "field" => IndexKind::Field,
            "composite" => IndexKind::Composite,
            "wildcard" => IndexKind::Wildcard,
            "array" => IndexKind::Array,
            "hash" => IndexKind::Hash,
            "vector" => IndexKind::Vector,
            "text" => IndexKind::Text,
            "geospatial" => IndexKind::Geospatial,
            "ttl" => IndexKind::Ttl,
            other => return Err(CliError::config_error(format!("unknown index kind '{}'", other))),
        };
        Ok(IndexSpec {
            name: self.name,
            kind,
            fields: self.fields,
        })
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        match self.backend.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.path.is_none() {
                    return Err(CliError::config_error("backend 'sqlite' requires 'path'"));
                }
            }
            "remote" => {
                if self.base_url.is_none() {
                    return Err(CliError::config_error("backend 'remote' requires 'base_url'"));
                }
            }
            other => {
                return Err(CliError::config_error(format!(
                    "unknown backend '{}': expected 'memory', 'sqlite', or 'remote'",
                    other
                )))
            }
        }
        Ok(())
    }

    async fn open_adapter(&self) -> CliResult<Arc<dyn Adapter>> {
        let adapter: Arc<dyn Adapter> = match self.backend.as_str() {
            "memory" => Arc::new(MemoryAdapter::new()),
            "sqlite" => {
                let path = self.path.as_deref().unwrap_or(":memory:");
                Arc::new(SqliteAdapter::open(path).await?)
            }
            "remote" => {
                let base_url = self.base_url.clone().unwrap_or_default();
                Arc::new(RemoteAdapter::new(RemoteConfig::new(base_url))?)
            }
            other => return Err(CliError::config_error(format!("unknown backend '{}'", other))),
        };
        Ok(adapter)
    }

    async fn open_store(&self) -> CliResult<DocumentStore> {
        let adapter = self.open_adapter().await?;
        let indexes = self
            .indexes
            .clone()
            .into_iter()
            .map(IndexConfig::into_spec)
            .collect::<CliResult<Vec<_>>>()?;
        let store_config = StoreConfig::new(self.collection.clone()).with_indexes(indexes);
        Ok(DocumentStore::open(adapter, store_config).await?)
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| CliError::io_error(e.to_string()))?;
    rt.block_on(async move {
        match cmd {
            Command::Init { config } => init(&config).await,
            Command::Start { config } => start(&config).await,
            Command::Query { config } => query(&config).await,
            Command::Explain { config } => explain(&config).await,
        }
    })
}

/// Creates the default collection (and its configured indexes) and exits.
/// Idempotent: running `init` against an already-created collection just
/// reports `status: "exists"` rather than failing (collection state
/// machine, unconditional `create`).
pub async fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = config.open_store().await?;
    write_response(json!({"collection": store.default_collection()}))?;
    store.close().await?;
    Ok(())
}

/// A single JSON-lines request: a portable statement plus its bound
/// parameters. `params` values are taken as literal `Value`s; a parameter
/// meant to substitute a whole clause (WHERE/SELECT/ORDER BY text) is
/// written as `{"$clause": "..."}`.
#[derive(Debug, Deserialize)]
struct Request {
    statement: String,
    #[serde(default)]
    params: std::collections::HashMap<String, Json>,
}

fn decode_params(raw: std::collections::HashMap<String, Json>) -> ParamMap {
    raw.into_iter()
        .map(|(name, v)| {
            let binding = match &v {
                Json::Object(m) if m.len() == 1 => match m.get("$clause").and_then(Json::as_str) {
                    Some(clause) => ParamBinding::Clause(clause.to_string()),
                    None => ParamBinding::Value(v.into()),
                },
                other => ParamBinding::Value(other.clone().into()),
            };
            (name, binding)
        })
        .collect()
}

/// Executes one request against an open store. Returns the raw response
/// payload on success or the `(code, message)` pair on failure — never a
/// pre-built envelope — so the caller's `write_response`/`write_error` are
/// the only place the JSON-lines `{"status": ..., ...}` shape gets built.
async fn handle_request(store: &DocumentStore, request: Json) -> Result<Json, (String, String)> {
    let request: Request = match serde_json::from_value(request) {
        Ok(r) => r,
        Err(e) => return Err(("BAD_REQUEST".to_string(), e.to_string())),
    };
    let params = decode_params(request.params);
    match store.execute(&request.statement, &params).await {
        Ok(response) => Ok(response_to_json(response)),
        Err(e) => Err((e.code().to_string(), e.to_string())),
    }
}

fn response_to_json(response: crate::core::operation::Response) -> Json {
    serde_json::to_value(response).unwrap_or(Json::Null)
}

/// Opens the store and serves JSON-lines requests from stdin until EOF,
/// writing one JSON-lines reply per request to stdout.
pub async fn start(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = config.open_store().await?;

    for request_result in read_requests() {
        match request_result {
            Ok(request) => match handle_request(&store, request).await {
                Ok(data) => write_response(data)?,
                Err((code, message)) => write_error(&code, &message)?,
            },
            Err(e) => {
                write_error(e.code_str(), e.message())?;
                break;
            }
        }
    }

    store.close().await?;
    Ok(())
}

/// Reads one request from stdin, executes it, prints the reply, and exits.
pub async fn query(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = config.open_store().await?;

    let request = read_request()?;
    match handle_request(&store, request).await {
        Ok(data) => write_response(data)?,
        Err((code, message)) => write_error(&code, &message)?,
    }

    store.close().await?;
    Ok(())
}

/// Reads `{"statement": "..."}` from stdin, parses it (no execution, no
/// backend), and prints the statement's serialized form back out. Useful
/// for checking a statement parses, and for the parser round-trip
/// invariant that `parse(serialize(AST)) == AST`.
pub async fn explain(config_path: &Path) -> CliResult<()> {
    // `config_path` is accepted for CLI symmetry with the other commands
    // but unused: parsing never touches a backend.
    let _ = config_path;
    let request = read_request()?;
    let statement = request
        .get("statement")
        .and_then(Json::as_str)
        .ok_or_else(|| CliError::io_error("request is missing a 'statement' string field"))?;

    match ql::parse_statement(statement) {
        Ok(ast) => write_response(json!({"ast": ast.serialize()}))?,
        Err(e) => write_error("BAD_REQUEST", &e.to_string())?,
    }
    Ok(())
}
