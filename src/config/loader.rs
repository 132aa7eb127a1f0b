//! Config loader - reads a YAML topology document and feeds the graph
//!
//! Each top-level key is one table of rows. Tables are loaded in a fixed
//! order so that every reference points at something already loaded, and
//! the validation passes run as soon as the tables they need are in. A
//! table that can't be parsed is fatal: nothing after it is loaded.

use super::attrs::TemplateSpec;
use super::error::ConfigError;
use super::graph::ConfigGraph;
use anyhow::Result;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// File looked for in the current directory when no path is given
pub const LOCAL_CONFIG: &str = "sysstarter.yml";

/// Every table a topology document may hold, in load order
pub const TABLES: [&str; 12] = [
    "locations",
    "operating_systems",
    "datacentres",
    "hosts",
    "servers",
    "host_server_map",
    "host_attr_templates",
    "host_attrs",
    "classes",
    "server_class_map",
    "server_host_must_have",
    "dependencies",
];

/// Attribute values are text, but YAML writes `2222` or `true` unquoted
fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(d)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "invalid type: {:?}, expected a string or number",
            other
        ))),
    }
}

fn optional_scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    scalar(d).map(Some)
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatacentreRow {
    name: String,
    location: String,
}

#[derive(Debug, Deserialize)]
struct HostRow {
    name: String,
    datacentre: String,
    os: String,
}

#[derive(Debug, Deserialize)]
struct ServerRow {
    name: String,
    #[serde(default)]
    startup_millis: i64,
    #[serde(default)]
    keep_alive: bool,
}

#[derive(Debug, Deserialize)]
struct HostServerRow {
    host: String,
    server: String,
    command: String,
}

fn unbounded() -> i64 {
    -1
}

fn any_value() -> String {
    ".*".to_string()
}

#[derive(Debug, Deserialize)]
struct TemplateRow {
    name: String,
    #[serde(default, deserialize_with = "optional_scalar")]
    default: Option<String>,
    #[serde(default)]
    min_count: i64,
    #[serde(default = "unbounded")]
    max_count: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    units: String,
    #[serde(default = "any_value")]
    value_regex: String,
    #[serde(default)]
    value_desc: String,
}

#[derive(Debug, Deserialize)]
struct HostAttrRow {
    host: String,
    attr: String,
    #[serde(deserialize_with = "scalar")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ClassRow {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ServerClassRow {
    server: String,
    class: String,
}

#[derive(Debug, Deserialize)]
struct MustHaveRow {
    server: String,
    attr: String,
    #[serde(deserialize_with = "scalar")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct DependencyRow {
    from: String,
    to: String,
}

/// Split `server:<name>` or `class:<name>` into its type and value. Text with
/// no colon is all type name, which the graph then rejects.
fn endpoint_fields(s: &str) -> (&str, &str) {
    match s.split_once(':') {
        Some((type_name, val)) => (type_name.trim(), val.trim()),
        None => (s.trim(), ""),
    }
}

/// Deserialize one table. Missing tables are empty; a malformed one marks the
/// graph fatal.
fn rows<T: DeserializeOwned>(cg: &mut ConfigGraph, doc: &serde_yaml::Value, table: &str) -> Vec<T> {
    if cg.is_fatal() {
        return Vec::new();
    }
    let Some(val) = doc.get(table) else {
        log::debug!("table {} not present", table);
        return Vec::new();
    };
    if val.is_null() {
        return Vec::new();
    }
    match serde_yaml::from_value::<Vec<T>>(val.clone()) {
        Ok(rows) => {
            log::debug!("table {}: {} row(s)", table, rows.len());
            rows
        }
        Err(e) => {
            cg.mark_fatal(ConfigError::Table {
                table: table.to_string(),
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}

/// Populate `cg` from an already parsed document. The document must be a
/// mapping of table names to rows; anything else is fatal.
pub fn load_document(cg: &mut ConfigGraph, doc: &serde_yaml::Value) {
    let Some(tables) = doc.as_mapping() else {
        let reason = if doc.is_null() {
            "the document is empty".to_string()
        } else {
            "the document is not a mapping of table names to rows".to_string()
        };
        cg.mark_fatal(ConfigError::Source { reason });
        return;
    };
    for key in tables.keys() {
        let name = match key.as_str() {
            Some(name) => name.to_string(),
            None => format!("{:?}", key),
        };
        if !TABLES.contains(&name.as_str()) {
            log::warn!("ignoring unknown table: {}", name);
            cg.add_error(ConfigError::UnknownTable { table: name });
        }
    }

    for r in rows::<LocationRow>(cg, doc, "locations") {
        cg.populate_location(&r.name, &r.description);
    }
    for r in rows::<NameRow>(cg, doc, "operating_systems") {
        cg.populate_operating_system(&r.name);
    }
    for r in rows::<DatacentreRow>(cg, doc, "datacentres") {
        cg.populate_datacentre(&r.name, &r.location);
    }
    for r in rows::<HostRow>(cg, doc, "hosts") {
        cg.populate_host(&r.name, &r.datacentre, &r.os);
    }
    for r in rows::<ServerRow>(cg, doc, "servers") {
        cg.populate_server(&r.name, r.startup_millis, r.keep_alive);
    }
    for r in rows::<HostServerRow>(cg, doc, "host_server_map") {
        cg.populate_host_server_map(&r.host, &r.server, &r.command);
    }
    for r in rows::<TemplateRow>(cg, doc, "host_attr_templates") {
        cg.populate_host_attr_template(TemplateSpec {
            name: &r.name,
            default: r.default.as_deref(),
            min_count: r.min_count,
            max_count: r.max_count,
            description: &r.description,
            units: &r.units,
            value_regex: &r.value_regex,
            value_desc: &r.value_desc,
        });
    }
    for r in rows::<HostAttrRow>(cg, doc, "host_attrs") {
        cg.populate_host_attr(&r.host, &r.attr, &r.value);
    }
    cg.check_host_attrs();
    for r in rows::<ClassRow>(cg, doc, "classes") {
        cg.populate_class(&r.name, &r.description);
    }
    for r in rows::<ServerClassRow>(cg, doc, "server_class_map") {
        cg.populate_server_class_map(&r.server, &r.class);
    }
    for r in rows::<MustHaveRow>(cg, doc, "server_host_must_have") {
        cg.populate_server_host_must_have(&r.server, &r.attr, &r.value);
    }
    cg.confirm_hosts_meet_server_needs();
    for r in rows::<DependencyRow>(cg, doc, "dependencies") {
        let (from_type, from_val) = endpoint_fields(&r.from);
        let (to_type, to_val) = endpoint_fields(&r.to);
        cg.populate_dependency(from_type, from_val, to_type, to_val);
    }
    cg.detect_cycles();

    log::info!(
        "loaded {} host(s), {} server(s), {} class(es) with {} error(s)",
        cg.host_count(),
        cg.server_count(),
        cg.class_count(),
        cg.error_count()
    );
}

/// Build a graph from YAML text
pub fn load_str(content: &str) -> ConfigGraph {
    let mut cg = ConfigGraph::new();
    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(doc) => load_document(&mut cg, &doc),
        Err(e) => cg.mark_fatal(ConfigError::Source {
            reason: e.to_string(),
        }),
    }
    cg
}

/// Build a graph from a YAML file. An unreadable file is a fatal config
/// error, not an `Err`.
pub fn load_file(path: &Path) -> ConfigGraph {
    log::info!("Loading configuration from: {}", path.display());
    match std::fs::read_to_string(path) {
        Ok(content) => load_str(&content),
        Err(e) => {
            let mut cg = ConfigGraph::new();
            cg.mark_fatal(ConfigError::Source {
                reason: format!("{}: {}", path.display(), e),
            });
            cg
        }
    }
}

/// The per-user config file location
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sysstarter").join("config.yml"))
}

/// Work out which config file to use
/// Priority:
/// 1. an explicitly given path
/// 2. sysstarter.yml in the current directory
/// 3. the per-user config file
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = Path::new(LOCAL_CONFIG);
    if local.exists() {
        return Ok(local.to_path_buf());
    }

    if let Some(user) = user_config_path() {
        if user.exists() {
            return Ok(user);
        }
    }

    anyhow::bail!(
        "No configuration found. Expected {} in the current directory or {}",
        LOCAL_CONFIG,
        user_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "a per-user config file".to_string())
    )
}
