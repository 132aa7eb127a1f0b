//! Configuration errors - accumulated while the graph is loaded and checked

use std::fmt;
use thiserror::Error;

/// The kinds of named entity held in the configuration graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Location,
    Datacentre,
    OperatingSystem,
    Host,
    Server,
    Class,
    AttrTemplate,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => write!(f, "location"),
            Self::Datacentre => write!(f, "datacentre"),
            Self::OperatingSystem => write!(f, "operating system"),
            Self::Host => write!(f, "host"),
            Self::Server => write!(f, "server"),
            Self::Class => write!(f, "class"),
            Self::AttrTemplate => write!(f, "host attribute template"),
        }
    }
}

/// Which side of a two-sided reference failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    Both,
    Left,
    Right,
}

impl Unresolved {
    /// Classify a pair of lookups, `None` when both resolved
    pub fn from_lookups(left_ok: bool, right_ok: bool) -> Option<Self> {
        match (left_ok, right_ok) {
            (true, true) => None,
            (false, false) => Some(Self::Both),
            (false, true) => Some(Self::Left),
            (true, false) => Some(Self::Right),
        }
    }
}

fn describe_unresolved(side: &Unresolved, left: &str, right: &str) -> String {
    match side {
        Unresolved::Both => format!("neither the {} nor the {} is known", left, right),
        Unresolved::Left => format!("the {} is unknown", left),
        Unresolved::Right => format!("the {} is unknown", right),
    }
}

fn joined(vals: &[String], sep: &str) -> String {
    vals.join(sep)
}

fn quoted_list(vals: &[String]) -> String {
    vals.iter()
        .map(|v| format!("'{}'", v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A problem found while building or checking the configuration graph.
///
/// None of these stop the load except [`ConfigError::Source`] and
/// [`ConfigError::Table`], which the loader records through
/// [`ConfigGraph::mark_fatal`](super::ConfigGraph::mark_fatal).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{kind} names must not be blank")]
    BlankName { kind: EntityKind },

    #[error("{kind}: '{name}' is already defined{detail}. {kind} names must be unique")]
    Duplicate {
        kind: EntityKind,
        name: String,
        detail: String,
    },

    #[error("{kind}: '{name}' has an invalid {field}: '{value}': it is not found in the set of {field}s")]
    UnknownReference {
        kind: EntityKind,
        name: String,
        field: EntityKind,
        value: String,
    },

    #[error("{mapping} error: {record} - {}", describe_unresolved(.side, .left, .right))]
    UnresolvedMapping {
        mapping: &'static str,
        record: String,
        left: &'static str,
        right: &'static str,
        side: Unresolved,
    },

    #[error("host-to-server mapping error: host: '{host}' running server: '{server}' - the command must not be blank")]
    BlankCommand { host: String, server: String },

    #[error("host attribute template: '{attr}' - {reason}")]
    InvalidTemplate { attr: String, reason: String },

    #[error("host attribute: value: '{value}' for attr: '{attr}' on host: '{host}' doesn't match regexp: '{regex}'")]
    AttrValueMismatch {
        host: String,
        attr: String,
        value: String,
        regex: String,
    },

    #[error("host attribute: host: '{host}' attr: '{attr}': has too few values ({count}) and no default, there should be at least: {min}")]
    TooFewValues {
        host: String,
        attr: String,
        count: usize,
        min: usize,
    },

    #[error("host attribute: host: '{host}' attr: '{attr}': has too many values: {count}, should be at most: {max}")]
    TooManyValues {
        host: String,
        attr: String,
        count: usize,
        max: usize,
    },

    #[error("host attribute: host: '{host}' attr: '{attr}' - the attr is mandatory, missing and has no default value")]
    MandatoryMissing { host: String, attr: String },

    #[error("server host-must-have error: server: '{server}' attr: '{attr}': value: '{value}' doesn't match regexp: '{regex}'")]
    MustHaveValueMismatch {
        server: String,
        attr: String,
        value: String,
        regex: String,
    },

    #[error("host '{host}' doesn't satisfy server '{server}' - '{attr}' is not defined for the host")]
    HostLacksAttr {
        host: String,
        server: String,
        attr: String,
    },

    #[error("host '{host}' doesn't satisfy server '{server}' - host attribute: '{attr}' should include: {}, is: {}", quoted_list(.wanted), quoted_list(.actual))]
    HostLacksValues {
        host: String,
        server: String,
        attr: String,
        wanted: Vec<String>,
        actual: Vec<String>,
    },

    #[error("dependency error: {record} - {}", joined(.problems, "; "))]
    UnresolvedDependency {
        record: String,
        problems: Vec<String>,
    },

    #[error("a dependency loop has been detected: {}", joined(.path, " -> "))]
    DependencyLoop { path: Vec<String> },

    #[error("couldn't read the configuration source: {reason}")]
    Source { reason: String },

    #[error("{table}: couldn't load the rows: {reason}")]
    Table { table: String, reason: String },

    #[error("'{table}' is not a known table and has been ignored")]
    UnknownTable { table: String },
}

impl ConfigError {
    /// Whether this error stops any further loading
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::Table { .. })
    }
}
