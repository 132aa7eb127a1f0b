//! Entities held in the configuration graph

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Attribute name -> ordered list of values
pub type AttrValues = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub name: String,
    pub description: String,
    /// Datacentres in this location, in insertion order
    pub datacentres: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Datacentre {
    pub name: String,
    pub location: String,
    /// Hosts in this datacentre, in insertion order
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub name: String,
    pub datacentre: String,
    pub os: String,
    pub attrs: AttrValues,
    /// Server name -> the commands that launch it on this host
    pub servers: BTreeMap<String, Vec<String>>,
    /// Total number of commands configured on this host
    pub command_count: usize,
}

impl Host {
    /// The ssh port for this host: the first `SSHPort` value if it parses,
    /// otherwise 22
    pub fn ssh_port(&self) -> u16 {
        self.attrs
            .get(SSH_PORT_ATTR)
            .and_then(|vals| vals.first())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SSH_PORT)
    }
}

pub const SSH_PORT_ATTR: &str = "SSHPort";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Validity rules for one named host attribute
#[derive(Debug, Clone, Serialize)]
pub struct AttrTemplate {
    pub name: String,
    pub default: Option<String>,
    pub min_count: usize,
    /// Values at or below zero mean "no upper bound"
    pub max_count: i64,
    pub description: String,
    pub units: String,
    pub value_regex: String,
    pub value_desc: String,
    #[serde(skip)]
    pub(crate) re: Regex,
}

impl AttrTemplate {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The upper bound on the value count, if there is one
    pub fn max(&self) -> Option<usize> {
        if self.max_count > 0 {
            Some(self.max_count as usize)
        } else {
            None
        }
    }

    pub fn matches(&self, val: &str) -> bool {
        self.re.is_match(val)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Class {
    pub name: String,
    pub description: String,
    /// Member servers, in mapping order
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Server {
    pub name: String,
    pub startup_millis: i64,
    pub keep_alive: bool,
    pub classes: Vec<String>,
    pub host_must_have: AttrValues,
    /// Host name -> number of instances on that host
    pub hosts: BTreeMap<String, usize>,
    pub needs: BTreeSet<String>,
    pub needed_by: BTreeSet<String>,
}

impl Server {
    pub(crate) fn new(name: &str, startup_millis: i64, keep_alive: bool) -> Self {
        Self {
            name: name.to_string(),
            startup_millis,
            keep_alive,
            classes: Vec::new(),
            host_must_have: AttrValues::new(),
            hosts: BTreeMap::new(),
            needs: BTreeSet::new(),
            needed_by: BTreeSet::new(),
        }
    }

    /// Total number of instances across all hosts
    pub fn instance_count(&self) -> usize {
        self.hosts.values().sum()
    }
}

/// Longest name seen per entity kind, kept for column formatting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NameWidths {
    pub location: usize,
    pub datacentre: usize,
    pub os: usize,
    pub host: usize,
    pub server: usize,
    pub class: usize,
}

pub(crate) fn widen(width: &mut usize, name: &str) {
    let len = name.chars().count();
    if len > *width {
        *width = len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_attrs(attrs: AttrValues) -> Host {
        Host {
            name: "h1".into(),
            datacentre: "DC1".into(),
            os: "Linux".into(),
            attrs,
            servers: BTreeMap::new(),
            command_count: 0,
        }
    }

    #[test]
    fn test_ssh_port() {
        assert_eq!(host_with_attrs(AttrValues::new()).ssh_port(), 22);

        let mut attrs = AttrValues::new();
        attrs.insert(SSH_PORT_ATTR.into(), vec!["2222".into()]);
        assert_eq!(host_with_attrs(attrs).ssh_port(), 2222);

        let mut attrs = AttrValues::new();
        attrs.insert(SSH_PORT_ATTR.into(), vec!["not-a-port".into()]);
        assert_eq!(host_with_attrs(attrs).ssh_port(), 22);
    }

    #[test]
    fn test_widen() {
        let mut w = 3;
        widen(&mut w, "ab");
        assert_eq!(w, 3);
        widen(&mut w, "abcdef");
        assert_eq!(w, 6);
    }
}
