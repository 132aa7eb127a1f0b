//! Configuration graph - the entity store and its populate operations
//!
//! The graph is filled once per run by additive populate calls. Every call
//! validates its input first: a rejected record leaves the graph untouched
//! apart from the error list. Once the loader has marked the graph fatal all
//! populate calls become no-ops.

use super::error::{ConfigError, EntityKind, Unresolved};
use super::model::{
    widen, AttrTemplate, Class, Datacentre, Host, Location, NameWidths, Server,
};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory store of the whole system configuration
#[derive(Debug, Default)]
pub struct ConfigGraph {
    errors: Vec<ConfigError>,
    pub(crate) fatal: bool,

    pub(crate) locations: BTreeMap<String, Location>,
    pub(crate) datacentres: BTreeMap<String, Datacentre>,
    pub(crate) operating_systems: BTreeSet<String>,
    pub(crate) attr_templates: BTreeMap<String, AttrTemplate>,
    pub(crate) hosts: BTreeMap<String, Host>,
    pub(crate) classes: BTreeMap<String, Class>,
    pub(crate) servers: BTreeMap<String, Server>,

    pub(crate) widths: NameWidths,
    total_instances: usize,
}

impl ConfigGraph {
    /// An empty graph
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_error(&mut self, err: ConfigError) {
        log::debug!("config error: {}", err);
        self.errors.push(err);
    }

    /// Record an unrecoverable load failure. Every later populate call and
    /// validation pass returns immediately.
    pub fn mark_fatal(&mut self, err: ConfigError) {
        log::error!("fatal config error: {}", err);
        self.errors.push(err);
        self.fatal = true;
    }

    /// True once the load has failed for good
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// All errors recorded so far, in the order they were found
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// Number of errors recorded so far
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Reject blank and duplicate names. Returns true if the name may be used.
    fn accept_name(&mut self, kind: EntityKind, name: &str, existing: Option<String>) -> bool {
        if name.trim().is_empty() {
            self.add_error(ConfigError::BlankName { kind });
            return false;
        }
        if let Some(detail) = existing {
            self.add_error(ConfigError::Duplicate {
                kind,
                name: name.to_string(),
                detail,
            });
            return false;
        }
        true
    }

    /// Add a location
    pub fn populate_location(&mut self, name: &str, description: &str) {
        if self.fatal {
            return;
        }
        let existing = self.locations.get(name).map(|_| String::new());
        if !self.accept_name(EntityKind::Location, name, existing) {
            return;
        }

        widen(&mut self.widths.location, name);
        self.locations.insert(
            name.to_string(),
            Location {
                name: name.to_string(),
                description: description.to_string(),
                datacentres: Vec::new(),
            },
        );
    }

    /// Add an operating system name
    pub fn populate_operating_system(&mut self, name: &str) {
        if self.fatal {
            return;
        }
        let existing = self.operating_systems.get(name).map(|_| String::new());
        if !self.accept_name(EntityKind::OperatingSystem, name, existing) {
            return;
        }

        widen(&mut self.widths.os, name);
        self.operating_systems.insert(name.to_string());
    }

    /// Add a datacentre in an existing location
    pub fn populate_datacentre(&mut self, name: &str, location: &str) {
        if self.fatal {
            return;
        }
        let existing = self
            .datacentres
            .get(name)
            .map(|dc| format!(" (with location: '{}')", dc.location));
        if !self.accept_name(EntityKind::Datacentre, name, existing) {
            return;
        }

        let Some(loc) = self.locations.get_mut(location) else {
            self.add_error(ConfigError::UnknownReference {
                kind: EntityKind::Datacentre,
                name: name.to_string(),
                field: EntityKind::Location,
                value: location.to_string(),
            });
            return;
        };
        loc.datacentres.push(name.to_string());

        widen(&mut self.widths.datacentre, name);
        self.datacentres.insert(
            name.to_string(),
            Datacentre {
                name: name.to_string(),
                location: location.to_string(),
                hosts: Vec::new(),
            },
        );
    }

    /// Add a host in an existing datacentre running a known OS
    pub fn populate_host(&mut self, name: &str, datacentre: &str, os: &str) {
        if self.fatal {
            return;
        }
        let existing = self.hosts.get(name).map(|h| {
            format!(" (with datacentre: '{}' and OS: '{}')", h.datacentre, h.os)
        });
        if !self.accept_name(EntityKind::Host, name, existing) {
            return;
        }

        if !self.datacentres.contains_key(datacentre) {
            self.add_error(ConfigError::UnknownReference {
                kind: EntityKind::Host,
                name: name.to_string(),
                field: EntityKind::Datacentre,
                value: datacentre.to_string(),
            });
            return;
        }
        if !self.operating_systems.contains(os) {
            self.add_error(ConfigError::UnknownReference {
                kind: EntityKind::Host,
                name: name.to_string(),
                field: EntityKind::OperatingSystem,
                value: os.to_string(),
            });
            return;
        }

        if let Some(dc) = self.datacentres.get_mut(datacentre) {
            dc.hosts.push(name.to_string());
        }
        widen(&mut self.widths.host, name);
        self.hosts.insert(
            name.to_string(),
            Host {
                name: name.to_string(),
                datacentre: datacentre.to_string(),
                os: os.to_string(),
                attrs: BTreeMap::new(),
                servers: BTreeMap::new(),
                command_count: 0,
            },
        );
    }

    /// Add a server with its startup delay and keep-alive flag
    pub fn populate_server(&mut self, name: &str, startup_millis: i64, keep_alive: bool) {
        if self.fatal {
            return;
        }
        let existing = self.servers.get(name).map(|_| String::new());
        if !self.accept_name(EntityKind::Server, name, existing) {
            return;
        }

        widen(&mut self.widths.server, name);
        self.servers
            .insert(name.to_string(), Server::new(name, startup_millis, keep_alive));
    }

    /// Add a server class
    pub fn populate_class(&mut self, name: &str, description: &str) {
        if self.fatal {
            return;
        }
        let existing = self
            .classes
            .get(name)
            .map(|c| format!(" (with description: '{}')", c.description));
        if !self.accept_name(EntityKind::Class, name, existing) {
            return;
        }

        widen(&mut self.widths.class, name);
        self.classes.insert(
            name.to_string(),
            Class {
                name: name.to_string(),
                description: description.to_string(),
                servers: Vec::new(),
            },
        );
    }

    /// Make a server a member of a class. Repeating a mapping is a no-op.
    pub fn populate_server_class_map(&mut self, server: &str, class: &str) {
        if self.fatal {
            return;
        }
        let side = Unresolved::from_lookups(
            self.servers.contains_key(server),
            self.classes.contains_key(class),
        );
        if let Some(side) = side {
            self.add_error(ConfigError::UnresolvedMapping {
                mapping: "server-class mapping",
                record: format!("server: '{}' class: '{}'", server, class),
                left: "server",
                right: "class",
                side,
            });
            return;
        }

        let (Some(svr), Some(cls)) = (self.servers.get_mut(server), self.classes.get_mut(class))
        else {
            return;
        };
        if svr.classes.iter().any(|c| c == class) {
            log::debug!("server {} is already in class {}", server, class);
            return;
        }
        svr.classes.push(class.to_string());
        cls.servers.push(server.to_string());
    }

    /// Add a launch command for a server on a host. A host may run the same
    /// server several times with different commands.
    pub fn populate_host_server_map(&mut self, host: &str, server: &str, command: &str) {
        if self.fatal {
            return;
        }
        if command.trim().is_empty() {
            self.add_error(ConfigError::BlankCommand {
                host: host.to_string(),
                server: server.to_string(),
            });
            return;
        }
        let side = Unresolved::from_lookups(
            self.hosts.contains_key(host),
            self.servers.contains_key(server),
        );
        if let Some(side) = side {
            self.add_error(ConfigError::UnresolvedMapping {
                mapping: "host-to-server mapping",
                record: format!(
                    "host: '{}' running server: '{}' (with command: '{}')",
                    host, server, command
                ),
                left: "host",
                right: "server",
                side,
            });
            return;
        }

        let (Some(h), Some(svr)) = (self.hosts.get_mut(host), self.servers.get_mut(server)) else {
            return;
        };
        h.servers
            .entry(server.to_string())
            .or_default()
            .push(command.to_string());
        h.command_count += 1;
        *svr.hosts.entry(host.to_string()).or_insert(0) += 1;
        self.total_instances += 1;
    }

    /// Look up a location by name
    pub fn find_location(&self, name: &str) -> Option<&Location> {
        self.locations.get(name)
    }

    /// Look up a datacentre by name
    pub fn find_datacentre(&self, name: &str) -> Option<&Datacentre> {
        self.datacentres.get(name)
    }

    /// Look up a host by name
    pub fn find_host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Look up a server by name
    pub fn find_server(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }

    /// Look up a class by name
    pub fn find_class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    /// Look up a host attribute template by name
    pub fn find_attr_template(&self, name: &str) -> Option<&AttrTemplate> {
        self.attr_templates.get(name)
    }

    /// All hosts, ordered by name
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// All servers, ordered by name
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    /// All classes, ordered by name
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    /// All locations, ordered by name
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// All datacentres, ordered by name
    pub fn datacentres(&self) -> impl Iterator<Item = &Datacentre> {
        self.datacentres.values()
    }

    /// All operating system names, sorted
    pub fn operating_systems(&self) -> impl Iterator<Item = &String> {
        self.operating_systems.iter()
    }

    /// All host attribute templates, ordered by name
    pub fn attr_templates(&self) -> impl Iterator<Item = &AttrTemplate> {
        self.attr_templates.values()
    }

    /// Number of locations
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of datacentres
    pub fn datacentre_count(&self) -> usize {
        self.datacentres.len()
    }

    /// Number of operating systems
    pub fn operating_system_count(&self) -> usize {
        self.operating_systems.len()
    }

    /// Number of hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of servers
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Number of classes
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of host attribute templates
    pub fn attr_template_count(&self) -> usize {
        self.attr_templates.len()
    }

    /// Number of host/server/command mappings, i.e. server instances
    pub fn total_instance_count(&self) -> usize {
        self.total_instances
    }

    /// Longest name seen for each kind of entity
    pub fn name_widths(&self) -> NameWidths {
        self.widths
    }
}
