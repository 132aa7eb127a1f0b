//! Server selection - narrows the configured servers to the ones a run
//! should act on

use crate::config::{ConfigGraph, EntityKind};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Include and exclude lists as given on the command line
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub hosts: Vec<String>,
    pub not_hosts: Vec<String>,
    pub servers: Vec<String>,
    pub not_servers: Vec<String>,
    pub classes: Vec<String>,
    pub not_classes: Vec<String>,
    /// Also take every server the selected ones need, transitively
    pub add_reqs: bool,
    /// Also take every server that needs the selected ones, transitively
    pub add_deps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Include,
    Exclude,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => write!(f, "list"),
            Self::Exclude => write!(f, "exclusion list"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("you have specified a {kind} list and a {kind} exclusion list - you should only supply one or the other")]
    Conflict { kind: EntityKind },

    #[error("{kind}: {name} from the {kind} {list} is not valid (not found)")]
    NotFound {
        kind: EntityKind,
        name: String,
        list: ListKind,
    },
}

/// Every problem found with a selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.0))]
pub struct SelectionErrors(pub Vec<SelectionError>);

fn describe(errs: &[SelectionError]) -> String {
    let mut out = format!("{} error(s) detected with the parameters:", errs.len());
    for e in errs {
        out.push_str("\n  ");
        out.push_str(&e.to_string());
    }
    out
}

impl Selection {
    /// True when no include or exclude list has been given
    pub fn is_everything(&self) -> bool {
        self.hosts.is_empty()
            && self.not_hosts.is_empty()
            && self.servers.is_empty()
            && self.not_servers.is_empty()
            && self.classes.is_empty()
            && self.not_classes.is_empty()
    }

    /// Check the lists against the graph and work out the selected servers
    pub fn resolve(&self, cg: &ConfigGraph) -> Result<BTreeSet<String>, SelectionErrors> {
        let mut errs = Vec::new();
        check_lists(&mut errs, EntityKind::Host, &self.hosts, &self.not_hosts, |n| {
            cg.find_host(n).is_some()
        });
        check_lists(&mut errs, EntityKind::Server, &self.servers, &self.not_servers, |n| {
            cg.find_server(n).is_some()
        });
        check_lists(&mut errs, EntityKind::Class, &self.classes, &self.not_classes, |n| {
            cg.find_class(n).is_some()
        });
        if !errs.is_empty() {
            return Err(SelectionErrors(errs));
        }

        let mut chosen: BTreeSet<String> = if self.servers.is_empty() && self.classes.is_empty() {
            cg.servers().map(|s| s.name.clone()).collect()
        } else {
            let mut names: BTreeSet<String> = self.servers.iter().cloned().collect();
            for class in self.classes.iter().filter_map(|c| cg.find_class(c)) {
                names.extend(class.servers.iter().cloned());
            }
            names
        };

        chosen.retain(|name| {
            let Some(svr) = cg.find_server(name) else {
                return false;
            };
            !self.not_servers.contains(name)
                && !svr.classes.iter().any(|c| self.not_classes.contains(c))
                && self.host_allowed(svr.hosts.keys())
        });

        if self.add_reqs {
            chosen = closure(cg, chosen, |name| {
                cg.find_server(name).map(|s| s.needs.clone()).unwrap_or_default()
            });
        }
        if self.add_deps {
            chosen = closure(cg, chosen, |name| {
                cg.find_server(name).map(|s| s.needed_by.clone()).unwrap_or_default()
            });
        }

        log::debug!("selected {} of {} server(s)", chosen.len(), cg.server_count());
        Ok(chosen)
    }

    /// Hosts a listing should show
    pub fn hosts_in_scope(&self, cg: &ConfigGraph) -> BTreeSet<String> {
        in_scope(cg.hosts().map(|h| &h.name), &self.hosts, &self.not_hosts)
    }

    /// Classes a listing should show
    pub fn classes_in_scope(&self, cg: &ConfigGraph) -> BTreeSet<String> {
        in_scope(cg.classes().map(|c| &c.name), &self.classes, &self.not_classes)
    }

    /// With a host filter in place a server stays only if it runs on at
    /// least one host that passes the filter
    fn host_allowed<'a>(&self, mut hosts: impl Iterator<Item = &'a String>) -> bool {
        if !self.hosts.is_empty() {
            hosts.any(|h| self.hosts.contains(h))
        } else if !self.not_hosts.is_empty() {
            hosts.any(|h| !self.not_hosts.contains(h))
        } else {
            true
        }
    }
}

fn in_scope<'a>(
    all: impl Iterator<Item = &'a String>,
    include: &[String],
    exclude: &[String],
) -> BTreeSet<String> {
    all.filter(|n| {
        if include.is_empty() {
            !exclude.contains(n)
        } else {
            include.contains(n)
        }
    })
    .cloned()
    .collect()
}

fn check_lists(
    errs: &mut Vec<SelectionError>,
    kind: EntityKind,
    include: &[String],
    exclude: &[String],
    known: impl Fn(&str) -> bool,
) {
    if !include.is_empty() && !exclude.is_empty() {
        errs.push(SelectionError::Conflict { kind });
    }
    for (names, list) in [(include, ListKind::Include), (exclude, ListKind::Exclude)] {
        for name in names.iter().filter(|n| !known(n.as_str())) {
            errs.push(SelectionError::NotFound {
                kind,
                name: name.clone(),
                list,
            });
        }
    }
}

/// Grow `start` along `next` until nothing new turns up
fn closure<F>(cg: &ConfigGraph, start: BTreeSet<String>, next: F) -> BTreeSet<String>
where
    F: Fn(&str) -> BTreeSet<String>,
{
    let mut seen = start.clone();
    let mut pending: Vec<String> = start.into_iter().collect();
    while let Some(name) = pending.pop() {
        for other in next(&name) {
            if cg.find_server(&other).is_some() && seen.insert(other.clone()) {
                pending.push(other);
            }
        }
    }
    seen
}
