//! Launch Scheduler - dependency-ordered rounds of server launches

use crate::config::{ConfigGraph, Server};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

/// One command to run for one server on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchUnit {
    pub id: u64,
    pub host: String,
    pub server: String,
    pub command: String,
}

impl fmt::Display for DispatchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] server: {} host: '{}' command: '{}'",
            self.id, self.server, self.host, self.command
        )
    }
}

fn comma_list(names: &[String]) -> String {
    names.join(", ")
}

/// Problems found while launching. None of them stop the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum OrchestrationError {
    #[error("'{host}' (running server '{server}') is not found in the set of hosts")]
    UnknownHost { server: String, host: String },

    #[error("'{server}' is not found in the set of servers running on '{host}'")]
    NoCommands { server: String, host: String },

    #[error("couldn't queue {unit}: {reason}")]
    Dispatch { unit: String, reason: String },

    #[error("server '{server}' was never launched: still waiting on: {}", comma_list(.waiting_on))]
    NeverLaunched {
        server: String,
        waiting_on: Vec<String>,
    },

    #[error("the supervisor for host '{host}' failed: {reason}")]
    Supervisor { host: String, reason: String },
}

/// Everything to be dispatched in one round
#[derive(Debug, Clone, Default)]
pub struct Round {
    pub number: usize,
    pub servers: Vec<String>,
    pub units: Vec<DispatchUnit>,
    pub errors: Vec<OrchestrationError>,
}

/// A server can be launched once everything it needs has been launched.
/// Needs outside `considered` are taken as already running.
pub fn is_launchable(
    server: &Server,
    launched: &HashSet<String>,
    considered: &BTreeSet<String>,
) -> bool {
    !launched.contains(&server.name)
        && server
            .needs
            .iter()
            .all(|n| launched.contains(n) || !considered.contains(n))
}

/// Works out successive launch rounds over a set of servers
pub struct LaunchScheduler<'a> {
    config: &'a ConfigGraph,
    considered: BTreeSet<String>,
    launched: HashSet<String>,
    next_id: u64,
    rounds: usize,
}

impl<'a> LaunchScheduler<'a> {
    /// Create a scheduler over the given servers. Names not in the graph are
    /// ignored.
    pub fn new<I, S>(config: &'a ConfigGraph, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let considered = servers
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| {
                let known = config.find_server(name).is_some();
                if !known {
                    log::warn!("server {} is not in the configuration; ignored", name);
                }
                known
            })
            .collect();

        Self {
            config,
            considered,
            launched: HashSet::new(),
            next_id: 0,
            rounds: 0,
        }
    }

    /// Scheduler over every server in the graph
    pub fn for_all(config: &'a ConfigGraph) -> Self {
        Self::new(config, config.servers().map(|s| s.name.clone()))
    }

    /// Servers that can be launched now, ordered by name
    pub fn launchable(&self) -> Vec<&'a Server> {
        self.considered
            .iter()
            .filter_map(|name| self.config.find_server(name))
            .filter(|svr| is_launchable(svr, &self.launched, &self.considered))
            .collect()
    }

    /// Plan the next round, marking its servers launched. `None` once
    /// nothing more can be launched.
    pub fn next_round(&mut self) -> Option<Round> {
        let ready = self.launchable();
        if ready.is_empty() {
            return None;
        }

        self.rounds += 1;
        let mut round = Round {
            number: self.rounds,
            ..Round::default()
        };

        for svr in ready {
            self.launched.insert(svr.name.clone());
            round.servers.push(svr.name.clone());

            for host_name in svr.hosts.keys() {
                let Some(host) = self.config.find_host(host_name) else {
                    log::error!("'{}' is not found in the set of hosts", host_name);
                    round.errors.push(OrchestrationError::UnknownHost {
                        server: svr.name.clone(),
                        host: host_name.clone(),
                    });
                    continue;
                };
                let Some(commands) = host.servers.get(&svr.name) else {
                    log::error!(
                        "'{}' is not found in the set of servers running on '{}'",
                        svr.name,
                        host_name
                    );
                    round.errors.push(OrchestrationError::NoCommands {
                        server: svr.name.clone(),
                        host: host_name.clone(),
                    });
                    continue;
                };
                for command in commands {
                    round.units.push(DispatchUnit {
                        id: self.next_id,
                        host: host.name.clone(),
                        server: svr.name.clone(),
                        command: command.clone(),
                    });
                    self.next_id += 1;
                }
            }
        }

        Some(round)
    }

    /// Number of dispatch units planned so far
    pub fn planned_count(&self) -> u64 {
        self.next_id
    }

    pub fn is_launched(&self, server: &str) -> bool {
        self.launched.contains(server)
    }

    /// Servers that haven't been launched, with the needs holding them back
    pub fn unlaunched(&self) -> Vec<OrchestrationError> {
        self.considered
            .iter()
            .filter(|name| !self.launched.contains(*name))
            .filter_map(|name| self.config.find_server(name))
            .map(|svr| OrchestrationError::NeverLaunched {
                server: svr.name.clone(),
                waiting_on: svr
                    .needs
                    .iter()
                    .filter(|n| self.considered.contains(*n) && !self.launched.contains(*n))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Check if every considered server has been launched
    pub fn all_launched(&self) -> bool {
        self.considered.iter().all(|s| self.launched.contains(s))
    }
}
