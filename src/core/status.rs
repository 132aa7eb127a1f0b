//! Status aggregation - one actor folds every command outcome into the
//! system status and answers snapshot requests

use super::scheduler::DispatchUnit;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Outcome of one dispatched command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    #[default]
    Unknown,
    Ok,
    CouldntRun,
    Failed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Ok => write!(f, "ok"),
            Self::CouldntRun => write!(f, "couldn't run command"),
            Self::Failed => write!(f, "command failed"),
        }
    }
}

/// State of a host's connection as seen when a command was handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostStatus {
    #[default]
    Unknown,
    Ok,
    ConnFail,
    SessionFail,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Ok => write!(f, "ok"),
            Self::ConnFail => write!(f, "connection failed"),
            Self::SessionFail => write!(f, "session failed"),
        }
    }
}

/// A dispatch unit together with what happened to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub unit: DispatchUnit,
    pub status: CommandStatus,
    pub host_status: HostStatus,
    pub detail: String,
}

/// Latest status, per-status counts and total for one host or server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSummary<S: Ord> {
    pub latest: S,
    pub counts: BTreeMap<S, usize>,
    pub total: usize,
}

impl<S: Ord + Copy> StatusSummary<S> {
    fn record(&mut self, status: S) {
        self.latest = status;
        *self.counts.entry(status).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn count(&self, status: S) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

pub type HostSummary = StatusSummary<HostStatus>;
pub type ServerSummary = StatusSummary<CommandStatus>;

/// Snapshot of everything reported so far
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SysStatus {
    pub hosts: BTreeMap<String, HostSummary>,
    pub servers: BTreeMap<String, ServerSummary>,
    pub commands: BTreeMap<u64, CommandOutcome>,
    pub response_count: usize,
    pub failure_count: usize,
}

impl SysStatus {
    pub fn record(&mut self, outcome: CommandOutcome) {
        self.response_count += 1;
        if outcome.status != CommandStatus::Ok {
            self.failure_count += 1;
        }
        self.hosts
            .entry(outcome.unit.host.clone())
            .or_default()
            .record(outcome.host_status);
        self.servers
            .entry(outcome.unit.server.clone())
            .or_default()
            .record(outcome.status);
        self.commands.insert(outcome.unit.id, outcome);
    }

    /// Hosts where at least one command found the host in a bad state
    pub fn failed_hosts(&self) -> impl Iterator<Item = (&String, &HostSummary)> {
        self.hosts
            .iter()
            .filter(|(_, s)| s.count(HostStatus::Ok) != s.total)
    }

    /// Servers with at least one command that didn't succeed
    pub fn failed_servers(&self) -> impl Iterator<Item = (&String, &ServerSummary)> {
        self.servers
            .iter()
            .filter(|(_, s)| s.count(CommandStatus::Ok) != s.total)
    }
}

impl fmt::Display for SysStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system status summary: responses: {} failures: {} hosts: {} servers: {}",
            self.response_count,
            self.failure_count,
            self.hosts.len(),
            self.servers.len()
        )
    }
}

enum Message {
    Outcome(CommandOutcome),
    Snapshot(oneshot::Sender<SysStatus>),
    Shutdown(oneshot::Sender<SysStatus>),
}

/// Cheap cloneable handle for talking to the aggregator
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl AggregatorHandle {
    /// Report a finished command
    pub fn report(&self, outcome: CommandOutcome) {
        if self.tx.send(Message::Outcome(outcome)).is_err() {
            log::warn!("status aggregator has stopped; outcome dropped");
        }
    }

    /// Current totals, `None` if the aggregator has stopped
    pub async fn snapshot(&self) -> Option<SysStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Message::Snapshot(reply)).ok()?;
        rx.await.ok()
    }
}

/// The single owner of the run's [`SysStatus`]
pub struct StatusAggregator {
    handle: AggregatorHandle,
    task: JoinHandle<()>,
}

impl StatusAggregator {
    /// Start the aggregator task
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut status = SysStatus::default();
            while let Some(msg) = rx.recv().await {
                match msg {
                    Message::Outcome(outcome) => {
                        log::debug!(
                            "[{}] {} on {}: {}",
                            outcome.unit.id,
                            outcome.unit.server,
                            outcome.unit.host,
                            outcome.status
                        );
                        status.record(outcome);
                    }
                    Message::Snapshot(reply) => {
                        let _ = reply.send(status.clone());
                    }
                    Message::Shutdown(reply) => {
                        let _ = reply.send(status);
                        return;
                    }
                }
            }
        });

        Self {
            handle: AggregatorHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    /// Stop the aggregator and return its final totals. Outcomes sent
    /// before this call are included.
    pub async fn shutdown(self) -> SysStatus {
        let (reply, rx) = oneshot::channel();
        let status = if self.handle.tx.send(Message::Shutdown(reply)).is_ok() {
            rx.await.unwrap_or_default()
        } else {
            SysStatus::default()
        };
        if let Err(e) = self.task.await {
            log::error!("status aggregator task failed: {}", e);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: u64, host: &str, server: &str, status: CommandStatus, host_status: HostStatus) -> CommandOutcome {
        CommandOutcome {
            unit: DispatchUnit {
                id,
                host: host.to_string(),
                server: server.to_string(),
                command: format!("run-{}", server),
            },
            status,
            host_status,
            detail: String::new(),
        }
    }

    #[test]
    fn test_record_totals() {
        let mut status = SysStatus::default();
        status.record(outcome(0, "h1", "S1", CommandStatus::Ok, HostStatus::Ok));
        status.record(outcome(1, "h1", "S2", CommandStatus::Failed, HostStatus::Ok));
        status.record(outcome(2, "h2", "S1", CommandStatus::CouldntRun, HostStatus::ConnFail));

        assert_eq!(status.response_count, 3);
        assert_eq!(status.failure_count, 2);
        assert_eq!(status.hosts["h1"].total, 2);
        assert_eq!(status.hosts["h2"].latest, HostStatus::ConnFail);
        assert_eq!(status.servers["S1"].count(CommandStatus::Ok), 1);
        assert_eq!(status.servers["S1"].latest, CommandStatus::CouldntRun);

        let bad_hosts: Vec<_> = status.failed_hosts().map(|(h, _)| h.as_str()).collect();
        assert_eq!(bad_hosts, vec!["h2"]);
        let bad_servers: Vec<_> = status.failed_servers().map(|(s, _)| s.as_str()).collect();
        assert_eq!(bad_servers, vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_aggregator_snapshot_and_shutdown() {
        let agg = StatusAggregator::spawn();
        let handle = agg.handle();

        assert_eq!(handle.snapshot().await.unwrap().response_count, 0);

        handle.report(outcome(0, "h1", "S1", CommandStatus::Ok, HostStatus::Ok));
        handle.report(outcome(1, "h1", "S2", CommandStatus::Ok, HostStatus::Ok));
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.response_count, 2);
        assert_eq!(snap.failure_count, 0);

        handle.report(outcome(2, "h1", "S3", CommandStatus::Failed, HostStatus::Ok));
        let last = agg.shutdown().await;
        assert_eq!(last.response_count, 3);
        assert_eq!(last.failure_count, 1);
        assert!(handle.snapshot().await.is_none());
    }

    #[test]
    fn test_status_serializes_to_json() {
        let mut status = SysStatus::default();
        status.record(outcome(0, "h1", "S1", CommandStatus::CouldntRun, HostStatus::SessionFail));
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"session-fail\":1"));
        assert!(json.contains("\"couldnt-run\""));
    }
}
