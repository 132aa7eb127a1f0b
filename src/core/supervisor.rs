//! Host Supervisor - one actor per host, running its commands in order
//!
//! The supervisor makes a single connection attempt when it starts and then
//! works through its queue. Every unit it takes off the queue produces exactly
//! one outcome for the aggregator, whatever state the host is in.

use super::remote::{Connection, Connector};
use super::scheduler::{DispatchUnit, OrchestrationError};
use super::status::{AggregatorHandle, CommandOutcome, CommandStatus, HostStatus};
use crate::config::Host;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle on a running host supervisor
pub struct HostSupervisor {
    host: String,
    tx: mpsc::Sender<DispatchUnit>,
    task: JoinHandle<()>,
}

impl HostSupervisor {
    /// Start the supervisor for `host`. The queue holds as many units as the
    /// host has commands, so a whole run fits without blocking.
    pub fn spawn(host: &Host, connector: Arc<dyn Connector>, aggregator: AggregatorHandle) -> Self {
        let capacity = host.command_count.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let name = host.name.clone();
        let port = host.ssh_port();

        log::debug!("starting supervisor for {} (queue: {})", name, capacity);
        let task = tokio::spawn(supervise(name.clone(), port, connector, aggregator, rx));

        Self {
            host: name,
            tx,
            task,
        }
    }

    /// Queue a unit without waiting
    pub fn dispatch(&self, unit: DispatchUnit) -> Result<(), OrchestrationError> {
        self.tx.try_send(unit).map_err(|e| {
            let (reason, unit) = match e {
                mpsc::error::TrySendError::Full(u) => ("the host queue is full", u),
                mpsc::error::TrySendError::Closed(u) => ("the host supervisor has stopped", u),
            };
            OrchestrationError::Dispatch {
                unit: unit.to_string(),
                reason: reason.to_string(),
            }
        })
    }

    /// Close the queue and wait for everything already queued to be handled
    pub async fn shutdown(self) -> Result<(), OrchestrationError> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| OrchestrationError::Supervisor {
                host: self.host,
                reason: e.to_string(),
            })
    }
}

async fn supervise(
    host: String,
    port: u16,
    connector: Arc<dyn Connector>,
    aggregator: AggregatorHandle,
    mut rx: mpsc::Receiver<DispatchUnit>,
) {
    let mut conn_error = String::new();
    let conn: Option<Box<dyn Connection>> = match connector.connect(&host, port).await {
        Ok(c) => {
            log::info!("Connected to {} port: {}", host, port);
            Some(c)
        }
        Err(e) => {
            log::error!("{}", e);
            conn_error = e.to_string();
            None
        }
    };

    let mut host_status = if conn.is_some() {
        HostStatus::Ok
    } else {
        HostStatus::ConnFail
    };
    let mut host_detail = conn_error;

    while let Some(unit) = rx.recv().await {
        let outcome = match (&conn, host_status) {
            (Some(conn), HostStatus::Ok) => match conn.open_session().await {
                Ok(mut session) => match session.run(&unit.command).await {
                    Ok(()) => {
                        log::info!("started {}", unit);
                        CommandOutcome {
                            unit,
                            status: CommandStatus::Ok,
                            host_status,
                            detail: String::new(),
                        }
                    }
                    Err(e) => {
                        log::warn!("{} failed: {}", unit, e);
                        CommandOutcome {
                            unit,
                            status: CommandStatus::Failed,
                            host_status,
                            detail: e.to_string(),
                        }
                    }
                },
                Err(e) => {
                    log::error!("{}", e);
                    host_status = HostStatus::SessionFail;
                    host_detail = e.to_string();
                    CommandOutcome {
                        unit,
                        status: CommandStatus::CouldntRun,
                        host_status,
                        detail: host_detail.clone(),
                    }
                }
            },
            _ => CommandOutcome {
                unit,
                status: CommandStatus::CouldntRun,
                host_status,
                detail: host_detail.clone(),
            },
        };
        aggregator.report(outcome);
    }

    log::debug!("supervisor for {} finished", host);
}
