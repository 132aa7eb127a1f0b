//! Orchestrator - drives the launch rounds
//!
//! Each round is planned by the [`LaunchScheduler`], its units are handed to
//! the per-host supervisors, and the next round waits at a barrier until the
//! aggregator has seen every response so far or the barrier times out.

use super::remote::Connector;
use super::scheduler::{LaunchScheduler, OrchestrationError, Round};
use super::status::{AggregatorHandle, StatusAggregator};
use super::supervisor::HostSupervisor;
use crate::config::ConfigGraph;
use crate::report::{LaunchReport, RoundRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// How a run behaves
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// When false nothing is started; the rounds are only planned and logged
    pub dispatch: bool,
    pub poll_interval: Duration,
    /// Barrier polls per round before giving up on the missing responses
    pub max_polls: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            dispatch: true,
            poll_interval: Duration::from_secs(1),
            max_polls: 30,
        }
    }
}

impl LaunchOptions {
    /// Options whose barrier gives up after roughly `timeout`
    pub fn with_round_timeout(timeout: Duration) -> Self {
        let defaults = Self::default();
        let polls = timeout.as_millis() / defaults.poll_interval.as_millis().max(1);
        Self {
            max_polls: u32::try_from(polls).unwrap_or(u32::MAX),
            ..defaults
        }
    }
}

/// Result of waiting at a round barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Barrier {
    received: usize,
    timed_out: bool,
}

pub struct Orchestrator<'a> {
    config: &'a ConfigGraph,
    connector: Arc<dyn Connector>,
    options: LaunchOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a ConfigGraph, connector: Arc<dyn Connector>, options: LaunchOptions) -> Self {
        Self {
            config,
            connector,
            options,
        }
    }

    /// Launch the given servers in dependency order and report what happened
    pub async fn run<I, S>(&self, servers: I) -> LaunchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scheduler = LaunchScheduler::new(self.config, servers);
        let mut report = LaunchReport::new(!self.options.dispatch);

        if !self.options.dispatch {
            while let Some(round) = scheduler.next_round() {
                log::info!("launching servers (round {})", round.number);
                for unit in &round.units {
                    log::info!("would have started {}", unit);
                }
                report.add_round(RoundRecord::planned(&round));
                report.errors.extend(round.errors);
            }
            report.errors.extend(scheduler.unlaunched());
            report.finish(Default::default());
            return report;
        }

        let aggregator = StatusAggregator::spawn();
        let handle = aggregator.handle();
        let mut supervisors: BTreeMap<String, HostSupervisor> = BTreeMap::new();
        let mut expected = 0;

        while let Some(round) = scheduler.next_round() {
            log::info!("launching servers (round {})", round.number);
            let dispatched = self.dispatch_round(&round, &mut supervisors, &handle, &mut report);
            expected += dispatched;

            let barrier = self.await_responses(&handle, expected).await;
            let mut record = RoundRecord::planned(&round);
            record.dispatched = dispatched;
            record.expected_responses = expected;
            record.received_responses = barrier.received;
            record.timed_out = barrier.timed_out;
            report.add_round(record);
            report.errors.extend(round.errors);
        }
        report.errors.extend(scheduler.unlaunched());

        for (_, sup) in supervisors {
            if let Err(e) = sup.shutdown().await {
                log::error!("{}", e);
                report.errors.push(e);
            }
        }
        let status = aggregator.shutdown().await;
        log::info!("{}", status);
        report.finish(status);
        report
    }

    /// Hand every unit of the round to its host's supervisor, starting the
    /// supervisor on first use. Returns how many units were queued.
    fn dispatch_round(
        &self,
        round: &Round,
        supervisors: &mut BTreeMap<String, HostSupervisor>,
        handle: &AggregatorHandle,
        report: &mut LaunchReport,
    ) -> usize {
        let mut queued = 0;
        for unit in &round.units {
            if !supervisors.contains_key(&unit.host) {
                let Some(host) = self.config.find_host(&unit.host) else {
                    report.errors.push(OrchestrationError::UnknownHost {
                        server: unit.server.clone(),
                        host: unit.host.clone(),
                    });
                    continue;
                };
                let sup = HostSupervisor::spawn(host, self.connector.clone(), handle.clone());
                supervisors.insert(unit.host.clone(), sup);
            }
            let Some(sup) = supervisors.get(&unit.host) else {
                continue;
            };

            log::debug!("starting {}", unit);
            match sup.dispatch(unit.clone()) {
                Ok(()) => queued += 1,
                Err(e) => {
                    log::error!("{}", e);
                    report.errors.push(e);
                }
            }
        }
        queued
    }

    /// Poll the aggregator until `expected` responses have arrived or the
    /// poll budget runs out
    async fn await_responses(&self, handle: &AggregatorHandle, expected: usize) -> Barrier {
        let mut polls = 0;
        loop {
            let Some(snapshot) = handle.snapshot().await else {
                log::error!("status aggregator has stopped");
                return Barrier {
                    received: 0,
                    timed_out: true,
                };
            };
            if snapshot.response_count >= expected {
                return Barrier {
                    received: snapshot.response_count,
                    timed_out: false,
                };
            }
            if polls >= self.options.max_polls {
                log::warn!(
                    "Timed out: some responses have not been received: expected: {} received: {}",
                    expected,
                    snapshot.response_count
                );
                return Barrier {
                    received: snapshot.response_count,
                    timed_out: true,
                };
            }
            tokio::time::sleep(self.options.poll_interval).await;
            polls += 1;
        }
    }
}
