//! Run report - what was launched in each round and how it went

use crate::core::{
    CommandStatus, DispatchUnit, HostStatus, OrchestrationError, Round, SysStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

const HOST_INTRO: &str = "               host failures: ";
const SVR_INTRO: &str = "               svr failure: ";

/// One round as it was dispatched
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundRecord {
    pub number: usize,
    pub servers: Vec<String>,
    pub units: Vec<DispatchUnit>,
    /// Units actually queued on a supervisor
    pub dispatched: usize,
    /// Responses the barrier waited for, counting earlier rounds
    pub expected_responses: usize,
    pub received_responses: usize,
    pub timed_out: bool,
}

impl RoundRecord {
    pub fn planned(round: &Round) -> Self {
        Self {
            number: round.number,
            servers: round.servers.clone(),
            units: round.units.clone(),
            ..Self::default()
        }
    }
}

/// Everything that happened in one run
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub rounds: Vec<RoundRecord>,
    pub errors: Vec<OrchestrationError>,
    pub status: SysStatus,
}

impl LaunchReport {
    pub fn new(dry_run: bool) -> Self {
        let started_at = Utc::now();
        Self {
            id: started_at.format("%Y-%m-%d-%H-%M-%S").to_string(),
            started_at,
            ended_at: None,
            dry_run,
            rounds: Vec::new(),
            errors: Vec::new(),
            status: SysStatus::default(),
        }
    }

    pub fn add_round(&mut self, round: RoundRecord) {
        self.rounds.push(round);
    }

    /// Record the final status and the end time
    pub fn finish(&mut self, status: SysStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// No orchestration errors, no failed commands and no timed out rounds
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.status.failure_count == 0
            && self.rounds.iter().all(|r| !r.timed_out)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The human-readable report
    pub fn render(&self) -> String {
        let mut out = String::new();

        for round in &self.rounds {
            let _ = writeln!(out, "round {}: {}", round.number, round.servers.join(", "));
            let verb = if self.dry_run {
                "would have started"
            } else {
                "starting"
            };
            for unit in &round.units {
                let _ = writeln!(out, "\t\t\t{} {}", verb, unit);
            }
            if round.timed_out {
                let _ = writeln!(
                    out,
                    "Timed Out: some responses have not been received: expected: {}",
                    round.expected_responses
                );
            }
        }

        for err in &self.errors {
            let _ = writeln!(out, "*****************");
            let _ = writeln!(out, "ERROR: {}", err);
            let _ = writeln!(out, "*****************");
        }

        if self.dry_run {
            return out;
        }

        let _ = writeln!(
            out,
            "System Status: responses: {} failures: {}",
            self.status.response_count, self.status.failure_count
        );
        if self.status.failure_count > 0 {
            self.render_bad_hosts(&mut out);
            self.render_bad_servers(&mut out);
        }
        out
    }

    fn render_bad_hosts(&self, out: &mut String) {
        let blank = " ".repeat(HOST_INTRO.len());
        let mut intro: &str = HOST_INTRO;
        let mut count = 0;

        for (name, summary) in self.status.failed_hosts() {
            count += 1;
            let why = if summary.count(HostStatus::ConnFail) > 0 {
                ": Connection failed"
            } else if summary.count(HostStatus::SessionFail) > 0 {
                ": Session failed"
            } else {
                " *** Unknown error ***"
            };
            let _ = writeln!(out, "{}{}{}", intro, name, why);
            intro = &blank;
        }
        if count > 0 {
            let _ = writeln!(out, "{}total failures: {:6}\n", blank, count);
        }
    }

    fn render_bad_servers(&self, out: &mut String) {
        let blank = " ".repeat(SVR_INTRO.len());
        let width = self
            .status
            .failed_servers()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);
        let mut count = 0;
        let mut intro: &str = SVR_INTRO;

        for (name, summary) in self.status.failed_servers() {
            count += summary.total - summary.count(CommandStatus::Ok);
            let mut label = format!("{:<width$}", name, width = width);

            for (status, text) in [
                (CommandStatus::CouldntRun, "Couldn't run command"),
                (CommandStatus::Failed, "Command failed"),
            ] {
                let n = summary.count(status);
                if n > 0 {
                    let _ = writeln!(out, "{}{} : {} ({:6} times)", intro, label, text, n);
                    intro = &blank;
                    label = " ".repeat(width);
                }
            }
        }
        if count > 0 {
            let _ = writeln!(out, "{}total failures: {:6}\n", blank, count);
        }
    }
}
