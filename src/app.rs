//! Application - ties the loaded configuration to the requested action

use crate::cli::{Action, Cli};
use crate::config::{loader, ConfigGraph};
use crate::core::{Connector, Orchestrator};
use crate::listing::{self, Listing};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Exit code for a run that found problems
pub const EXIT_PROBLEMS: i32 = 1;

/// Application state
pub struct App {
    pub cli: Cli,
    pub config: ConfigGraph,
}

impl App {
    /// Find and load the configuration named by the command line
    pub fn load(cli: Cli) -> Result<Self> {
        let path = loader::locate(cli.config.as_deref())?;
        let config = loader::load_file(&path);
        Ok(Self { cli, config })
    }

    /// Report the configuration errors and say whether to carry on
    fn config_usable(&self) -> bool {
        if self.config.error_count() == 0 {
            return true;
        }
        if !self.cli.dont_report_errors {
            eprint!("{}", listing::config_errors(&self.config));
        }
        if self.config.is_fatal() {
            log::error!("the configuration couldn't be loaded");
            return false;
        }
        self.cli.dont_exit_on_config_error
    }

    /// Carry out the requested action, returning the process exit code
    pub async fn run(&self, connector: Arc<dyn Connector>) -> Result<i32> {
        if !self.config_usable() {
            return Ok(EXIT_PROBLEMS);
        }

        let selection = self.cli.selection();
        let servers = match selection.resolve(&self.config) {
            Ok(servers) => servers,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(EXIT_PROBLEMS);
            }
        };

        match self.cli.action {
            Action::List => {
                let classes = selection.classes_in_scope(&self.config);
                let hosts = selection.hosts_in_scope(&self.config);
                let listing = Listing {
                    config: &self.config,
                    servers: &servers,
                    classes: &classes,
                    hosts: &hosts,
                    style: self.cli.style,
                };
                print!("{}", listing.render(&self.cli.only_show));
                Ok(0)
            }
            Action::Check => Ok(self.check(&servers)),
            Action::Start => {
                let orch = Orchestrator::new(&self.config, connector, self.cli.launch_options());
                let report = orch.run(servers).await;
                if self.cli.json {
                    println!("{}", report.to_json()?);
                } else {
                    print!("{}", report.render());
                }
                Ok(if report.is_clean() { 0 } else { EXIT_PROBLEMS })
            }
        }
    }

    fn check(&self, servers: &BTreeSet<String>) -> i32 {
        let findings = listing::check(&self.config, servers);
        if findings.is_empty() {
            println!("no problems found in {} server(s)", servers.len());
            return 0;
        }
        for finding in &findings {
            println!("{}", finding);
        }
        EXIT_PROBLEMS
    }
}
