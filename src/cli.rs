//! Command-line interface definitions
//!
//! Every flag can also be set from the environment using the `SYS_STARTER_`
//! prefix, e.g. `SYS_STARTER_ACTION=check`.

use crate::core::LaunchOptions;
use crate::listing::{Section, Style};
use crate::selection::Selection;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// What a run does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Start the system
    #[default]
    Start,
    /// List the configuration details
    List,
    /// Look for servers that could never be started
    Check,
}

/// SysStarter - validate a system topology and start its servers in order
#[derive(Parser, Debug)]
#[command(name = "sysstarter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Topology file (defaults to ./sysstarter.yml, then the per-user config)
    #[arg(env = "SYS_STARTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// What action to take
    #[arg(long, value_enum, default_value_t = Action::Start, env = "SYS_STARTER_ACTION")]
    pub action: Action,

    /// Only servers on these hosts will be used
    #[arg(long, value_delimiter = ',', env = "SYS_STARTER_HOST")]
    pub host: Vec<String>,

    /// Only servers not on these hosts will be used
    #[arg(long, value_delimiter = ',', env = "SYS_STARTER_NOT_HOST")]
    pub not_host: Vec<String>,

    /// Only these servers will be used
    #[arg(long, visible_alias = "svr", value_delimiter = ',', env = "SYS_STARTER_SERVER")]
    pub server: Vec<String>,

    /// These servers will not be used
    #[arg(long, visible_alias = "not-svr", value_delimiter = ',', env = "SYS_STARTER_NOT_SERVER")]
    pub not_server: Vec<String>,

    /// Only servers in these classes will be used
    #[arg(long, value_delimiter = ',', env = "SYS_STARTER_CLASS")]
    pub class: Vec<String>,

    /// Only servers not a member of these classes will be used
    #[arg(long, value_delimiter = ',', env = "SYS_STARTER_NOT_CLASS")]
    pub not_class: Vec<String>,

    /// Any servers required by those specified will be added to the set
    #[arg(long, visible_alias = "add-required-svrs", env = "SYS_STARTER_ADD_REQS")]
    pub add_reqs: bool,

    /// Any servers that depend on those specified will be added to the set
    #[arg(long, visible_alias = "add-dependencies", env = "SYS_STARTER_ADD_DEPS")]
    pub add_deps: bool,

    /// Show what would be started without starting anything
    #[arg(long, env = "SYS_STARTER_DONT_START")]
    pub dont_start: bool,

    /// Carry on even if the configuration has errors
    #[arg(long, env = "SYS_STARTER_DONT_EXIT_ON_CONFIG_ERROR")]
    pub dont_exit_on_config_error: bool,

    /// Don't print the configuration errors
    #[arg(long, env = "SYS_STARTER_DONT_REPORT_ERRORS")]
    pub dont_report_errors: bool,

    /// How to list the results
    #[arg(long, value_enum, default_value_t = Style::Full, env = "SYS_STARTER_STYLE")]
    pub style: Style,

    /// Which sections of the listing to show
    #[arg(long, value_enum, value_delimiter = ',', env = "SYS_STARTER_ONLY_SHOW")]
    pub only_show: Vec<Section>,

    /// Seconds to wait for each round's responses
    #[arg(long, default_value_t = 30, env = "SYS_STARTER_ROUND_TIMEOUT")]
    pub round_timeout: u64,

    /// Remote user for the ssh connections
    #[arg(long, env = "SYS_STARTER_SSH_USER")]
    pub ssh_user: Option<String>,

    /// Seconds to wait for an ssh connection
    #[arg(long, default_value_t = 10, env = "SYS_STARTER_SSH_CONNECT_TIMEOUT")]
    pub ssh_connect_timeout: u64,

    /// Print the run report as JSON
    #[arg(long, env = "SYS_STARTER_JSON")]
    pub json: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn selection(&self) -> Selection {
        Selection {
            hosts: self.host.clone(),
            not_hosts: self.not_host.clone(),
            servers: self.server.clone(),
            not_servers: self.not_server.clone(),
            classes: self.class.clone(),
            not_classes: self.not_class.clone(),
            add_reqs: self.add_reqs,
            add_deps: self.add_deps,
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            dispatch: !self.dont_start,
            ..LaunchOptions::with_round_timeout(Duration::from_secs(self.round_timeout))
        }
    }

    pub fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["sysstarter"]);
        assert_eq!(cli.action, Action::Start);
        assert_eq!(cli.style, Style::Full);
        assert!(cli.config.is_none());
        assert!(cli.selection().is_everything());
        let opts = cli.launch_options();
        assert!(opts.dispatch);
        assert_eq!(opts.max_polls, 30);
    }

    #[test]
    fn test_lists_and_aliases() {
        let cli = Cli::parse_from([
            "sysstarter",
            "topology.yml",
            "--action",
            "list",
            "--svr",
            "S1,S2",
            "--not-class",
            "batch",
            "--only-show",
            "servers,hosts",
            "--style",
            "short",
            "--dont-start",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("topology.yml")));
        assert_eq!(cli.action, Action::List);
        assert_eq!(cli.server, vec!["S1", "S2"]);
        assert_eq!(cli.selection().not_classes, vec!["batch"]);
        assert_eq!(cli.only_show, vec![Section::Servers, Section::Hosts]);
        assert_eq!(cli.style, Style::Short);
        assert!(!cli.launch_options().dispatch);
    }

    #[test]
    fn test_round_timeout() {
        let cli = Cli::parse_from(["sysstarter", "--round-timeout", "5"]);
        assert_eq!(cli.launch_options().max_polls, 5);
    }
}
