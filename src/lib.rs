//! SysStarter - validates a system topology and starts its servers
//!
//! The configuration graph holds locations, datacentres, hosts, servers,
//! classes and the dependencies between servers. Once it has been checked the
//! servers are launched over ssh in rounds, each round holding the servers
//! whose needs were met by the rounds before it.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod listing;
pub mod report;
pub mod selection;

// Re-exports
pub use app::App;
pub use config::{ConfigError, ConfigGraph};
pub use crate::core::{LaunchOptions, Orchestrator, SysStatus};
pub use report::LaunchReport;
pub use selection::Selection;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
