//! Core engine - launch scheduling, host supervisors and status aggregation

mod orchestrator;
pub mod remote;
mod scheduler;
mod status;
mod supervisor;

pub use orchestrator::{LaunchOptions, Orchestrator};
pub use remote::{Connection, Connector, RemoteError, RemoteSession, SshConnector};
pub use scheduler::{is_launchable, DispatchUnit, LaunchScheduler, OrchestrationError, Round};
pub use status::{
    AggregatorHandle, CommandOutcome, CommandStatus, HostStatus, HostSummary, ServerSummary,
    StatusAggregator, StatusSummary, SysStatus,
};
pub use supervisor::HostSupervisor;
