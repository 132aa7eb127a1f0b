//! SysStarter CLI entry point

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use sysstarter::cli::Cli;
use sysstarter::core::SshConnector;
use sysstarter::App;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("SysStarter v{}", env!("CARGO_PKG_VERSION"));

    let connector = Arc::new(SshConnector::new(
        cli.ssh_user.clone(),
        cli.ssh_connect_timeout(),
    ));

    let app = App::load(cli)?;
    let code = app.run(connector).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
