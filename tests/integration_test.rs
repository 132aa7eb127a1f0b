use assert_cmd::Command;
use async_trait::async_trait;
use predicates::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysstarter::config::loader;
use sysstarter::core::{
    CommandStatus, Connection, Connector, HostStatus, LaunchOptions, Orchestrator, RemoteError,
    RemoteSession,
};
use sysstarter::ConfigGraph;
use tempfile::NamedTempFile;

const BALHAM: &str = r#"
locations:
  - { name: Balham }
operating_systems:
  - name: Linux
datacentres:
  - { name: DC1, location: Balham }
hosts:
  - { name: h1, datacentre: DC1, os: Linux }
servers:
  - { name: S1 }
  - { name: S2 }
host_server_map:
  - { host: h1, server: S1, command: run1 }
  - { host: h1, server: S2, command: run2 }
dependencies:
  - { from: "server:S1", to: "server:S2" }
"#;

/// Connector that records (host, command) pairs and refuses listed hosts
#[derive(Default)]
struct ScriptedConnector {
    refuse: Vec<String>,
    ran: Arc<Mutex<Vec<(String, String)>>>,
}

struct ScriptedConnection {
    host: String,
    ran: Arc<Mutex<Vec<(String, String)>>>,
}

struct ScriptedSession {
    host: String,
    ran: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Connection>, RemoteError> {
        if self.refuse.iter().any(|h| h == host) {
            return Err(RemoteError::Connect {
                host: host.to_string(),
                port,
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(ScriptedConnection {
            host: host.to_string(),
            ran: self.ran.clone(),
        }))
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        Ok(Box::new(ScriptedSession {
            host: self.host.clone(),
            ran: self.ran.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<(), RemoteError> {
        self.ran
            .lock()
            .unwrap()
            .push((self.host.clone(), command.to_string()));
        Ok(())
    }
}

fn quick() -> LaunchOptions {
    LaunchOptions {
        dispatch: true,
        poll_interval: Duration::from_millis(5),
        max_polls: 200,
    }
}

fn all_servers(cg: &ConfigGraph) -> Vec<String> {
    cg.servers().map(|s| s.name.clone()).collect()
}

#[tokio::test]
async fn test_balham_scenario() {
    let cg = loader::load_str(BALHAM);
    assert_eq!(cg.error_count(), 0, "{:?}", cg.errors());

    let connector = ScriptedConnector::default();
    let ran = connector.ran.clone();
    let orch = Orchestrator::new(&cg, Arc::new(connector), quick());
    let report = orch.run(all_servers(&cg)).await;

    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].servers, vec!["S2"]);
    assert_eq!(report.rounds[0].units[0].host, "h1");
    assert_eq!(report.rounds[0].units[0].command, "run2");
    assert_eq!(report.rounds[1].servers, vec!["S1"]);
    assert_eq!(report.rounds[1].units[0].command, "run1");

    assert_eq!(report.status.response_count, 2);
    assert_eq!(report.status.failure_count, 0);
    assert!(report.is_clean());
    assert_eq!(
        *ran.lock().unwrap(),
        vec![
            ("h1".to_string(), "run2".to_string()),
            ("h1".to_string(), "run1".to_string())
        ]
    );
}

#[tokio::test]
async fn test_connection_failure_is_isolated_to_its_host() {
    let yaml = BALHAM.replace(
        "  - { name: h1, datacentre: DC1, os: Linux }",
        "  - { name: h1, datacentre: DC1, os: Linux }\n  - { name: h2, datacentre: DC1, os: Linux }",
    ) + "  - { from: \"server:S3\", to: \"server:S2\" }\n";
    let yaml = yaml.replace(
        "  - { name: S2 }",
        "  - { name: S2 }\n  - { name: S3 }",
    );
    let yaml = yaml.replace(
        "  - { host: h1, server: S2, command: run2 }",
        "  - { host: h1, server: S2, command: run2 }\n  - { host: h2, server: S3, command: run3 }",
    );
    let cg = loader::load_str(&yaml);
    assert_eq!(cg.error_count(), 0, "{:?}", cg.errors());

    let connector = ScriptedConnector {
        refuse: vec!["h2".into()],
        ..ScriptedConnector::default()
    };
    let ran = connector.ran.clone();
    let orch = Orchestrator::new(&cg, Arc::new(connector), quick());
    let report = orch.run(all_servers(&cg)).await;

    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[1].servers, vec!["S1", "S3"]);
    assert_eq!(report.status.response_count, 3);
    assert_eq!(report.status.failure_count, 1);
    assert_eq!(report.status.hosts["h2"].latest, HostStatus::ConnFail);
    assert_eq!(report.status.servers["S3"].latest, CommandStatus::CouldntRun);
    assert_eq!(report.status.servers["S1"].latest, CommandStatus::Ok);
    assert_eq!(ran.lock().unwrap().len(), 2);

    let text = report.render();
    assert!(text.contains("h2: Connection failed"));
}

#[test]
fn test_dry_run_blocking() {
    let cg = loader::load_str(BALHAM);
    let options = LaunchOptions {
        dispatch: false,
        ..quick()
    };
    let connector = ScriptedConnector::default();
    let ran = connector.ran.clone();
    let orch = Orchestrator::new(&cg, Arc::new(connector), options);

    let report = tokio_test::block_on(orch.run(all_servers(&cg)));
    assert!(report.dry_run);
    assert_eq!(report.rounds.len(), 2);
    assert!(ran.lock().unwrap().is_empty());
}

fn topology_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn sysstarter() -> Command {
    let mut cmd = Command::cargo_bin("sysstarter").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_cli_list() {
    let file = topology_file(BALHAM);
    sysstarter()
        .arg(file.path())
        .args(["--action", "list", "--style", "expanded", "--only-show", "servers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("server: S1 needs: S2"))
        .stdout(predicate::str::contains("server: S2 host: h1 command: run2"));
}

#[test]
fn test_cli_dry_run() {
    let file = topology_file(BALHAM);
    sysstarter()
        .arg(file.path())
        .arg("--dont-start")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "would have started [0] server: S2 host: 'h1' command: 'run2'",
        ))
        .stdout(predicate::str::contains(
            "would have started [1] server: S1 host: 'h1' command: 'run1'",
        ));
}

#[test]
fn test_cli_check_finds_loops() {
    let looped = format!("{}  - {{ from: \"server:S2\", to: \"server:S1\" }}\n", BALHAM);
    let file = topology_file(&looped);
    sysstarter()
        .arg(file.path())
        .args(["--action", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a dependency loop has been detected"));

    sysstarter()
        .arg(file.path())
        .args(["--action", "check", "--dont-exit-on-config-error", "--dont-report-errors"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("server: S1 can never be launched"));
}

#[test]
fn test_cli_rejects_conflicting_lists() {
    let file = topology_file(BALHAM);
    sysstarter()
        .arg(file.path())
        .args(["--server", "S1", "--not-server", "S2", "--dont-start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("server list and a server exclusion list"));
}
