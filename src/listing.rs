//! Listing and checking - human-readable views of the configuration

use crate::config::{ConfigGraph, Host, Server};
use crate::core::{LaunchScheduler, OrchestrationError};
use clap::ValueEnum;
use std::collections::BTreeSet;
use std::fmt::Write as _;

const INTRO: &str = "    ";
const SECTION_SEP: &str = "============================================\n\n";

/// How much detail a listing gives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Style {
    /// A full description of each item
    #[default]
    Full,
    /// Each detail on a line of its own
    Expanded,
    /// A brief description
    Short,
}

/// Parts of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    Servers,
    Classes,
    Hosts,
}

impl Section {
    pub const ALL: &'static [Section] = &[Section::Servers, Section::Classes, Section::Hosts];

    fn title(&self) -> &'static str {
        match self {
            Self::Servers => "servers",
            Self::Classes => "classes",
            Self::Hosts => "hosts",
        }
    }
}

/// What a listing covers
pub struct Listing<'a> {
    pub config: &'a ConfigGraph,
    pub servers: &'a BTreeSet<String>,
    pub classes: &'a BTreeSet<String>,
    pub hosts: &'a BTreeSet<String>,
    pub style: Style,
}

impl<'a> Listing<'a> {
    /// Render the requested sections; none means all of them
    pub fn render(&self, sections: &[Section]) -> String {
        let sections = if sections.is_empty() {
            Section::ALL
        } else {
            sections
        };

        let mut out = String::new();
        let mut sep = "";
        for section in sections {
            out.push_str(sep);
            match self.style {
                Style::Full => {
                    let title = section.title();
                    let _ = writeln!(out, "{}\n{}", title, "=".repeat(title.len()));
                    sep = SECTION_SEP;
                }
                Style::Short => {
                    let _ = writeln!(out, "{}", section.title());
                    sep = "\n";
                }
                Style::Expanded => sep = "\n",
            }

            match section {
                Section::Servers => self.servers(&mut out),
                Section::Classes => self.classes(&mut out),
                Section::Hosts => self.hosts(&mut out),
            }
        }
        out
    }

    fn servers(&self, out: &mut String) {
        let prompts = ["class:", "host:", "needs:", "needed-by:"];
        let width = prompts
            .iter()
            .map(|p| p.len())
            .fold(self.config.name_widths().server, usize::max);

        for name in self.servers {
            let Some(svr) = self.config.find_server(name) else {
                match self.style {
                    Style::Expanded => {
                        let _ = writeln!(out, "server: {} NOT-FOUND", name);
                    }
                    _ => {
                        let _ = writeln!(out, "{}{:<w$} server not found", INTRO, name, w = width);
                    }
                }
                continue;
            };

            match self.style {
                Style::Full => {
                    server_heading(out, svr, width);
                    self.server_full(out, svr, width);
                }
                Style::Expanded => self.server_expanded(out, svr),
                Style::Short => server_heading(out, svr, width),
            }
        }
    }

    fn server_full(&self, out: &mut String, svr: &Server, width: usize) {
        labelled(out, width, "class:", svr.classes.iter().cloned());

        if !svr.hosts.is_empty() {
            let host_width = self.config.name_widths().host;
            let indent = format!("{}{:w$}", INTRO, "", w = width);
            let mut lead = format!("{}{:>w$}", INTRO, "host:", w = width);
            for (host, count) in &svr.hosts {
                let plural = if *count > 1 { "s" } else { "" };
                let _ = writeln!(
                    out,
                    "{} {:<hw$} {:4} instance{}:",
                    lead,
                    host,
                    count,
                    plural,
                    hw = host_width
                );
                lead = indent.clone();
                for cmd in self.commands(host, &svr.name) {
                    let _ = writeln!(out, "{}    {}", indent, cmd);
                }
            }
        }

        labelled(out, width, "needs:", svr.needs.iter().cloned());
        labelled(out, width, "needed-by:", svr.needed_by.iter().cloned());
        out.push('\n');
    }

    fn server_expanded(&self, out: &mut String, svr: &Server) {
        for class in &svr.classes {
            let _ = writeln!(out, "server: {} class: {}", svr.name, class);
        }
        for host in svr.hosts.keys() {
            for cmd in self.commands(host, &svr.name) {
                let _ = writeln!(out, "server: {} host: {} command: {}", svr.name, host, cmd);
            }
        }
        for need in &svr.needs {
            let _ = writeln!(out, "server: {} needs: {}", svr.name, need);
        }
        for by in &svr.needed_by {
            let _ = writeln!(out, "server: {} needed-by: {}", svr.name, by);
        }
    }

    fn commands(&self, host: &str, server: &str) -> &'a [String] {
        self.config
            .find_host(host)
            .and_then(|h| h.servers.get(server))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn classes(&self, out: &mut String) {
        let width = self.config.name_widths().class.max("server:".len());

        for name in self.classes {
            let Some(class) = self.config.find_class(name) else {
                continue;
            };
            let mut members: Vec<&String> = class.servers.iter().collect();
            members.sort();

            match self.style {
                Style::Full => {
                    let _ = writeln!(out, "{}{:<w$} {}", INTRO, name, class.description, w = width);
                    labelled(out, width, "server:", members.into_iter().cloned());
                    out.push('\n');
                }
                Style::Expanded => {
                    let _ = writeln!(out, "class: {} description: {}", name, class.description);
                    for svr in members {
                        let _ = writeln!(out, "class: {} server: {}", name, svr);
                    }
                }
                Style::Short => {
                    let _ = writeln!(out, "{} {}", INTRO, name);
                }
            }
        }
    }

    fn hosts(&self, out: &mut String) {
        for name in self.hosts {
            let Some(host) = self.config.find_host(name) else {
                continue;
            };
            match self.style {
                Style::Full => self.host_full(out, host),
                Style::Expanded => host_expanded(out, host),
                Style::Short => {
                    let _ = writeln!(out, "{} {}", INTRO, name);
                }
            }
        }
    }

    fn host_full(&self, out: &mut String, host: &Host) {
        let widths = self.config.name_widths();
        let width = widths.host.max("attr:".len()).max("server:".len());

        let _ = writeln!(
            out,
            "{}{:<w$}  {:<dw$}  {:<ow$}",
            INTRO,
            host.name,
            host.datacentre,
            host.os,
            w = width,
            dw = widths.datacentre,
            ow = widths.os
        );
        labelled(
            out,
            width,
            "attr:",
            host.attrs
                .iter()
                .flat_map(|(attr, vals)| vals.iter().map(move |v| format!("{} = {}", attr, v))),
        );

        if !host.servers.is_empty() {
            let indent = format!("{}{:w$}", INTRO, "", w = width);
            let mut lead = format!("{}{:>w$}", INTRO, "server:", w = width);
            for (svr, cmds) in &host.servers {
                let _ = writeln!(out, "{} {}", lead, svr);
                lead = indent.clone();
                for cmd in cmds {
                    let _ = writeln!(out, "{}    {}", indent, cmd);
                }
            }
        }
        out.push('\n');
    }
}

fn server_heading(out: &mut String, svr: &Server, width: usize) {
    let _ = writeln!(
        out,
        "{}{:<w$} hosts: {:6} instances: {:6}",
        INTRO,
        svr.name,
        svr.hosts.len(),
        svr.instance_count(),
        w = width
    );
}

fn host_expanded(out: &mut String, host: &Host) {
    let _ = writeln!(out, "host: {} datacentre: {}", host.name, host.datacentre);
    let _ = writeln!(out, "host: {} OS: {}", host.name, host.os);
    for (attr, vals) in &host.attrs {
        for v in vals {
            let _ = writeln!(out, "host: {} attr: {} val: {}", host.name, attr, v);
        }
    }
    for (svr, cmds) in &host.servers {
        for cmd in cmds {
            let _ = writeln!(out, "host: {} server: {} command: {}", host.name, svr, cmd);
        }
    }
}

/// A right-aligned prompt followed by one value per line
fn labelled(out: &mut String, width: usize, prompt: &str, values: impl Iterator<Item = String>) {
    let indent = format!("{}{:w$}", INTRO, "", w = width);
    let mut lead = format!("{}{:>w$}", INTRO, prompt, w = width);
    for val in values {
        let _ = writeln!(out, "{} {}", lead, val);
        lead = indent.clone();
    }
}

/// Problems that won't show up as configuration errors but will spoil a run:
/// servers with nowhere to run and servers that can never be launched
pub fn check(config: &ConfigGraph, servers: &BTreeSet<String>) -> Vec<String> {
    let mut findings: Vec<String> = servers
        .iter()
        .filter_map(|name| config.find_server(name))
        .filter(|svr| svr.hosts.is_empty())
        .map(|svr| format!("server: {} is not running on any hosts", svr.name))
        .collect();

    let mut scheduler = LaunchScheduler::new(config, servers.iter().cloned());
    while scheduler.next_round().is_some() {}
    for err in scheduler.unlaunched() {
        if let OrchestrationError::NeverLaunched { server, waiting_on } = err {
            findings.push(format!(
                "server: {} can never be launched: it is waiting on: {}",
                server,
                waiting_on.join(", ")
            ));
        }
    }
    findings
}

/// The accumulated configuration errors, one per line
pub fn config_errors(config: &ConfigGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} error(s) detected in the configuration:",
        config.error_count()
    );
    for err in config.errors() {
        let _ = writeln!(out, "    {}", err);
    }
    if config.is_fatal() {
        let _ = writeln!(out, "the configuration could not be completely loaded");
    }
    out
}
