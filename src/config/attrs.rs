//! Host attribute validation - templates, per-host values, and the
//! attributes a server requires of every host it runs on

use super::error::{ConfigError, EntityKind, Unresolved};
use super::graph::ConfigGraph;
use super::model::AttrTemplate;
use regex::Regex;

/// Raw fields of one attribute template record
#[derive(Debug, Clone, Default)]
pub struct TemplateSpec<'a> {
    pub name: &'a str,
    pub default: Option<&'a str>,
    pub min_count: i64,
    pub max_count: i64,
    pub description: &'a str,
    pub units: &'a str,
    pub value_regex: &'a str,
    pub value_desc: &'a str,
}

impl ConfigGraph {
    fn reject_template(&mut self, attr: &str, reason: String) {
        self.add_error(ConfigError::InvalidTemplate {
            attr: attr.to_string(),
            reason,
        });
    }

    pub fn populate_host_attr_template(&mut self, spec: TemplateSpec<'_>) {
        if self.fatal {
            return;
        }
        let name = spec.name;
        if name.trim().is_empty() {
            self.add_error(ConfigError::BlankName {
                kind: EntityKind::AttrTemplate,
            });
            return;
        }
        if self.attr_templates.contains_key(name) {
            self.add_error(ConfigError::Duplicate {
                kind: EntityKind::AttrTemplate,
                name: name.to_string(),
                detail: String::new(),
            });
            return;
        }

        if spec.max_count > 0 && spec.min_count > spec.max_count {
            self.reject_template(
                name,
                format!(
                    "has invalid min ({}) and max ({}) counts: if a max count is >0 it must be >= min count",
                    spec.min_count, spec.max_count
                ),
            );
            return;
        }

        let re = match Regex::new(spec.value_regex) {
            Ok(re) => re,
            Err(e) => {
                self.reject_template(
                    name,
                    format!(
                        "the regular expression: '{}' did not compile: {}",
                        spec.value_regex, e
                    ),
                );
                return;
            }
        };

        if let Some(default) = spec.default {
            if !re.is_match(default) {
                self.reject_template(
                    name,
                    format!(
                        "the default value: '{}' does not match the regular expression: '{}'",
                        default, spec.value_regex
                    ),
                );
                return;
            }
        }

        let min_count = spec.min_count.max(0) as usize;
        if min_count == 0 {
            if let Some(default) = spec.default {
                self.reject_template(
                    name,
                    format!("is optional and has a default value: '{}'", default),
                );
                return;
            }
        }

        self.attr_templates.insert(
            name.to_string(),
            AttrTemplate {
                name: name.to_string(),
                default: spec.default.map(str::to_string),
                min_count,
                max_count: spec.max_count,
                description: spec.description.to_string(),
                units: spec.units.to_string(),
                value_regex: spec.value_regex.to_string(),
                value_desc: spec.value_desc.to_string(),
                re,
            },
        );
    }

    /// Add one attribute value to a host. The host and template must exist
    /// and the value must match the template's regex.
    pub fn populate_host_attr(&mut self, host: &str, attr: &str, value: &str) {
        if self.fatal {
            return;
        }
        let side = Unresolved::from_lookups(
            self.hosts.contains_key(host),
            self.attr_templates.contains_key(attr),
        );
        if let Some(side) = side {
            self.add_error(ConfigError::UnresolvedMapping {
                mapping: "host attribute",
                record: format!("host: '{}' attr: '{}' value: '{}'", host, attr, value),
                left: "host",
                right: "attribute template",
                side,
            });
            return;
        }

        let Some(tmpl) = self.attr_templates.get(attr) else {
            return;
        };
        if !tmpl.matches(value) {
            let err = ConfigError::AttrValueMismatch {
                host: host.to_string(),
                attr: attr.to_string(),
                value: value.to_string(),
                regex: tmpl.value_regex.clone(),
            };
            self.add_error(err);
            return;
        }

        if let Some(h) = self.hosts.get_mut(host) {
            h.attrs
                .entry(attr.to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    /// Check every host's attribute counts against the templates, filling
    /// mandatory attributes from template defaults where needed
    pub fn check_host_attrs(&mut self) {
        if self.fatal {
            return;
        }
        let mut errs = Vec::new();

        for host in self.hosts.values_mut() {
            for tmpl in self.attr_templates.values() {
                let vals = host.attrs.get(&tmpl.name).map(Vec::len);
                let count = vals.unwrap_or(0);

                if let Some(max) = tmpl.max() {
                    if count > max {
                        errs.push(ConfigError::TooManyValues {
                            host: host.name.clone(),
                            attr: tmpl.name.clone(),
                            count,
                            max,
                        });
                        continue;
                    }
                }
                if count >= tmpl.min_count {
                    continue;
                }

                match (&tmpl.default, vals) {
                    (Some(default), _) => {
                        log::debug!(
                            "host {}: filling {} with {} default value(s)",
                            host.name,
                            tmpl.name,
                            tmpl.min_count - count
                        );
                        let slot = host.attrs.entry(tmpl.name.clone()).or_default();
                        slot.resize(tmpl.min_count, default.clone());
                    }
                    (None, Some(_)) => errs.push(ConfigError::TooFewValues {
                        host: host.name.clone(),
                        attr: tmpl.name.clone(),
                        count,
                        min: tmpl.min_count,
                    }),
                    (None, None) => errs.push(ConfigError::MandatoryMissing {
                        host: host.name.clone(),
                        attr: tmpl.name.clone(),
                    }),
                }
            }
        }

        for err in errs {
            self.add_error(err);
        }
    }

    /// Record that every host running `server` must carry `value` for `attr`
    pub fn populate_server_host_must_have(&mut self, server: &str, attr: &str, value: &str) {
        if self.fatal {
            return;
        }
        let side = Unresolved::from_lookups(
            self.servers.contains_key(server),
            self.attr_templates.contains_key(attr),
        );
        if let Some(side) = side {
            self.add_error(ConfigError::UnresolvedMapping {
                mapping: "server host-must-have",
                record: format!("server: '{}' attr: '{}' = '{}'", server, attr, value),
                left: "server",
                right: "attribute template",
                side,
            });
            return;
        }

        let Some(tmpl) = self.attr_templates.get(attr) else {
            return;
        };
        if !tmpl.matches(value) {
            let err = ConfigError::MustHaveValueMismatch {
                server: server.to_string(),
                attr: attr.to_string(),
                value: value.to_string(),
                regex: tmpl.value_regex.clone(),
            };
            self.add_error(err);
            return;
        }

        if let Some(svr) = self.servers.get_mut(server) {
            svr.host_must_have
                .entry(attr.to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    /// Confirm that each host a server runs on has the attribute values the
    /// server requires. One error per (host, server, attribute) shortfall.
    pub fn confirm_hosts_meet_server_needs(&mut self) {
        if self.fatal {
            return;
        }
        let mut errs = Vec::new();

        for svr in self.servers.values() {
            for host_name in svr.hosts.keys() {
                let Some(host) = self.hosts.get(host_name) else {
                    continue;
                };
                for (attr, wanted) in &svr.host_must_have {
                    let Some(actual) = host.attrs.get(attr) else {
                        errs.push(ConfigError::HostLacksAttr {
                            host: host_name.clone(),
                            server: svr.name.clone(),
                            attr: attr.clone(),
                        });
                        continue;
                    };
                    let missing: Vec<String> = wanted
                        .iter()
                        .filter(|w| !actual.contains(w))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        errs.push(ConfigError::HostLacksValues {
                            host: host_name.clone(),
                            server: svr.name.clone(),
                            attr: attr.clone(),
                            wanted: missing,
                            actual: actual.clone(),
                        });
                    }
                }
            }
        }

        for err in errs {
            self.add_error(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_host() -> ConfigGraph {
        let mut cg = ConfigGraph::new();
        cg.populate_location("Balham", "");
        cg.populate_datacentre("DC1", "Balham");
        cg.populate_operating_system("Linux");
        cg.populate_host("h1", "DC1", "Linux");
        cg
    }

    fn template<'a>(name: &'a str, min: i64, max: i64, default: Option<&'a str>) -> TemplateSpec<'a> {
        TemplateSpec {
            name,
            default,
            min_count: min,
            max_count: max,
            value_regex: "^[a-z0-9]+$",
            ..Default::default()
        }
    }

    #[test]
    fn test_template_validation() {
        let mut cg = ConfigGraph::new();

        cg.populate_host_attr_template(template("ok", 1, 3, Some("x")));
        assert_eq!(cg.error_count(), 0);
        assert_eq!(cg.attr_template_count(), 1);

        cg.populate_host_attr_template(template("ok", 1, 3, None));
        cg.populate_host_attr_template(template("", 1, 3, None));
        cg.populate_host_attr_template(template("minmax", 3, 2, None));
        cg.populate_host_attr_template(template("optdefault", 0, -1, Some("x")));
        cg.populate_host_attr_template(template("baddefault", 1, -1, Some("NOT OK")));
        cg.populate_host_attr_template(TemplateSpec {
            value_regex: "([unclosed",
            ..template("badregex", 1, 1, None)
        });

        assert_eq!(cg.error_count(), 6);
        assert_eq!(cg.attr_template_count(), 1);
    }

    #[test]
    fn test_negative_min_is_clamped() {
        let mut cg = ConfigGraph::new();
        cg.populate_host_attr_template(template("opt", -4, -1, None));
        assert_eq!(cg.error_count(), 0);
        assert_eq!(cg.find_attr_template("opt").unwrap().min_count, 0);
    }

    #[test]
    fn test_min_two_unbounded_with_two_values() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("nic", 2, -1, None));
        cg.populate_host_attr("h1", "nic", "eth0");
        cg.populate_host_attr("h1", "nic", "eth1");
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 0);
    }

    #[test]
    fn test_missing_mandatory_without_default() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("nic", 2, -1, None));
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 1);
        assert!(matches!(cg.errors()[0], ConfigError::MandatoryMissing { .. }));
    }

    #[test]
    fn test_too_few_without_default() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("nic", 2, -1, None));
        cg.populate_host_attr("h1", "nic", "eth0");
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 1);
        assert!(matches!(
            cg.errors()[0],
            ConfigError::TooFewValues { count: 1, min: 2, .. }
        ));
    }

    #[test]
    fn test_too_many_values() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("disk", 0, 2, None));
        for v in ["a", "b", "c"] {
            cg.populate_host_attr("h1", "disk", v);
        }
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 1);
        assert!(matches!(
            cg.errors()[0],
            ConfigError::TooManyValues { count: 3, max: 2, .. }
        ));
    }

    #[test]
    fn test_default_fills_to_min() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("cpu", 3, -1, Some("x86")));
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 0);
        assert_eq!(cg.find_host("h1").unwrap().attrs["cpu"], vec!["x86"; 3]);

        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("cpu", 3, -1, Some("x86")));
        cg.populate_host_attr("h1", "cpu", "arm");
        cg.check_host_attrs();
        assert_eq!(cg.error_count(), 0);
        assert_eq!(cg.find_host("h1").unwrap().attrs["cpu"], vec!["arm", "x86", "x86"]);
    }

    #[test]
    fn test_bad_host_attr_values_dropped() {
        let mut cg = graph_with_host();
        cg.populate_host_attr_template(template("role", 0, -1, None));

        cg.populate_host_attr("h1", "role", "BAD VALUE");
        cg.populate_host_attr("h9", "role", "db");
        cg.populate_host_attr("h1", "colour", "red");
        cg.populate_host_attr("h9", "colour", "red");

        assert_eq!(cg.error_count(), 4);
        assert!(cg.find_host("h1").unwrap().attrs.is_empty());
    }

    fn must_have_graph() -> ConfigGraph {
        let mut cg = graph_with_host();
        cg.populate_host("h2", "DC1", "Linux");
        cg.populate_host_attr_template(template("role", 0, -1, None));
        cg.populate_host_attr_template(template("zone", 0, -1, None));
        cg.populate_server("db", 0, false);
        cg.populate_host_server_map("h1", "db", "start-db");
        cg.populate_host_server_map("h2", "db", "start-db");
        cg
    }

    #[test]
    fn test_host_must_have_satisfied() {
        let mut cg = must_have_graph();
        for h in ["h1", "h2"] {
            cg.populate_host_attr(h, "role", "db");
            cg.populate_host_attr(h, "role", "cache");
        }
        cg.populate_server_host_must_have("db", "role", "db");
        cg.confirm_hosts_meet_server_needs();
        assert_eq!(cg.error_count(), 0);
    }

    #[test]
    fn test_host_must_have_mismatches() {
        let mut cg = must_have_graph();
        cg.populate_host_attr("h2", "role", "web");
        cg.populate_host_attr("h2", "role", "cache");
        cg.populate_server_host_must_have("db", "role", "db");
        cg.populate_server_host_must_have("db", "role", "ssd");
        assert_eq!(cg.error_count(), 0);

        cg.confirm_hosts_meet_server_needs();
        assert_eq!(cg.error_count(), 2);
        assert!(matches!(
            &cg.errors()[0],
            ConfigError::HostLacksAttr { host, server, attr } if host == "h1" && server == "db" && attr == "role"
        ));
        match &cg.errors()[1] {
            ConfigError::HostLacksValues { host, wanted, .. } => {
                assert_eq!(host, "h2");
                assert_eq!(wanted, &vec!["db".to_string(), "ssd".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_host_must_have_rejects_bad_records() {
        let mut cg = must_have_graph();
        cg.populate_server_host_must_have("nope", "role", "db");
        cg.populate_server_host_must_have("db", "colour", "red");
        cg.populate_server_host_must_have("nope", "colour", "red");
        cg.populate_server_host_must_have("db", "role", "NOT VALID");
        assert_eq!(cg.error_count(), 4);
        assert!(cg.find_server("db").unwrap().host_must_have.is_empty());
    }
}
