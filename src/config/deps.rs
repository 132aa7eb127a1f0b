//! Dependency graph - needs/needed-by edges between servers and cycle detection

use super::error::ConfigError;
use super::graph::ConfigGraph;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One side of a dependency declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Server(String),
    Class(String),
}

impl Endpoint {
    /// Build an endpoint from a separate type tag and value
    pub fn from_parts(type_name: &str, val: &str) -> Result<Self, String> {
        match type_name {
            "server" => Ok(Self::Server(val.to_string())),
            "class" => Ok(Self::Class(val.to_string())),
            other => Err(format!("invalid type name: '{}'", other)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(name) => write!(f, "server[{}]", name),
            Self::Class(name) => write!(f, "class[{}]", name),
        }
    }
}

/// Private copy of the edges, pruned during cycle detection
type EdgeMap = BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)>;

impl ConfigGraph {
    /// Expand an endpoint into the set of servers it names
    fn resolve_endpoint(&self, endpoint: &Endpoint) -> Result<BTreeSet<String>, String> {
        match endpoint {
            Endpoint::Server(name) => {
                if self.servers.contains_key(name) {
                    Ok(BTreeSet::from([name.clone()]))
                } else {
                    Err(format!("unknown server: '{}'", name))
                }
            }
            Endpoint::Class(name) => match self.classes.get(name) {
                Some(class) => Ok(class.servers.iter().cloned().collect()),
                None => Err(format!("unknown class: '{}'", name)),
            },
        }
    }

    /// Declare that every server named by `from` needs every server named by
    /// `to`. Self-edges are dropped and repeated edges are no-ops.
    pub fn add_dependency(&mut self, from: &Endpoint, to: &Endpoint) {
        if self.fatal {
            return;
        }
        let record = format!("{} needs {}", from, to);
        let from_set = self.resolve_endpoint(from);
        let to_set = self.resolve_endpoint(to);

        let (from_set, to_set) = match (from_set, to_set) {
            (Ok(f), Ok(t)) => (f, t),
            (f, t) => {
                let problems = [f.err(), t.err()].into_iter().flatten().collect();
                self.add_error(ConfigError::UnresolvedDependency { record, problems });
                return;
            }
        };

        for svr in &from_set {
            for needed in to_set.iter().filter(|n| *n != svr) {
                if let Some(s) = self.servers.get_mut(svr) {
                    s.needs.insert(needed.clone());
                }
                if let Some(n) = self.servers.get_mut(needed) {
                    n.needed_by.insert(svr.clone());
                }
            }
        }
    }

    /// Declare a dependency from its raw type/value fields. Both sides are
    /// checked before either is resolved, so a record with two bad sides
    /// gives one error naming both.
    pub fn populate_dependency(&mut self, from_type: &str, from_val: &str, to_type: &str, to_val: &str) {
        if self.fatal {
            return;
        }
        match (
            Endpoint::from_parts(from_type, from_val),
            Endpoint::from_parts(to_type, to_val),
        ) {
            (Ok(from), Ok(to)) => self.add_dependency(&from, &to),
            (from, to) => {
                let record = format!("{}[{}] needs {}[{}]", from_type, from_val, to_type, to_val);
                let problems = [from.err(), to.err()].into_iter().flatten().collect();
                self.add_error(ConfigError::UnresolvedDependency { record, problems });
            }
        }
    }

    fn copy_edges(&self) -> EdgeMap {
        self.servers
            .values()
            .map(|s| (s.name.clone(), (s.needs.clone(), s.needed_by.clone())))
            .collect()
    }

    /// Find the dependency loops in the graph, one per connected group of
    /// servers that are caught in a loop. The graph itself is not changed.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut edges = self.copy_edges();

        // Prune anything that needs nothing or is needed by nothing; it can't
        // be on a loop. Whatever survives is.
        loop {
            let removable: Vec<String> = edges
                .iter()
                .filter(|(_, (needs, needed_by))| needs.is_empty() || needed_by.is_empty())
                .map(|(name, _)| name.clone())
                .collect();
            if removable.is_empty() {
                break;
            }
            for name in removable {
                remove_node(&mut edges, &name);
            }
        }

        let mut cycles = Vec::new();
        while let Some(start) = edges.keys().next().cloned() {
            cycles.push(walk_cycle(&edges, &start));
            for name in connected_group(&edges, &start) {
                remove_node(&mut edges, &name);
            }
        }
        cycles
    }

    /// Report every dependency loop as a configuration error
    pub fn detect_cycles(&mut self) {
        if self.fatal {
            return;
        }
        for path in self.find_cycles() {
            log::warn!("dependency loop: {}", path.join(" -> "));
            self.add_error(ConfigError::DependencyLoop { path });
        }
    }
}

fn remove_node(edges: &mut EdgeMap, name: &str) {
    let Some((needs, needed_by)) = edges.remove(name) else {
        return;
    };
    for n in needs {
        if let Some((_, nb)) = edges.get_mut(&n) {
            nb.remove(name);
        }
    }
    for n in needed_by {
        if let Some((ns, _)) = edges.get_mut(&n) {
            ns.remove(name);
        }
    }
}

/// Follow the smallest `needs` edge from `start` until a server repeats. The
/// loop is rendered from the first repeated server back to itself.
fn walk_cycle(edges: &EdgeMap, start: &str) -> Vec<String> {
    let mut path = vec![start.to_string()];
    let mut current = start.to_string();
    loop {
        let Some(next) = edges
            .get(&current)
            .and_then(|(needs, _)| needs.iter().next())
            .cloned()
        else {
            // Pruning leaves every survivor with an outgoing edge
            return path;
        };
        if let Some(pos) = path.iter().position(|p| *p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next.clone());
        current = next;
    }
}

/// All servers reachable from `start` following edges in either direction
fn connected_group(edges: &EdgeMap, start: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut pending = vec![start.to_string()];
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some((needs, needed_by)) = edges.get(&name) {
            pending.extend(needs.iter().chain(needed_by).cloned());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(names: &[&str]) -> ConfigGraph {
        let mut cg = ConfigGraph::new();
        for n in names {
            cg.populate_server(n, 0, false);
        }
        cg
    }

    fn needs(cg: &mut ConfigGraph, from: &str, to: &str) {
        cg.populate_dependency("server", from, "server", to);
    }

    fn assert_symmetric(cg: &ConfigGraph) {
        for a in cg.servers() {
            for b in cg.servers() {
                assert_eq!(
                    a.needs.contains(&b.name),
                    b.needed_by.contains(&a.name),
                    "{} / {}",
                    a.name,
                    b.name
                );
            }
        }
    }

    #[test]
    fn test_endpoint_from_parts() {
        assert_eq!(Endpoint::from_parts("server", "S1"), Ok(Endpoint::Server("S1".into())));
        assert_eq!(Endpoint::from_parts("class", "web"), Ok(Endpoint::Class("web".into())));
        assert_eq!(
            Endpoint::from_parts("host", "h1"),
            Err("invalid type name: 'host'".to_string())
        );
    }

    #[test]
    fn test_edges_are_symmetric_and_idempotent() {
        let mut cg = servers(&["A", "B", "C"]);
        needs(&mut cg, "A", "B");
        needs(&mut cg, "A", "B");
        needs(&mut cg, "B", "C");
        assert_eq!(cg.error_count(), 0);
        assert_eq!(cg.find_server("A").unwrap().needs.len(), 1);
        assert_eq!(cg.find_server("B").unwrap().needed_by.len(), 1);
        assert_symmetric(&cg);
    }

    #[test]
    fn test_self_need_is_dropped() {
        let mut cg = servers(&["X"]);
        needs(&mut cg, "X", "X");
        assert_eq!(cg.error_count(), 0);
        let x = cg.find_server("X").unwrap();
        assert!(x.needs.is_empty());
        assert!(x.needed_by.is_empty());
    }

    #[test]
    fn test_class_endpoints_expand_to_members() {
        let mut cg = servers(&["db1", "db2", "web1", "web2"]);
        cg.populate_class("db", "");
        cg.populate_class("web", "");
        for (s, c) in [("db1", "db"), ("db2", "db"), ("web1", "web"), ("web2", "web")] {
            cg.populate_server_class_map(s, c);
        }

        cg.populate_dependency("class", "web", "class", "db");
        assert_eq!(cg.error_count(), 0);
        let web1 = cg.find_server("web1").unwrap();
        assert_eq!(web1.needs.iter().collect::<Vec<_>>(), vec!["db1", "db2"]);
        assert_eq!(cg.find_server("db2").unwrap().needed_by.len(), 2);
        assert_symmetric(&cg);
    }

    #[test]
    fn test_class_needing_itself_skips_self_pairs() {
        let mut cg = servers(&["a", "b"]);
        cg.populate_class("pair", "");
        cg.populate_server_class_map("a", "pair");
        cg.populate_server_class_map("b", "pair");
        cg.add_dependency(&Endpoint::Class("pair".into()), &Endpoint::Class("pair".into()));
        assert!(cg.find_server("a").unwrap().needs.contains("b"));
        assert!(!cg.find_server("a").unwrap().needs.contains("a"));
        assert_symmetric(&cg);
    }

    #[test]
    fn test_unresolved_dependency_is_one_error() {
        let mut cg = servers(&["A"]);
        cg.populate_dependency("server", "A", "class", "missing");
        cg.populate_dependency("server", "nope", "server", "gone");
        cg.populate_dependency("host", "A", "server", "A");
        assert_eq!(cg.error_count(), 3);
        match &cg.errors()[1] {
            ConfigError::UnresolvedDependency { problems, .. } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
        assert!(cg.find_server("A").unwrap().needs.is_empty());
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let mut cg = servers(&["A", "B", "C", "D"]);
        needs(&mut cg, "A", "B");
        needs(&mut cg, "A", "C");
        needs(&mut cg, "B", "D");
        needs(&mut cg, "C", "D");
        cg.detect_cycles();
        assert_eq!(cg.error_count(), 0);
    }

    #[test]
    fn test_two_node_cycle() {
        let mut cg = servers(&["A", "B"]);
        needs(&mut cg, "A", "B");
        needs(&mut cg, "B", "A");
        cg.detect_cycles();
        assert_eq!(cg.error_count(), 1);
        assert_eq!(
            cg.errors()[0],
            ConfigError::DependencyLoop {
                path: vec!["A".into(), "B".into(), "A".into()]
            }
        );
        assert_symmetric(&cg);
        // detection works on a copy
        assert!(cg.find_server("A").unwrap().needs.contains("B"));
    }

    #[test]
    fn test_cycle_walk_takes_smallest_edges() {
        let mut cg = servers(&["A", "B", "C", "D", "E"]);
        needs(&mut cg, "A", "C");
        needs(&mut cg, "A", "B");
        needs(&mut cg, "B", "C");
        needs(&mut cg, "C", "A");
        needs(&mut cg, "E", "A");
        assert_eq!(
            cg.find_cycles(),
            vec![vec!["A".to_string(), "B".into(), "C".into(), "A".into()]]
        );
    }

    #[test]
    fn test_loop_not_through_start() {
        // A leads into the B <-> C loop; the walk from A never comes back to A
        let mut cg = servers(&["A", "B", "C", "D"]);
        needs(&mut cg, "A", "B");
        needs(&mut cg, "B", "C");
        needs(&mut cg, "C", "B");
        needs(&mut cg, "C", "D");
        needs(&mut cg, "D", "A");
        assert_eq!(
            cg.find_cycles(),
            vec![vec!["B".to_string(), "C".into(), "B".into()]]
        );
    }

    #[test]
    fn test_disjoint_cycles_all_reported() {
        let mut cg = servers(&["A", "B", "X", "Y", "Z"]);
        needs(&mut cg, "A", "B");
        needs(&mut cg, "B", "A");
        needs(&mut cg, "X", "Y");
        needs(&mut cg, "Y", "Z");
        needs(&mut cg, "Z", "X");
        cg.detect_cycles();
        assert_eq!(cg.error_count(), 2);
        assert_eq!(
            cg.errors()[1].to_string(),
            "a dependency loop has been detected: X -> Y -> Z -> X"
        );
    }
}
