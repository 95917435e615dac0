//! Graph-based classification pass
//!
//! Builds a call graph over internally resolved call edges and adjusts the
//! local pass's low-confidence results from caller/callee role
//! distributions. Rules fire in the configured priority order; when several
//! rules disagree the outcome is a confidence-weighted vote, and an exact
//! tie falls back to Utility.

use super::{Classification, Role};
use crate::config::EngineConfig;
use crate::models::{Edge, EdgeKind, Entity, Resolution};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Confidence boost a promotion applies on top of the local result
const PROMOTION_BOOST: f64 = 0.25;
const MAX_PROMOTED_CONFIDENCE: f64 = 0.95;

struct CallGraph {
    graph: DiGraph<String, ()>,
    nodes: FxHashMap<String, NodeIndex>,
}

impl CallGraph {
    fn build(entities: &[Entity], edges: &[Edge]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = FxHashMap::default();
        for entity in entities {
            let index = graph.add_node(entity.id.clone());
            nodes.insert(entity.id.clone(), index);
        }
        for edge in edges {
            if edge.kind != EdgeKind::Calls || edge.resolution != Resolution::ResolvedInternal {
                continue;
            }
            if let (Some(&a), Some(&b)) = (nodes.get(&edge.source), nodes.get(&edge.target)) {
                graph.add_edge(a, b, ());
            }
        }
        Self { graph, nodes }
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

pub fn apply(
    entities: &[Entity],
    edges: &[Edge],
    local: &BTreeMap<String, Classification>,
    config: &EngineConfig,
) -> BTreeMap<String, Classification> {
    let call_graph = CallGraph::build(entities, edges);
    let mut result = local.clone();

    for entity in entities {
        let Some(current) = local.get(&entity.id) else {
            continue;
        };
        let callers = call_graph.neighbors(&entity.id, Direction::Incoming);
        let callees = call_graph.neighbors(&entity.id, Direction::Outgoing);

        let mut fired: Vec<Classification> = Vec::new();
        for rule in &config.promotion_rules {
            let candidate = match rule.as_str() {
                "test-only-callers" => test_only_callers(current, &callers, local),
                "service-sandwich" => service_sandwich(current, &callers, &callees, local),
                "shared-helper" => shared_helper(current, &callers, config),
                _ => None,
            };
            if let Some(candidate) = candidate {
                fired.push(candidate);
            }
        }

        if let Some(winner) = vote(fired) {
            let overrides = current.confidence < config.confidence_threshold
                || winner.confidence > current.confidence;
            if overrides && winner.role != current.role {
                result.insert(entity.id.clone(), winner);
            }
        }
    }

    result
}

/// An entity called exclusively by tests is the subject under test, at a
/// confidence above what the local pass assigned.
fn test_only_callers(
    current: &Classification,
    callers: &[&str],
    local: &BTreeMap<String, Classification>,
) -> Option<Classification> {
    if callers.is_empty() || current.role == Role::Test {
        return None;
    }
    let all_tests = callers
        .iter()
        .all(|c| local.get(*c).map(|l| l.role == Role::Test).unwrap_or(false));
    if !all_tests {
        return None;
    }
    let confidence = (current.confidence + PROMOTION_BOOST).min(MAX_PROMOTED_CONFIDENCE);
    Some(Classification::new(
        Role::TestSubject,
        confidence,
        "graph:test-only-callers",
    ))
}

/// Called by controllers, calls only repositories: the classic service
/// layer position.
fn service_sandwich(
    current: &Classification,
    callers: &[&str],
    callees: &[&str],
    local: &BTreeMap<String, Classification>,
) -> Option<Classification> {
    if current.role == Role::Service || callees.is_empty() {
        return None;
    }
    let all_repos = callees
        .iter()
        .all(|c| local.get(*c).map(|l| l.role == Role::Repository).unwrap_or(false));
    let controller_caller = callers
        .iter()
        .any(|c| local.get(*c).map(|l| l.role == Role::Controller).unwrap_or(false));
    if all_repos && controller_caller {
        return Some(Classification::new(Role::Service, 0.80, "graph:service-sandwich"));
    }
    None
}

/// High fan-in from several files with a weak local result reads as a
/// shared utility.
fn shared_helper(
    current: &Classification,
    callers: &[&str],
    config: &EngineConfig,
) -> Option<Classification> {
    if current.confidence >= config.confidence_threshold || current.role == Role::Utility {
        return None;
    }
    let mut files: Vec<&str> = callers
        .iter()
        .filter_map(|c| c.split_once("::").map(|(f, _)| f))
        .collect();
    files.sort_unstable();
    files.dedup();
    if files.len() >= 3 {
        return Some(Classification::new(Role::Utility, 0.70, "graph:shared-helper"));
    }
    None
}

/// Confidence-weighted vote over fired rules; exact ties fall back to
/// Utility rather than leaving the entity unclassified.
fn vote(fired: Vec<Classification>) -> Option<Classification> {
    if fired.is_empty() {
        return None;
    }
    if fired.len() == 1 {
        return fired.into_iter().next();
    }

    let mut totals: BTreeMap<Role, f64> = BTreeMap::new();
    for candidate in &fired {
        *totals.entry(candidate.role).or_insert(0.0) += candidate.confidence;
    }
    let best = totals.values().cloned().fold(f64::MIN, f64::max);
    let winners: Vec<Role> = totals
        .iter()
        .filter(|(_, w)| **w == best)
        .map(|(r, _)| *r)
        .collect();

    if winners.len() > 1 {
        let confidence = fired
            .iter()
            .map(|c| c.confidence)
            .fold(f64::MIN, f64::max);
        return Some(Classification::new(Role::Utility, confidence, "graph:tie-fallback"));
    }

    let role = winners[0];
    fired.into_iter().find(|c| c.role == role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, UnresolvedReason};

    fn entity(id: &str) -> Entity {
        let (file, name) = id.split_once("::").unwrap();
        Entity {
            id: id.to_string(),
            kind: EntityKind::Function,
            name: name.to_string(),
            qualified_name: name.to_string(),
            file: file.to_string(),
            line_start: 1,
            line_end: 5,
            snippet: String::new(),
            parent: None,
            annotations: vec![],
            complexity: 1,
            is_module_level: true,
        }
    }

    fn call(source: &str, target: &str) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::Calls,
            resolution: Resolution::ResolvedInternal,
            reason: None,
            line: 1,
        }
    }

    fn classified(entries: &[(&str, Role, f64)]) -> BTreeMap<String, Classification> {
        entries
            .iter()
            .map(|(id, role, conf)| (id.to_string(), Classification::new(*role, *conf, "local")))
            .collect()
    }

    #[test]
    fn test_test_only_callers_promotes_subject() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("tests/test_a.py::test_two"),
            entity("src/core.py::target"),
        ];
        let edges = vec![
            call("tests/test_a.py::test_one", "src/core.py::target"),
            call("tests/test_a.py::test_two", "src/core.py::target"),
        ];
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("tests/test_a.py::test_two", Role::Test, 0.88),
            ("src/core.py::target", Role::Utility, 0.30),
        ]);

        let result = apply(&entities, &edges, &local, &EngineConfig::default());
        let target = &result["src/core.py::target"];
        assert_eq!(target.role, Role::TestSubject);
        assert!(target.confidence > 0.30);
        assert_eq!(target.rule, "graph:test-only-callers");
    }

    #[test]
    fn test_mixed_callers_do_not_promote() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("src/app.py::main"),
            entity("src/core.py::target"),
        ];
        let edges = vec![
            call("tests/test_a.py::test_one", "src/core.py::target"),
            call("src/app.py::main", "src/core.py::target"),
        ];
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("src/app.py::main", Role::EntryPoint, 0.85),
            ("src/core.py::target", Role::Utility, 0.30),
        ]);

        let result = apply(&entities, &edges, &local, &EngineConfig::default());
        assert_eq!(result["src/core.py::target"].role, Role::Utility);
    }

    #[test]
    fn test_service_sandwich() {
        let entities = vec![
            entity("src/api.py::OrderController"),
            entity("src/logic.py::process"),
            entity("src/db.py::OrderRepository"),
        ];
        let edges = vec![
            call("src/api.py::OrderController", "src/logic.py::process"),
            call("src/logic.py::process", "src/db.py::OrderRepository"),
        ];
        let local = classified(&[
            ("src/api.py::OrderController", Role::Controller, 0.80),
            ("src/logic.py::process", Role::Utility, 0.30),
            ("src/db.py::OrderRepository", Role::Repository, 0.80),
        ]);

        let result = apply(&entities, &edges, &local, &EngineConfig::default());
        let process = &result["src/logic.py::process"];
        assert_eq!(process.role, Role::Service);
        assert_eq!(process.rule, "graph:service-sandwich");
    }

    #[test]
    fn test_high_confidence_local_result_not_overridden() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("src/db.py::OrderRepository"),
        ];
        let edges = vec![call("tests/test_a.py::test_one", "src/db.py::OrderRepository")];

        // Promoted confidence caps at 0.95, below this local result
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("src/db.py::OrderRepository", Role::Repository, 0.96),
        ]);
        let result = apply(&entities, &edges, &local, &EngineConfig::default());
        assert_eq!(result["src/db.py::OrderRepository"].role, Role::Repository);
    }

    #[test]
    fn test_disabled_rules_do_not_fire() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("src/core.py::target"),
        ];
        let edges = vec![call("tests/test_a.py::test_one", "src/core.py::target")];
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("src/core.py::target", Role::Utility, 0.30),
        ]);

        let config = EngineConfig {
            promotion_rules: vec!["service-sandwich".to_string()],
            ..Default::default()
        };
        let result = apply(&entities, &edges, &local, &config);
        assert_eq!(result["src/core.py::target"].role, Role::Utility);
    }

    #[test]
    fn test_idempotent_on_unchanged_graph() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("src/core.py::target"),
        ];
        let edges = vec![call("tests/test_a.py::test_one", "src/core.py::target")];
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("src/core.py::target", Role::Utility, 0.30),
        ]);

        let config = EngineConfig::default();
        let first = apply(&entities, &edges, &local, &config);
        let second = apply(&entities, &edges, &local, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unresolved_edges_ignored() {
        let entities = vec![
            entity("tests/test_a.py::test_one"),
            entity("src/core.py::target"),
        ];
        let edges = vec![Edge {
            source: "tests/test_a.py::test_one".to_string(),
            target: "src/core.py::target".to_string(),
            kind: EdgeKind::Calls,
            resolution: Resolution::Unresolved,
            reason: Some(UnresolvedReason::Dynamic),
            line: 1,
        }];
        let local = classified(&[
            ("tests/test_a.py::test_one", Role::Test, 0.88),
            ("src/core.py::target", Role::Utility, 0.30),
        ]);

        let result = apply(&entities, &edges, &local, &EngineConfig::default());
        assert_eq!(result["src/core.py::target"].role, Role::Utility);
    }
}
