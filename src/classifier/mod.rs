//! Structural role classification
//!
//! Two phases. The local heuristic pass scores every entity against naming,
//! annotation, and file-path conventions. The optional graph pass then
//! adjusts low-confidence results from caller/callee role distributions,
//! applying an explicit, configurable priority list of promotion rules.
//! Re-running on an unchanged graph produces identical results: the graph
//! pass reads only the local-pass snapshot.

mod heuristics;
mod inference;

pub use heuristics::classify_local;

use crate::config::EngineConfig;
use crate::models::{Edge, Entity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Fixed role taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Service,
    Repository,
    Entity,
    Controller,
    Utility,
    Test,
    TestSubject,
    Factory,
    Configuration,
    Query,
    Command,
    Validator,
    Transformer,
    EventHandler,
    EntryPoint,
    Exception,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Service => "service",
            Role::Repository => "repository",
            Role::Entity => "entity",
            Role::Controller => "controller",
            Role::Utility => "utility",
            Role::Test => "test",
            Role::TestSubject => "test_subject",
            Role::Factory => "factory",
            Role::Configuration => "configuration",
            Role::Query => "query",
            Role::Command => "command",
            Role::Validator => "validator",
            Role::Transformer => "transformer",
            Role::EventHandler => "event_handler",
            Role::EntryPoint => "entry_point",
            Role::Exception => "exception",
        };
        write!(f, "{name}")
    }
}

impl Role {
    /// Architectural layer rank, outermost first. Test roles have no rank;
    /// layer checks do not apply to them.
    pub fn layer_rank(&self) -> Option<u8> {
        match self {
            Role::Controller | Role::EntryPoint => Some(0),
            Role::Service | Role::Command | Role::Query | Role::EventHandler => Some(1),
            Role::Entity | Role::Validator | Role::Transformer | Role::Factory => Some(2),
            Role::Repository | Role::Configuration | Role::Utility | Role::Exception => Some(3),
            Role::Test | Role::TestSubject => None,
        }
    }
}

/// Per-entity classification result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub role: Role,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Name of the rule or graph pattern that produced this result
    pub rule: String,
}

impl Classification {
    pub fn new(role: Role, confidence: f64, rule: &str) -> Self {
        Self {
            role,
            confidence,
            rule: rule.to_string(),
        }
    }
}

/// Classify every entity. Entities are processed in id order and the result
/// map is ordered, so output is deterministic.
pub fn classify(
    entities: &[Entity],
    edges: &[Edge],
    config: &EngineConfig,
) -> BTreeMap<String, Classification> {
    let mut local: BTreeMap<String, Classification> = BTreeMap::new();
    for entity in entities {
        local.insert(entity.id.clone(), classify_local(entity));
    }

    if !config.use_graph_inference {
        return local;
    }

    let adjusted = inference::apply(entities, edges, &local, config);
    let changed = adjusted
        .iter()
        .filter(|(id, c)| local.get(*id).map(|l| l.role != c.role).unwrap_or(false))
        .count();
    debug!("graph inference adjusted {changed} of {} entities", adjusted.len());
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization_is_snake_case() {
        let json = serde_json::to_string(&Role::TestSubject).unwrap();
        assert_eq!(json, "\"test_subject\"");
        assert_eq!(Role::EventHandler.to_string(), "event_handler");
    }

    #[test]
    fn test_layer_ranks() {
        assert_eq!(Role::Controller.layer_rank(), Some(0));
        assert_eq!(Role::Repository.layer_rank(), Some(3));
        assert_eq!(Role::Test.layer_rank(), None);
        assert!(Role::Controller.layer_rank() < Role::Service.layer_rank());
    }
}
