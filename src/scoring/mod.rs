//! Quality scoring over the containment hierarchy
//!
//! Computes `Q(H) = w_parts * avg(Q_children) + w_intrinsic * I(H)` bottom-up
//! (entity -> file -> module directory). `I(H)` blends six sub-metrics, each
//! normalized to [0, 1] before weighting:
//!
//! - alignment     rule-violation penalty (shadowed / dead bindings)
//! - coherence     entropy of contained entity kinds
//! - density       signal-to-noise ratio of children, blended with
//!                 complexity per line
//! - completeness  expected-vs-actual children for the assigned role
//! - simplicity    inverse-log complexity
//! - purity        layer consistency of outgoing calls
//!
//! The scorer reads the graph and classifications and never mutates either;
//! scores are derived values, recomputed deterministically on every run.

use crate::classifier::{Classification, Role};
use crate::config::ScoreWeights;
use crate::models::{Edge, EdgeKind, Entity, EntityKind, Resolution};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Violation counts attributed to one entity by the scope resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ViolationCounts {
    pub shadowed: usize,
    pub dead: usize,
}

const SHADOW_PENALTY: f64 = 0.2;
const DEAD_PENALTY: f64 = 0.2;
const LAYER_VIOLATION_PENALTY: f64 = 0.3;

/// Per-entity quality breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityScore {
    pub total: f64,
    pub intrinsic: f64,
    pub alignment: f64,
    pub coherence: f64,
    pub density: f64,
    pub completeness: f64,
    pub simplicity: f64,
    pub purity: f64,
}

/// Score distribution over all entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub moderate: usize,
    pub poor: usize,
}

/// Complete quality report for the analyzed tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub per_entity: BTreeMap<String, QualityScore>,
    /// File path -> score of its module entity
    pub per_file: BTreeMap<String, f64>,
    /// Directory -> mean of contained file scores
    pub per_module: BTreeMap<String, f64>,
    pub overall: f64,
    pub distribution: ScoreDistribution,
}

/// Score every entity, file, and module directory.
pub fn score(
    entities: &[Entity],
    edges: &[Edge],
    classifications: &BTreeMap<String, Classification>,
    violations: &FxHashMap<String, ViolationCounts>,
    weights: &ScoreWeights,
) -> QualityReport {
    let mut children: FxHashMap<&str, Vec<&Entity>> = FxHashMap::default();
    for entity in entities {
        if let Some(parent) = &entity.parent {
            children.entry(parent.as_str()).or_default().push(entity);
        }
    }

    // Outgoing internal call targets per source, for the purity metric
    let mut calls_out: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for edge in edges {
        if edge.kind == EdgeKind::Calls && edge.resolution == Resolution::ResolvedInternal {
            calls_out
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    // Children strictly nest inside their parents, so processing by
    // ascending span (deepest qualified name first on ties) scores every
    // child before its container
    let mut ordered: Vec<&Entity> = entities.iter().collect();
    ordered.sort_by_key(|e| {
        (
            e.line_end - e.line_start,
            std::cmp::Reverse(e.qualified_name.matches('.').count()),
            e.id.clone(),
        )
    });

    let mut totals: FxHashMap<&str, f64> = FxHashMap::default();
    let mut per_entity: BTreeMap<String, QualityScore> = BTreeMap::new();

    for entity in ordered {
        let kids = children
            .get(entity.id.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let child_scores: Vec<f64> = kids
            .iter()
            .filter_map(|c| totals.get(c.id.as_str()).copied())
            .collect();

        let quality = intrinsic_quality(
            entity,
            kids,
            &calls_out,
            classifications,
            violations,
            weights,
        );
        // No children: assume the parts are fine and let intrinsic quality
        // dominate through the propagation formula
        let avg_children = if child_scores.is_empty() {
            1.0
        } else {
            child_scores.iter().sum::<f64>() / child_scores.len() as f64
        };
        let total = (weights.parts * avg_children + weights.intrinsic * quality.intrinsic)
            .clamp(0.0, 1.0);

        totals.insert(entity.id.as_str(), total);
        per_entity.insert(
            entity.id.clone(),
            QualityScore {
                total,
                ..quality
            },
        );
    }

    let per_file: BTreeMap<String, f64> = entities
        .iter()
        .filter(|e| matches!(e.kind, EntityKind::File | EntityKind::Module) && e.parent.is_none())
        .map(|e| (e.file.clone(), totals[e.id.as_str()]))
        .collect();

    let mut module_files: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (file, file_score) in &per_file {
        let dir = match file.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        };
        module_files.entry(dir).or_default().push(*file_score);
    }
    let per_module: BTreeMap<String, f64> = module_files
        .into_iter()
        .map(|(dir, scores)| {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            (dir, mean)
        })
        .collect();

    let all: Vec<f64> = per_entity.values().map(|q| q.total).collect();
    let overall = if all.is_empty() {
        0.0
    } else {
        all.iter().sum::<f64>() / all.len() as f64
    };

    let mut distribution = ScoreDistribution::default();
    for q in &all {
        if *q >= 0.85 {
            distribution.excellent += 1;
        } else if *q >= 0.70 {
            distribution.good += 1;
        } else if *q >= 0.50 {
            distribution.moderate += 1;
        } else {
            distribution.poor += 1;
        }
    }

    QualityReport {
        per_entity,
        per_file,
        per_module,
        overall,
        distribution,
    }
}

fn intrinsic_quality(
    entity: &Entity,
    children: &[&Entity],
    calls_out: &FxHashMap<&str, Vec<&str>>,
    classifications: &BTreeMap<String, Classification>,
    violations: &FxHashMap<String, ViolationCounts>,
    weights: &ScoreWeights,
) -> QualityScore {
    let alignment = alignment_score(entity, violations);
    let coherence = coherence_score(children);
    let density = density_score(entity, children);
    let completeness = completeness_score(entity, children, classifications);
    let simplicity = simplicity_score(entity.complexity);
    let purity = purity_score(entity, calls_out, classifications);

    let intrinsic = weights.alignment * alignment
        + weights.coherence * coherence
        + weights.density * density
        + weights.completeness * completeness
        + weights.simplicity * simplicity
        + weights.purity * purity;

    QualityScore {
        total: 0.0,
        intrinsic,
        alignment,
        coherence,
        density,
        completeness,
        simplicity,
        purity,
    }
}

/// 1 - weighted violation count, floored at 0.
fn alignment_score(entity: &Entity, violations: &FxHashMap<String, ViolationCounts>) -> f64 {
    let Some(counts) = violations.get(&entity.id) else {
        return 1.0;
    };
    let penalty = SHADOW_PENALTY * counts.shadowed as f64 + DEAD_PENALTY * counts.dead as f64;
    (1.0 - penalty).max(0.0)
}

/// Focus via Shannon entropy of contained entity kinds: low entropy reads as
/// a focused container, high entropy as a grab-bag.
fn coherence_score(children: &[&Entity]) -> f64 {
    if children.len() <= 1 {
        return 1.0;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for child in children {
        *counts
            .entry(match child.kind {
                EntityKind::Function => "function",
                EntityKind::Class => "class",
                EntityKind::Variable => "variable",
                EntityKind::Module => "module",
                EntityKind::File => "file",
            })
            .or_insert(0) += 1;
    }
    if counts.len() <= 1 {
        return 1.0;
    }

    let total = children.len() as f64;
    let mut entropy = 0.0;
    for count in counts.values() {
        let p = *count as f64 / total;
        entropy -= p * p.log2();
    }
    let max_entropy = (counts.len() as f64).log2();
    let normalized = if max_entropy > 0.0 {
        entropy / max_entropy
    } else {
        0.0
    };
    1.0 / (1.0 + normalized)
}

/// Signal-to-noise over children blended with complexity per line.
fn density_score(entity: &Entity, children: &[&Entity]) -> f64 {
    let base = if children.is_empty() {
        match entity.kind {
            EntityKind::Function | EntityKind::Class => 1.0,
            _ => 0.6,
        }
    } else {
        let signal = children
            .iter()
            .filter(|c| matches!(c.kind, EntityKind::Function | EntityKind::Class))
            .count() as f64;
        let ratio = signal / children.len() as f64;
        0.2 + 0.8 * ratio
    };

    let loc = (entity.line_end.saturating_sub(entity.line_start) + 1) as f64;
    let complexity_factor = 1.0 / (1.0 + entity.complexity as f64 / loc);

    (base + complexity_factor) / 2.0
}

/// Expected children present for the entity's role.
fn completeness_score(
    entity: &Entity,
    children: &[&Entity],
    classifications: &BTreeMap<String, Classification>,
) -> f64 {
    if entity.kind == EntityKind::Class {
        let methods = children
            .iter()
            .filter(|c| c.kind == EntityKind::Function)
            .count();
        let role = classifications.get(&entity.id).map(|c| c.role);
        let expected = match role {
            Some(Role::Repository) => 2,
            Some(Role::Service) | Some(Role::Controller) | Some(Role::Factory) => 1,
            _ => 1,
        };
        if methods >= expected {
            return 1.0;
        }
        if methods > 0 {
            return methods as f64 / expected as f64;
        }
        return 0.3;
    }

    if matches!(entity.kind, EntityKind::File | EntityKind::Module) && children.is_empty() {
        // A file with nothing extracted is carrying little weight
        return 0.5;
    }

    1.0
}

/// Inverse-log complexity: complexity 1 scores 1.0 and decays slowly.
fn simplicity_score(complexity: u32) -> f64 {
    if complexity <= 1 {
        return 1.0;
    }
    1.0 / (1.0 + (1.0 + complexity as f64).ln())
}

/// Outgoing calls against the layer order (e.g. a repository calling a
/// controller) erode purity.
fn purity_score(
    entity: &Entity,
    calls_out: &FxHashMap<&str, Vec<&str>>,
    classifications: &BTreeMap<String, Classification>,
) -> f64 {
    let Some(caller_rank) = classifications
        .get(&entity.id)
        .and_then(|c| c.role.layer_rank())
    else {
        return 1.0;
    };
    let Some(targets) = calls_out.get(entity.id.as_str()) else {
        return 1.0;
    };

    let mut purity: f64 = 1.0;
    for target in targets {
        let Some(callee_rank) = classifications
            .get(*target)
            .and_then(|c| c.role.layer_rank())
        else {
            continue;
        };
        if callee_rank < caller_rank {
            purity -= LAYER_VIOLATION_PENALTY;
        }
    }
    purity.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;

    fn entity(id: &str, kind: EntityKind, parent: Option<&str>, complexity: u32) -> Entity {
        let (file, qualified) = id.split_once("::").unwrap();
        Entity {
            id: id.to_string(),
            kind,
            name: qualified.rsplit('.').next().unwrap().to_string(),
            qualified_name: qualified.to_string(),
            file: file.to_string(),
            line_start: 1,
            line_end: match kind {
                EntityKind::File | EntityKind::Module => 100,
                EntityKind::Class => 50,
                _ => 10,
            },
            snippet: String::new(),
            parent: parent.map(|p| p.to_string()),
            annotations: vec![],
            complexity,
            is_module_level: parent.map(|p| p.ends_with("::a")).unwrap_or(true),
        }
    }

    fn classify(entries: &[(&str, Role)]) -> BTreeMap<String, Classification> {
        entries
            .iter()
            .map(|(id, role)| (id.to_string(), Classification::new(*role, 0.8, "t")))
            .collect()
    }

    #[test]
    fn test_simplicity_decays_with_complexity() {
        assert_eq!(simplicity_score(1), 1.0);
        assert!(simplicity_score(5) > simplicity_score(20));
        assert!(simplicity_score(20) > 0.0);
    }

    #[test]
    fn test_scores_bounded_and_propagated() {
        let entities = vec![
            entity("a.py::a", EntityKind::File, None, 1),
            entity("a.py::Repo", EntityKind::Class, Some("a.py::a"), 1),
            entity("a.py::Repo.save", EntityKind::Function, Some("a.py::Repo"), 3),
            entity("a.py::Repo.find", EntityKind::Function, Some("a.py::Repo"), 2),
        ];
        let classifications = classify(&[
            ("a.py::a", Role::Utility),
            ("a.py::Repo", Role::Repository),
            ("a.py::Repo.save", Role::Command),
            ("a.py::Repo.find", Role::Query),
        ]);

        let report = score(
            &entities,
            &[],
            &classifications,
            &FxHashMap::default(),
            &ScoreWeights::default(),
        );

        for q in report.per_entity.values() {
            assert!((0.0..=1.0).contains(&q.total));
            assert!((0.0..=1.0).contains(&q.intrinsic));
        }
        assert_eq!(report.per_file.len(), 1);
        assert!(report.per_file.contains_key("a.py"));
        assert!(report.overall > 0.0);
        // Repository with two methods meets its expectation
        assert_eq!(report.per_entity["a.py::Repo"].completeness, 1.0);
    }

    #[test]
    fn test_violations_reduce_alignment() {
        let entities = vec![entity("a.py::f", EntityKind::Function, None, 1)];
        let classifications = classify(&[("a.py::f", Role::Utility)]);
        let mut violations = FxHashMap::default();
        violations.insert(
            "a.py::f".to_string(),
            ViolationCounts {
                shadowed: 1,
                dead: 1,
            },
        );

        let report = score(
            &entities,
            &[],
            &classifications,
            &violations,
            &ScoreWeights::default(),
        );
        let aligned = report.per_entity["a.py::f"].alignment;
        assert!((aligned - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_layer_violation_reduces_purity() {
        let entities = vec![
            entity("a.py::repo", EntityKind::Function, None, 1),
            entity("a.py::ctrl", EntityKind::Function, None, 1),
        ];
        let classifications = classify(&[
            ("a.py::repo", Role::Repository),
            ("a.py::ctrl", Role::Controller),
        ]);
        let edges = vec![Edge {
            source: "a.py::repo".to_string(),
            target: "a.py::ctrl".to_string(),
            kind: EdgeKind::Calls,
            resolution: Resolution::ResolvedInternal,
            reason: None,
            line: 1,
        }];

        let report = score(
            &entities,
            &edges,
            &classifications,
            &FxHashMap::default(),
            &ScoreWeights::default(),
        );
        assert!((report.per_entity["a.py::repo"].purity - 0.7).abs() < 1e-9);
        assert_eq!(report.per_entity["a.py::ctrl"].purity, 1.0);
    }

    #[test]
    fn test_empty_class_scores_low_completeness() {
        let entities = vec![
            entity("a.py::a", EntityKind::File, None, 1),
            entity("a.py::Empty", EntityKind::Class, Some("a.py::a"), 1),
        ];
        let classifications = classify(&[
            ("a.py::a", Role::Utility),
            ("a.py::Empty", Role::Entity),
        ]);

        let report = score(
            &entities,
            &[],
            &classifications,
            &FxHashMap::default(),
            &ScoreWeights::default(),
        );
        assert_eq!(report.per_entity["a.py::Empty"].completeness, 0.3);
    }

    #[test]
    fn test_deterministic() {
        let entities = vec![
            entity("a.py::a", EntityKind::File, None, 1),
            entity("a.py::f", EntityKind::Function, Some("a.py::a"), 4),
        ];
        let classifications = classify(&[("a.py::a", Role::Utility), ("a.py::f", Role::Query)]);

        let a = score(
            &entities,
            &[],
            &classifications,
            &FxHashMap::default(),
            &ScoreWeights::default(),
        );
        let b = score(
            &entities,
            &[],
            &classifications,
            &FxHashMap::default(),
            &ScoreWeights::default(),
        );
        assert_eq!(a.per_entity, b.per_entity);
        assert_eq!(a.overall, b.overall);
    }
}
