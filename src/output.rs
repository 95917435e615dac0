//! Serialized graph document
//!
//! The engine's single output: entities with their classifications, resolved
//! edges, resolution statistics, quality scores, and skip records. Every
//! document carries a configuration fingerprint; two documents are
//! comparable only when their fingerprints match. All collections are
//! sorted so unchanged source yields byte-identical output.

use crate::classifier::{Classification, Role};
use crate::config;
use crate::edges::{ImportResolutionStats, ResolvedGraph};
use crate::models::{Edge, Entity, EntityKind, SkippedFile};
use crate::parsers::AdapterRegistry;
use crate::scoring::QualityReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One entity in the output document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    pub qualified_name: String,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub role: Role,
    pub confidence: f64,
    /// Rule or graph pattern that produced the role
    pub rule: String,
}

/// Run statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub entities: usize,
    pub edges: usize,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub import_resolution: ImportResolutionStats,
}

/// The complete analysis output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Hash of taxonomy version, rule-set version, and grammar adapters
    pub fingerprint: String,
    pub root: String,
    pub nodes: Vec<NodeDoc>,
    pub edges: Vec<Edge>,
    pub stats: Stats,
    pub quality: QualityReport,
    pub skipped: Vec<SkippedFile>,
}

impl GraphDocument {
    pub(crate) fn assemble(
        root: &Path,
        registry: &AdapterRegistry,
        entities: Vec<Entity>,
        graph: ResolvedGraph,
        classifications: BTreeMap<String, Classification>,
        quality: QualityReport,
        skipped: Vec<SkippedFile>,
    ) -> Self {
        let mut nodes: Vec<NodeDoc> = entities
            .into_iter()
            .map(|entity| {
                let classification = classifications
                    .get(&entity.id)
                    .cloned()
                    .unwrap_or_else(|| Classification::new(Role::Utility, 0.0, "missing"));
                NodeDoc {
                    id: entity.id,
                    kind: entity.kind,
                    name: entity.name,
                    qualified_name: entity.qualified_name,
                    file: entity.file,
                    line_start: entity.line_start,
                    line_end: entity.line_end,
                    role: classification.role,
                    confidence: classification.confidence,
                    rule: classification.rule,
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges = graph.edges;
        edges.sort_by(|a, b| {
            (a.source.as_str(), a.line, a.kind as u8, a.target.as_str()).cmp(&(
                b.source.as_str(),
                b.line,
                b.kind as u8,
                b.target.as_str(),
            ))
        });

        let mut edges_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for edge in &edges {
            *edges_by_kind.entry(edge.kind.to_string()).or_insert(0) += 1;
        }

        let files_parsed = quality.per_file.len();
        let stats = Stats {
            files_parsed,
            files_skipped: skipped.len(),
            entities: nodes.len(),
            edges: edges.len(),
            edges_by_kind,
            import_resolution: graph.import_stats,
        };

        GraphDocument {
            fingerprint: config::fingerprint(&registry.adapters()),
            root: root.to_string_lossy().replace('\\', "/"),
            nodes,
            edges,
            stats,
            quality,
            skipped,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
