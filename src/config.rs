//! Engine configuration
//!
//! One immutable `EngineConfig` is passed to the engine at construction; there
//! is no process-wide mutable registry. Optional per-project overrides load
//! from `codeatlas.toml` at the repository root.
//!
//! ```toml
//! # codeatlas.toml
//! use_graph_inference = true
//! confidence_threshold = 0.6
//! promotion_rules = ["test-only-callers", "service-sandwich", "shared-helper"]
//!
//! [score_weights]
//! parts = 0.5
//! intrinsic = 0.5
//!
//! [languages]
//! pyi = "python"
//! ```
//!
//! Every output document carries a fingerprint hashing the taxonomy version,
//! rule-set version, and registered grammar adapters, so two documents are
//! comparable only when their fingerprints match.

use crate::error::{EngineError, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Version of the role taxonomy baked into the classifier.
pub const TAXONOMY_VERSION: &str = "3";

/// Version of the heuristic + promotion rule set.
pub const RULESET_VERSION: &str = "7";

/// Promotion rule names accepted in `promotion_rules`.
pub const KNOWN_PROMOTION_RULES: &[&str] =
    &["test-only-callers", "service-sandwich", "shared-helper"];

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights for the quality scorer. `parts`/`intrinsic` combine child and
/// intrinsic quality; the six metric weights must sum to 1.0.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreWeights {
    pub parts: f64,
    pub intrinsic: f64,
    pub alignment: f64,
    pub coherence: f64,
    pub density: f64,
    pub completeness: f64,
    pub simplicity: f64,
    pub purity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            parts: 0.5,
            intrinsic: 0.5,
            alignment: 0.20,
            coherence: 0.20,
            density: 0.15,
            completeness: 0.15,
            simplicity: 0.15,
            purity: 0.15,
        }
    }
}

impl ScoreWeights {
    fn metric_sum(&self) -> f64 {
        self.alignment
            + self.coherence
            + self.density
            + self.completeness
            + self.simplicity
            + self.purity
    }
}

/// Immutable engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Run the graph-based classification pass after local heuristics
    pub use_graph_inference: bool,
    /// Fail the run (after completing it) when any edge resolved ambiguous
    pub strict_mode: bool,
    /// Local classifications below this confidence are open to graph override
    pub confidence_threshold: f64,
    /// Worker threads for the per-file phase; 0 = available parallelism
    pub workers: usize,
    /// Per-file parse timeout in milliseconds
    pub parse_timeout_ms: u64,
    /// Graph promotion rules, applied in order
    pub promotion_rules: Vec<String>,
    pub score_weights: ScoreWeights,
    /// Extra extension -> language-name mappings (e.g. `pyw = "python"`)
    pub languages: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_graph_inference: true,
            strict_mode: false,
            confidence_threshold: 0.6,
            workers: 0,
            parse_timeout_ms: 10_000,
            promotion_rules: KNOWN_PROMOTION_RULES
                .iter()
                .map(|r| r.to_string())
                .collect(),
            score_weights: ScoreWeights::default(),
            languages: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `codeatlas.toml` under `root`, falling back to
    /// defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("codeatlas.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config: EngineConfig = toml::from_str(&text)
            .map_err(|e| EngineError::Configuration(format!("{}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate the configuration. Called once at engine construction;
    /// any error here is fatal to the run.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::Configuration(format!(
                "confidence_threshold must be in [0.0, 1.0], got {}",
                self.confidence_threshold
            )));
        }
        let w = &self.score_weights;
        if (w.parts + w.intrinsic - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Configuration(format!(
                "score_weights.parts + score_weights.intrinsic must sum to 1.0, got {}",
                w.parts + w.intrinsic
            )));
        }
        if (w.metric_sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Configuration(format!(
                "the six metric weights must sum to 1.0, got {}",
                w.metric_sum()
            )));
        }
        for rule in &self.promotion_rules {
            if !KNOWN_PROMOTION_RULES.contains(&rule.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "unknown promotion rule: {rule}"
                )));
            }
        }
        Ok(())
    }

    /// Number of worker threads to use for the per-file phase.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Deterministic hash of the taxonomy version, rule-set version, and the
/// registered grammar adapters. `adapters` is `(language name, version)`.
pub fn fingerprint(adapters: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"taxonomy=");
    hasher.update(TAXONOMY_VERSION.as_bytes());
    hasher.update(b";rules=");
    hasher.update(RULESET_VERSION.as_bytes());
    for (name, version) in adapters {
        hasher.update(b";adapter=");
        hasher.update(name.as_bytes());
        hasher.update(b"@");
        hasher.update(version.as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}
