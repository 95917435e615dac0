//! codeatlas: a universal code graph engine
//!
//! Parses multi-language source trees with tree-sitter, extracts typed code
//! entities, resolves imports, calls, and inheritance across files, assigns
//! each entity a structural role, and derives hierarchical quality scores.
//! The result is a single serialized [`GraphDocument`] consumed by external
//! reporting and tooling layers.
//!
//! # Example
//!
//! ```rust,no_run
//! use codeatlas::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let document = engine.analyze(std::path::Path::new("./my-repo"))?;
//! println!("{}", document.to_json()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Pipeline
//!
//! Grammar adapters -> atom extraction -> scope resolution feed the edge
//! extractor, which feeds classification and scoring. Per-file work runs on
//! a worker pool; cross-file resolution runs single-threaded over the
//! merged, immutable entity index. Per-file failures are recorded and
//! skipped; only configuration errors and a run where nothing parsed are
//! fatal.

pub mod classifier;
pub mod config;
pub mod edges;
pub mod error;
pub mod extract;
pub mod models;
pub mod output;
pub mod parsers;
pub mod pipeline;
pub mod scope;
pub mod scoring;

pub use classifier::{Classification, Role};
pub use config::{EngineConfig, ScoreWeights};
pub use error::{EngineError, Result};
pub use models::{Edge, EdgeKind, Entity, EntityKind, Resolution, SkippedFile, UnresolvedReason};
pub use output::GraphDocument;
pub use pipeline::{CancellationToken, Engine};
