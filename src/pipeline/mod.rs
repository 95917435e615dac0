//! Analysis pipeline
//!
//! Orchestrates the full run:
//! 1. Walk source files (`.gitignore`-aware) and select adapters
//! 2. Parse, extract, and scope-analyze per file on a worker pool
//!    (share-nothing; producer -> workers -> collector over bounded
//!    crossbeam channels)
//! 3. Barrier, then merged single-threaded phase: edge resolution,
//!    classification, scoring
//! 4. Assemble the fingerprinted output document
//!
//! Per-file failures are isolated and recorded; cancellation is checked
//! between files and already-completed results stay usable.

use crate::config::EngineConfig;
use crate::edges;
use crate::error::{EngineError, Result};
use crate::extract::extract;
use crate::models::{FileFacts, SkipReason, SkippedFile};
use crate::output::GraphDocument;
use crate::parsers::{parse_source, AdapterRegistry, LanguageSpec};
use crate::scope::ScopeTable;
use crate::scoring::ViolationCounts;
use crossbeam_channel::bounded;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CHANNEL_BUFFER: usize = 128;

/// Cooperative cancellation handle. Cloneable; cancelling any clone stops
/// the run between files.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The analysis engine: one immutable configuration, one adapter registry.
pub struct Engine {
    config: EngineConfig,
    registry: AdapterRegistry,
}

/// A work item for the parallel phase
struct FileJob {
    absolute: PathBuf,
    relative: String,
    spec: &'static LanguageSpec,
}

/// Outcome of the per-file phase
enum FileOutcome {
    Analyzed(Box<(FileFacts, ScopeTable)>),
    Skipped(SkippedFile),
}

impl Engine {
    /// Validate the configuration and build the engine. Configuration
    /// problems are fatal here, before any file is touched.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let registry = AdapterRegistry::with_overrides(&config.languages)?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze the tree under `root`.
    pub fn analyze(&self, root: &Path) -> Result<GraphDocument> {
        self.analyze_with_cancel(root, &CancellationToken::new())
    }

    /// Analyze with a cancellation token. Cancellation is honored between
    /// files; results for files already processed are kept.
    pub fn analyze_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<GraphDocument> {
        let jobs = self.collect_files(root)?;
        let candidates = jobs.len();
        info!("analyzing {candidates} candidate files under {}", root.display());

        let (mut analyzed, skipped) = self.run_parallel_phase(jobs, cancel);

        if analyzed.is_empty() {
            if candidates == 0 {
                debug!("no candidate files; producing an empty document");
            } else {
                return Err(EngineError::TotalParseFailure { candidates });
            }
        }

        // Barrier: everything below runs over the complete, merged set
        analyzed.sort_by(|a, b| a.0.file.cmp(&b.0.file));

        let graph = edges::resolve(&analyzed);
        let entities: Vec<_> = analyzed
            .iter()
            .flat_map(|(facts, _)| facts.entities.iter().cloned())
            .collect();

        let classifications = crate::classifier::classify(&entities, &graph.edges, &self.config);
        let violations = collect_violations(&analyzed);
        let quality = crate::scoring::score(
            &entities,
            &graph.edges,
            &classifications,
            &violations,
            &self.config.score_weights,
        );

        if self.config.strict_mode && graph.ambiguous_count > 0 {
            return Err(EngineError::AmbiguousResolution {
                count: graph.ambiguous_count,
            });
        }

        Ok(GraphDocument::assemble(
            root,
            &self.registry,
            entities,
            graph,
            classifications,
            quality,
            skipped,
        ))
    }

    /// Walk the tree and pair every supported file with its adapter.
    fn collect_files(&self, root: &Path) -> Result<Vec<FileJob>> {
        if !root.exists() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", root.display()),
            )));
        }

        let mut jobs = Vec::new();
        for entry in ignore::WalkBuilder::new(root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("walk error: {e}");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();

            // Shebang sniffing only matters for extensionless scripts
            let first_line = if path.extension().is_none() {
                read_first_line(path)
            } else {
                None
            };
            let Some(spec) = self.registry.for_path(path, first_line.as_deref()) else {
                continue;
            };

            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            jobs.push(FileJob {
                absolute: path.to_path_buf(),
                relative,
                spec,
            });
        }

        jobs.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(jobs)
    }

    /// Producer -> workers -> collector. Workers are share-nothing: each
    /// file's parse, extraction, and scope analysis happen on one worker
    /// with no shared mutable state.
    fn run_parallel_phase(
        &self,
        jobs: Vec<FileJob>,
        cancel: &CancellationToken,
    ) -> (Vec<(FileFacts, ScopeTable)>, Vec<SkippedFile>) {
        let workers = self.config.effective_workers().min(jobs.len().max(1));
        let timeout = Duration::from_millis(self.config.parse_timeout_ms);

        let (job_tx, job_rx) = bounded::<FileJob>(CHANNEL_BUFFER);
        let (result_tx, result_rx) = bounded::<FileOutcome>(CHANNEL_BUFFER);

        let producer_cancel = cancel.clone();
        let producer = thread::spawn(move || {
            for job in jobs {
                if producer_cancel.is_cancelled() {
                    debug!("cancellation requested; stopping file feed");
                    break;
                }
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        let mut worker_handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            let worker_cancel = cancel.clone();
            worker_handles.push(thread::spawn(move || {
                for job in rx {
                    if worker_cancel.is_cancelled() {
                        break;
                    }
                    let outcome = process_file(&job, timeout);
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(job_rx);
        drop(result_tx);

        let mut analyzed = Vec::new();
        let mut skipped = Vec::new();
        for outcome in result_rx {
            match outcome {
                FileOutcome::Analyzed(bundle) => analyzed.push(*bundle),
                FileOutcome::Skipped(record) => skipped.push(record),
            }
        }

        let _ = producer.join();
        for handle in worker_handles {
            let _ = handle.join();
        }

        skipped.sort_by(|a, b| a.file.cmp(&b.file));
        (analyzed, skipped)
    }
}

/// Parse, extract, and scope-analyze one file. Failures never propagate;
/// they become skip records and the batch continues.
fn process_file(job: &FileJob, timeout: Duration) -> FileOutcome {
    let source = match std::fs::read_to_string(&job.absolute) {
        Ok(source) => source,
        Err(e) => {
            warn!("failed to read {}: {e}", job.relative);
            return FileOutcome::Skipped(SkippedFile {
                file: job.relative.clone(),
                reason: SkipReason::ParseError { offset: 0 },
            });
        }
    };

    let started = Instant::now();
    let parsed = match parse_source(job.spec, &source, &job.absolute, timeout) {
        Ok(parsed) => parsed,
        Err(EngineError::Parse { offset, .. }) => {
            let reason = if offset == 0 && started.elapsed() >= timeout {
                debug!("parse of {} timed out", job.relative);
                SkipReason::Timeout
            } else {
                debug!("parse error in {} at byte {offset}", job.relative);
                SkipReason::ParseError { offset }
            };
            return FileOutcome::Skipped(SkippedFile {
                file: job.relative.clone(),
                reason,
            });
        }
        Err(_) => {
            return FileOutcome::Skipped(SkippedFile {
                file: job.relative.clone(),
                reason: SkipReason::UnsupportedLanguage,
            });
        }
    };

    let facts = extract(&parsed, &job.relative);
    let scopes = ScopeTable::analyze(&parsed, &facts);
    FileOutcome::Analyzed(Box::new((facts, scopes)))
}

/// Attribute shadowed and dead bindings to their innermost containing
/// entities for the alignment metric.
fn collect_violations(
    analyzed: &[(FileFacts, ScopeTable)],
) -> FxHashMap<String, ViolationCounts> {
    let mut violations: FxHashMap<String, ViolationCounts> = FxHashMap::default();

    for (facts, scopes) in analyzed {
        for binding in scopes.shadowed() {
            let owner = facts
                .containing_entity(binding.line)
                .map(|e| e.id.clone())
                .unwrap_or_else(|| facts.module_entity.clone());
            violations.entry(owner).or_default().shadowed += 1;
        }
        for binding in scopes.unused() {
            let owner = facts
                .containing_entity(binding.line)
                .map(|e| e.id.clone())
                .unwrap_or_else(|| facts.module_entity.clone());
            violations.entry(owner).or_default().dead += 1;
        }
    }

    violations
}

fn read_first_line(path: &Path) -> Option<String> {
    use std::io::{BufRead, BufReader};
    let file = std::fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_engine_rejects_bad_config() {
        let config = EngineConfig {
            confidence_threshold: 7.0,
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(config),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_skipped_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.py", "def fine():\n    return 1\n");
        write(dir.path(), "bad.py", "def broken(:\n");

        let engine = Engine::new(EngineConfig::default()).unwrap();
        let document = engine.analyze(dir.path()).unwrap();

        assert_eq!(document.stats.files_parsed, 1);
        assert_eq!(document.stats.files_skipped, 1);
        assert_eq!(document.skipped.len(), 1);
        assert_eq!(document.skipped[0].file, "bad.py");
        assert!(matches!(
            document.skipped[0].reason,
            SkipReason::ParseError { offset } if offset > 0
        ));
        assert!(document.nodes.iter().any(|n| n.id == "good.py::fine"));
    }

    #[test]
    fn test_empty_root_produces_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let document = engine.analyze(dir.path()).unwrap();
        assert!(document.nodes.is_empty());
        assert_eq!(document.stats.files_parsed, 0);
    }

    #[test]
    fn test_all_files_corrupt_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.py", "def broken(:\n");

        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.analyze(dir.path()),
            Err(EngineError::TotalParseFailure { candidates: 1 })
        ));
    }

    #[test]
    fn test_cancelled_run_keeps_completed_results() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");

        let engine = Engine::new(EngineConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Cancelled before any file: zero parsed out of one candidate
        assert!(matches!(
            engine.analyze_with_cancel(dir.path(), &cancel),
            Err(EngineError::TotalParseFailure { .. })
        ));
    }

    #[test]
    fn test_strict_mode_fails_on_ambiguity() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def go():\n    return transform(1)\n");
        write(dir.path(), "x.py", "def transform(v):\n    return v\n");
        write(dir.path(), "y.py", "def transform(v):\n    return v\n");

        let lenient = Engine::new(EngineConfig::default()).unwrap();
        assert!(lenient.analyze(dir.path()).is_ok());

        let strict = Engine::new(EngineConfig {
            strict_mode: true,
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            strict.analyze(dir.path()),
            Err(EngineError::AmbiguousResolution { count }) if count > 0
        ));
    }
}
