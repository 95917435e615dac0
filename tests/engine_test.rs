//! End-to-end engine scenarios over temporary repositories

use codeatlas::{Engine, EngineConfig, Resolution, Role, UnresolvedReason};
use std::fs;
use std::path::Path;

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

#[test]
fn reruns_on_unchanged_source_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "pkg/a.py",
        "from pkg.b import helper\n\ndef main():\n    return helper()\n",
    );
    write(dir.path(), "pkg/b.py", "def helper():\n    return 42\n");
    write(
        dir.path(),
        "src/util.ts",
        "export function helper(): number {\n  return 1;\n}\n",
    );

    let first = engine().analyze(dir.path()).unwrap();
    let second = engine().analyze(dir.path()).unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn import_and_call_resolve_to_helper_then_flip_to_not_found() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "pkg/a.py",
        "from pkg.b import helper\n\ndef main():\n    return helper()\n",
    );
    write(dir.path(), "pkg/b.py", "def helper():\n    return 42\n");

    let document = engine().analyze(dir.path()).unwrap();
    let import = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Imports)
        .unwrap();
    assert_eq!(import.resolution, Resolution::ResolvedInternal);
    assert_eq!(import.target, "pkg/b.py::helper");

    let call = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Calls && e.target.contains("helper"))
        .unwrap();
    assert_eq!(call.resolution, Resolution::ResolvedInternal);
    assert_eq!(call.source, "pkg/a.py::main");
    assert_eq!(document.stats.import_resolution.resolved_internal, 1);

    // Delete helper and re-run: the same edge becomes unresolved/not_found
    write(dir.path(), "pkg/b.py", "def other():\n    return 0\n");
    let document = engine().analyze(dir.path()).unwrap();
    let import = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Imports)
        .unwrap();
    assert_eq!(import.resolution, Resolution::Unresolved);
    assert_eq!(import.reason, Some(UnresolvedReason::NotFound));
    assert_eq!(document.stats.import_resolution.unresolved, 1);
}

#[test]
fn alias_import_points_call_at_original_entity() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "pkg/a.py",
        "from pkg.b import helper as h\n\ndef main():\n    return h()\n",
    );
    write(dir.path(), "pkg/b.py", "def helper():\n    return 42\n");

    let document = engine().analyze(dir.path()).unwrap();
    let call = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Calls && e.source == "pkg/a.py::main")
        .unwrap();
    assert_eq!(call.resolution, Resolution::ResolvedInternal);
    assert_eq!(call.target, "pkg/b.py::helper");
    // No synthetic alias entity exists
    assert!(!document.nodes.iter().any(|n| n.name == "h"));
}

#[test]
fn whole_module_import_without_default_export_is_file_node() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.py", "import util\n\ndef go():\n    return util.helper()\n");
    write(dir.path(), "util.py", "def helper():\n    return 1\n");

    let document = engine().analyze(dir.path()).unwrap();
    let import = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Imports)
        .unwrap();
    assert_eq!(import.resolution, Resolution::ResolvedToFileNode);
    assert_eq!(import.target, "util.py::util");
    assert_eq!(document.stats.import_resolution.resolved_to_file_no_node, 1);

    // Member access through the module still resolves to the symbol
    let call = document
        .edges
        .iter()
        .find(|e| e.kind == codeatlas::EdgeKind::Calls && e.source == "app.py::go")
        .unwrap();
    assert_eq!(call.resolution, Resolution::ResolvedInternal);
    assert_eq!(call.target, "util.py::helper");
}

#[test]
fn test_only_callers_promote_subject_with_raised_confidence() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/core.py",
        "def frobnicate(x):\n    return x + 1\n",
    );
    write(
        dir.path(),
        "tests/test_core.py",
        "from src.core import frobnicate\n\ndef test_one():\n    assert frobnicate(1) == 2\n\ndef test_two():\n    assert frobnicate(2) == 3\n",
    );

    // Local-only pass for the confidence baseline
    let local_only = Engine::new(EngineConfig {
        use_graph_inference: false,
        ..Default::default()
    })
    .unwrap()
    .analyze(dir.path())
    .unwrap();
    let baseline = local_only
        .nodes
        .iter()
        .find(|n| n.id == "src/core.py::frobnicate")
        .unwrap();

    let document = engine().analyze(dir.path()).unwrap();
    let subject = document
        .nodes
        .iter()
        .find(|n| n.id == "src/core.py::frobnicate")
        .unwrap();

    assert_eq!(subject.role, Role::TestSubject);
    assert!(subject.confidence > baseline.confidence);
    assert_eq!(subject.rule, "graph:test-only-callers");
}

#[test]
fn mixed_language_tree_analyzes_in_one_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "svc.py", "class OrderService:\n    def run(self):\n        return 1\n");
    write(
        dir.path(),
        "web/app.ts",
        "import { helper } from './util';\n\nexport function main(): number {\n  return helper();\n}\n",
    );
    write(
        dir.path(),
        "web/util.ts",
        "export function helper(): number {\n  return 1;\n}\n",
    );
    write(
        dir.path(),
        "lib.rs",
        "mod store;\n\nuse store::fetch;\n\npub fn run() -> u32 {\n    fetch()\n}\n",
    );
    write(dir.path(), "store.rs", "pub struct Store;\n\npub fn fetch() -> u32 {\n    7\n}\n");

    let document = engine().analyze(dir.path()).unwrap();

    assert_eq!(document.stats.files_parsed, 5);
    assert!(document.nodes.iter().any(|n| n.id == "svc.py::OrderService.run"));
    assert!(document.nodes.iter().any(|n| n.id == "web/util.ts::helper"));
    assert!(document.nodes.iter().any(|n| n.id == "store.rs::fetch"));

    let ts_call = document
        .edges
        .iter()
        .find(|e| e.source == "web/app.ts::main" && e.kind == codeatlas::EdgeKind::Calls)
        .unwrap();
    assert_eq!(ts_call.target, "web/util.ts::helper");

    let rs_call = document
        .edges
        .iter()
        .find(|e| e.source == "lib.rs::run" && e.kind == codeatlas::EdgeKind::Calls)
        .unwrap();
    assert_eq!(rs_call.target, "store.rs::fetch");

    // Service class picked up by suffix heuristics
    let svc = document
        .nodes
        .iter()
        .find(|n| n.id == "svc.py::OrderService")
        .unwrap();
    assert_eq!(svc.role, Role::Service);
}

#[test]
fn quality_scores_cover_entities_and_files() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "repo.py",
        "class UserRepository:\n    def save(self, user):\n        return user\n\n    def find(self, user_id):\n        return user_id\n",
    );

    let document = engine().analyze(dir.path()).unwrap();

    assert!(document.quality.per_file.contains_key("repo.py"));
    let class_score = &document.quality.per_entity["repo.py::UserRepository"];
    assert!(class_score.total > 0.0 && class_score.total <= 1.0);
    assert_eq!(class_score.completeness, 1.0);
    assert!(document.quality.overall > 0.0);
}

#[test]
fn skipped_files_are_reported_with_reasons() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok.py", "def fine():\n    return 1\n");
    write(dir.path(), "broken.py", "def broken(:\n    pass\n");
    write(dir.path(), "notes.txt", "not code\n");

    let document = engine().analyze(dir.path()).unwrap();

    // Unsupported extensions are not candidates at all; syntax errors are
    assert_eq!(document.stats.files_parsed, 1);
    assert_eq!(document.stats.files_skipped, 1);
    assert_eq!(document.skipped[0].file, "broken.py");
}

#[test]
fn fingerprints_differ_only_with_configuration_surface() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    return 1\n");

    let one = engine().analyze(dir.path()).unwrap();

    // Different tuning, same taxonomy / rules / adapters: same fingerprint
    let two = Engine::new(EngineConfig {
        confidence_threshold: 0.9,
        ..Default::default()
    })
    .unwrap()
    .analyze(dir.path())
    .unwrap();
    assert_eq!(one.fingerprint, two.fingerprint);
}
