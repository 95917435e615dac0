//! Grammar adapters built on tree-sitter
//!
//! Every supported language registers one [`LanguageSpec`]: the tree-sitter
//! grammar plus declarative tables describing which node kinds declare
//! entities, open scopes, perform calls, and so on. Extraction and scope
//! analysis are generic walks driven by these tables — adding a language is
//! one new module here, with no change to downstream stages.
//!
//! Adapters are selected through [`AdapterRegistry`], keyed on file extension
//! with shebang sniffing as a fallback for extensionless scripts.

pub mod javascript;
pub mod python;
pub mod rust_lang;
pub mod typescript;

use crate::error::{EngineError, Result};
use crate::models::{EntityKind, RawImport};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tree_sitter::{Language, Node, Parser, Tree};

/// A node kind that declares an entity
pub struct DeclRule {
    pub node_kind: &'static str,
    pub entity_kind: EntityKind,
    /// Field holding the declared name (`name`, `left`, `pattern`, ...)
    pub name_field: &'static str,
    /// Only emit an entity when declared at module scope
    pub module_level_only: bool,
}

/// A node kind that contributes a qualified-name segment for its children
/// without necessarily being an entity itself (e.g. Rust `impl_item`)
pub struct ContainerRule {
    pub node_kind: &'static str,
    pub name_field: &'static str,
}

/// A node kind that is a call expression
pub struct CallRule {
    pub node_kind: &'static str,
    pub callee_field: &'static str,
}

/// A node kind that binds a local name without declaring an entity
/// (loop variables, `let` patterns)
pub struct BindRule {
    pub node_kind: &'static str,
    pub name_field: &'static str,
}

/// A node kind that opens a lexical scope
pub struct ScopeRule {
    pub node_kind: &'static str,
    /// Whether bindings here are visible to nested scopes (class bodies: no)
    pub inherits: bool,
}

/// A member-access node shape: `object_field` is the receiver chain,
/// `member_field` names the accessed member (never a scope reference)
pub struct ChainRule {
    pub node_kind: &'static str,
    pub object_field: &'static str,
    pub member_field: &'static str,
}

/// One language's complete adapter: grammar handle plus extraction tables.
pub struct LanguageSpec {
    pub name: &'static str,
    /// Grammar crate version, part of the output fingerprint
    pub version: &'static str,
    pub extensions: &'static [&'static str],
    /// Substrings matched against a `#!` first line
    pub shebang_hints: &'static [&'static str],
    /// Module path separator as written in imports (`.`, `/`, `::`)
    pub path_separator: &'static str,
    pub grammar: fn() -> Language,

    pub decls: &'static [DeclRule],
    pub containers: &'static [ContainerRule],
    pub calls: &'static [CallRule],
    pub scopes: &'static [ScopeRule],
    /// Local binding forms that do not declare entities
    pub local_defs: &'static [BindRule],
    /// Node kinds whose identifier children are parameter definitions
    pub param_kinds: &'static [&'static str],
    /// Node kinds that add a branch to cyclomatic complexity
    pub branch_kinds: &'static [&'static str],
    /// Node kinds counting as name references in expression position
    pub identifier_kinds: &'static [&'static str],
    /// Decorator / attribute node kinds recorded as entity annotations
    pub annotation_kinds: &'static [&'static str],
    /// Anonymous function node kinds (lambdas, closures, arrows)
    pub anonymous_fn_kinds: &'static [&'static str],
    /// Member-access shapes for receiver-chain flattening
    pub member_access: &'static [ChainRule],
    /// Import statement kinds; their subtrees bind through [`RawImport`]s,
    /// not through ordinary identifier scanning
    pub import_kinds: &'static [&'static str],
    /// File stems whose module entity represents a package index
    pub module_index_stems: &'static [&'static str],
    /// Names resolved straight to `resolved_external` when nothing shadows them
    pub builtins: &'static [&'static str],
    /// Receiver names referring to the enclosing instance (`self`, `this`)
    pub self_names: &'static [&'static str],

    pub collect_imports: fn(Node, &[u8]) -> Vec<RawImport>,
    /// Base-class names for a class-declaration node
    pub collect_bases: fn(Node, &[u8]) -> Vec<String>,
    /// Candidate repository-relative paths a module string may resolve to.
    /// `importer_dir` is the slash-normalized directory of the importing file.
    pub module_candidates: fn(&str, &str) -> Vec<String>,
}

impl LanguageSpec {
    pub fn scope_rule(&self, kind: &str) -> Option<&'static ScopeRule> {
        self.scopes.iter().find(|r| r.node_kind == kind)
    }

    pub fn decl_rule(&self, kind: &str) -> Option<&'static DeclRule> {
        self.decls.iter().find(|r| r.node_kind == kind)
    }

    pub fn container_rule(&self, kind: &str) -> Option<&'static ContainerRule> {
        self.containers.iter().find(|r| r.node_kind == kind)
    }

    pub fn call_rule(&self, kind: &str) -> Option<&'static CallRule> {
        self.calls.iter().find(|r| r.node_kind == kind)
    }

    pub fn chain_rule(&self, kind: &str) -> Option<&'static ChainRule> {
        self.member_access.iter().find(|r| r.node_kind == kind)
    }

    pub fn is_identifier(&self, kind: &str) -> bool {
        self.identifier_kinds.contains(&kind)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(&name)
    }
}

/// A successfully parsed file, ready for extraction and scope analysis
pub struct ParsedFile {
    pub tree: Tree,
    pub source: String,
    pub spec: &'static LanguageSpec,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("tree", &self.tree)
            .field("source", &self.source)
            .field("spec", &self.spec.name)
            .finish()
    }
}

impl ParsedFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }
}

/// All built-in language specs, in registration order.
static BUILTIN_SPECS: &[&LanguageSpec] = &[
    &python::SPEC,
    &typescript::SPEC,
    &javascript::SPEC,
    &rust_lang::SPEC,
];

fn builtin_specs() -> &'static [&'static LanguageSpec] {
    BUILTIN_SPECS
}

/// Look up a built-in spec by language name.
pub fn spec_by_name(name: &str) -> Option<&'static LanguageSpec> {
    builtin_specs().iter().find(|s| s.name == name).copied()
}

/// Registry of grammar adapters, keyed on file extension.
pub struct AdapterRegistry {
    by_ext: FxHashMap<String, &'static LanguageSpec>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut by_ext = FxHashMap::default();
        for spec in builtin_specs() {
            for ext in spec.extensions {
                by_ext.insert(ext.to_string(), *spec);
            }
        }
        Self { by_ext }
    }

    /// Build a registry with extra extension -> language-name mappings.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut registry = Self::new();
        for (ext, language) in overrides {
            let spec = builtin_specs()
                .iter()
                .find(|s| s.name == language)
                .copied()
                .ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "unknown language in extension mapping: {language}"
                    ))
                })?;
            registry.by_ext.insert(ext.clone(), spec);
        }
        Ok(registry)
    }

    /// Select an adapter for a file, sniffing the shebang line when the
    /// extension is missing or unknown.
    pub fn for_path(&self, path: &Path, first_line: Option<&str>) -> Option<&'static LanguageSpec> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if let Some(spec) = self.by_ext.get(ext) {
            return Some(spec);
        }
        let line = first_line?;
        if !line.starts_with("#!") {
            return None;
        }
        builtin_specs()
            .iter()
            .find(|s| s.shebang_hints.iter().any(|h| line.contains(h)))
            .copied()
    }

    /// Registered adapters as `(name, version)`, deduplicated and sorted,
    /// for the configuration fingerprint.
    pub fn adapters(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = self.by_ext.values().map(|s| (s.name, s.version)).collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse source text with the given adapter.
///
/// Returns `EngineError::Parse` carrying the first offending byte offset when
/// the grammar reports a syntax error, or offset 0 when the parser yields
/// nothing at all (timeout or grammar failure).
pub fn parse_source(
    spec: &'static LanguageSpec,
    source: &str,
    path: &Path,
    timeout: Duration,
) -> Result<ParsedFile> {
    let mut parser = Parser::new();
    parser
        .set_language(&(spec.grammar)())
        .map_err(|_| EngineError::UnsupportedLanguage {
            path: path.to_path_buf(),
        })?;
    #[allow(deprecated)]
    parser.set_timeout_micros(timeout.as_micros() as u64);

    let Some(tree) = parser.parse(source, None) else {
        return Err(EngineError::Parse {
            path: path.to_path_buf(),
            offset: 0,
        });
    };

    if tree.root_node().has_error() {
        let offset = first_error_offset(tree.root_node());
        return Err(EngineError::Parse {
            path: path.to_path_buf(),
            offset,
        });
    }

    Ok(ParsedFile {
        tree,
        source: source.to_string(),
        spec,
    })
}

/// Join a relative specifier onto a directory and normalize `.`/`..`
/// segments. Both inputs and the result are slash-separated.
pub(crate) fn join_normalize(dir: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Byte offset of the first error or missing node in the tree.
fn first_error_offset(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_byte();
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_error() || child.is_missing() {
            return first_error_offset(child);
        }
    }
    node.start_byte()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_registry_maps_extensions() {
        let registry = AdapterRegistry::new();
        let py = registry.for_path(&PathBuf::from("a.py"), None).unwrap();
        assert_eq!(py.name, "python");
        let rs = registry.for_path(&PathBuf::from("lib.rs"), None).unwrap();
        assert_eq!(rs.name, "rust");
        assert!(registry.for_path(&PathBuf::from("a.xyz"), None).is_none());
    }

    #[test]
    fn test_shebang_sniffing() {
        let registry = AdapterRegistry::new();
        let spec = registry
            .for_path(&PathBuf::from("runme"), Some("#!/usr/bin/env python3"))
            .unwrap();
        assert_eq!(spec.name, "python");
        assert!(registry
            .for_path(&PathBuf::from("runme"), Some("import os"))
            .is_none());
    }

    #[test]
    fn test_extension_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("pyw".to_string(), "python".to_string());
        let registry = AdapterRegistry::with_overrides(&overrides).unwrap();
        let spec = registry.for_path(&PathBuf::from("gui.pyw"), None).unwrap();
        assert_eq!(spec.name, "python");

        overrides.insert("x".to_string(), "cobol".to_string());
        assert!(AdapterRegistry::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_parse_error_reports_offset() {
        let path = PathBuf::from("bad.py");
        let err = parse_source(
            &python::SPEC,
            "def broken(:\n    pass\n",
            &path,
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            EngineError::Parse { offset, .. } => assert!(offset > 0),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_ok() {
        let path = PathBuf::from("ok.py");
        let parsed = parse_source(
            &python::SPEC,
            "def fine():\n    return 1\n",
            &path,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(parsed.root().kind(), "module");
    }

    #[test]
    fn test_adapters_sorted_for_fingerprint() {
        let registry = AdapterRegistry::new();
        let adapters = registry.adapters();
        assert!(adapters.iter().any(|(n, _)| *n == "python"));
        let mut sorted = adapters.clone();
        sorted.sort_unstable();
        assert_eq!(adapters, sorted);
    }
}
