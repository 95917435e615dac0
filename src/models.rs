//! Core data models for codeatlas
//!
//! These models are shared across the extraction, resolution, classification,
//! and scoring stages. Identity fields are owned by the extractor; downstream
//! stages attach annotations (role, confidence, score) but never rewrite them.

use serde::{Deserialize, Serialize};

/// Build the canonical entity id: `<relative file path>::<qualified name>`.
///
/// Ids are stable across runs on unchanged source, which makes output
/// documents diffable between analysis runs.
pub fn entity_id(file: &str, qualified_name: &str) -> String {
    format!("{file}::{qualified_name}")
}

/// Kinds of extracted code entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Function,
    Class,
    Variable,
    /// Package index file (`__init__.py`, `mod.rs`, `index.ts`, ...)
    Module,
    /// Any other source file's whole-file node
    File,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Function => write!(f, "function"),
            EntityKind::Class => write!(f, "class"),
            EntityKind::Variable => write!(f, "variable"),
            EntityKind::Module => write!(f, "module"),
            EntityKind::File => write!(f, "file"),
        }
    }
}

/// A single extracted code entity (function, class, variable, module, file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical id: `<relative file path>::<qualified name>`
    pub id: String,
    pub kind: EntityKind,
    /// Short name (last path segment of the qualified name)
    pub name: String,
    /// Dotted name including container context, e.g. `MyClass.method`
    pub qualified_name: String,
    /// Relative file path, slash-normalized
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    /// First source line of the declaration, trimmed
    pub snippet: String,
    /// Id of the containing entity (class for methods, file node otherwise)
    pub parent: Option<String>,
    /// Decorators / attributes attached to the declaration
    pub annotations: Vec<String>,
    /// Cyclomatic complexity of the entity's subtree
    pub complexity: u32,
    /// Declared directly at module scope (candidate export)
    pub is_module_level: bool,
}

/// Edge kinds in the code graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    References,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Calls => write!(f, "calls"),
            EdgeKind::Imports => write!(f, "imports"),
            EdgeKind::Inherits => write!(f, "inherits"),
            EdgeKind::References => write!(f, "references"),
        }
    }
}

/// Outcome of matching a reference against a concrete target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Target entity id is known inside the analyzed tree
    ResolvedInternal,
    /// Target lives outside the analyzed tree (stdlib, third-party)
    ResolvedExternal,
    /// Target is a whole-file module node, not a specific symbol
    ResolvedToFileNode,
    /// Could not be matched; see the reason code
    Unresolved,
}

/// Why an edge stayed unresolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedReason {
    /// Two or more internal candidates with equal plausibility
    Ambiguous,
    /// The expected defining module exists but the symbol does not
    NotFound,
    /// Computed receiver or callable value; target unknowable statically
    Dynamic,
}

/// A directed relation between two entities.
///
/// `target` holds an entity id when resolved internally, otherwise the raw
/// module path or name as written at the reference site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnresolvedReason>,
    pub line: u32,
}

impl Edge {
    pub fn is_ambiguous(&self) -> bool {
        self.reason == Some(UnresolvedReason::Ambiguous)
    }
}

/// Why a file was skipped during the per-file phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    UnsupportedLanguage,
    ParseError { offset: usize },
    Timeout,
}

/// Record of a file excluded from the analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// An import statement as written in source, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    /// Module path text as written (`pkg.helpers`, `./util`, `crate::scope`)
    pub module: String,
    /// Named symbol for `from m import x` style imports
    pub symbol: Option<String>,
    /// Local alias when the bound name differs from the imported one
    pub alias: Option<String>,
    /// Whole-module import (no specific symbol requested)
    pub whole_module: bool,
    pub line: u32,
}

impl RawImport {
    /// The name this import binds in the importing file's root scope.
    pub fn bound_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        if let Some(symbol) = &self.symbol {
            return symbol;
        }
        // `import a.b` binds the head segment; `use x::y` binds the tail.
        let module = self.module.trim_start_matches('.');
        if let Some((head, _)) = module.split_once('.') {
            head
        } else if let Some((_, tail)) = module.rsplit_once("::") {
            tail
        } else {
            module
        }
    }
}

/// Shape of a call site's receiver, used to pick a resolution strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReceiver {
    /// Bare name or dotted module path: `helper()`, `mod.helper()`
    Bare,
    /// Method call on the enclosing instance: `self.helper()`, `this.helper()`
    SelfRef,
    /// Computed receiver: chained calls, subscripts, arbitrary expressions
    Chained,
}

/// A call site recorded during extraction, before resolution
#[derive(Debug, Clone)]
pub struct RawCall {
    /// Entity id of the innermost enclosing declaration (or the file node)
    pub caller: String,
    /// Callee path text as written, dotted
    pub callee: String,
    pub receiver: CallReceiver,
    pub line: u32,
    /// Byte offset of the call site, for scope-aware binding lookup
    pub byte: usize,
}

/// An inheritance reference recorded during extraction
#[derive(Debug, Clone)]
pub struct RawInherit {
    /// Entity id of the subclass
    pub subject: String,
    /// Base name text as written
    pub base: String,
    pub line: u32,
}

/// Everything extracted from one file. Produced by the per-file phase,
/// consumed read-only by the merged resolution phase.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    /// Relative file path, slash-normalized
    pub file: String,
    pub language: &'static str,
    /// Id of this file's module-level entity
    pub module_entity: String,
    pub entities: Vec<Entity>,
    pub imports: Vec<RawImport>,
    pub calls: Vec<RawCall>,
    pub inherits: Vec<RawInherit>,
}

impl FileFacts {
    /// Innermost entity whose span contains `line`, if any.
    pub fn containing_entity(&self, line: u32) -> Option<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.line_start <= line && line <= e.line_end)
            .min_by_key(|e| e.line_end - e.line_start)
    }
}
