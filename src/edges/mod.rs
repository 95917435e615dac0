//! Edge extraction and cross-file reference resolution
//!
//! Consumes the merged per-file facts and scope tables after the parallel
//! phase barrier and emits `imports`, `calls`, `inherits`, and `references`
//! edges. Resolution order for anything not bound in-file:
//!
//! 1. known module path + exported symbol        -> `resolved_internal`
//! 2. known module path, whole-module import     -> `resolved_to_file_node`
//!    (or `resolved_internal` when the module has a default export named
//!    after its stem)
//! 3. module path absent from the analyzed tree  -> `resolved_external`
//! 4. two or more equally plausible candidates   -> `unresolved/ambiguous`
//! 5. module present, named symbol missing       -> `unresolved/not_found`
//!
//! Alias bindings resolve through the scope table and always point edges at
//! the original defining entity, never at the alias.

use crate::models::{
    CallReceiver, Edge, EdgeKind, EntityKind, FileFacts, RawImport, Resolution, UnresolvedReason,
};
use crate::scope::{BindingKind, ScopeTable};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Base names that carry no architectural signal as inheritance targets
const IGNORED_BASES: &[&str] = &["object", "ABC", "Protocol"];

/// Import resolution counts for the output document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResolutionStats {
    pub attempted: usize,
    pub resolved_internal: usize,
    pub resolved_external: usize,
    pub resolved_to_file_no_node: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
}

/// Result of the resolution phase
#[derive(Debug, Default)]
pub struct ResolvedGraph {
    pub edges: Vec<Edge>,
    pub import_stats: ImportResolutionStats,
    /// Edges (of any kind) left `unresolved/ambiguous`
    pub ambiguous_count: usize,
}

/// Merged lookup structures over every analyzed file.
pub struct ModuleIndex {
    /// relative path -> file/module entity id
    files: FxHashMap<String, String>,
    /// relative path -> exported name -> entity id (module-level entities)
    exports: FxHashMap<String, FxHashMap<String, String>>,
    /// exported name -> entity ids across the tree, sorted for determinism
    by_name: FxHashMap<String, Vec<String>>,
    /// (file, qualified name) -> entity id, for member lookups
    by_qualified: FxHashMap<(String, String), String>,
    /// file/module entity name per path (the "default export" name)
    stems: FxHashMap<String, String>,
}

impl ModuleIndex {
    pub fn build(files: &[(FileFacts, ScopeTable)]) -> Self {
        let mut index = ModuleIndex {
            files: FxHashMap::default(),
            exports: FxHashMap::default(),
            by_name: FxHashMap::default(),
            by_qualified: FxHashMap::default(),
            stems: FxHashMap::default(),
        };

        for (facts, _) in files {
            index
                .files
                .insert(facts.file.clone(), facts.module_entity.clone());
            let file_exports = index.exports.entry(facts.file.clone()).or_default();

            for entity in &facts.entities {
                index
                    .by_qualified
                    .insert((facts.file.clone(), entity.qualified_name.clone()), entity.id.clone());

                if entity.id == facts.module_entity {
                    index.stems.insert(facts.file.clone(), entity.name.clone());
                    continue;
                }
                if entity.is_module_level {
                    file_exports.insert(entity.name.clone(), entity.id.clone());
                    index
                        .by_name
                        .entry(entity.name.clone())
                        .or_default()
                        .push(entity.id.clone());
                }
            }
        }

        for ids in index.by_name.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
        index
    }

    fn file_entity(&self, path: &str) -> Option<&String> {
        self.files.get(path)
    }

    fn export(&self, path: &str, name: &str) -> Option<&String> {
        self.exports.get(path)?.get(name)
    }

    fn member(&self, file: &str, qualified: &str) -> Option<&String> {
        self.by_qualified
            .get(&(file.to_string(), qualified.to_string()))
    }

    fn global(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// A resolved target plus its status
struct Target {
    target: String,
    resolution: Resolution,
    reason: Option<UnresolvedReason>,
}

impl Target {
    fn internal(id: &str) -> Self {
        Target {
            target: id.to_string(),
            resolution: Resolution::ResolvedInternal,
            reason: None,
        }
    }

    fn external(raw: &str) -> Self {
        Target {
            target: raw.to_string(),
            resolution: Resolution::ResolvedExternal,
            reason: None,
        }
    }

    fn file_node(id: &str) -> Self {
        Target {
            target: id.to_string(),
            resolution: Resolution::ResolvedToFileNode,
            reason: None,
        }
    }

    fn unresolved(raw: &str, reason: UnresolvedReason) -> Self {
        Target {
            target: raw.to_string(),
            resolution: Resolution::Unresolved,
            reason: Some(reason),
        }
    }
}

/// Resolve all cross-file relations over the merged file set.
pub fn resolve(files: &[(FileFacts, ScopeTable)]) -> ResolvedGraph {
    let index = ModuleIndex::build(files);
    let mut graph = ResolvedGraph::default();

    for (facts, scopes) in files {
        resolve_imports(facts, &index, &mut graph);
        resolve_calls(facts, scopes, &index, &mut graph);
        resolve_inherits(facts, scopes, &index, &mut graph);
        resolve_cross_refs(facts, scopes, &index, &mut graph);
    }

    graph.ambiguous_count = graph.edges.iter().filter(|e| e.is_ambiguous()).count();
    if graph.ambiguous_count > 0 {
        debug!(
            "{} edges left ambiguous after resolution",
            graph.ambiguous_count
        );
    }
    graph
}

fn resolve_imports(facts: &FileFacts, index: &ModuleIndex, graph: &mut ResolvedGraph) {
    let importer_dir = parent_dir(&facts.file);

    for import in &facts.imports {
        let target = resolve_import(import, facts, &importer_dir, index);

        graph.import_stats.attempted += 1;
        match (target.resolution, target.reason) {
            (Resolution::ResolvedInternal, _) => graph.import_stats.resolved_internal += 1,
            (Resolution::ResolvedExternal, _) => graph.import_stats.resolved_external += 1,
            (Resolution::ResolvedToFileNode, _) => {
                graph.import_stats.resolved_to_file_no_node += 1
            }
            (Resolution::Unresolved, Some(UnresolvedReason::Ambiguous)) => {
                graph.import_stats.ambiguous += 1
            }
            (Resolution::Unresolved, _) => graph.import_stats.unresolved += 1,
        }

        graph.edges.push(Edge {
            source: facts.module_entity.clone(),
            target: target.target,
            kind: EdgeKind::Imports,
            resolution: target.resolution,
            reason: target.reason,
            line: import.line,
        });
    }
}

/// Resolve one import through the candidate ladder.
fn resolve_import(
    import: &RawImport,
    facts: &FileFacts,
    importer_dir: &str,
    index: &ModuleIndex,
) -> Target {
    let spec = module_spec(facts);
    let written = match &import.symbol {
        Some(symbol) => join_module(&import.module, symbol, spec.path_separator),
        None => import.module.clone(),
    };

    // A named symbol may itself be a submodule (`from pkg import helper`
    // where helper is pkg/helper.py); try the full path as a module first
    if let Some(symbol) = &import.symbol {
        let full = join_module(&import.module, symbol, spec.path_separator);
        let existing = existing_candidates(&full, importer_dir, facts, index);
        if existing.len() > 1 {
            return Target::unresolved(&written, UnresolvedReason::Ambiguous);
        }
        if let [path] = existing.as_slice() {
            return resolve_module_file(path, index);
        }
    }

    let existing = existing_candidates(&import.module, importer_dir, facts, index);
    match existing.as_slice() {
        [] => {
            // `import a.b` style whole-module imports may name a symbol in a
            // parent module rather than a module file
            if import.symbol.is_none() {
                if let Some((parent, last)) = split_module_tail(&import.module, spec.path_separator)
                {
                    let parents = existing_candidates(&parent, importer_dir, facts, index);
                    match parents.as_slice() {
                        [path] => {
                            return match index.export(path, &last) {
                                Some(id) => Target::internal(id),
                                None => Target::unresolved(&written, UnresolvedReason::NotFound),
                            };
                        }
                        [_, ..] => {
                            return Target::unresolved(&written, UnresolvedReason::Ambiguous)
                        }
                        [] => {}
                    }
                }
            }
            Target::external(&written)
        }
        [path] => match &import.symbol {
            Some(symbol) => match index.export(path, symbol) {
                Some(id) => Target::internal(id),
                None => Target::unresolved(&written, UnresolvedReason::NotFound),
            },
            None => resolve_module_file(path, index),
        },
        _ => Target::unresolved(&written, UnresolvedReason::Ambiguous),
    }
}

/// Whole-module resolution: prefer a default export named after the module
/// stem, fall back to the file node.
fn resolve_module_file(path: &str, index: &ModuleIndex) -> Target {
    if let Some(stem) = index.stems.get(path) {
        if let Some(id) = index.export(path, stem) {
            return Target::internal(id);
        }
    }
    match index.file_entity(path) {
        Some(id) => Target::file_node(id),
        None => Target::external(path),
    }
}

fn resolve_calls(
    facts: &FileFacts,
    scopes: &ScopeTable,
    index: &ModuleIndex,
    graph: &mut ResolvedGraph,
) {
    let importer_dir = parent_dir(&facts.file);

    for call in &facts.calls {
        let target = match call.receiver {
            CallReceiver::Chained => {
                Target::unresolved(&call.callee, UnresolvedReason::Dynamic)
            }
            CallReceiver::SelfRef => resolve_self_call(call.caller.as_str(), &call.callee, facts, index),
            CallReceiver::Bare => resolve_path(
                &call.callee,
                call.byte,
                facts,
                scopes,
                &importer_dir,
                index,
            ),
        };

        graph.edges.push(Edge {
            source: call.caller.clone(),
            target: target.target,
            kind: EdgeKind::Calls,
            resolution: target.resolution,
            reason: target.reason,
            line: call.line,
        });
    }
}

/// `self.method()` / `this.method()`: look the method up on the caller's
/// enclosing class.
fn resolve_self_call(
    caller_id: &str,
    callee: &str,
    facts: &FileFacts,
    index: &ModuleIndex,
) -> Target {
    let Some(caller) = facts.entities.iter().find(|e| e.id == caller_id) else {
        return Target::unresolved(callee, UnresolvedReason::Dynamic);
    };
    let class_qualified = match caller.kind {
        EntityKind::Class => caller.qualified_name.as_str(),
        _ => match caller.qualified_name.rsplit_once('.') {
            Some((class, _)) => class,
            None => return Target::unresolved(callee, UnresolvedReason::Dynamic),
        },
    };
    let method = callee.split('.').next().unwrap_or(callee);
    match index.member(&facts.file, &format!("{class_qualified}.{method}")) {
        Some(id) => Target::internal(id),
        None => Target::unresolved(callee, UnresolvedReason::Dynamic),
    }
}

/// Resolve a dotted path as seen from a byte position inside the file:
/// in-file bindings first (aliases included), then the merged export index.
fn resolve_path(
    path: &str,
    byte: usize,
    facts: &FileFacts,
    scopes: &ScopeTable,
    importer_dir: &str,
    index: &ModuleIndex,
) -> Target {
    let spec = module_spec(facts);
    let segments: Vec<&str> = path.split('.').collect();
    let head = segments[0];
    let rest = &segments[1..];

    if let Some(binding) = scopes.resolve_at(head, byte) {
        return match binding.kind {
            BindingKind::Import => {
                let import = binding
                    .import
                    .and_then(|i| facts.imports.get(i))
                    .expect("import bindings carry their import index");
                resolve_through_import(import, rest, path, facts, importer_dir, index)
            }
            // Variables may still carry an entity (`const f = () => ...`)
            BindingKind::Function | BindingKind::Class | BindingKind::Variable => {
                match &binding.entity {
                    Some(id) if rest.is_empty() => Target::internal(id),
                    Some(id) => {
                        // Static member access on an in-file class
                        let qualified = qualified_of(facts, id)
                            .map(|q| format!("{q}.{}", rest[0]))
                            .unwrap_or_default();
                        match index.member(&facts.file, &qualified) {
                            Some(member) => Target::internal(member),
                            None => Target::unresolved(path, UnresolvedReason::Dynamic),
                        }
                    }
                    None => Target::unresolved(path, UnresolvedReason::Dynamic),
                }
            }
            // A callable value; its target is not knowable statically
            BindingKind::Parameter => Target::unresolved(path, UnresolvedReason::Dynamic),
        };
    }

    if spec.is_builtin(head) {
        return Target::external(path);
    }

    if rest.is_empty() {
        return match index.global(head) {
            [] => Target::external(path),
            [id] => Target::internal(id),
            _ => Target::unresolved(path, UnresolvedReason::Ambiguous),
        };
    }

    // Dotted path with an unbound head: a unique global class allows a
    // member lookup, anything else is dynamic
    match index.global(head) {
        [id] => {
            let (file, qualified) = split_entity_id(id);
            match index.member(file, &format!("{qualified}.{}", rest[0])) {
                Some(member) => Target::internal(member),
                None => Target::unresolved(path, UnresolvedReason::Dynamic),
            }
        }
        [] => Target::external(path),
        _ => Target::unresolved(path, UnresolvedReason::Ambiguous),
    }
}

/// Resolve a use of an import binding: the edge must land on the original
/// defining entity, not the alias.
fn resolve_through_import(
    import: &RawImport,
    rest: &[&str],
    written: &str,
    facts: &FileFacts,
    importer_dir: &str,
    index: &ModuleIndex,
) -> Target {
    let resolved = resolve_import(import, facts, importer_dir, index);

    if rest.is_empty() {
        return resolved;
    }

    // Member access through the import: `ns.helper()`, `Class.create()`
    match resolved.resolution {
        Resolution::ResolvedToFileNode => {
            let (file, _) = split_entity_id(&resolved.target);
            match index.export(file, rest[0]) {
                Some(id) => Target::internal(id),
                None => Target::unresolved(written, UnresolvedReason::NotFound),
            }
        }
        Resolution::ResolvedInternal => {
            let (file, qualified) = split_entity_id(&resolved.target);
            match index.member(file, &format!("{qualified}.{}", rest[0])) {
                Some(id) => Target::internal(id),
                None => Target::unresolved(written, UnresolvedReason::Dynamic),
            }
        }
        Resolution::ResolvedExternal => Target::external(written),
        Resolution::Unresolved => resolved,
    }
}

fn resolve_inherits(
    facts: &FileFacts,
    scopes: &ScopeTable,
    index: &ModuleIndex,
    graph: &mut ResolvedGraph,
) {
    let importer_dir = parent_dir(&facts.file);

    for inherit in &facts.inherits {
        if IGNORED_BASES.contains(&inherit.base.as_str()) {
            continue;
        }
        let subject_exists = facts.entities.iter().any(|e| e.id == inherit.subject);
        if !subject_exists {
            debug!(
                "inheritance subject {} not extracted, skipping",
                inherit.subject
            );
            continue;
        }

        // Base names resolve like references from module scope: imports and
        // module-level classes all bind at the root, probed at byte 0
        let target = resolve_path(
            &inherit.base.replace("::", "."),
            0,
            facts,
            scopes,
            &importer_dir,
            index,
        );

        graph.edges.push(Edge {
            source: inherit.subject.clone(),
            target: target.target,
            kind: EdgeKind::Inherits,
            resolution: target.resolution,
            reason: target.reason,
            line: inherit.line,
        });
    }
}

/// References with no in-file binding, handed over by the scope resolver.
fn resolve_cross_refs(
    facts: &FileFacts,
    scopes: &ScopeTable,
    index: &ModuleIndex,
    graph: &mut ResolvedGraph,
) {
    let spec = module_spec(facts);

    for cross in &scopes.cross_refs {
        if spec.is_builtin(&cross.name) {
            continue;
        }
        let target = match index.global(&cross.name) {
            [] => Target::external(&cross.name),
            [id] => Target::internal(id),
            _ => Target::unresolved(&cross.name, UnresolvedReason::Ambiguous),
        };
        let source = facts
            .containing_entity(cross.line)
            .map(|e| e.id.clone())
            .unwrap_or_else(|| facts.module_entity.clone());

        // Calls already carry the relation for call sites; a references edge
        // for the same line and name would be noise
        let already_called = facts
            .calls
            .iter()
            .any(|c| c.line == cross.line && c.callee.split('.').next() == Some(&cross.name));
        if already_called {
            continue;
        }

        graph.edges.push(Edge {
            source,
            target: target.target,
            kind: EdgeKind::References,
            resolution: target.resolution,
            reason: target.reason,
            line: cross.line,
        });
    }
}

fn module_spec(facts: &FileFacts) -> &'static crate::parsers::LanguageSpec {
    crate::parsers::spec_by_name(facts.language)
        .expect("analyzed files always carry a registered language")
}

/// Candidate paths that actually exist in the analyzed tree, deduplicated.
fn existing_candidates(
    module: &str,
    importer_dir: &str,
    facts: &FileFacts,
    index: &ModuleIndex,
) -> Vec<String> {
    let spec = module_spec(facts);
    let mut existing: Vec<String> = (spec.module_candidates)(module, importer_dir)
        .into_iter()
        .filter(|c| index.files.contains_key(c))
        .collect();
    existing.sort_unstable();
    existing.dedup();
    existing
}

fn split_module_tail(module: &str, separator: &str) -> Option<(String, String)> {
    module
        .rsplit_once(separator)
        .map(|(a, b)| (a.to_string(), b.to_string()))
}

/// Join a module path and a symbol without doubling separators; a relative
/// Python module like `.` or `..pkg` already ends at a separator boundary.
fn join_module(module: &str, symbol: &str, separator: &str) -> String {
    if module.ends_with(separator) || module.ends_with('.') {
        format!("{module}{symbol}")
    } else {
        format!("{module}{separator}{symbol}")
    }
}

fn split_entity_id(id: &str) -> (&str, &str) {
    id.split_once("::").unwrap_or((id, ""))
}

fn qualified_of<'a>(facts: &'a FileFacts, id: &str) -> Option<&'a str> {
    facts
        .entities
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.qualified_name.as_str())
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}
