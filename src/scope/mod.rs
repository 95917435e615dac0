//! Lexical scope analysis
//!
//! Builds one scope tree per file in a single pass with a scope stack, binds
//! every in-file reference to its innermost visible definition, and flags
//! shadowed and unused bindings. Scope parents are vector indices; the tree
//! is owned flat by [`ScopeTable`], so there are no reference cycles.
//!
//! References that resolve to no in-file binding are collected as cross-file
//! references and handed to the edge extractor.

use crate::models::{EntityKind, FileFacts};
use crate::parsers::ParsedFile;
use rustc_hash::{FxHashMap, FxHashSet};
use tree_sitter::Node;

/// What a binding names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Function,
    Class,
    Variable,
    Parameter,
    Import,
}

/// One lexical scope. `parent` is an index into [`ScopeTable::scopes`].
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<usize>,
    pub kind: &'static str,
    /// Whether bindings here are visible to nested scopes
    pub inherits: bool,
    pub start_byte: usize,
    pub end_byte: usize,
    pub depth: u32,
}

/// A name bound in one scope, with its recorded reference sites.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    /// Index of the owning scope
    pub scope: usize,
    pub byte: usize,
    pub line: u32,
    /// Entity id when this binding is an extracted declaration
    pub entity: Option<String>,
    /// Index into `FileFacts::imports` for import bindings
    pub import: Option<usize>,
    /// Lines of reference sites resolved to this binding
    pub references: Vec<u32>,
    /// Index of the enclosing-scope binding this one shadows
    pub shadows: Option<usize>,
    /// Root-scope declarations are presumed used by importers
    pub exported: bool,
}

/// A reference with no in-file binding; resolved cross-file later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossFileRef {
    pub name: String,
    pub line: u32,
}

/// Complete scope analysis for one file.
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    pub scopes: Vec<Scope>,
    pub bindings: Vec<Binding>,
    /// Binding indices per scope, in insertion order
    per_scope: Vec<Vec<usize>>,
    pub cross_refs: Vec<CrossFileRef>,
}

impl ScopeTable {
    /// Analyze one parsed file. `facts` supplies extracted entities (for
    /// binding -> entity links) and imports (bound at root scope).
    pub fn analyze(parsed: &ParsedFile, facts: &FileFacts) -> ScopeTable {
        let mut builder = Builder {
            spec: parsed.spec,
            source: parsed.bytes(),
            table: ScopeTable::default(),
            scope_stack: Vec::new(),
            def_nodes: FxHashSet::default(),
            entity_by_name_line: facts
                .entities
                .iter()
                .map(|e| ((e.name.clone(), e.line_start), e.id.clone()))
                .collect(),
            refs: Vec::new(),
            import_depth: 0,
        };

        let root = parsed.root();
        builder.push_scope(&root, true);
        for (index, import) in facts.imports.iter().enumerate() {
            builder.add_binding(
                import.bound_name().to_string(),
                BindingKind::Import,
                0,
                import.line,
                None,
                Some(index),
            );
        }
        builder.walk(root);
        builder.finish()
    }

    /// Resolve `name` as seen from byte offset `byte`: innermost containing
    /// scope outward, newest visible binding first.
    pub fn resolve_at(&self, name: &str, byte: usize) -> Option<&Binding> {
        let origin = self.innermost_scope(byte)?;
        self.lookup(name, origin, byte).map(|i| &self.bindings[i])
    }

    fn innermost_scope(&self, byte: usize) -> Option<usize> {
        self.scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start_byte <= byte && byte < s.end_byte)
            .max_by_key(|(_, s)| s.depth)
            .map(|(i, _)| i)
    }

    fn lookup(&self, name: &str, origin: usize, byte: usize) -> Option<usize> {
        let mut current = Some(origin);
        while let Some(s) = current {
            let scope = &self.scopes[s];
            // A scope's bindings are visible from nested scopes only when it
            // inherits (class bodies do not)
            if s == origin || scope.inherits {
                for &b in self.per_scope[s].iter().rev() {
                    let binding = &self.bindings[b];
                    if binding.name != name {
                        continue;
                    }
                    // Functions, classes, and imports are visible scope-wide;
                    // variables only after their definition site
                    if binding.kind == BindingKind::Variable && binding.byte > byte {
                        continue;
                    }
                    return Some(b);
                }
            }
            current = scope.parent;
        }
        None
    }

    /// Bindings never referenced: dead definitions. Root-scope bindings are
    /// presumed exported and parameters are part of a signature, so both are
    /// excluded, as are `_`-prefixed names.
    pub fn unused(&self) -> Vec<&Binding> {
        self.bindings
            .iter()
            .filter(|b| {
                b.references.is_empty()
                    && !b.exported
                    && b.kind != BindingKind::Parameter
                    && !b.name.starts_with('_')
            })
            .collect()
    }

    /// Bindings that shadow an enclosing-scope binding.
    pub fn shadowed(&self) -> Vec<&Binding> {
        self.bindings.iter().filter(|b| b.shadows.is_some()).collect()
    }
}

struct PendingRef {
    name: String,
    byte: usize,
    line: u32,
    scope: usize,
}

struct Builder<'a> {
    spec: &'static crate::parsers::LanguageSpec,
    source: &'a [u8],
    table: ScopeTable,
    scope_stack: Vec<usize>,
    /// Node ids already consumed as definition sites
    def_nodes: FxHashSet<usize>,
    entity_by_name_line: FxHashMap<(String, u32), String>,
    refs: Vec<PendingRef>,
    import_depth: usize,
}

impl<'a> Builder<'a> {
    fn push_scope(&mut self, node: &Node, inherits: bool) -> usize {
        let parent = self.scope_stack.last().copied();
        let depth = parent.map(|p| self.table.scopes[p].depth + 1).unwrap_or(0);
        let index = self.table.scopes.len();
        self.table.scopes.push(Scope {
            parent,
            kind: node.kind(),
            inherits,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            depth,
        });
        self.table.per_scope.push(Vec::new());
        self.scope_stack.push(index);
        index
    }

    fn add_binding(
        &mut self,
        name: String,
        kind: BindingKind,
        byte: usize,
        line: u32,
        entity: Option<String>,
        import: Option<usize>,
    ) {
        let scope = *self.scope_stack.last().expect("scope stack never empty");
        let shadows = self.find_shadowed(&name, scope);
        let exported = scope == 0;
        let index = self.table.bindings.len();
        self.table.bindings.push(Binding {
            name,
            kind,
            scope,
            byte,
            line,
            entity,
            import,
            references: Vec::new(),
            shadows,
            exported,
        });
        self.table.per_scope[scope].push(index);
    }

    /// Visible same-name binding in an enclosing scope, if any.
    fn find_shadowed(&self, name: &str, scope: usize) -> Option<usize> {
        let mut current = self.table.scopes[scope].parent;
        while let Some(s) = current {
            if self.table.scopes[s].inherits {
                for &b in self.table.per_scope[s].iter().rev() {
                    if self.table.bindings[b].name == name {
                        return Some(b);
                    }
                }
            }
            current = self.table.scopes[s].parent;
        }
        None
    }

    fn walk(&mut self, node: Node) {
        let kind = node.kind();

        let entering_import = self.spec.import_kinds.contains(&kind);
        if entering_import {
            self.import_depth += 1;
        }

        // A declaration's name binds in the enclosing scope, so definitions
        // are collected before the declaration's own scope opens
        if self.import_depth == 0 {
            self.collect_defs(node);
        }

        // Scope opening (the root scope is already pushed)
        let opened = if node.parent().is_some() {
            self.spec
                .scope_rule(kind)
                .map(|rule| self.push_scope(&node, rule.inherits))
                .is_some()
        } else {
            false
        };

        if self.import_depth == 0 {
            self.collect_ref(node);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }

        if opened {
            self.scope_stack.pop();
        }
        if entering_import {
            self.import_depth -= 1;
        }
    }

    fn collect_defs(&mut self, node: Node) {
        let kind = node.kind();

        if let Some(rule) = self.spec.decl_rule(kind) {
            if let Some(name_node) = node.child_by_field_name(rule.name_field) {
                if self.spec.is_identifier(name_node.kind()) {
                    if let Ok(name) = name_node.utf8_text(self.source) {
                        self.def_nodes.insert(name_node.id());
                        let line = name_node.start_position().row as u32 + 1;
                        let entity = self
                            .entity_by_name_line
                            .get(&(name.to_string(), node.start_position().row as u32 + 1))
                            .cloned();
                        self.add_binding(
                            name.to_string(),
                            binding_kind(rule.entity_kind),
                            name_node.start_byte(),
                            line,
                            entity,
                            None,
                        );
                    }
                }
            }
            return;
        }

        if let Some(rule) = self.spec.local_defs.iter().find(|r| r.node_kind == kind) {
            if let Some(target) = node.child_by_field_name(rule.name_field) {
                self.bind_pattern(target);
            }
        }
    }

    /// Bind every identifier inside a (possibly destructuring) pattern.
    fn bind_pattern(&mut self, node: Node) {
        if self.spec.is_identifier(node.kind()) {
            if let Ok(name) = node.utf8_text(self.source) {
                self.def_nodes.insert(node.id());
                self.add_binding(
                    name.to_string(),
                    BindingKind::Variable,
                    node.start_byte(),
                    node.start_position().row as u32 + 1,
                    None,
                    None,
                );
            }
            return;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.bind_pattern(child);
        }
    }

    fn collect_ref(&mut self, node: Node) {
        if !self.spec.is_identifier(node.kind()) || self.def_nodes.contains(&node.id()) {
            return;
        }
        let Some(parent) = node.parent() else {
            return;
        };

        // Parameter definition positions. Parameter nodes with a name or
        // pattern field may also hold default-value expressions; only the
        // name position is a definition, the rest are ordinary references
        if self.spec.param_kinds.contains(&parent.kind()) {
            let name_field = parent
                .child_by_field_name("name")
                .or_else(|| parent.child_by_field_name("pattern"));
            let is_param_name = match name_field {
                Some(field) => field.id() == node.id(),
                None => true,
            };
            if is_param_name {
                if let Ok(name) = node.utf8_text(self.source) {
                    self.def_nodes.insert(node.id());
                    self.add_binding(
                        name.to_string(),
                        BindingKind::Parameter,
                        node.start_byte(),
                        node.start_position().row as u32 + 1,
                        None,
                        None,
                    );
                }
                return;
            }
        }

        // Member positions (`obj.member`, keyword labels) are not references
        if let Some(chain) = self.spec.chain_rule(parent.kind()) {
            if parent
                .child_by_field_name(chain.member_field)
                .map(|m| m.id() == node.id())
                .unwrap_or(false)
            {
                return;
            }
        }

        let scope = *self.scope_stack.last().expect("scope stack never empty");
        if let Ok(name) = node.utf8_text(self.source) {
            self.refs.push(PendingRef {
                name: name.to_string(),
                byte: node.start_byte(),
                line: node.start_position().row as u32 + 1,
                scope,
            });
        }
    }

    fn finish(mut self) -> ScopeTable {
        for pending in std::mem::take(&mut self.refs) {
            match self
                .table
                .lookup(&pending.name, pending.scope, pending.byte)
            {
                Some(binding) => self.table.bindings[binding].references.push(pending.line),
                None => {
                    let cross = CrossFileRef {
                        name: pending.name,
                        line: pending.line,
                    };
                    if !self.table.cross_refs.contains(&cross) {
                        self.table.cross_refs.push(cross);
                    }
                }
            }
        }
        self.table
    }
}

fn binding_kind(kind: EntityKind) -> BindingKind {
    match kind {
        EntityKind::Function => BindingKind::Function,
        EntityKind::Class => BindingKind::Class,
        _ => BindingKind::Variable,
    }
}
