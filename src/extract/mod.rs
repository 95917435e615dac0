//! Atom extraction: syntax tree -> typed entities plus raw reference facts
//!
//! One linear walk per file, driven entirely by the language adapter's
//! tables. Emits an `Entity` per recognized declaration (with container-aware
//! qualified names), the file's module-level entity, and the raw import /
//! call / inheritance facts that the edge extractor resolves later.
//!
//! Extraction never reads other files; anonymous constructs get synthetic
//! names derived from their position so ids stay stable across runs.

use crate::models::{
    entity_id, CallReceiver, Entity, EntityKind, FileFacts, RawCall, RawInherit,
};
use crate::parsers::{LanguageSpec, ParsedFile};
use rustc_hash::FxHashSet;
use tree_sitter::Node;

/// Extract all entities and raw facts from a parsed file.
///
/// `rel_path` is the slash-normalized repository-relative path that becomes
/// part of every entity id.
pub fn extract(parsed: &ParsedFile, rel_path: &str) -> FileFacts {
    let source = parsed.bytes();
    let spec = parsed.spec;
    let root = parsed.root();

    let module_entity = module_entity(spec, rel_path, &root, &parsed.source);
    let mut walker = Walker {
        spec,
        source,
        lines: parsed.source.lines().collect(),
        file: rel_path,
        module_entity_id: module_entity.id.clone(),
        facts: FileFacts {
            file: rel_path.to_string(),
            language: spec.name,
            module_entity: module_entity.id.clone(),
            entities: vec![module_entity],
            imports: (spec.collect_imports)(root, source),
            calls: Vec::new(),
            inherits: Vec::new(),
        },
        containers: Vec::new(),
        fn_depth: 0,
        class_depth: 0,
        seen_ids: FxHashSet::default(),
    };
    walker.seen_ids.insert(walker.module_entity_id.clone());

    walker.visit(root);
    link_parents(&mut walker.facts);
    walker.facts
}

/// Re-link parents by qualified name. Methods declared through pure
/// containers (Rust `impl` blocks) know their container segment but not its
/// entity, which may be declared elsewhere in the file.
fn link_parents(facts: &mut FileFacts) {
    let by_qualified: rustc_hash::FxHashMap<String, String> = facts
        .entities
        .iter()
        .map(|e| (e.qualified_name.clone(), e.id.clone()))
        .collect();
    let module_id = facts.module_entity.clone();

    for entity in &mut facts.entities {
        if entity.id == module_id {
            continue;
        }
        if entity.parent.as_deref() != Some(module_id.as_str()) {
            continue;
        }
        if let Some((container, _)) = entity.qualified_name.rsplit_once('.') {
            if let Some(parent_id) = by_qualified.get(container) {
                entity.parent = Some(parent_id.clone());
            }
        }
    }
}

/// Build the whole-file module entity. Package index files (`__init__.py`,
/// `mod.rs`, `index.ts`, ...) are `Module` nodes named after their
/// directory; everything else is a `File` node named after its stem.
fn module_entity(
    spec: &'static LanguageSpec,
    rel_path: &str,
    root: &Node,
    source: &str,
) -> Entity {
    let stem = rel_path
        .rsplit('/')
        .next()
        .and_then(|f| f.split('.').next())
        .unwrap_or(rel_path);

    let (kind, name) = if spec.module_index_stems.contains(&stem) {
        let dir_name = rel_path
            .rsplit('/')
            .nth(1)
            .filter(|d| !d.is_empty())
            .unwrap_or(stem);
        (EntityKind::Module, dir_name.to_string())
    } else {
        (EntityKind::File, stem.to_string())
    };

    let snippet = source
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .chars()
        .take(120)
        .collect();

    Entity {
        id: entity_id(rel_path, &name),
        kind,
        name: name.clone(),
        qualified_name: name,
        file: rel_path.to_string(),
        line_start: 1,
        line_end: root.end_position().row as u32 + 1,
        snippet,
        parent: None,
        annotations: Vec::new(),
        complexity: 1,
        is_module_level: true,
    }
}

struct ContainerFrame {
    segment: String,
    entity: Option<String>,
    is_class: bool,
}

struct Walker<'a> {
    spec: &'static LanguageSpec,
    source: &'a [u8],
    lines: Vec<&'a str>,
    file: &'a str,
    module_entity_id: String,
    facts: FileFacts,
    containers: Vec<ContainerFrame>,
    fn_depth: usize,
    class_depth: usize,
    seen_ids: FxHashSet<String>,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, node: Node) {
        let kind = node.kind();
        let mut popped = 0usize;
        let mut entered_fn = false;
        let mut entered_class = false;

        if let Some(rule) = self.spec.decl_rule(kind) {
            if let Some(entity) = self.declared_entity(node, rule) {
                let is_class = entity.kind == EntityKind::Class;
                let is_function = entity.kind == EntityKind::Function;
                let entity_id = entity.id.clone();
                let name = entity.name.clone();

                if is_class {
                    let bases = (self.spec.collect_bases)(node, self.source);
                    for base in bases {
                        self.facts.inherits.push(RawInherit {
                            subject: entity_id.clone(),
                            base,
                            line: entity.line_start,
                        });
                    }
                }

                self.facts.entities.push(entity);

                if is_class || is_function {
                    self.containers.push(ContainerFrame {
                        segment: name,
                        entity: Some(entity_id),
                        is_class,
                    });
                    popped += 1;
                    if is_class {
                        self.class_depth += 1;
                        entered_class = true;
                    } else {
                        self.fn_depth += 1;
                        entered_fn = true;
                    }
                }
            }
        } else if self.spec.anonymous_fn_kinds.contains(&kind) {
            let entity = self.anonymous_entity(node);
            let name = entity.name.clone();
            let id = entity.id.clone();
            self.facts.entities.push(entity);
            self.containers.push(ContainerFrame {
                segment: name,
                entity: Some(id),
                is_class: false,
            });
            popped += 1;
            self.fn_depth += 1;
            entered_fn = true;
        } else if let Some(rule) = self.spec.container_rule(kind) {
            // Pure containers (impl blocks, inline modules): qualified-name
            // context without an entity of their own
            if let Some(segment) = self.container_segment(node, rule.name_field) {
                if let Some(trait_node) = node.child_by_field_name("trait") {
                    if let Ok(trait_text) = trait_node.utf8_text(self.source) {
                        self.facts.inherits.push(RawInherit {
                            subject: entity_id(self.file, &segment),
                            base: strip_generics(trait_text),
                            line: node.start_position().row as u32 + 1,
                        });
                    }
                }
                self.containers.push(ContainerFrame {
                    segment,
                    entity: None,
                    is_class: true,
                });
                popped += 1;
                self.class_depth += 1;
                entered_class = true;
            }
        }

        if let Some(rule) = self.spec.call_rule(kind) {
            self.record_call(node, rule.callee_field);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }

        for _ in 0..popped {
            self.containers.pop();
        }
        if entered_fn {
            self.fn_depth -= 1;
        }
        if entered_class {
            self.class_depth -= 1;
        }
    }

    /// Entity for a declaration-rule match, or None when the rule does not
    /// apply in this position (no name, wrong nesting level, function-valued
    /// variable handled by the anonymous path).
    fn declared_entity(&mut self, node: Node, rule: &crate::parsers::DeclRule) -> Option<Entity> {
        let module_level = self.fn_depth == 0 && self.class_depth == 0;
        if rule.module_level_only && !module_level {
            return None;
        }

        let name_node = node.child_by_field_name(rule.name_field)?;
        if rule.entity_kind == EntityKind::Variable {
            // Destructuring targets and function-valued bindings are not
            // variable entities; the latter surface as named functions
            if !self.spec.is_identifier(name_node.kind()) {
                return None;
            }
            for value_field in ["value", "right"] {
                if let Some(value) = node.child_by_field_name(value_field) {
                    if self.spec.anonymous_fn_kinds.contains(&value.kind()) {
                        return None;
                    }
                }
            }
        }
        let name = name_node.utf8_text(self.source).ok()?.to_string();
        if name.is_empty() {
            return None;
        }

        Some(self.build_entity(node, rule.entity_kind, name, module_level))
    }

    /// Entity for an anonymous function, named from the binding it is
    /// assigned to when there is one, otherwise from its position.
    fn anonymous_entity(&mut self, node: Node) -> Entity {
        let bound_name = node.parent().and_then(|parent| {
            if !matches!(
                parent.kind(),
                "variable_declarator" | "assignment" | "let_declaration"
            ) {
                return None;
            }
            ["name", "left", "pattern"].iter().find_map(|field| {
                let name_node = parent.child_by_field_name(field)?;
                if self.spec.is_identifier(name_node.kind()) {
                    name_node
                        .utf8_text(self.source)
                        .ok()
                        .map(|s| s.to_string())
                } else {
                    None
                }
            })
        });

        let module_level = self.fn_depth == 0 && self.class_depth == 0;
        let name = bound_name.unwrap_or_else(|| {
            let pos = node.start_position();
            format!("<lambda@{}:{}>", pos.row + 1, pos.column)
        });

        self.build_entity(node, EntityKind::Function, name, module_level)
    }

    fn build_entity(
        &mut self,
        node: Node,
        kind: EntityKind,
        name: String,
        module_level: bool,
    ) -> Entity {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let mut qualified = self
            .containers
            .iter()
            .map(|c| c.segment.as_str())
            .chain(std::iter::once(name.as_str()))
            .collect::<Vec<_>>()
            .join(".");

        let mut id = entity_id(self.file, &qualified);
        if !self.seen_ids.insert(id.clone()) {
            // Redefinition at the same nesting level; position disambiguates
            qualified = format!("{qualified}@{line_start}");
            id = entity_id(self.file, &qualified);
            self.seen_ids.insert(id.clone());
        }

        let parent = self
            .containers
            .iter()
            .rev()
            .find_map(|c| c.entity.clone())
            .or_else(|| Some(self.module_entity_id.clone()));

        let snippet = self
            .lines
            .get(line_start as usize - 1)
            .map(|l| l.trim().chars().take(120).collect())
            .unwrap_or_default();

        Entity {
            id,
            kind,
            name,
            qualified_name: qualified,
            file: self.file.to_string(),
            line_start,
            line_end,
            snippet,
            parent,
            annotations: self.annotations_for(node),
            complexity: self.complexity_of(node),
            is_module_level: module_level,
        }
    }

    /// Decorators / attributes attached to a declaration: children of a
    /// wrapping `decorated_definition`, or preceding annotation siblings.
    fn annotations_for(&self, node: Node) -> Vec<String> {
        let mut annotations = Vec::new();

        if let Some(parent) = node.parent() {
            if parent.kind() == "decorated_definition" {
                for child in parent.children(&mut parent.walk()) {
                    if self.spec.annotation_kinds.contains(&child.kind()) {
                        if let Ok(text) = child.utf8_text(self.source) {
                            annotations.push(text.trim().to_string());
                        }
                    }
                }
            }
        }

        let mut sibling = node.prev_named_sibling();
        while let Some(prev) = sibling {
            if !self.spec.annotation_kinds.contains(&prev.kind()) {
                break;
            }
            if let Ok(text) = prev.utf8_text(self.source) {
                annotations.push(text.trim().to_string());
            }
            sibling = prev.prev_named_sibling();
        }

        annotations.sort();
        annotations.dedup();
        annotations
    }

    /// Cyclomatic complexity: 1 + branch-kind nodes in the subtree.
    fn complexity_of(&self, node: Node) -> u32 {
        let mut complexity = 1;
        count_branches(node, self.spec, &mut complexity);
        complexity
    }

    fn record_call(&mut self, node: Node, callee_field: &str) {
        let Some(callee_node) = node.child_by_field_name(callee_field) else {
            return;
        };
        let line = node.start_position().row as u32 + 1;
        let byte = node.start_byte();
        let caller = self
            .containers
            .iter()
            .rev()
            .find_map(|c| c.entity.clone())
            .unwrap_or_else(|| self.module_entity_id.clone());

        let call = match self.flatten_callee(callee_node) {
            Flattened::Path(segments) => {
                let head_is_self = segments
                    .first()
                    .map(|h| self.spec.self_names.contains(&h.as_str()))
                    .unwrap_or(false);
                if head_is_self && segments.len() > 1 {
                    RawCall {
                        caller,
                        callee: segments[1..].join("."),
                        receiver: CallReceiver::SelfRef,
                        line,
                        byte,
                    }
                } else {
                    RawCall {
                        caller,
                        callee: segments.join("."),
                        receiver: CallReceiver::Bare,
                        line,
                        byte,
                    }
                }
            }
            Flattened::Dynamic => {
                let text = callee_node
                    .utf8_text(self.source)
                    .unwrap_or("")
                    .chars()
                    .take(60)
                    .collect::<String>();
                RawCall {
                    caller,
                    callee: text,
                    receiver: CallReceiver::Chained,
                    line,
                    byte,
                }
            }
        };
        if !call.callee.is_empty() {
            self.facts.calls.push(call);
        }
    }

    /// Flatten a callee expression into dotted path segments, or report it
    /// dynamic when the receiver chain contains anything but plain names.
    fn flatten_callee(&self, node: Node) -> Flattened {
        if self.spec.is_identifier(node.kind())
            || self.spec.self_names.contains(&node.kind())
        {
            let text = node.utf8_text(self.source).unwrap_or("");
            return Flattened::Path(vec![text.to_string()]);
        }

        if let Some(chain) = self.spec.chain_rule(node.kind()) {
            let member = node
                .child_by_field_name(chain.member_field)
                .and_then(|n| n.utf8_text(self.source).ok())
                .map(|s| s.to_string());
            let object = node.child_by_field_name(chain.object_field);
            if let (Some(member), Some(object)) = (member, object) {
                return match self.flatten_callee(object) {
                    Flattened::Path(mut segments) => {
                        segments.push(member);
                        Flattened::Path(segments)
                    }
                    Flattened::Dynamic => Flattened::Dynamic,
                };
            }
        }

        Flattened::Dynamic
    }

    fn container_segment(&self, node: Node, name_field: &str) -> Option<String> {
        let name_node = node.child_by_field_name(name_field)?;
        let text = name_node.utf8_text(self.source).ok()?;
        Some(strip_generics(text))
    }
}

enum Flattened {
    Path(Vec<String>),
    Dynamic,
}

/// `Engine<T>` -> `Engine`
fn strip_generics(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
}

fn count_branches(node: Node, spec: &LanguageSpec, complexity: &mut u32) {
    if spec.branch_kinds.contains(&node.kind()) {
        *complexity += 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count_branches(child, spec, complexity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{parse_source, python, ParsedFile};
    use std::path::PathBuf;
    use std::time::Duration;

    fn parse_python(source: &str) -> ParsedFile {
        parse_source(
            &python::SPEC,
            source,
            &PathBuf::from("pkg/svc.py"),
            Duration::from_secs(5),
        )
        .expect("should parse")
    }

    fn kinds(facts: &FileFacts) -> Vec<(EntityKind, &str)> {
        facts
            .entities
            .iter()
            .map(|e| (e.kind, e.qualified_name.as_str()))
            .collect()
    }

    #[test]
    fn test_extract_functions_and_methods() {
        let parsed = parse_python(
            "class OrderService:\n    def place(self, order):\n        self.validate(order)\n\n    def validate(self, order):\n        pass\n\ndef main():\n    svc = OrderService()\n    svc.place(None)\n",
        );
        let facts = extract(&parsed, "pkg/svc.py");

        let names = kinds(&facts);
        assert!(names.contains(&(EntityKind::File, "svc")));
        assert!(names.contains(&(EntityKind::Class, "OrderService")));
        assert!(names.contains(&(EntityKind::Function, "OrderService.place")));
        assert!(names.contains(&(EntityKind::Function, "OrderService.validate")));
        assert!(names.contains(&(EntityKind::Function, "main")));

        let place = facts
            .entities
            .iter()
            .find(|e| e.qualified_name == "OrderService.place")
            .unwrap();
        assert_eq!(place.parent.as_deref(), Some("pkg/svc.py::OrderService"));
        assert!(!place.is_module_level);

        let main = facts
            .entities
            .iter()
            .find(|e| e.qualified_name == "main")
            .unwrap();
        assert!(main.is_module_level);
        assert_eq!(main.parent.as_deref(), Some("pkg/svc.py::svc"));
    }

    #[test]
    fn test_self_calls_are_receiver_tagged() {
        let parsed = parse_python(
            "class A:\n    def run(self):\n        self.step()\n\n    def step(self):\n        pass\n",
        );
        let facts = extract(&parsed, "pkg/svc.py");

        let call = facts
            .calls
            .iter()
            .find(|c| c.receiver == CallReceiver::SelfRef)
            .expect("self call recorded");
        assert_eq!(call.callee, "step");
        assert_eq!(call.caller, "pkg/svc.py::A.run");
    }

    #[test]
    fn test_module_level_call_attributed_to_file_node() {
        let parsed = parse_python("def helper():\n    pass\n\nhelper()\n");
        let facts = extract(&parsed, "pkg/svc.py");

        let call = facts.calls.iter().find(|c| c.callee == "helper").unwrap();
        assert_eq!(call.caller, "pkg/svc.py::svc");
        assert_eq!(call.receiver, CallReceiver::Bare);
    }

    #[test]
    fn test_lambda_gets_deterministic_synthetic_name() {
        let parsed = parse_python("def run(xs):\n    return sorted(xs, key=lambda x: x.rank)\n");
        let facts = extract(&parsed, "pkg/svc.py");

        let lambda = facts
            .entities
            .iter()
            .find(|e| e.name.starts_with("<lambda@"))
            .expect("lambda entity");
        assert_eq!(lambda.name, "<lambda@2:26>");
        assert_eq!(lambda.qualified_name, "run.<lambda@2:26>");

        // Same source, same ids
        let again = extract(&parse_python("def run(xs):\n    return sorted(xs, key=lambda x: x.rank)\n"), "pkg/svc.py");
        let lambda_again = again
            .entities
            .iter()
            .find(|e| e.name.starts_with("<lambda@"))
            .unwrap();
        assert_eq!(lambda.id, lambda_again.id);
    }

    #[test]
    fn test_module_level_variables_only() {
        let parsed = parse_python("LIMIT = 10\n\ndef f():\n    local = 2\n    return local\n");
        let facts = extract(&parsed, "pkg/svc.py");

        let variables: Vec<_> = facts
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Variable)
            .collect();
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name, "LIMIT");
    }

    #[test]
    fn test_decorators_recorded_as_annotations() {
        let parsed = parse_python("@app.route('/health')\ndef health():\n    return 'ok'\n");
        let facts = extract(&parsed, "pkg/svc.py");

        let health = facts
            .entities
            .iter()
            .find(|e| e.name == "health")
            .unwrap();
        assert_eq!(health.annotations, vec!["@app.route('/health')"]);
    }

    #[test]
    fn test_inheritance_facts() {
        let parsed = parse_python("class Repo(BaseRepo):\n    pass\n");
        let facts = extract(&parsed, "pkg/svc.py");

        assert_eq!(facts.inherits.len(), 1);
        assert_eq!(facts.inherits[0].subject, "pkg/svc.py::Repo");
        assert_eq!(facts.inherits[0].base, "BaseRepo");
    }

    #[test]
    fn test_complexity_counts_branches() {
        let parsed = parse_python(
            "def decide(x):\n    if x > 0:\n        if x > 10:\n            return 'big'\n        return 'small'\n    elif x < 0:\n        return 'neg'\n    return 'zero'\n",
        );
        let facts = extract(&parsed, "pkg/svc.py");
        let decide = facts.entities.iter().find(|e| e.name == "decide").unwrap();
        assert!(decide.complexity >= 4);
    }

    #[test]
    fn test_rust_impl_methods_and_trait_edge() {
        let parsed = parse_source(
            &crate::parsers::rust_lang::SPEC,
            "struct Store;\n\nimpl Store {\n    fn get(&self) -> u32 {\n        1\n    }\n}\n\nimpl Default for Store {\n    fn default() -> Self {\n        Store\n    }\n}\n",
            &PathBuf::from("store.rs"),
            Duration::from_secs(5),
        )
        .expect("should parse");
        let facts = extract(&parsed, "store.rs");

        let names = kinds(&facts);
        assert!(names.contains(&(EntityKind::Class, "Store")));
        assert!(names.contains(&(EntityKind::Function, "Store.get")));
        assert!(names.contains(&(EntityKind::Function, "Store.default")));
        assert!(facts
            .inherits
            .iter()
            .any(|i| i.subject == "store.rs::Store" && i.base == "Default"));
    }
}
