//! Python grammar adapter
//!
//! Tables cover functions, classes, module-level assignments, decorators,
//! and both `import X [as Y]` and `from M import X [as Y]` forms, including
//! relative imports.

use crate::models::{EntityKind, RawImport};
use crate::parsers::{BindRule, CallRule, ChainRule, ContainerRule, DeclRule, LanguageSpec, ScopeRule};
use tree_sitter::{Language, Node};

fn grammar() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

pub static SPEC: LanguageSpec = LanguageSpec {
    name: "python",
    version: "0.25",
    extensions: &["py", "pyi"],
    shebang_hints: &["python"],
    path_separator: ".",
    grammar,

    decls: &[
        DeclRule {
            node_kind: "function_definition",
            entity_kind: EntityKind::Function,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "class_definition",
            entity_kind: EntityKind::Class,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "assignment",
            entity_kind: EntityKind::Variable,
            name_field: "left",
            module_level_only: true,
        },
    ],
    containers: &[ContainerRule {
        node_kind: "class_definition",
        name_field: "name",
    }],
    calls: &[CallRule {
        node_kind: "call",
        callee_field: "function",
    }],
    scopes: &[
        ScopeRule {
            node_kind: "module",
            inherits: true,
        },
        ScopeRule {
            node_kind: "function_definition",
            inherits: true,
        },
        // Class bodies do not leak bindings into nested functions
        ScopeRule {
            node_kind: "class_definition",
            inherits: false,
        },
        ScopeRule {
            node_kind: "lambda",
            inherits: true,
        },
        ScopeRule {
            node_kind: "list_comprehension",
            inherits: true,
        },
        ScopeRule {
            node_kind: "dictionary_comprehension",
            inherits: true,
        },
        ScopeRule {
            node_kind: "set_comprehension",
            inherits: true,
        },
        ScopeRule {
            node_kind: "generator_expression",
            inherits: true,
        },
    ],
    local_defs: &[
        BindRule {
            node_kind: "for_statement",
            name_field: "left",
        },
        BindRule {
            node_kind: "for_in_clause",
            name_field: "left",
        },
    ],
    param_kinds: &[
        "parameters",
        "lambda_parameters",
        "typed_parameter",
        "default_parameter",
        "typed_default_parameter",
        "list_splat_pattern",
        "dictionary_splat_pattern",
    ],
    branch_kinds: &[
        "if_statement",
        "elif_clause",
        "while_statement",
        "for_statement",
        "except_clause",
        "boolean_operator",
        "conditional_expression",
        "with_statement",
        "assert_statement",
        "case_clause",
    ],
    identifier_kinds: &["identifier"],
    annotation_kinds: &["decorator"],
    anonymous_fn_kinds: &["lambda"],
    member_access: &[
        ChainRule {
            node_kind: "attribute",
            object_field: "object",
            member_field: "attribute",
        },
        // keyword argument names are labels, not references
        ChainRule {
            node_kind: "keyword_argument",
            object_field: "value",
            member_field: "name",
        },
    ],
    import_kinds: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    module_index_stems: &["__init__"],
    builtins: &[
        "print",
        "len",
        "str",
        "int",
        "float",
        "bool",
        "list",
        "dict",
        "set",
        "tuple",
        "range",
        "enumerate",
        "zip",
        "map",
        "filter",
        "sorted",
        "min",
        "max",
        "sum",
        "abs",
        "repr",
        "iter",
        "next",
        "isinstance",
        "issubclass",
        "hasattr",
        "getattr",
        "setattr",
        "open",
        "super",
        "type",
        "id",
        "Exception",
        "ValueError",
        "TypeError",
        "KeyError",
        "RuntimeError",
        "NotImplementedError",
    ],
    self_names: &["self", "cls"],

    collect_imports,
    collect_bases,
    module_candidates,
};

/// Extract import statements from the module root.
fn collect_imports(root: Node, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();

    for node in root.children(&mut cursor) {
        let line = node.start_position().row as u32 + 1;
        match node.kind() {
            "import_statement" => {
                // import a.b, c [as d]
                for child in node.children(&mut node.walk()) {
                    match child.kind() {
                        "dotted_name" => {
                            if let Ok(text) = child.utf8_text(source) {
                                imports.push(RawImport {
                                    module: text.to_string(),
                                    symbol: None,
                                    alias: None,
                                    whole_module: true,
                                    line,
                                });
                            }
                        }
                        "aliased_import" => {
                            let module = child
                                .child_by_field_name("name")
                                .and_then(|n| n.utf8_text(source).ok())
                                .unwrap_or("")
                                .to_string();
                            let alias = child
                                .child_by_field_name("alias")
                                .and_then(|n| n.utf8_text(source).ok())
                                .map(|s| s.to_string());
                            if !module.is_empty() {
                                imports.push(RawImport {
                                    module,
                                    symbol: None,
                                    alias,
                                    whole_module: true,
                                    line,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "import_from_statement" => {
                // from m import a [as b], c
                let Some(module_node) = node.child_by_field_name("module_name") else {
                    continue;
                };
                let Ok(module) = module_node.utf8_text(source) else {
                    continue;
                };

                for child in node.children(&mut node.walk()) {
                    if child.id() == module_node.id() {
                        continue;
                    }
                    match child.kind() {
                        "dotted_name" => {
                            if let Ok(symbol) = child.utf8_text(source) {
                                imports.push(RawImport {
                                    module: module.to_string(),
                                    symbol: Some(symbol.to_string()),
                                    alias: None,
                                    whole_module: false,
                                    line,
                                });
                            }
                        }
                        "aliased_import" => {
                            let symbol = child
                                .child_by_field_name("name")
                                .and_then(|n| n.utf8_text(source).ok())
                                .map(|s| s.to_string());
                            let alias = child
                                .child_by_field_name("alias")
                                .and_then(|n| n.utf8_text(source).ok())
                                .map(|s| s.to_string());
                            if let Some(symbol) = symbol {
                                imports.push(RawImport {
                                    module: module.to_string(),
                                    symbol: Some(symbol),
                                    alias,
                                    whole_module: false,
                                    line,
                                });
                            }
                        }
                        "wildcard_import" => {
                            imports.push(RawImport {
                                module: module.to_string(),
                                symbol: None,
                                alias: None,
                                whole_module: true,
                                line,
                            });
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    imports
}

/// Extract base class names from a `class_definition` node.
fn collect_bases(class_node: Node, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    let Some(superclasses) = class_node.child_by_field_name("superclasses") else {
        return bases;
    };

    for arg in superclasses.children(&mut superclasses.walk()) {
        if let Some(base) = base_name(&arg, source) {
            bases.push(base);
        }
    }
    bases
}

fn base_name(node: &Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" | "attribute" => node.utf8_text(source).ok().map(|s| s.to_string()),
        // Generic[T] - take the base
        "subscript" => node
            .child_by_field_name("value")
            .and_then(|n| base_name(&n, source)),
        // Skip metaclass=... and punctuation
        _ => None,
    }
}

/// Candidate repository-relative files for a Python module path.
fn module_candidates(module: &str, importer_dir: &str) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(stripped) = module.strip_prefix('.') {
        // Relative import: each extra leading dot pops one directory
        let mut dir: Vec<&str> = importer_dir.split('/').filter(|s| !s.is_empty()).collect();
        let mut rest = stripped;
        while let Some(r) = rest.strip_prefix('.') {
            dir.pop();
            rest = r;
        }
        let base = dir.join("/");
        if rest.is_empty() {
            let index = if base.is_empty() {
                "__init__.py".to_string()
            } else {
                format!("{base}/__init__.py")
            };
            out.push(index);
        } else {
            let rel = rest.replace('.', "/");
            let path = if base.is_empty() {
                rel
            } else {
                format!("{base}/{rel}")
            };
            out.push(format!("{path}.py"));
            out.push(format!("{path}/__init__.py"));
        }
    } else {
        let rel = module.replace('.', "/");
        out.push(format!("{rel}.py"));
        out.push(format!("{rel}/__init__.py"));
        // Tolerate an src/ layout
        out.push(format!("src/{rel}.py"));
        out.push(format!("src/{rel}/__init__.py"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_source;
    use std::path::PathBuf;
    use std::time::Duration;

    fn parse(source: &str) -> crate::parsers::ParsedFile {
        parse_source(
            &SPEC,
            source,
            &PathBuf::from("test.py"),
            Duration::from_secs(5),
        )
        .expect("should parse")
    }

    #[test]
    fn test_collect_plain_and_aliased_imports() {
        let parsed = parse("import os\nimport numpy as np\nfrom pathlib import Path\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());

        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].module, "os");
        assert!(imports[0].whole_module);
        assert_eq!(imports[1].module, "numpy");
        assert_eq!(imports[1].alias.as_deref(), Some("np"));
        assert_eq!(imports[1].bound_name(), "np");
        assert_eq!(imports[2].module, "pathlib");
        assert_eq!(imports[2].symbol.as_deref(), Some("Path"));
    }

    #[test]
    fn test_collect_from_import_with_alias() {
        let parsed = parse("from pkg.helpers import helper as h, other\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());

        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "pkg.helpers");
        assert_eq!(imports[0].symbol.as_deref(), Some("helper"));
        assert_eq!(imports[0].alias.as_deref(), Some("h"));
        assert_eq!(imports[1].symbol.as_deref(), Some("other"));
        assert_eq!(imports[1].alias, None);
    }

    #[test]
    fn test_collect_relative_import() {
        let parsed = parse("from . import util\nfrom ..core import engine\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());

        assert_eq!(imports[0].module, ".");
        assert_eq!(imports[0].symbol.as_deref(), Some("util"));
        assert_eq!(imports[1].module, "..core");
        assert_eq!(imports[1].symbol.as_deref(), Some("engine"));
    }

    #[test]
    fn test_collect_bases() {
        let parsed = parse("class Svc(Base, mixins.Loggable, Generic[T], metaclass=Meta):\n    pass\n");
        let root = parsed.root();
        let class_node = root
            .children(&mut root.walk())
            .find(|n| n.kind() == "class_definition")
            .unwrap();
        let bases = collect_bases(class_node, parsed.bytes());
        assert_eq!(bases, vec!["Base", "mixins.Loggable", "Generic"]);
    }

    #[test]
    fn test_module_candidates_absolute() {
        let candidates = module_candidates("pkg.b", "anywhere");
        assert!(candidates.contains(&"pkg/b.py".to_string()));
        assert!(candidates.contains(&"pkg/b/__init__.py".to_string()));
    }

    #[test]
    fn test_module_candidates_relative() {
        let candidates = module_candidates(".helper", "pkg");
        assert_eq!(candidates[0], "pkg/helper.py");

        let candidates = module_candidates("..core", "pkg/sub");
        assert_eq!(candidates[0], "pkg/core.py");

        let candidates = module_candidates(".", "pkg");
        assert_eq!(candidates, vec!["pkg/__init__.py".to_string()]);
    }
}
