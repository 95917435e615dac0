//! Rust grammar adapter
//!
//! Functions, structs, enums, traits, and module-level consts become
//! entities; `impl` blocks contribute qualified-name segments so methods
//! land as `Type.method`. `use` declarations and file-level `mod foo;`
//! declarations both feed the import resolver.

use crate::models::{EntityKind, RawImport};
use crate::parsers::{BindRule, CallRule, ChainRule, ContainerRule, DeclRule, LanguageSpec, ScopeRule};
use tree_sitter::{Language, Node};

fn grammar() -> Language {
    tree_sitter_rust::LANGUAGE.into()
}

pub static SPEC: LanguageSpec = LanguageSpec {
    name: "rust",
    version: "0.24",
    extensions: &["rs"],
    shebang_hints: &[],
    path_separator: "::",
    grammar,

    decls: &[
        DeclRule {
            node_kind: "function_item",
            entity_kind: EntityKind::Function,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "struct_item",
            entity_kind: EntityKind::Class,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "enum_item",
            entity_kind: EntityKind::Class,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "trait_item",
            entity_kind: EntityKind::Class,
            name_field: "name",
            module_level_only: false,
        },
        DeclRule {
            node_kind: "const_item",
            entity_kind: EntityKind::Variable,
            name_field: "name",
            module_level_only: true,
        },
        DeclRule {
            node_kind: "static_item",
            entity_kind: EntityKind::Variable,
            name_field: "name",
            module_level_only: true,
        },
    ],
    containers: &[
        ContainerRule {
            node_kind: "impl_item",
            name_field: "type",
        },
        ContainerRule {
            node_kind: "trait_item",
            name_field: "name",
        },
        ContainerRule {
            node_kind: "mod_item",
            name_field: "name",
        },
    ],
    calls: &[CallRule {
        node_kind: "call_expression",
        callee_field: "function",
    }],
    scopes: &[
        ScopeRule {
            node_kind: "source_file",
            inherits: true,
        },
        ScopeRule {
            node_kind: "function_item",
            inherits: true,
        },
        ScopeRule {
            node_kind: "block",
            inherits: true,
        },
        ScopeRule {
            node_kind: "closure_expression",
            inherits: true,
        },
        // Methods are reached through Self/receiver paths, not bare names
        ScopeRule {
            node_kind: "impl_item",
            inherits: false,
        },
        ScopeRule {
            node_kind: "trait_item",
            inherits: false,
        },
        ScopeRule {
            node_kind: "mod_item",
            inherits: true,
        },
    ],
    local_defs: &[
        BindRule {
            node_kind: "let_declaration",
            name_field: "pattern",
        },
        BindRule {
            node_kind: "for_expression",
            name_field: "pattern",
        },
    ],
    param_kinds: &[
        "parameters",
        "parameter",
        "self_parameter",
        "closure_parameters",
    ],
    branch_kinds: &[
        "if_expression",
        "match_arm",
        "while_expression",
        "for_expression",
        "loop_expression",
    ],
    identifier_kinds: &["identifier"],
    annotation_kinds: &["attribute_item"],
    anonymous_fn_kinds: &["closure_expression"],
    member_access: &[
        ChainRule {
            node_kind: "field_expression",
            object_field: "value",
            member_field: "field",
        },
        ChainRule {
            node_kind: "scoped_identifier",
            object_field: "path",
            member_field: "name",
        },
    ],
    import_kinds: &["use_declaration", "extern_crate_declaration"],
    module_index_stems: &["mod", "lib", "main"],
    builtins: &[
        "Some", "None", "Ok", "Err", "Box", "Vec", "String", "Option", "Result", "drop",
        "Default", "Clone", "Arc", "Rc",
    ],
    self_names: &["self", "Self"],

    collect_imports,
    collect_bases,
    module_candidates,
};

/// Extract `use` declarations and file-level `mod foo;` declarations.
fn collect_imports(root: Node, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();

    for node in root.children(&mut cursor) {
        let line = node.start_position().row as u32 + 1;
        match node.kind() {
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    collect_use_tree(&argument, "", source, line, &mut imports);
                }
            }
            // `mod helpers;` without a body pulls in a sibling module file
            "mod_item" => {
                if node.child_by_field_name("body").is_none() {
                    if let Some(name) = node
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source).ok())
                    {
                        imports.push(RawImport {
                            module: format!("self::{name}"),
                            symbol: None,
                            alias: None,
                            whole_module: true,
                            line,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    imports
}

/// Flatten one arm of a use tree. `prefix` accumulates the path outside a
/// `scoped_use_list`.
fn collect_use_tree(node: &Node, prefix: &str, source: &[u8], line: u32, out: &mut Vec<RawImport>) {
    let join = |head: &str, tail: &str| -> String {
        if head.is_empty() {
            tail.to_string()
        } else {
            format!("{head}::{tail}")
        }
    };

    match node.kind() {
        "identifier" => {
            let Ok(name) = node.utf8_text(source) else {
                return;
            };
            if prefix.is_empty() {
                // `use helpers;` binds the module itself
                out.push(RawImport {
                    module: name.to_string(),
                    symbol: None,
                    alias: None,
                    whole_module: true,
                    line,
                });
            } else {
                out.push(RawImport {
                    module: prefix.to_string(),
                    symbol: Some(name.to_string()),
                    alias: None,
                    whole_module: false,
                    line,
                });
            }
        }
        "self" => {
            if !prefix.is_empty() {
                out.push(RawImport {
                    module: prefix.to_string(),
                    symbol: None,
                    alias: None,
                    whole_module: true,
                    line,
                });
            }
        }
        "scoped_identifier" => {
            let Ok(text) = node.utf8_text(source) else {
                return;
            };
            let full = join(prefix, text);
            match full.rsplit_once("::") {
                Some((module, symbol)) => out.push(RawImport {
                    module: module.to_string(),
                    symbol: Some(symbol.to_string()),
                    alias: None,
                    whole_module: false,
                    line,
                }),
                None => out.push(RawImport {
                    module: full,
                    symbol: None,
                    alias: None,
                    whole_module: true,
                    line,
                }),
            }
        }
        "use_as_clause" => {
            let alias = node
                .child_by_field_name("alias")
                .and_then(|n| n.utf8_text(source).ok())
                .map(|s| s.to_string());
            if let Some(path) = node.child_by_field_name("path") {
                let before = out.len();
                collect_use_tree(&path, prefix, source, line, out);
                if let Some(imp) = out.get_mut(before) {
                    imp.alias = alias;
                }
            }
        }
        "use_wildcard" => {
            let Ok(text) = node.utf8_text(source) else {
                return;
            };
            let module = join(prefix, text.trim_end_matches("::*").trim_end_matches('*'));
            out.push(RawImport {
                module,
                symbol: None,
                alias: None,
                whole_module: true,
                line,
            });
        }
        "scoped_use_list" => {
            let new_prefix = node
                .child_by_field_name("path")
                .and_then(|n| n.utf8_text(source).ok())
                .map(|p| join(prefix, p))
                .unwrap_or_else(|| prefix.to_string());
            if let Some(list) = node.child_by_field_name("list") {
                for child in list.children(&mut list.walk()) {
                    collect_use_tree(&child, &new_prefix, source, line, out);
                }
            }
        }
        "use_list" => {
            for child in node.children(&mut node.walk()) {
                collect_use_tree(&child, prefix, source, line, out);
            }
        }
        _ => {}
    }
}

/// Rust has no class inheritance; trait relationships come from `impl`
/// blocks, which the extractor reads off the container node directly.
fn collect_bases(_class_node: Node, _source: &[u8]) -> Vec<String> {
    Vec::new()
}

fn parent_dir(dir: &str) -> String {
    match dir.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Candidate repository-relative files for a Rust module path.
fn module_candidates(module: &str, importer_dir: &str) -> Vec<String> {
    let (base, rest) = if let Some(r) = module.strip_prefix("crate::") {
        (String::new(), r.to_string())
    } else if module == "crate" {
        (String::new(), String::new())
    } else if let Some(r) = module.strip_prefix("self::") {
        (importer_dir.to_string(), r.to_string())
    } else if let Some(r) = module.strip_prefix("super::") {
        (parent_dir(importer_dir), r.to_string())
    } else if module == "super" {
        (parent_dir(importer_dir), String::new())
    } else {
        // Bare path: sibling module in a flat layout, or an external crate
        (String::new(), module.to_string())
    };

    let mut out = Vec::new();
    if rest.is_empty() {
        // The crate root itself
        for root in ["lib.rs", "main.rs", "src/lib.rs", "src/main.rs"] {
            out.push(root.to_string());
        }
        return out;
    }

    let rel = rest.replace("::", "/");
    let path = if base.is_empty() {
        rel
    } else {
        format!("{base}/{rel}")
    };
    out.push(format!("{path}.rs"));
    out.push(format!("{path}/mod.rs"));
    if base.is_empty() && !path.starts_with("src/") {
        out.push(format!("src/{path}.rs"));
        out.push(format!("src/{path}/mod.rs"));
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
            &PathBuf::from("test.rs"),
            Duration::from_secs(5),
        )
        .expect("should parse")
    }

    #[test]
    fn test_use_scoped_path() {
        let parsed = parse("use crate::scope::Binding;\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "crate::scope");
        assert_eq!(imports[0].symbol.as_deref(), Some("Binding"));
    }

    #[test]
    fn test_use_list_and_alias() {
        let parsed = parse("use helpers::{alpha, beta as b};\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "helpers");
        assert_eq!(imports[0].symbol.as_deref(), Some("alpha"));
        assert_eq!(imports[1].symbol.as_deref(), Some("beta"));
        assert_eq!(imports[1].alias.as_deref(), Some("b"));
        assert_eq!(imports[1].bound_name(), "b");
    }

    #[test]
    fn test_mod_declaration_becomes_import() {
        let parsed = parse("mod helpers;\n\nmod inline {\n    pub fn x() {}\n}\n");
        let imports = collect_imports(parsed.root(), parsed.bytes());
        // Only the bodyless declaration references another file
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "self::helpers");
        assert!(imports[0].whole_module);
        assert_eq!(imports[0].bound_name(), "helpers");
    }

    #[test]
    fn test_module_candidates() {
        let candidates = module_candidates("crate::scope", "src");
        assert!(candidates.contains(&"scope.rs".to_string()));
        assert!(candidates.contains(&"src/scope.rs".to_string()));
        assert!(candidates.contains(&"scope/mod.rs".to_string()));

        let candidates = module_candidates("self::helpers", "");
        assert_eq!(candidates[0], "helpers.rs");

        let candidates = module_candidates("crate", "src");
        assert!(candidates.contains(&"src/lib.rs".to_string()));
    }
}
