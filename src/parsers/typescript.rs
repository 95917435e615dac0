//! TypeScript grammar adapter
//!
//! The extraction tables, import collection, and module-candidate logic are
//! shared with the JavaScript adapter; the TypeScript grammar is a superset,
//! so table entries for TS-only node kinds are simply never matched on JS
//! trees.

use crate::models::{EntityKind, RawImport};
use crate::parsers::{
    join_normalize, BindRule, CallRule, ChainRule, ContainerRule, DeclRule, LanguageSpec,
    ScopeRule,
};
use tree_sitter::{Language, Node};

fn grammar() -> Language {
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
}

pub static SPEC: LanguageSpec = LanguageSpec {
    name: "typescript",
    version: "0.23",
    extensions: &["ts"],
    shebang_hints: &["ts-node", "deno"],
    path_separator: "/",
    grammar,

    decls: DECLS,
    containers: CONTAINERS,
    calls: CALLS,
    scopes: SCOPES,
    local_defs: LOCAL_DEFS,
    param_kinds: PARAM_KINDS,
    branch_kinds: BRANCH_KINDS,
    identifier_kinds: &["identifier"],
    annotation_kinds: &["decorator"],
    anonymous_fn_kinds: ANONYMOUS_FN_KINDS,
    member_access: MEMBER_ACCESS,
    import_kinds: &["import_statement"],
    module_index_stems: &["index"],
    builtins: BUILTINS,
    self_names: &["this"],

    collect_imports,
    collect_bases,
    module_candidates,
};

pub(crate) static DECLS: &[DeclRule] = &[
    DeclRule {
        node_kind: "function_declaration",
        entity_kind: EntityKind::Function,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "generator_function_declaration",
        entity_kind: EntityKind::Function,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "method_definition",
        entity_kind: EntityKind::Function,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "class_declaration",
        entity_kind: EntityKind::Class,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "interface_declaration",
        entity_kind: EntityKind::Class,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "enum_declaration",
        entity_kind: EntityKind::Class,
        name_field: "name",
        module_level_only: false,
    },
    DeclRule {
        node_kind: "variable_declarator",
        entity_kind: EntityKind::Variable,
        name_field: "name",
        module_level_only: true,
    },
    DeclRule {
        node_kind: "type_alias_declaration",
        entity_kind: EntityKind::Variable,
        name_field: "name",
        module_level_only: true,
    },
];

pub(crate) static CONTAINERS: &[ContainerRule] = &[
    ContainerRule {
        node_kind: "class_declaration",
        name_field: "name",
    },
    ContainerRule {
        node_kind: "interface_declaration",
        name_field: "name",
    },
];

pub(crate) static CALLS: &[CallRule] = &[
    CallRule {
        node_kind: "call_expression",
        callee_field: "function",
    },
    CallRule {
        node_kind: "new_expression",
        callee_field: "constructor",
    },
];

pub(crate) static SCOPES: &[ScopeRule] = &[
    ScopeRule {
        node_kind: "program",
        inherits: true,
    },
    ScopeRule {
        node_kind: "function_declaration",
        inherits: true,
    },
    ScopeRule {
        node_kind: "generator_function_declaration",
        inherits: true,
    },
    ScopeRule {
        node_kind: "function_expression",
        inherits: true,
    },
    ScopeRule {
        node_kind: "arrow_function",
        inherits: true,
    },
    ScopeRule {
        node_kind: "method_definition",
        inherits: true,
    },
    // Class fields are reached through `this`, not as bare names
    ScopeRule {
        node_kind: "class_declaration",
        inherits: false,
    },
    ScopeRule {
        node_kind: "statement_block",
        inherits: true,
    },
    ScopeRule {
        node_kind: "for_statement",
        inherits: true,
    },
    ScopeRule {
        node_kind: "for_in_statement",
        inherits: true,
    },
    ScopeRule {
        node_kind: "catch_clause",
        inherits: true,
    },
];

pub(crate) static LOCAL_DEFS: &[BindRule] = &[BindRule {
    node_kind: "for_in_statement",
    name_field: "left",
}];

pub(crate) static PARAM_KINDS: &[&str] = &[
    "formal_parameters",
    "required_parameter",
    "optional_parameter",
    "rest_pattern",
];

pub(crate) static BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

pub(crate) static ANONYMOUS_FN_KINDS: &[&str] =
    &["arrow_function", "function_expression", "generator_function"];

pub(crate) static MEMBER_ACCESS: &[ChainRule] = &[ChainRule {
    node_kind: "member_expression",
    object_field: "object",
    member_field: "property",
}];

pub(crate) static BUILTINS: &[&str] = &[
    "console",
    "require",
    "module",
    "exports",
    "JSON",
    "Object",
    "Array",
    "Promise",
    "Math",
    "String",
    "Number",
    "Boolean",
    "Error",
    "Map",
    "Set",
    "Symbol",
    "Date",
    "RegExp",
    "parseInt",
    "parseFloat",
    "isNaN",
    "setTimeout",
    "setInterval",
    "clearTimeout",
    "fetch",
    "window",
    "document",
    "process",
    "globalThis",
];

/// Extract ES import statements from the program root.
pub(crate) fn collect_imports(root: Node, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();

    for node in root.children(&mut cursor) {
        if node.kind() != "import_statement" {
            continue;
        }
        let line = node.start_position().row as u32 + 1;
        let Some(module) = node
            .child_by_field_name("source")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
        else {
            continue;
        };

        let clause = node
            .children(&mut node.walk())
            .find(|c| c.kind() == "import_clause");

        let Some(clause) = clause else {
            // Side-effect import: `import './polyfill'`
            imports.push(RawImport {
                module,
                symbol: None,
                alias: None,
                whole_module: true,
                line,
            });
            continue;
        };

        for child in clause.children(&mut clause.walk()) {
            match child.kind() {
                // Default import binds the module's default export; treat it
                // as a whole-module binding for resolution purposes
                "identifier" => {
                    if let Ok(name) = child.utf8_text(source) {
                        imports.push(RawImport {
                            module: module.clone(),
                            symbol: None,
                            alias: Some(name.to_string()),
                            whole_module: true,
                            line,
                        });
                    }
                }
                "namespace_import" => {
                    let alias = child
                        .children(&mut child.walk())
                        .find(|c| c.kind() == "identifier")
                        .and_then(|n| n.utf8_text(source).ok())
                        .map(|s| s.to_string());
                    imports.push(RawImport {
                        module: module.clone(),
                        symbol: None,
                        alias,
                        whole_module: true,
                        line,
                    });
                }
                "named_imports" => {
                    for spec_node in child.children(&mut child.walk()) {
                        if spec_node.kind() != "import_specifier" {
                            continue;
                        }
                        let symbol = spec_node
                            .child_by_field_name("name")
                            .and_then(|n| n.utf8_text(source).ok())
                            .map(|s| s.to_string());
                        let alias = spec_node
                            .child_by_field_name("alias")
                            .and_then(|n| n.utf8_text(source).ok())
                            .map(|s| s.to_string());
                        if let Some(symbol) = symbol {
                            imports.push(RawImport {
                                module: module.clone(),
                                symbol: Some(symbol),
                                alias,
                                whole_module: false,
                                line,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    imports
}

/// Extract base names from a class heritage clause (`extends` / `implements`).
pub(crate) fn collect_bases(class_node: Node, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    for child in class_node.children(&mut class_node.walk()) {
        if child.kind() == "class_heritage" || child.kind() == "extends_type_clause" {
            collect_heritage_names(&child, source, &mut bases);
        }
    }
    bases
}

fn collect_heritage_names(node: &Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "member_expression" | "type_identifier" | "nested_type_identifier" => {
            if let Ok(text) = node.utf8_text(source) {
                out.push(text.to_string());
            }
        }
        "type_arguments" => {}
        _ => {
            for child in node.children(&mut node.walk()) {
                collect_heritage_names(&child, source, out);
            }
        }
    }
}

/// Candidate repository-relative files for a module specifier. Bare package
/// specifiers produce no candidates and resolve external.
pub(crate) fn module_candidates(spec: &str, importer_dir: &str) -> Vec<String> {
    if !spec.starts_with("./") && !spec.starts_with("../") {
        return Vec::new();
    }
    let joined = join_normalize(importer_dir, spec);
    let mut out = Vec::new();

    let has_ext = [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]
        .iter()
        .any(|e| joined.ends_with(e));
    if has_ext {
        out.push(joined.clone());
        // Compiled specifiers: `./util.js` may live as `util.ts` on disk
        if let Some(stripped) = joined.strip_suffix(".js") {
            out.push(format!("{stripped}.ts"));
        }
        return out;
    }

    for ext in [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"] {
        out.push(format!("{joined}{ext}"));
    }
    out.push(format!("{joined}/index.ts"));
    out.push(format!("{joined}/index.js"));
    out
}
