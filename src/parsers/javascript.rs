//! JavaScript grammar adapter
//!
//! Shares every extraction table with the TypeScript adapter; only the
//! grammar handle and extensions differ.

use super::typescript;
use crate::parsers::LanguageSpec;
use tree_sitter::Language;

fn grammar() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

pub static SPEC: LanguageSpec = LanguageSpec {
    name: "javascript",
    version: "0.25",
    extensions: &["js", "jsx", "mjs", "cjs"],
    shebang_hints: &["node"],
    path_separator: "/",
    grammar,

    decls: typescript::DECLS,
    containers: typescript::CONTAINERS,
    calls: typescript::CALLS,
    scopes: typescript::SCOPES,
    local_defs: typescript::LOCAL_DEFS,
    param_kinds: typescript::PARAM_KINDS,
    branch_kinds: typescript::BRANCH_KINDS,
    identifier_kinds: &["identifier"],
    annotation_kinds: &["decorator"],
    anonymous_fn_kinds: typescript::ANONYMOUS_FN_KINDS,
    member_access: typescript::MEMBER_ACCESS,
    import_kinds: &["import_statement"],
    module_index_stems: &["index"],
    builtins: typescript::BUILTINS,
    self_names: &["this"],

    collect_imports: typescript::collect_imports,
    collect_bases: typescript::collect_bases,
    module_candidates: typescript::module_candidates,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_source;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_js_parses_with_shared_tables() {
        let parsed = parse_source(
            &SPEC,
            "import { helper } from './util';\n\nfunction main() {\n  return helper();\n}\n",
            &PathBuf::from("test.js"),
            Duration::from_secs(5),
        )
        .expect("should parse");

        let imports = (SPEC.collect_imports)(parsed.root(), parsed.bytes());
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].symbol.as_deref(), Some("helper"));
    }
}
