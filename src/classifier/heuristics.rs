//! Local heuristic classification pass
//!
//! Tiers, strongest first: annotation markers, file-path conventions, name
//! suffixes, verb prefixes, then constant-shape variables. The first match
//! wins; everything else falls back to Utility at low confidence so no
//! entity is left unclassified.

use super::{Classification, Role};
use crate::models::{Entity, EntityKind};

pub fn classify_local(entity: &Entity) -> Classification {
    if let Some(c) = by_annotation(entity) {
        return c;
    }
    if let Some(c) = by_path(entity) {
        return c;
    }
    if let Some(c) = by_suffix(entity) {
        return c;
    }
    if let Some(c) = by_prefix(entity) {
        return c;
    }
    if let Some(c) = by_shape(entity) {
        return c;
    }
    Classification::new(Role::Utility, 0.30, "fallback")
}

fn by_annotation(entity: &Entity) -> Option<Classification> {
    for annotation in &entity.annotations {
        let lower = annotation.to_lowercase();
        if lower.contains("fixture") {
            return Some(Classification::new(Role::Configuration, 0.92, "annotation:fixture"));
        }
        if lower.contains("test") {
            return Some(Classification::new(Role::Test, 0.92, "annotation:test"));
        }
        if lower.contains("route") || lower.contains("router") || lower.contains("mapping") {
            return Some(Classification::new(Role::Controller, 0.90, "annotation:route"));
        }
        if lower.contains("validator") {
            return Some(Classification::new(Role::Validator, 0.90, "annotation:validator"));
        }
    }
    None
}

fn by_path(entity: &Entity) -> Option<Classification> {
    let path = format!("/{}", entity.file.to_lowercase());
    let file_name = path.rsplit('/').next().unwrap_or("").to_string();

    if path.contains("/tests/")
        || path.contains("/test/")
        || file_name.starts_with("test_")
        || file_name.ends_with("_test.py")
        || file_name.ends_with("_test.rs")
        || file_name.contains(".spec.")
        || file_name.contains(".test.")
    {
        return Some(Classification::new(Role::Test, 0.85, "path:test"));
    }
    if path.contains("/config/") || path.contains("/settings") || file_name.starts_with("conf") {
        return Some(Classification::new(Role::Configuration, 0.80, "path:config"));
    }
    if path.contains("/controllers/")
        || path.contains("/handlers/")
        || path.contains("/routes/")
        || path.contains("/api/")
        || path.contains("/views/")
    {
        return Some(Classification::new(Role::Controller, 0.80, "path:controller"));
    }
    if path.contains("/repositories/") || path.contains("/dao/") {
        return Some(Classification::new(Role::Repository, 0.80, "path:repository"));
    }
    if path.contains("/models/") || path.contains("/entities/") || path.contains("/domain/") {
        return Some(Classification::new(Role::Entity, 0.75, "path:model"));
    }
    if path.contains("/utils/")
        || path.contains("/helpers/")
        || path.contains("/common/")
        || path.contains("/shared/")
    {
        return Some(Classification::new(Role::Utility, 0.70, "path:utility"));
    }
    None
}

fn by_suffix(entity: &Entity) -> Option<Classification> {
    let name = entity.name.to_lowercase();
    let (role, rule) = if name.ends_with("service") {
        (Role::Service, "suffix:service")
    } else if name.ends_with("repository") || name.ends_with("repo") || name.ends_with("store") {
        (Role::Repository, "suffix:repository")
    } else if name.ends_with("controller") {
        (Role::Controller, "suffix:controller")
    } else if name.ends_with("handler") || name.ends_with("listener") {
        (Role::EventHandler, "suffix:handler")
    } else if name.ends_with("factory") || name.ends_with("builder") {
        (Role::Factory, "suffix:factory")
    } else if name.ends_with("validator") {
        (Role::Validator, "suffix:validator")
    } else if name.ends_with("error") || name.ends_with("exception") {
        (Role::Exception, "suffix:exception")
    } else if name.ends_with("config") || name.ends_with("configuration") || name.ends_with("settings") {
        (Role::Configuration, "suffix:config")
    } else if name.ends_with("test") || name.ends_with("tests") {
        (Role::Test, "suffix:test")
    } else if name.ends_with("mapper")
        || name.ends_with("serializer")
        || name.ends_with("transformer")
        || name.ends_with("converter")
    {
        (Role::Transformer, "suffix:transformer")
    } else if name.ends_with("command") {
        (Role::Command, "suffix:command")
    } else if name.ends_with("query") {
        (Role::Query, "suffix:query")
    } else {
        return None;
    };
    Some(Classification::new(role, 0.80, rule))
}

fn by_prefix(entity: &Entity) -> Option<Classification> {
    if entity.kind != EntityKind::Function {
        return None;
    }
    let name = &entity.name;

    if has_verb_prefix(name, "test") {
        return Some(Classification::new(Role::Test, 0.88, "prefix:test"));
    }
    if matches!(name.as_str(), "main" | "run" | "start" | "execute") {
        return Some(Classification::new(Role::EntryPoint, 0.85, "name:entry"));
    }
    for verb in ["get", "find", "fetch", "load", "list", "read", "is", "has", "can", "should"] {
        if has_verb_prefix(name, verb) {
            return Some(Classification::new(Role::Query, 0.65, "prefix:query"));
        }
    }
    for verb in ["create", "update", "delete", "save", "set", "add", "remove", "write", "insert"] {
        if has_verb_prefix(name, verb) {
            return Some(Classification::new(Role::Command, 0.65, "prefix:command"));
        }
    }
    for verb in ["validate", "check", "verify", "ensure"] {
        if has_verb_prefix(name, verb) {
            return Some(Classification::new(Role::Validator, 0.65, "prefix:validator"));
        }
    }
    for verb in ["on", "handle"] {
        if has_verb_prefix(name, verb) {
            return Some(Classification::new(Role::EventHandler, 0.65, "prefix:handler"));
        }
    }
    for verb in ["to", "from", "convert", "parse", "format", "render"] {
        if has_verb_prefix(name, verb) {
            return Some(Classification::new(Role::Transformer, 0.60, "prefix:transformer"));
        }
    }
    None
}

/// Constant-shaped module variables read as configuration.
fn by_shape(entity: &Entity) -> Option<Classification> {
    if entity.kind == EntityKind::Variable
        && entity.is_module_level
        && entity.name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
        && entity.name.chars().any(|c| c.is_ascii_uppercase())
    {
        return Some(Classification::new(Role::Configuration, 0.60, "shape:constant"));
    }
    None
}

/// `snake_case` (`get_user`) or `camelCase` (`getUser`) verb prefix match.
fn has_verb_prefix(name: &str, verb: &str) -> bool {
    let lower = name.to_lowercase();
    if lower == verb {
        return false;
    }
    if let Some(rest) = lower.strip_prefix(verb) {
        if rest.starts_with('_') {
            return true;
        }
        // Camel-case boundary in the original name
        if let Some(next) = name.chars().nth(verb.len()) {
            return next.is_ascii_uppercase();
        }
    }
    false
}
