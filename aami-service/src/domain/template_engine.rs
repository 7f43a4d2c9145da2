//! Shared text-template rendering (§2, §4.1).
//!
//! "Implement once and share" — `TemplateEngine` is the one place `query_template`
//! strings get compiled and rendered. Grounded on `tera::Tera::one_off`, since templates
//! here are data pulled from the store, not files on disk.

use std::collections::HashSet;

use serde_json::Value;
use tera::{Context, Tera};

use crate::error::{Error, Result};

use super::dynamic_value::DynamicMap;

/// Renders text templates over a merged variable scope.
///
/// Missing variables render as empty strings rather than erroring (§4.1: "for
/// backwards compatibility"), which diverges from tera's default behavior of erroring
/// on an undefined variable — so every `{{ var }}` tera reports as undefined is
/// pre-seeded into the context as an empty string before the real render pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Renders `template` against `scope`, treating any variable tera can't resolve as
    /// an empty string instead of failing the render.
    pub fn render(&self, rule_id: &str, template: &str, scope: &DynamicMap) -> Result<String> {
        let mut context = Context::new();
        for (key, value) in scope.iter() {
            context.insert(key, value);
        }

        match Tera::one_off(template, &context, false) {
            Ok(rendered) => Ok(rendered),
            Err(err) => {
                // tera surfaces undefined-variable errors distinctly from genuine parse
                // errors; only the former gets the empty-default treatment.
                if is_undefined_variable_error(&err) {
                    self.render_with_empty_defaults(rule_id, template, scope, &context)
                } else {
                    Err(Error::TemplateError {
                        rule_id: rule_id.to_string(),
                        message: err.to_string(),
                    })
                }
            }
        }
    }

    fn render_with_empty_defaults(
        &self,
        rule_id: &str,
        template: &str,
        scope: &DynamicMap,
        base_context: &Context,
    ) -> Result<String> {
        let mut context = base_context.clone();
        for var in referenced_variables(template) {
            if scope.get(&var).is_none() {
                context.insert(&var, &Value::String(String::new()));
            }
        }

        Tera::one_off(template, &context, false).map_err(|err| Error::TemplateError {
            rule_id: rule_id.to_string(),
            message: err.to_string(),
        })
    }
}

/// Whether a tera error is (transitively) an undefined-variable error rather than a
/// genuine parse failure (e.g. the unterminated `{{ .x` from the spec's scenario 3).
fn is_undefined_variable_error(err: &tera::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(err);
    while let Some(e) = source {
        if e.to_string().contains("not found in context") {
            return true;
        }
        source = e.source();
    }
    false
}

/// Best-effort extraction of `{{ name }}` / `{{ name.field }}` top-level identifiers
/// referenced by a template, used only to seed empty defaults for the retry render.
fn referenced_variables(template: &str) -> HashSet<String> {
    let mut vars = HashSet::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if let Some(end) = template[i + 2..].find("}}") {
                let expr = template[i + 2..i + 2 + end].trim();
                let ident: String = expr
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if !ident.is_empty() {
                    vars.insert(ident);
                }
                i += 2 + end + 2;
                continue;
            }
        }
        i += 1;
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_with_all_variables_present() {
        let engine = TemplateEngine::new();
        let mut scope = DynamicMap::new();
        scope.insert("threshold", json!(90));

        let rendered = engine
            .render("r1", "cpu_usage > {{ threshold }}", &scope)
            .unwrap();
        assert_eq!(rendered, "cpu_usage > 90");
    }

    #[test]
    fn test_missing_variable_renders_empty_not_error() {
        let engine = TemplateEngine::new();
        let scope = DynamicMap::new();

        let rendered = engine
            .render("r1", "cpu_usage > {{ threshold }}", &scope)
            .unwrap();
        assert_eq!(rendered, "cpu_usage > ");
    }

    #[test]
    fn test_genuine_parse_error_is_template_error() {
        let engine = TemplateEngine::new();
        let scope = DynamicMap::new();

        let result = engine.render("r1", "{{ .x", &scope);
        assert!(matches!(result, Err(Error::TemplateError { rule_id, .. }) if rule_id == "r1"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let engine = TemplateEngine::new();
        let mut scope = DynamicMap::new();
        scope.insert("threshold", json!(80));

        let a = engine.render("r1", "x > {{ threshold }}", &scope).unwrap();
        let b = engine.render("r1", "x > {{ threshold }}", &scope).unwrap();
        assert_eq!(a, b);
    }
}
