//! Child-precedence merge algorithm shared between the alert and script resolvers.
//!
//! §9 Design Notes: "Implement once and share between the alert and script resolvers;
//! do not duplicate." Both `resolver::alert_rules` and `resolver::script_policies` call
//! into these free functions rather than re-deriving the merge logic.

use super::dynamic_value::{union_string_maps, DynamicMap, StringMap};
use super::model::{AlertRuleConfig, MergeStrategy, ScriptPolicyConfig};

/// Merges a parent `AlertRuleConfig` with a child override according to `strategy`.
///
/// `Override` replaces the parent's config entirely with the child's. `Merge` (default)
/// unions `labels`/`annotations`/`template_vars` key-wise with child precedence, and
/// replaces `for_duration` only if the child's value is non-empty (§4.1).
pub fn merge_alert_config(
    parent: &AlertRuleConfig,
    child: &AlertRuleConfig,
    strategy: MergeStrategy,
) -> AlertRuleConfig {
    match strategy {
        MergeStrategy::Override => child.clone(),
        MergeStrategy::Merge => AlertRuleConfig {
            for_duration: if child.for_duration.is_empty() {
                parent.for_duration.clone()
            } else {
                child.for_duration.clone()
            },
            labels: union_string_maps(&parent.labels, &child.labels),
            annotations: union_string_maps(&parent.annotations, &child.annotations),
            template_vars: parent.template_vars.union_with_precedence(&child.template_vars),
        },
    }
}

/// Merges a parent `ScriptPolicyConfig` with a child override (always key-wise union;
/// script policies have no override-vs-merge distinction, only the union semantics
/// described for config maps in §4.1).
pub fn merge_script_config(parent: &ScriptPolicyConfig, child: &ScriptPolicyConfig) -> ScriptPolicyConfig {
    ScriptPolicyConfig {
        template_vars: parent.template_vars.union_with_precedence(&child.template_vars),
    }
}

/// Builds the full render scope for a template: `default_config` layered below `config`
/// with child (i.e. `config`) precedence, plus `labels`/`annotations`/`for_duration`
/// exposed as top-level fields (§4.1 Rendering).
pub fn build_render_scope(default_config: &AlertRuleConfig, config: &AlertRuleConfig) -> DynamicMap {
    let mut scope = default_config.template_vars.union_with_precedence(&config.template_vars);

    let labels = union_string_maps(&default_config.labels, &config.labels);
    let annotations = union_string_maps(&default_config.annotations, &config.annotations);
    let for_duration = if config.for_duration.is_empty() {
        default_config.for_duration.clone()
    } else {
        config.for_duration.clone()
    };

    scope.insert("labels", string_map_to_json(&labels));
    scope.insert("annotations", string_map_to_json(&annotations));
    scope.insert("for_duration", serde_json::Value::String(for_duration));

    scope
}

fn string_map_to_json(map: &StringMap) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}
