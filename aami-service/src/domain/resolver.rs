//! Effective-policy resolution (§4.1): the core's largest single component.
//!
//! Given a target, computes the ordered list of effective alert rules or script
//! policies that apply to it, merging by group lineage and rendering templates over
//! the merged variable scope.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ids::{GroupId, TargetId};

use super::merge::{build_render_scope, merge_alert_config, merge_script_config};
use super::model::{AlertRule, AlertRuleConfig, ScriptPolicy, ScriptPolicyConfig};
use super::repositories::{AlertRuleRepository, GroupRepository, ScriptPolicyRepository, TargetRepository};
use super::template_engine::TemplateEngine;

/// A fully resolved alert rule: the stored rule plus its rendered query and the group
/// the winning (highest-priority) definition came from (§4.1 Output shape).
#[derive(Debug, Clone)]
pub struct EffectiveAlertRule {
    pub rule: AlertRule,
    pub rendered_query: String,
    pub source_group: GroupId,
}

/// A fully resolved script policy (§4.1 Output shape).
#[derive(Debug, Clone)]
pub struct EffectiveCheck {
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: super::model::ScriptLanguage,
    pub merged_config: ScriptPolicyConfig,
    pub version: String,
    pub hash: String,
    pub policy_id: crate::ids::ScriptPolicyId,
}

/// Resolves effective alert rules and script policies for a target.
///
/// Unit struct like [`TemplateEngine`]: holds no state, every operation takes the store
/// and the `TemplateEngine` it needs explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyResolver;

impl PolicyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Every group directly linked to `target_id`, plus (if hierarchy is present) every
    /// ancestor of those groups, nearest-first, deduplicated. A group with no parent
    /// contributes nothing beyond itself (§9: flat model short-circuits).
    async fn group_set<S>(&self, store: &S, target_id: &TargetId) -> Result<Vec<GroupId>>
    where
        S: TargetRepository + GroupRepository,
    {
        let direct = store.groups_for_target(target_id).await?;
        let mut seen: Vec<GroupId> = Vec::new();
        for gid in &direct {
            if !seen.contains(gid) {
                seen.push(gid.clone());
            }
        }
        for gid in &direct {
            for ancestor in store.get_ancestors(gid).await? {
                if !seen.contains(&ancestor.id) {
                    seen.push(ancestor.id);
                }
            }
        }
        Ok(seen)
    }

    /// Computes the effective, ordered alert-rule list for `target_id` (§4.1).
    pub async fn effective_alert_rules_for_target<S>(
        &self,
        store: &S,
        target_id: &TargetId,
    ) -> Result<Vec<EffectiveAlertRule>>
    where
        S: TargetRepository + GroupRepository + AlertRuleRepository,
    {
        let target = store
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Target {target_id}")))?;
        let _ = target;

        let groups = self.group_set(store, target_id).await?;

        let mut rules = Vec::new();
        for gid in &groups {
            rules.extend(store.get_by_group_id(gid).await?.into_iter().filter(|r| r.enabled));
        }

        // Group by logical identity (name); the winner of each identity class is the
        // highest-priority rule, with lower-priority same-name rules folded in as
        // parent layers for the merge (§4.1: "rules that share name under the same
        // group lineage merge").
        let mut by_name: HashMap<String, Vec<AlertRule>> = HashMap::new();
        for rule in rules {
            by_name.entry(rule.name.clone()).or_default().push(rule);
        }

        let engine = TemplateEngine::new();
        let mut effective = Vec::new();

        for (_, mut group) in by_name {
            // Ancestors sort later in `groups` (nearest-first population order means
            // ancestors were appended after direct links), so the nearest definition
            // (closest to the target) should win. Sort parent→child by walking
            // `groups` order: direct groups (and groups nearer the target) come first
            // in `groups`, so stable-sort by that position descending puts the
            // nearest-to-target rule last, which we then fold right-to-left.
            group.sort_by_key(|r| groups.iter().position(|g| g == &r.group_id).unwrap_or(usize::MAX));
            group.reverse(); // parent (farthest ancestor) first, child (nearest) last

            let mut iter = group.into_iter();
            let Some(mut winner) = iter.next() else { continue };
            let mut winning_config = winner.default_config.clone();
            winning_config = merge_alert_config(&winning_config, &winner.config, winner.merge_strategy);

            for child in iter {
                let parent_layer = AlertRuleConfig {
                    for_duration: winning_config.for_duration.clone(),
                    labels: winning_config.labels.clone(),
                    annotations: winning_config.annotations.clone(),
                    template_vars: winning_config.template_vars.clone(),
                };
                winning_config = merge_alert_config(&parent_layer, &child.config, child.merge_strategy);
                winner = child;
            }

            let scope = build_render_scope(&winner.default_config, &winning_config);
            let rendered_query = engine.render(winner.id.as_str(), &winner.query_template, &scope)?;

            effective.push(EffectiveAlertRule {
                source_group: winner.group_id.clone(),
                rule: AlertRule {
                    config: winning_config,
                    ..winner
                },
                rendered_query,
            });
        }

        effective.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority).then_with(|| a.rule.name.cmp(&b.rule.name)));
        Ok(effective)
    }

    /// Computes the effective, ordered script-policy list for `target_id` (§4.1).
    ///
    /// Global policies always apply regardless of group state (§9 Design Notes,
    /// resolved open question); group policies apply iff `group_id` is in the
    /// target's group set.
    pub async fn effective_checks_for_target<S>(&self, store: &S, target_id: &TargetId) -> Result<Vec<EffectiveCheck>>
    where
        S: TargetRepository + GroupRepository + ScriptPolicyRepository,
    {
        let groups = self.group_set(store, target_id).await?;

        let mut policies = store.get_global_instances().await?;
        for gid in &groups {
            policies.extend(store.get_by_group_id(gid).await?);
        }
        policies.retain(|p| p.is_active);

        let mut by_name: HashMap<String, Vec<ScriptPolicy>> = HashMap::new();
        for policy in policies {
            by_name.entry(policy.name.clone()).or_default().push(policy);
        }

        let mut effective = Vec::new();
        for (_, mut group) in by_name {
            group.sort_by_key(|p| p.priority);
            let mut iter = group.into_iter();
            let Some(mut winner) = iter.next() else { continue };
            let mut merged: ScriptPolicyConfig = merge_script_config(&winner.default_config, &winner.config);

            for child in iter {
                let parent_layer = ScriptPolicyConfig {
                    template_vars: merged.template_vars.clone(),
                };
                merged = merge_script_config(&parent_layer, &child.config);
                winner = child;
            }

            effective.push(EffectiveCheck {
                name: winner.name,
                script_type: winner.script_type,
                script_content: winner.script_content,
                language: winner.language,
                merged_config: merged,
                version: winner.version,
                hash: winner.hash,
                policy_id: winner.id,
            });
        }

        effective.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory_store::InMemoryStore;
    use crate::domain::model::{
        CreateAlertRule, CreateGroup, CreateScriptPolicy, CreateTarget, DynamicMap, MergeStrategy,
        ScriptLanguage, ScriptPolicyScope, Severity, StringMap,
    };
    use crate::repository::Repository;
    use serde_json::json;

    async fn fixture_target_in_hierarchy(
        store: &InMemoryStore,
    ) -> (TargetId, GroupId, GroupId) {
        let parent = store
            .create(CreateGroup {
                name: "parent".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let child = store
            .create(CreateGroup {
                name: "child".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: Some(parent.id.clone()),
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let target = store
            .create(CreateTarget {
                hostname: "t1".into(),
                ip_address: "10.0.0.1".into(),
                status: None,
                labels: StringMap::new(),
                metadata: DynamicMap::new(),
            })
            .await
            .unwrap();

        store.link_group(&target.id, &child.id, true).await.unwrap();

        (target.id, parent.id, child.id)
    }

    fn config_with_threshold(threshold: i64, duration: &str) -> AlertRuleConfig {
        let mut template_vars = DynamicMap::new();
        template_vars.insert("threshold", json!(threshold));
        AlertRuleConfig {
            for_duration: duration.to_string(),
            labels: StringMap::new(),
            annotations: StringMap::new(),
            template_vars,
        }
    }

    #[tokio::test]
    async fn test_effective_rules_merge_parent_and_child_threshold() {
        let store = InMemoryStore::new();
        let (target_id, parent_id, child_id) = fixture_target_in_hierarchy(&store).await;

        store
            .create(CreateAlertRule {
                group_id: parent_id,
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "high-cpu".into(),
                description: None,
                severity: Severity::Warning,
                query_template: "cpu > {{ threshold }} for {{ for_duration }}".into(),
                default_config: AlertRuleConfig::default(),
                config: config_with_threshold(80, "5m"),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        store
            .create(CreateAlertRule {
                group_id: child_id,
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "high-cpu".into(),
                description: None,
                severity: Severity::Warning,
                query_template: "cpu > {{ threshold }} for {{ for_duration }}".into(),
                default_config: AlertRuleConfig::default(),
                config: config_with_threshold(90, ""),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        let resolver = PolicyResolver::new();
        let effective = resolver
            .effective_alert_rules_for_target(&store, &target_id)
            .await
            .unwrap();

        assert_eq!(effective.len(), 1);
        let rule = &effective[0];
        assert_eq!(rule.rule.config.template_vars.get("threshold"), Some(json!(90)));
        assert_eq!(rule.rule.config.for_duration, "5m");
        assert_eq!(rule.rendered_query, "cpu > 90 for 5m");
    }

    #[tokio::test]
    async fn test_effective_rules_target_not_found() {
        let store = InMemoryStore::new();
        let resolver = PolicyResolver::new();
        let result = resolver
            .effective_alert_rules_for_target(&store, &TargetId::new())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_effective_rules_ordering_priority_desc_name_asc() {
        let store = InMemoryStore::new();
        let (target_id, _parent_id, child_id) = fixture_target_in_hierarchy(&store).await;

        for (name, priority) in [("b-rule", 50), ("a-rule", 50), ("z-rule", 200)] {
            store
                .create(CreateAlertRule {
                    group_id: child_id.clone(),
                    enabled: true,
                    priority: Some(priority),
                    merge_strategy: MergeStrategy::Merge,
                    name: name.into(),
                    description: None,
                    severity: Severity::Info,
                    query_template: "up".into(),
                    default_config: AlertRuleConfig::default(),
                    config: AlertRuleConfig::default(),
                    created_from_template_id: None,
                    created_from_template_name: None,
                })
                .await
                .unwrap();
        }

        let resolver = PolicyResolver::new();
        let effective = resolver
            .effective_alert_rules_for_target(&store, &target_id)
            .await
            .unwrap();

        let names: Vec<&str> = effective.iter().map(|r| r.rule.name.as_str()).collect();
        assert_eq!(names, vec!["z-rule", "a-rule", "b-rule"]);
    }

    #[tokio::test]
    async fn test_effective_checks_global_and_group_scoped() {
        let store = InMemoryStore::new();
        let (target_id, _parent_id, child_id) = fixture_target_in_hierarchy(&store).await;

        store
            .create(CreateScriptPolicy {
                scope: ScriptPolicyScope::Global,
                group_id: None,
                priority: Some(100),
                is_active: true,
                name: "uptime".into(),
                script_type: "uptime".into(),
                script_content: "echo ok".into(),
                language: ScriptLanguage::Bash,
                default_config: ScriptPolicyConfig::default(),
                version: "1".into(),
                hash: crate::domain::hash_script_content("echo ok"),
                config: ScriptPolicyConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        store
            .create(CreateScriptPolicy {
                scope: ScriptPolicyScope::Group,
                group_id: Some(child_id),
                priority: Some(100),
                is_active: true,
                name: "disk-check".into(),
                script_type: "disk".into(),
                script_content: "df -h".into(),
                language: ScriptLanguage::Bash,
                default_config: ScriptPolicyConfig::default(),
                version: "1".into(),
                hash: crate::domain::hash_script_content("df -h"),
                config: ScriptPolicyConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        let resolver = PolicyResolver::new();
        let checks = resolver.effective_checks_for_target(&store, &target_id).await.unwrap();

        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, "disk-check");
        assert_eq!(checks[1].name, "uptime");
    }

    #[tokio::test]
    async fn test_effective_rules_template_error_surfaces_rule_id() {
        let store = InMemoryStore::new();
        let (target_id, _parent_id, child_id) = fixture_target_in_hierarchy(&store).await;

        store
            .create(CreateAlertRule {
                group_id: child_id,
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "broken".into(),
                description: None,
                severity: Severity::Critical,
                query_template: "{{ .x".into(),
                default_config: AlertRuleConfig::default(),
                config: AlertRuleConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        let resolver = PolicyResolver::new();
        let result = resolver.effective_alert_rules_for_target(&store, &target_id).await;
        assert!(matches!(result, Err(Error::TemplateError { .. })));
    }
}
