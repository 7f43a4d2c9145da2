//! Rule generator (§4.2): joins resolver output with the rule-file manager, grouping
//! emitted rules by emission unit (one file per group) and orchestrating regeneration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::GroupId;

use super::merge::build_render_scope;
use super::model::StringMap;
use super::repositories::{AlertRuleRepository, GroupRepository, TargetRepository};
use super::resolver::PolicyResolver;
use super::rule_file_manager::RuleFileManager;
use super::template_engine::TemplateEngine;

/// Top-level Prometheus rule-file document (§4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFileDocument {
    pub groups: Vec<RuleGroupDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleGroupDocument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    pub rules: Vec<RuleDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    pub alert: String,
    pub expr: String,
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub r#for: Option<String>,
    pub labels: StringMap,
    pub annotations: StringMap,
}

/// Result of generating rules for a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRuleOutcome {
    /// The group's file was written with at least one rule.
    Written,
    /// The group had zero active rules; its file (if any) was deleted.
    Deleted,
}

/// Translates resolver output into on-disk rule files and triggers the engine client's
/// reload (the reload step itself is invoked by callers — the rule generator's job is
/// strictly the resolve → render → write pipeline, per the module boundary in §2).
pub struct RuleGenerator {
    resolver: PolicyResolver,
    engine: TemplateEngine,
}

impl Default for RuleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleGenerator {
    pub fn new() -> Self {
        Self {
            resolver: PolicyResolver::new(),
            engine: TemplateEngine::new(),
        }
    }

    /// Builds the `RuleFileDocument` for `group_id` from its effective alert rules.
    async fn build_document<S>(&self, store: &S, group_id: &GroupId) -> Result<RuleFileDocument>
    where
        S: TargetRepository + GroupRepository + AlertRuleRepository,
    {
        let rules = store.get_by_group_id(group_id).await?;
        let enabled: Vec<_> = rules.into_iter().filter(|r| r.enabled).collect();

        let mut documents = Vec::with_capacity(enabled.len());
        for rule in &enabled {
            let scope = build_render_scope(&rule.default_config, &rule.config);
            let expr = self.engine.render(rule.id.as_str(), &rule.query_template, &scope)?;

            documents.push(RuleDocument {
                alert: rule.name.clone(),
                expr,
                r#for: (!rule.config.for_duration.is_empty())
                    .then(|| rule.config.for_duration.clone())
                    .or_else(|| (!rule.default_config.for_duration.is_empty()).then(|| rule.default_config.for_duration.clone())),
                labels: rule.config.labels.clone(),
                annotations: rule.config.annotations.clone(),
            });
        }

        documents.sort_by(|a, b| a.alert.cmp(&b.alert));

        Ok(RuleFileDocument {
            groups: vec![RuleGroupDocument {
                name: format!("group-{}", group_id.as_str()),
                interval: None,
                rules: documents,
            }],
        })
    }

    /// `GenerateRulesForGroup` (§4.2): emits or deletes the file for a single group.
    pub async fn generate_rules_for_group<S>(
        &self,
        store: &S,
        file_manager: &RuleFileManager,
        group_id: &GroupId,
    ) -> Result<GroupRuleOutcome>
    where
        S: TargetRepository + GroupRepository + AlertRuleRepository,
    {
        // Back up whatever is on disk before rendering: a broken `query_template` fails
        // inside `build_document`, upstream of `write_rule_file`'s own backup step, and
        // §8 scenario 3 still requires a timestamped backup to exist and the file on
        // disk to be left byte-identical to its pre-call state.
        file_manager.backup_before_write(group_id).await?;

        let document = self.build_document(store, group_id).await?;

        if document.groups[0].rules.is_empty() {
            file_manager.delete_rule_file(group_id).await?;
            return Ok(GroupRuleOutcome::Deleted);
        }

        let bytes = serde_yaml::to_string(&document)
            .map_err(|e| crate::error::Error::ConfigInvalid(e.to_string()))?;
        file_manager.write_rule_file(group_id, bytes.as_bytes()).await?;
        Ok(GroupRuleOutcome::Written)
    }

    /// `GenerateAllRules` (§4.2): iterates every group owning at least one active rule.
    ///
    /// All-or-nothing per §4.2's invariant is delegated to the per-group atomic write;
    /// if one group's write fails after others already succeeded, those successes are
    /// left in place (the failing group's own backup/restore already made it whole) and
    /// the error is surfaced to the caller, who decides whether to retry the whole run.
    pub async fn generate_all_rules<S>(
        &self,
        store: &S,
        file_manager: &RuleFileManager,
    ) -> Result<Vec<(GroupId, GroupRuleOutcome)>>
    where
        S: TargetRepository + GroupRepository + AlertRuleRepository,
    {
        let groups = store.groups_with_active_rules().await?;
        let mut outcomes = Vec::with_capacity(groups.len());
        for group_id in groups {
            let outcome = self.generate_rules_for_group(store, file_manager, &group_id).await?;
            outcomes.push((group_id, outcome));
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleFileConfig;
    use crate::domain::memory_store::InMemoryStore;
    use crate::domain::model::{AlertRuleConfig, CreateAlertRule, CreateGroup, MergeStrategy, Severity};
    use crate::repository::Repository;
    use std::path::PathBuf;

    fn test_file_manager(base: &std::path::Path) -> RuleFileManager {
        RuleFileManager::new(RuleFileConfig {
            base_path: base.to_path_buf(),
            backup_path: None,
            enable_validation: false,
            enable_backup: true,
            validator_path: PathBuf::from("promtool"),
            validator_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_generate_rules_for_group_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let file_manager = test_file_manager(dir.path());
        let generator = RuleGenerator::new();

        let group = store
            .create(CreateGroup {
                name: "g1".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        store
            .create(CreateAlertRule {
                group_id: group.id.clone(),
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "high-cpu".into(),
                description: None,
                severity: Severity::Warning,
                query_template: "cpu > 90".into(),
                default_config: AlertRuleConfig::default(),
                config: AlertRuleConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        let outcome = generator
            .generate_rules_for_group(&store, &file_manager, &group.id)
            .await
            .unwrap();
        assert_eq!(outcome, GroupRuleOutcome::Written);

        let files = file_manager.list_rule_files().await.unwrap();
        assert_eq!(files, vec![group.id.as_str().to_string()]);
    }

    #[tokio::test]
    async fn test_generate_rules_for_group_with_no_rules_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let file_manager = test_file_manager(dir.path());
        let generator = RuleGenerator::new();

        let group = store
            .create(CreateGroup {
                name: "empty".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let outcome = generator
            .generate_rules_for_group(&store, &file_manager, &group.id)
            .await
            .unwrap();
        assert_eq!(outcome, GroupRuleOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_generate_all_rules_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let file_manager = test_file_manager(dir.path());
        let generator = RuleGenerator::new();

        let group = store
            .create(CreateGroup {
                name: "g1".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        store
            .create(CreateAlertRule {
                group_id: group.id.clone(),
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "up".into(),
                description: None,
                severity: Severity::Info,
                query_template: "up == 1".into(),
                default_config: AlertRuleConfig::default(),
                config: AlertRuleConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        generator.generate_all_rules(&store, &file_manager).await.unwrap();
        let first = tokio::fs::read(dir.path().join(format!("group-{}.yml", group.id.as_str())))
            .await
            .unwrap();

        generator.generate_all_rules(&store, &file_manager).await.unwrap();
        let second = tokio::fs::read(dir.path().join(format!("group-{}.yml", group.id.as_str())))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_regenerate_with_broken_template_preserves_file_and_leaves_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let file_manager = test_file_manager(dir.path());
        let generator = RuleGenerator::new();

        let group = store
            .create(CreateGroup {
                name: "g1".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        store
            .create(CreateAlertRule {
                group_id: group.id.clone(),
                enabled: true,
                priority: Some(100),
                merge_strategy: MergeStrategy::Merge,
                name: "up".into(),
                description: None,
                severity: Severity::Info,
                query_template: "up == 1".into(),
                default_config: AlertRuleConfig::default(),
                config: AlertRuleConfig::default(),
                created_from_template_id: None,
                created_from_template_name: None,
            })
            .await
            .unwrap();

        generator
            .generate_rules_for_group(&store, &file_manager, &group.id)
            .await
            .unwrap();
        let path = dir.path().join(format!("group-{}.yml", group.id.as_str()));
        let before = tokio::fs::read(&path).await.unwrap();

        store
            .create(CreateAlertRule {
                group_id: group.id.clone(),
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

        let result = generator
            .generate_rules_for_group(&store, &file_manager, &group.id)
            .await;
        assert!(matches!(result, Err(crate::error::Error::TemplateError { .. })));

        let after = tokio::fs::read(&path).await.unwrap();
        assert_eq!(before, after, "file must be byte-identical to its pre-call state");

        let backups: Vec<_> = std::fs::read_dir(dir.path().join(".backup"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(!backups.is_empty(), "a timestamped backup must exist");
    }
}
