//! Default in-memory implementation of the [`Store`] bundle (§9: "the relational store
//! is a collaborator; other backends ... must satisfy the transactionality required by
//! §4.5"). Persistence itself is out of scope (§1); this exists so the binary crate has
//! a concrete store to wire `AppState` against, and so resolver/generator/admission
//! tests can exercise realistic fixtures without a database.
//!
//! Built on `dashmap::DashMap` for the same reason the job core is (§4.6 Ambient
//! stack): sharded internal locking instead of a single `RwLock<HashMap<_>>`, with
//! every read returning an owned clone so callers never observe or mutate store state
//! through a shared reference (§5 "every external-returned job is a deep copy").

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::ids::{
    AlertRuleId, AlertTemplateId, BootstrapTokenId, ExporterId, GroupId, ScriptPolicyId,
    ScriptTemplateId, TargetId,
};
use crate::repository::{
    FilterCondition, OrderDirection, Pagination, Repository, RepositoryError, RepositoryErrorKind,
    RepositoryOperation, RepositoryResult, SoftDeleteRepository,
};

use super::model::*;
use super::repositories::*;

fn paginate<T: Clone>(items: Vec<T>, pagination: Option<Pagination>) -> Vec<T> {
    match pagination {
        Some(p) => items
            .into_iter()
            .skip(p.offset as usize)
            .take(p.limit as usize)
            .collect(),
        None => items,
    }
}

macro_rules! crud_impl {
    ($store:ty, $id:ty, $entity:ty, $create:ty, $update:ty, $field:ident, $entity_name:literal, $build:expr, $apply_update:expr) => {
        impl Repository<$id, $entity, $create, $update> for $store {
            async fn find_by_id(&self, id: &$id) -> RepositoryResult<Option<$entity>> {
                Ok(self.$field.get(id).map(|e| e.clone()).filter(|e: &$entity| e.deleted_at.is_none()))
            }

            async fn find_all(
                &self,
                _filters: &[FilterCondition],
                _order_by: Option<(&str, OrderDirection)>,
                pagination: Option<Pagination>,
            ) -> RepositoryResult<Vec<$entity>> {
                let items: Vec<$entity> = self
                    .$field
                    .iter()
                    .map(|e| e.clone())
                    .filter(|e: &$entity| e.deleted_at.is_none())
                    .collect();
                Ok(paginate(items, pagination))
            }

            async fn count(&self, _filters: &[FilterCondition]) -> RepositoryResult<u64> {
                Ok(self.$field.iter().filter(|e| e.deleted_at.is_none()).count() as u64)
            }

            async fn exists(&self, id: &$id) -> RepositoryResult<bool> {
                Ok(self.$field.get(id).is_some_and(|e| e.deleted_at.is_none()))
            }

            async fn create(&self, data: $create) -> RepositoryResult<$entity> {
                let now = Utc::now();
                let entity = ($build)(data, now);
                self.$field.insert(entity.id.clone(), entity.clone());
                Ok(entity)
            }

            async fn update(&self, id: &$id, data: $update) -> RepositoryResult<$entity> {
                let mut entry = self
                    .$field
                    .get_mut(id)
                    .ok_or_else(|| RepositoryError::not_found($entity_name, id.as_str()))?;
                ($apply_update)(&mut entry, data);
                entry.updated_at = Utc::now();
                Ok(entry.clone())
            }

            async fn delete(&self, id: &$id) -> RepositoryResult<bool> {
                Ok(self.$field.remove(id).is_some())
            }
        }

        impl SoftDeleteRepository<$id, $entity, $create, $update> for $store {
            async fn soft_delete(&self, id: &$id) -> RepositoryResult<bool> {
                match self.$field.get_mut(id) {
                    Some(mut e) if e.deleted_at.is_none() => {
                        e.deleted_at = Some(Utc::now());
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }

            async fn restore(&self, id: &$id) -> RepositoryResult<bool> {
                match self.$field.get_mut(id) {
                    Some(mut e) if e.deleted_at.is_some() => {
                        e.deleted_at = None;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }

            async fn find_with_deleted(
                &self,
                _filters: &[FilterCondition],
                _order_by: Option<(&str, OrderDirection)>,
                pagination: Option<Pagination>,
            ) -> RepositoryResult<Vec<$entity>> {
                let items: Vec<$entity> = self.$field.iter().map(|e| e.clone()).collect();
                Ok(paginate(items, pagination))
            }

            async fn find_deleted(
                &self,
                _filters: &[FilterCondition],
                _order_by: Option<(&str, OrderDirection)>,
                pagination: Option<Pagination>,
            ) -> RepositoryResult<Vec<$entity>> {
                let items: Vec<$entity> = self
                    .$field
                    .iter()
                    .map(|e| e.clone())
                    .filter(|e: &$entity| e.deleted_at.is_some())
                    .collect();
                Ok(paginate(items, pagination))
            }

            async fn force_delete(&self, id: &$id) -> RepositoryResult<bool> {
                Ok(self.$field.remove(id).is_some())
            }
        }
    };
}

/// Default in-memory `Store` implementation: one `DashMap` per entity plus a
/// target↔group link table.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    groups: DashMap<GroupId, Group>,
    targets: DashMap<TargetId, Target>,
    target_groups: DashMap<TargetId, Vec<(GroupId, bool)>>,
    exporters: DashMap<ExporterId, Exporter>,
    alert_templates: DashMap<AlertTemplateId, AlertTemplate>,
    alert_rules: DashMap<AlertRuleId, AlertRule>,
    script_templates: DashMap<ScriptTemplateId, ScriptTemplate>,
    script_policies: DashMap<ScriptPolicyId, ScriptPolicy>,
    bootstrap_tokens: DashMap<BootstrapTokenId, BootstrapToken>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

crud_impl!(
    InMemoryStore,
    GroupId,
    Group,
    CreateGroup,
    UpdateGroup,
    groups,
    "Group",
    |data: CreateGroup, now: DateTime<Utc>| Group {
        id: GroupId::new(),
        name: data.name,
        description: data.description,
        priority: data.priority.unwrap_or(100),
        is_default_own: data.is_default_own,
        parent_id: data.parent_id,
        metadata: data.metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut Group, data: UpdateGroup| {
        if let Some(name) = data.name {
            entry.name = name;
        }
        if let Some(description) = data.description {
            entry.description = Some(description);
        }
        if let Some(priority) = data.priority {
            entry.priority = priority;
        }
        if let Some(parent_id) = data.parent_id {
            entry.parent_id = parent_id;
        }
        if let Some(metadata) = data.metadata {
            entry.metadata = metadata;
        }
    }
);

crud_impl!(
    InMemoryStore,
    TargetId,
    Target,
    CreateTarget,
    UpdateTarget,
    targets,
    "Target",
    |data: CreateTarget, now: DateTime<Utc>| Target {
        id: TargetId::new(),
        hostname: data.hostname,
        ip_address: data.ip_address,
        status: data.status.unwrap_or_default(),
        labels: data.labels,
        metadata: data.metadata,
        last_seen: Some(now),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut Target, data: UpdateTarget| {
        if let Some(ip) = data.ip_address {
            entry.ip_address = ip;
        }
        if let Some(status) = data.status {
            entry.status = status;
        }
        if let Some(labels) = data.labels {
            entry.labels = labels;
        }
        if let Some(metadata) = data.metadata {
            entry.metadata = metadata;
        }
        if let Some(last_seen) = data.last_seen {
            entry.last_seen = Some(last_seen);
        }
    }
);

crud_impl!(
    InMemoryStore,
    ExporterId,
    Exporter,
    CreateExporter,
    UpdateExporter,
    exporters,
    "Exporter",
    |data: CreateExporter, now: DateTime<Utc>| {
        let defaults = ExporterDefaults::default();
        Exporter {
            id: ExporterId::new(),
            target_id: data.target_id,
            exporter_type: data.exporter_type,
            port: data.port,
            enabled: data.enabled,
            metrics_path: data.metrics_path.unwrap_or(defaults.metrics_path),
            scrape_interval_secs: data.scrape_interval_secs.unwrap_or(defaults.scrape_interval_secs),
            scrape_timeout_secs: data.scrape_timeout_secs.unwrap_or(defaults.scrape_timeout_secs),
            config: data.config,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    },
    |entry: &mut Exporter, data: UpdateExporter| {
        if let Some(port) = data.port {
            entry.port = port;
        }
        if let Some(enabled) = data.enabled {
            entry.enabled = enabled;
        }
        if let Some(path) = data.metrics_path {
            entry.metrics_path = path;
        }
        if let Some(interval) = data.scrape_interval_secs {
            entry.scrape_interval_secs = interval;
        }
        if let Some(timeout) = data.scrape_timeout_secs {
            entry.scrape_timeout_secs = timeout;
        }
        if let Some(config) = data.config {
            entry.config = config;
        }
    }
);

crud_impl!(
    InMemoryStore,
    AlertTemplateId,
    AlertTemplate,
    CreateAlertTemplate,
    UpdateAlertTemplate,
    alert_templates,
    "AlertTemplate",
    |data: CreateAlertTemplate, now: DateTime<Utc>| AlertTemplate {
        id: AlertTemplateId::new(),
        name: data.name,
        severity: data.severity,
        query_template: data.query_template,
        default_config: data.default_config,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut AlertTemplate, data: UpdateAlertTemplate| {
        if let Some(name) = data.name {
            entry.name = name;
        }
        if let Some(severity) = data.severity {
            entry.severity = severity;
        }
        if let Some(qt) = data.query_template {
            entry.query_template = qt;
        }
        if let Some(dc) = data.default_config {
            entry.default_config = dc;
        }
    }
);

crud_impl!(
    InMemoryStore,
    AlertRuleId,
    AlertRule,
    CreateAlertRule,
    UpdateAlertRule,
    alert_rules,
    "AlertRule",
    |data: CreateAlertRule, now: DateTime<Utc>| AlertRule {
        id: AlertRuleId::new(),
        group_id: data.group_id,
        enabled: data.enabled,
        priority: data.priority.unwrap_or(100),
        merge_strategy: data.merge_strategy,
        name: data.name,
        description: data.description,
        severity: data.severity,
        query_template: data.query_template,
        default_config: data.default_config,
        config: data.config,
        created_from_template_id: data.created_from_template_id,
        created_from_template_name: data.created_from_template_name,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut AlertRule, data: UpdateAlertRule| {
        if let Some(enabled) = data.enabled {
            entry.enabled = enabled;
        }
        if let Some(priority) = data.priority {
            entry.priority = priority;
        }
        if let Some(strategy) = data.merge_strategy {
            entry.merge_strategy = strategy;
        }
        if let Some(config) = data.config {
            entry.config = config;
        }
    }
);

crud_impl!(
    InMemoryStore,
    ScriptTemplateId,
    ScriptTemplate,
    CreateScriptTemplate,
    UpdateScriptTemplate,
    script_templates,
    "ScriptTemplate",
    |data: CreateScriptTemplate, now: DateTime<Utc>| {
        let hash = super::hash_script_content(&data.script_content);
        ScriptTemplate {
            id: ScriptTemplateId::new(),
            name: data.name,
            script_type: data.script_type,
            script_content: data.script_content,
            language: data.language,
            default_config: data.default_config,
            version: data.version,
            hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    },
    |entry: &mut ScriptTemplate, data: UpdateScriptTemplate| {
        if let Some(name) = data.name {
            entry.name = name;
        }
        if let Some(content) = data.script_content {
            entry.hash = super::hash_script_content(&content);
            entry.script_content = content;
        }
        if let Some(dc) = data.default_config {
            entry.default_config = dc;
        }
        if let Some(version) = data.version {
            entry.version = version;
        }
    }
);

crud_impl!(
    InMemoryStore,
    ScriptPolicyId,
    ScriptPolicy,
    CreateScriptPolicy,
    UpdateScriptPolicy,
    script_policies,
    "ScriptPolicy",
    |data: CreateScriptPolicy, now: DateTime<Utc>| ScriptPolicy {
        id: ScriptPolicyId::new(),
        scope: data.scope,
        group_id: data.group_id,
        priority: data.priority.unwrap_or(100),
        is_active: data.is_active,
        name: data.name,
        script_type: data.script_type,
        script_content: data.script_content,
        language: data.language,
        default_config: data.default_config,
        version: data.version,
        hash: data.hash,
        config: data.config,
        created_from_template_id: data.created_from_template_id,
        created_from_template_name: data.created_from_template_name,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut ScriptPolicy, data: UpdateScriptPolicy| {
        if let Some(priority) = data.priority {
            entry.priority = priority;
        }
        if let Some(active) = data.is_active {
            entry.is_active = active;
        }
        if let Some(config) = data.config {
            entry.config = config;
        }
    }
);

crud_impl!(
    InMemoryStore,
    BootstrapTokenId,
    BootstrapToken,
    CreateBootstrapToken,
    UpdateBootstrapToken,
    bootstrap_tokens,
    "BootstrapToken",
    |data: CreateBootstrapToken, now: DateTime<Utc>| BootstrapToken {
        id: BootstrapTokenId::new(),
        token: super::token_admission::generate_token(),
        name: data.name,
        max_uses: data.max_uses,
        uses: 0,
        expires_at: data.expires_at,
        labels: data.labels,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    },
    |entry: &mut BootstrapToken, data: UpdateBootstrapToken| {
        if let Some(labels) = data.labels {
            entry.labels = labels;
        }
    }
);

impl GroupRepository for InMemoryStore {
    async fn get_children(&self, id: &GroupId) -> RepositoryResult<Vec<Group>> {
        Ok(self
            .groups
            .iter()
            .map(|e| e.clone())
            .filter(|g| g.deleted_at.is_none() && g.parent_id.as_ref() == Some(id))
            .collect())
    }

    async fn get_ancestors(&self, id: &GroupId) -> RepositoryResult<Vec<Group>> {
        let mut ancestors = Vec::new();
        let mut visited: std::collections::HashSet<GroupId> = std::collections::HashSet::new();
        visited.insert(id.clone());
        let mut current = self.groups.get(id).map(|g| g.clone());

        loop {
            let Some(group) = current else { break };
            let Some(parent_id) = group.parent_id.clone() else {
                break;
            };
            // §3 invariant: `parent_id` never forms a cycle. A correctly maintained
            // store never hits this, but if one slipped through, §4.1's failure modes
            // call it a fatal invariant violation, not an infinite walk.
            if !visited.insert(parent_id.clone()) {
                return Err(RepositoryError::new(
                    RepositoryOperation::FindById,
                    RepositoryErrorKind::DatabaseError,
                    format!("circular parent chain detected walking ancestors of group {id}"),
                ));
            }
            let Some(parent) = self.groups.get(&parent_id).map(|g| g.clone()) else {
                break;
            };
            if parent.deleted_at.is_none() {
                ancestors.push(parent.clone());
            }
            current = Some(parent);
        }
        Ok(ancestors)
    }
}

impl TargetRepository for InMemoryStore {
    async fn get_by_hostname(&self, hostname: &str) -> RepositoryResult<Option<Target>> {
        Ok(self
            .targets
            .iter()
            .map(|e| e.clone())
            .find(|t| t.deleted_at.is_none() && t.hostname == hostname))
    }

    async fn get_by_group_id(&self, group_id: &GroupId) -> RepositoryResult<Vec<Target>> {
        let target_ids: Vec<TargetId> = self
            .target_groups
            .iter()
            .filter(|e| e.value().iter().any(|(gid, _)| gid == group_id))
            .map(|e| e.key().clone())
            .collect();

        Ok(target_ids
            .into_iter()
            .filter_map(|id| self.targets.get(&id).map(|t| t.clone()))
            .filter(|t| t.deleted_at.is_none())
            .collect())
    }

    async fn update_status(&self, id: &TargetId, status: TargetStatus) -> RepositoryResult<Target> {
        let mut entry = self
            .targets
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("Target", id.as_str()))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn heartbeat(&self, id: &TargetId, now: DateTime<Utc>) -> RepositoryResult<Target> {
        let mut entry = self
            .targets
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("Target", id.as_str()))?;
        entry.last_seen = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn link_group(&self, target_id: &TargetId, group_id: &GroupId, is_default_own: bool) -> RepositoryResult<()> {
        self.target_groups
            .entry(target_id.clone())
            .or_default()
            .push((group_id.clone(), is_default_own));
        Ok(())
    }

    async fn groups_for_target(&self, target_id: &TargetId) -> RepositoryResult<Vec<GroupId>> {
        Ok(self
            .target_groups
            .get(target_id)
            .map(|links| links.iter().map(|(gid, _)| gid.clone()).collect())
            .unwrap_or_default())
    }
}

impl ExporterRepository for InMemoryStore {
    async fn get_by_target_id(&self, target_id: &TargetId) -> RepositoryResult<Vec<Exporter>> {
        Ok(self
            .exporters
            .iter()
            .map(|e| e.clone())
            .filter(|e| e.deleted_at.is_none() && &e.target_id == target_id)
            .collect())
    }

    async fn get_by_type(&self, exporter_type: ExporterType) -> RepositoryResult<Vec<Exporter>> {
        Ok(self
            .exporters
            .iter()
            .map(|e| e.clone())
            .filter(|e| e.deleted_at.is_none() && e.exporter_type == exporter_type)
            .collect())
    }
}

impl AlertTemplateRepository for InMemoryStore {}

impl AlertRuleRepository for InMemoryStore {
    async fn get_by_group_id(&self, group_id: &GroupId) -> RepositoryResult<Vec<AlertRule>> {
        Ok(self
            .alert_rules
            .iter()
            .map(|e| e.clone())
            .filter(|r| r.deleted_at.is_none() && &r.group_id == group_id)
            .collect())
    }

    async fn get_by_template_id(&self, template_id: &AlertTemplateId) -> RepositoryResult<Vec<AlertRule>> {
        Ok(self
            .alert_rules
            .iter()
            .map(|e| e.clone())
            .filter(|r| r.deleted_at.is_none() && r.created_from_template_id.as_ref() == Some(template_id))
            .collect())
    }

    async fn groups_with_active_rules(&self) -> RepositoryResult<Vec<GroupId>> {
        let mut groups: Vec<GroupId> = self
            .alert_rules
            .iter()
            .filter(|r| r.deleted_at.is_none() && r.enabled)
            .map(|r| r.group_id.clone())
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }
}

impl ScriptTemplateRepository for InMemoryStore {}

impl ScriptPolicyRepository for InMemoryStore {
    async fn get_global_instances(&self) -> RepositoryResult<Vec<ScriptPolicy>> {
        Ok(self
            .script_policies
            .iter()
            .map(|e| e.clone())
            .filter(|p| p.deleted_at.is_none() && p.scope == ScriptPolicyScope::Global)
            .collect())
    }

    async fn get_by_group_id(&self, group_id: &GroupId) -> RepositoryResult<Vec<ScriptPolicy>> {
        Ok(self
            .script_policies
            .iter()
            .map(|e| e.clone())
            .filter(|p| p.deleted_at.is_none() && p.group_id.as_ref() == Some(group_id))
            .collect())
    }

    async fn get_by_template_id(&self, template_id: &ScriptTemplateId) -> RepositoryResult<Vec<ScriptPolicy>> {
        Ok(self
            .script_policies
            .iter()
            .map(|e| e.clone())
            .filter(|p| p.deleted_at.is_none() && p.created_from_template_id.as_ref() == Some(template_id))
            .collect())
    }

    async fn get_effective_checks_by_group(&self, group_id: &GroupId) -> RepositoryResult<Vec<ScriptPolicy>> {
        let mut global = self.get_global_instances().await?;
        let mut group = self.get_by_group_id(group_id).await?;
        global.append(&mut group);
        Ok(global.into_iter().filter(|p| p.is_active).collect())
    }
}

impl BootstrapTokenRepository for InMemoryStore {
    async fn get_by_token(&self, token: &str) -> RepositoryResult<Option<BootstrapToken>> {
        Ok(self
            .bootstrap_tokens
            .iter()
            .map(|e| e.clone())
            .find(|t| t.deleted_at.is_none() && t.token == token))
    }

    async fn validate_and_consume(&self, token: &str, now: DateTime<Utc>) -> RepositoryResult<Option<BootstrapToken>> {
        // DashMap's per-shard locking makes the read-check-increment atomic with
        // respect to other callers touching the same key, matching the
        // `UPDATE ... WHERE uses < max_uses AND expires_at > now() RETURNING *`
        // semantics described for the Postgres-backed implementation (§4.5).
        let id = self
            .bootstrap_tokens
            .iter()
            .find(|e| e.deleted_at.is_none() && e.token == token)
            .map(|e| e.key().clone());

        let Some(id) = id else {
            return Ok(None);
        };

        let mut entry = self
            .bootstrap_tokens
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("BootstrapToken", id.as_str()))?;

        if entry.is_usable(now) {
            entry.uses += 1;
            entry.updated_at = now;
            Ok(Some(entry.clone()))
        } else {
            Ok(Some(entry.clone()))
        }
    }

    async fn compensate_use(&self, token: &str) -> RepositoryResult<()> {
        let id = self
            .bootstrap_tokens
            .iter()
            .find(|e| e.deleted_at.is_none() && e.token == token)
            .map(|e| e.key().clone());

        if let Some(id) = id {
            if let Some(mut entry) = self.bootstrap_tokens.get_mut(&id) {
                entry.uses = entry.uses.saturating_sub(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CreateGroup, CreateTarget, UpdateGroup};

    #[tokio::test]
    async fn test_create_and_find_group() {
        let store = InMemoryStore::new();
        let group = store
            .create(CreateGroup {
                name: "web".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let found = store.find_by_id(&group.id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, "web");
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_find() {
        let store = InMemoryStore::new();
        let group = store
            .create(CreateGroup {
                name: "web".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        store.soft_delete(&group.id).await.unwrap();
        assert!(store.find_by_id(&group.id).await.unwrap().is_none());

        let restored = store.restore(&group.id).await.unwrap();
        assert!(restored);
        assert!(store.find_by_id(&group.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ancestor_walk() {
        let store = InMemoryStore::new();
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

        let ancestors = store.get_ancestors(&child.id).await.unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].id, parent.id);
    }

    #[tokio::test]
    async fn test_get_ancestors_reports_internal_on_cycle() {
        // §3's "parent_id never forms a cycle" invariant is enforced above the store;
        // this forces one through `update` to exercise §4.1's stated failure mode: a
        // circular parent chain is a fatal invariant violation, not an infinite walk.
        let store = InMemoryStore::new();
        let a = store
            .create(CreateGroup {
                name: "a".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let b = store
            .create(CreateGroup {
                name: "b".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: Some(a.id.clone()),
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        store
            .update(
                &a.id,
                UpdateGroup {
                    name: None,
                    description: None,
                    priority: None,
                    parent_id: Some(Some(b.id.clone())),
                    metadata: None,
                },
            )
            .await
            .unwrap();

        let result = store.get_ancestors(&b.id).await;
        assert!(result.is_err());
        let error: crate::error::Error = result.unwrap_err().into();
        assert!(matches!(error, crate::error::Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_target_group_linking() {
        let store = InMemoryStore::new();
        let group = store
            .create(CreateGroup {
                name: "web".into(),
                description: None,
                priority: None,
                is_default_own: true,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let target = store
            .create(CreateTarget {
                hostname: "web-01".into(),
                ip_address: "10.0.1.1".into(),
                status: None,
                labels: StringMap::new(),
                metadata: DynamicMap::new(),
            })
            .await
            .unwrap();

        store.link_group(&target.id, &group.id, true).await.unwrap();
        let groups = store.groups_for_target(&target.id).await.unwrap();
        assert_eq!(groups, vec![group.id.clone()]);

        let targets = store.get_by_group_id(&group.id).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, target.id);
    }

    #[tokio::test]
    async fn test_token_concurrent_validate_and_consume_exact_success_count() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let token = store
            .create(CreateBootstrapToken {
                name: "bulk".into(),
                max_uses: 2,
                expires_at: now + chrono::Duration::hours(24),
                labels: StringMap::new(),
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            let token_str = token.token.clone();
            handles.push(tokio::spawn(async move {
                let result = store.validate_and_consume(&token_str, Utc::now()).await.unwrap();
                result.is_some_and(|t| t.uses <= t.max_uses && t.is_usable(Utc::now()) || t.uses == t.max_uses)
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let final_token = store.get_by_token(&token.token).await.unwrap().unwrap();
        assert_eq!(final_token.uses, 2);
    }
}
