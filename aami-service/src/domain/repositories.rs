//! Store contracts the core consumes (§6).
//!
//! Generalizes the host framework's `Repository<Id, Entity, Create, Update>` /
//! `SoftDeleteRepository` traits to AAMI's entities, adding the specialized query
//! methods §6 requires per entity. The core (resolver, rule generator, token admission)
//! is written against these traits only; persistence itself is out of scope (§1).

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::ids::{
    AlertRuleId, AlertTemplateId, BootstrapTokenId, ExporterId, GroupId, ScriptPolicyId,
    ScriptTemplateId, TargetId,
};
use crate::repository::{RepositoryResult, SoftDeleteRepository};

use super::model::{
    AlertRule, AlertTemplate, BootstrapToken, CreateAlertRule, CreateAlertTemplate,
    CreateBootstrapToken, CreateExporter, CreateGroup, CreateScriptPolicy, CreateScriptTemplate,
    CreateTarget, Exporter, ExporterType, Group, ScriptPolicy, ScriptTemplate, Target,
    TargetStatus, UpdateAlertRule, UpdateAlertTemplate, UpdateBootstrapToken, UpdateExporter,
    UpdateGroup, UpdateScriptPolicy, UpdateScriptTemplate, UpdateTarget,
};

/// Group store contract (§6): `GetByID` (from `Repository`) plus, where hierarchy
/// exists, `GetChildren`/`GetAncestors`.
pub trait GroupRepository: SoftDeleteRepository<GroupId, Group, CreateGroup, UpdateGroup> {
    /// Direct children of `id`.
    fn get_children(&self, id: &GroupId) -> impl Future<Output = RepositoryResult<Vec<Group>>> + Send;

    /// Every ancestor of `id`, nearest first. Empty if `id` has no `parent_id` (§9: the
    /// flat model costs one extra `is_none()` check, nothing more).
    fn get_ancestors(&self, id: &GroupId) -> impl Future<Output = RepositoryResult<Vec<Group>>> + Send;
}

/// Target store contract (§6).
pub trait TargetRepository: SoftDeleteRepository<TargetId, Target, CreateTarget, UpdateTarget> {
    fn get_by_hostname(&self, hostname: &str) -> impl Future<Output = RepositoryResult<Option<Target>>> + Send;

    fn get_by_group_id(&self, group_id: &GroupId) -> impl Future<Output = RepositoryResult<Vec<Target>>> + Send;

    fn update_status(
        &self,
        id: &TargetId,
        status: TargetStatus,
    ) -> impl Future<Output = RepositoryResult<Target>> + Send;

    fn heartbeat(&self, id: &TargetId, now: DateTime<Utc>) -> impl Future<Output = RepositoryResult<Target>> + Send;

    /// Links `target_id` to `group_id`. At most one link per target may carry
    /// `is_default_own=true` (§3 invariant); callers are responsible for upholding it.
    fn link_group(
        &self,
        target_id: &TargetId,
        group_id: &GroupId,
        is_default_own: bool,
    ) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Every group directly linked to `target_id` (not including ancestors).
    fn groups_for_target(&self, target_id: &TargetId) -> impl Future<Output = RepositoryResult<Vec<GroupId>>> + Send;
}

/// Exporter store contract (§6).
pub trait ExporterRepository: SoftDeleteRepository<ExporterId, Exporter, CreateExporter, UpdateExporter> {
    fn get_by_target_id(&self, target_id: &TargetId) -> impl Future<Output = RepositoryResult<Vec<Exporter>>> + Send;

    fn get_by_type(&self, exporter_type: ExporterType) -> impl Future<Output = RepositoryResult<Vec<Exporter>>> + Send;
}

/// AlertTemplate store contract. No specialized queries beyond base CRUD (§6 only
/// specifies extras for AlertRule, not AlertTemplate).
pub trait AlertTemplateRepository:
    SoftDeleteRepository<AlertTemplateId, AlertTemplate, CreateAlertTemplate, UpdateAlertTemplate>
{
}

/// AlertRule store contract (§6).
pub trait AlertRuleRepository: SoftDeleteRepository<AlertRuleId, AlertRule, CreateAlertRule, UpdateAlertRule> {
    fn get_by_group_id(&self, group_id: &GroupId) -> impl Future<Output = RepositoryResult<Vec<AlertRule>>> + Send;

    /// Matches rules whose snapshot lineage (`created_from_template_id`) points at `template_id`.
    fn get_by_template_id(
        &self,
        template_id: &AlertTemplateId,
    ) -> impl Future<Output = RepositoryResult<Vec<AlertRule>>> + Send;

    /// Distinct groups owning at least one non-deleted, enabled rule — the emission
    /// units `GenerateAllRules` (§4.2) iterates.
    fn groups_with_active_rules(&self) -> impl Future<Output = RepositoryResult<Vec<GroupId>>> + Send;
}

/// ScriptTemplate store contract.
pub trait ScriptTemplateRepository:
    SoftDeleteRepository<ScriptTemplateId, ScriptTemplate, CreateScriptTemplate, UpdateScriptTemplate>
{
}

/// ScriptPolicy store contract (§6).
pub trait ScriptPolicyRepository:
    SoftDeleteRepository<ScriptPolicyId, ScriptPolicy, CreateScriptPolicy, UpdateScriptPolicy>
{
    fn get_global_instances(&self) -> impl Future<Output = RepositoryResult<Vec<ScriptPolicy>>> + Send;

    fn get_by_group_id(&self, group_id: &GroupId) -> impl Future<Output = RepositoryResult<Vec<ScriptPolicy>>> + Send;

    fn get_by_template_id(
        &self,
        template_id: &ScriptTemplateId,
    ) -> impl Future<Output = RepositoryResult<Vec<ScriptPolicy>>> + Send;

    /// Raw (unmerged) global + group-scoped policies applicable to `group_id`; callers
    /// (the resolver) perform the merge/render pass.
    fn get_effective_checks_by_group(
        &self,
        group_id: &GroupId,
    ) -> impl Future<Output = RepositoryResult<Vec<ScriptPolicy>>> + Send;
}

/// BootstrapToken store contract (§6, §4.5). `validate_and_consume` must be atomic:
/// two concurrent validations of a last-use token must not both succeed.
pub trait BootstrapTokenRepository:
    SoftDeleteRepository<BootstrapTokenId, BootstrapToken, CreateBootstrapToken, UpdateBootstrapToken>
{
    fn get_by_token(&self, token: &str) -> impl Future<Output = RepositoryResult<Option<BootstrapToken>>> + Send;

    /// Atomically increments `uses` iff the token is usable as of `now`, returning the
    /// updated record. Returns `Ok(None)` if the token does not exist; the caller (the
    /// token-admission service) is responsible for distinguishing expired/exhausted
    /// from not-found by re-checking the returned (or last-read) record.
    fn validate_and_consume(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepositoryResult<Option<BootstrapToken>>> + Send;

    /// Rolls back one `validate_and_consume` use, for callers that span multiple stores
    /// without a real transaction (§4.5's `register_node`): if a step after the token
    /// was consumed fails, this undoes the consumption so the token is left exactly as
    /// if the whole flow had never been attempted. A no-op if the token does not exist
    /// or has no uses to give back.
    fn compensate_use(&self, token: &str) -> impl Future<Output = RepositoryResult<()>> + Send;
}

/// Aggregate supertrait bundling every repository the core depends on (§1: "the core
/// assumes a relational store exposing per-entity repositories"). One concrete type
/// implementing all of these is handed to the domain services; swapping the relational
/// store for another backend means implementing this bundle again, not touching the
/// resolver/generator/admission logic.
pub trait Store:
    GroupRepository
    + TargetRepository
    + ExporterRepository
    + AlertTemplateRepository
    + AlertRuleRepository
    + ScriptTemplateRepository
    + ScriptPolicyRepository
    + BootstrapTokenRepository
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: GroupRepository
        + TargetRepository
        + ExporterRepository
        + AlertTemplateRepository
        + AlertRuleRepository
        + ScriptTemplateRepository
        + ScriptPolicyRepository
        + BootstrapTokenRepository
        + Send
        + Sync
{
}
