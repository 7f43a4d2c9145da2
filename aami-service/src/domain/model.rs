//! Entity types for AAMI's data model (§3).
//!
//! Every entity carries `created_at`/`updated_at`/`deleted_at` for soft delete, mirroring
//! the host framework's soft-delete repository contract. Free-form config carries through
//! as [`DynamicMap`]; label/annotation maps stay flat `BTreeMap<String, String>` since they
//! are always string→string per §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AlertRuleId, AlertTemplateId, BootstrapTokenId, ExporterId, GroupId, ScriptPolicyId,
    ScriptTemplateId, TargetId,
};

pub use super::dynamic_value::{DynamicMap, StringMap};

/// Organizational unit that binds targets to alert rules and script policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    /// Higher binds tighter; default 100.
    pub priority: i32,
    /// Whether this is the per-target auto-group created at first registration.
    pub is_default_own: bool,
    pub parent_id: Option<GroupId>,
    pub metadata: StringMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub is_default_own: bool,
    pub parent_id: Option<GroupId>,
    pub metadata: StringMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub parent_id: Option<Option<GroupId>>,
    pub metadata: Option<StringMap>,
}

/// Target status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Active,
    Inactive,
    Down,
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// A monitored host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub hostname: String,
    pub ip_address: String,
    pub status: TargetStatus,
    pub labels: StringMap,
    pub metadata: DynamicMap,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Target {
    /// A target is "healthy" iff `status=active` and `last_seen` is within `staleness`.
    pub fn is_healthy(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        self.status == TargetStatus::Active
            && self
                .last_seen
                .is_some_and(|seen| now.signed_duration_since(seen) <= staleness)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTarget {
    pub hostname: String,
    pub ip_address: String,
    pub status: Option<TargetStatus>,
    pub labels: StringMap,
    pub metadata: DynamicMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub ip_address: Option<String>,
    pub status: Option<TargetStatus>,
    pub labels: Option<StringMap>,
    pub metadata: Option<DynamicMap>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Join record linking a target to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroupLink {
    pub target_id: TargetId,
    pub group_id: GroupId,
    pub is_default_own: bool,
}

/// Exporter type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterType {
    NodeExporter,
    DcgmExporter,
    AllSmi,
    Custom,
}

/// A scrape endpoint on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exporter {
    pub id: ExporterId,
    pub target_id: TargetId,
    pub exporter_type: ExporterType,
    pub port: u16,
    pub enabled: bool,
    pub metrics_path: String,
    pub scrape_interval_secs: u64,
    pub scrape_timeout_secs: u64,
    pub config: DynamicMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Default for ExporterDefaults {
    fn default() -> Self {
        Self {
            metrics_path: "/metrics".to_string(),
            scrape_interval_secs: 15,
            scrape_timeout_secs: 10,
        }
    }
}

/// Defaults applied to a new exporter when the caller doesn't specify them.
pub struct ExporterDefaults {
    pub metrics_path: String,
    pub scrape_interval_secs: u64,
    pub scrape_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExporter {
    pub target_id: TargetId,
    pub exporter_type: ExporterType,
    pub port: u16,
    pub enabled: bool,
    pub metrics_path: Option<String>,
    pub scrape_interval_secs: Option<u64>,
    pub scrape_timeout_secs: Option<u64>,
    pub config: DynamicMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExporter {
    pub port: Option<u16>,
    pub enabled: Option<bool>,
    pub metrics_path: Option<String>,
    pub scrape_interval_secs: Option<u64>,
    pub scrape_timeout_secs: Option<u64>,
    pub config: Option<DynamicMap>,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// How a child rule's `config` combines with its parent's during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Merge,
    Override,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Merge
    }
}

/// The config bundle carried by an AlertTemplate and snapshotted into every AlertRule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    #[serde(default)]
    pub for_duration: String,
    #[serde(default)]
    pub labels: StringMap,
    #[serde(default)]
    pub annotations: StringMap,
    #[serde(default)]
    pub template_vars: DynamicMap,
}

/// A reusable alert definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTemplate {
    pub id: AlertTemplateId,
    pub name: String,
    pub severity: Severity,
    pub query_template: String,
    pub default_config: AlertRuleConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertTemplate {
    pub name: String,
    pub severity: Severity,
    pub query_template: String,
    pub default_config: AlertRuleConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAlertTemplate {
    pub name: Option<String>,
    pub severity: Option<Severity>,
    pub query_template: Option<String>,
    pub default_config: Option<AlertRuleConfig>,
}

/// A rule bound to a group. Carries a snapshot of template fields taken at creation
/// time; the template may evolve afterward without silently changing this rule (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: AlertRuleId,
    pub group_id: GroupId,
    pub enabled: bool,
    pub priority: i32,
    pub merge_strategy: MergeStrategy,

    // Snapshot fields (copied from the template at creation time).
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub query_template: String,
    pub default_config: AlertRuleConfig,

    /// Per-rule override layered above `default_config` during render.
    pub config: AlertRuleConfig,

    /// Lineage only; never used to refresh the snapshot.
    pub created_from_template_id: Option<AlertTemplateId>,
    pub created_from_template_name: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertRule {
    pub group_id: GroupId,
    pub enabled: bool,
    pub priority: Option<i32>,
    pub merge_strategy: MergeStrategy,
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub query_template: String,
    pub default_config: AlertRuleConfig,
    pub config: AlertRuleConfig,
    pub created_from_template_id: Option<AlertTemplateId>,
    pub created_from_template_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAlertRule {
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub merge_strategy: Option<MergeStrategy>,
    pub config: Option<AlertRuleConfig>,
}

/// Scripting language for a ScriptTemplate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptLanguage {
    Bash,
    Python,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptPolicyConfig {
    #[serde(default)]
    pub template_vars: DynamicMap,
}

/// A reusable executable-check definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptTemplate {
    pub id: ScriptTemplateId,
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: ScriptLanguage,
    pub default_config: ScriptPolicyConfig,
    pub version: String,
    /// SHA-256 of `script_content`, hex-encoded.
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ScriptTemplate {
    /// Recomputes the hash of `script_content` and compares it with the stored `hash`.
    pub fn verify_hash(&self) -> bool {
        super::hash_script_content(&self.script_content) == self.hash
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScriptTemplate {
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: ScriptLanguage,
    pub default_config: ScriptPolicyConfig,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScriptTemplate {
    pub name: Option<String>,
    pub script_content: Option<String>,
    pub default_config: Option<ScriptPolicyConfig>,
    pub version: Option<String>,
}

/// Scope at which a ScriptPolicy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPolicyScope {
    Global,
    Group,
}

/// A script policy bound to a scope, carrying the same snapshot pattern as AlertRule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPolicy {
    pub id: ScriptPolicyId,
    pub scope: ScriptPolicyScope,
    /// Required iff `scope=group`; forbidden iff `scope=global`.
    pub group_id: Option<GroupId>,
    pub priority: i32,
    pub is_active: bool,

    // Snapshot fields.
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: ScriptLanguage,
    pub default_config: ScriptPolicyConfig,
    pub version: String,
    pub hash: String,

    pub config: ScriptPolicyConfig,

    pub created_from_template_id: Option<ScriptTemplateId>,
    pub created_from_template_name: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ScriptPolicy {
    /// Validates the scope/group_id pairing invariant from §3.
    pub fn validate_scope(&self) -> crate::error::Result<()> {
        match (self.scope, &self.group_id) {
            (ScriptPolicyScope::Global, Some(_)) => Err(crate::error::Error::ValidationError {
                field: "group_id".to_string(),
                message: "group_id is forbidden when scope=global".to_string(),
            }),
            (ScriptPolicyScope::Group, None) => Err(crate::error::Error::ValidationError {
                field: "group_id".to_string(),
                message: "group_id is required when scope=group".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScriptPolicy {
    pub scope: ScriptPolicyScope,
    pub group_id: Option<GroupId>,
    pub priority: Option<i32>,
    pub is_active: bool,
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: ScriptLanguage,
    pub default_config: ScriptPolicyConfig,
    pub version: String,
    pub hash: String,
    pub config: ScriptPolicyConfig,
    pub created_from_template_id: Option<ScriptTemplateId>,
    pub created_from_template_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScriptPolicy {
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub config: Option<ScriptPolicyConfig>,
}

/// A short-lived, bounded-use node-registration credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapToken {
    pub id: BootstrapTokenId,
    /// URL-safe base64 of 32 random bytes.
    pub token: String,
    pub name: String,
    pub max_uses: u32,
    pub uses: u32,
    pub expires_at: DateTime<Utc>,
    pub labels: StringMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BootstrapToken {
    /// "Usable" iff `now < expires_at ∧ uses < max_uses` (§3).
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.uses < self.max_uses
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.uses)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBootstrapToken {
    pub name: String,
    pub max_uses: u32,
    pub expires_at: DateTime<Utc>,
    pub labels: StringMap,
}

/// Tokens are never updated in place outside of validate-and-consume; this exists only
/// to satisfy the generic `Repository` trait's `Update` parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBootstrapToken {
    pub labels: Option<StringMap>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_healthy_within_window() {
        let now = Utc::now();
        let target = Target {
            id: TargetId::new(),
            hostname: "web-01".into(),
            ip_address: "10.0.1.100".into(),
            status: TargetStatus::Active,
            labels: StringMap::new(),
            metadata: DynamicMap::new(),
            last_seen: Some(now - chrono::Duration::seconds(60)),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(target.is_healthy(now, chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_target_is_unhealthy_when_stale() {
        let now = Utc::now();
        let target = Target {
            id: TargetId::new(),
            hostname: "web-01".into(),
            ip_address: "10.0.1.100".into(),
            status: TargetStatus::Active,
            labels: StringMap::new(),
            metadata: DynamicMap::new(),
            last_seen: Some(now - chrono::Duration::seconds(600)),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(!target.is_healthy(now, chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_target_without_last_seen_is_unhealthy() {
        let now = Utc::now();
        let target = Target {
            id: TargetId::new(),
            hostname: "web-01".into(),
            ip_address: "10.0.1.100".into(),
            status: TargetStatus::Active,
            labels: StringMap::new(),
            metadata: DynamicMap::new(),
            last_seen: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(!target.is_healthy(now, chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_bootstrap_token_usability() {
        let now = Utc::now();
        let mut token = BootstrapToken {
            id: BootstrapTokenId::new(),
            token: "abc".into(),
            name: "t".into(),
            max_uses: 2,
            uses: 1,
            expires_at: now + chrono::Duration::hours(1),
            labels: StringMap::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(token.is_usable(now));
        assert_eq!(token.remaining_uses(), 1);

        token.uses = 2;
        assert!(!token.is_usable(now));
        assert_eq!(token.remaining_uses(), 0);
    }

    #[test]
    fn test_bootstrap_token_expired() {
        let now = Utc::now();
        let token = BootstrapToken {
            id: BootstrapTokenId::new(),
            token: "abc".into(),
            name: "t".into(),
            max_uses: 5,
            uses: 0,
            expires_at: now - chrono::Duration::seconds(1),
            labels: StringMap::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(!token.is_usable(now));
    }

    #[test]
    fn test_script_policy_scope_validation() {
        let now = Utc::now();
        let mut policy = ScriptPolicy {
            id: ScriptPolicyId::new(),
            scope: ScriptPolicyScope::Global,
            group_id: Some(GroupId::new()),
            priority: 100,
            is_active: true,
            name: "disk-check".into(),
            script_type: "disk".into(),
            script_content: "echo ok".into(),
            language: ScriptLanguage::Bash,
            default_config: ScriptPolicyConfig::default(),
            version: "1".into(),
            hash: super::super::hash_script_content("echo ok"),
            config: ScriptPolicyConfig::default(),
            created_from_template_id: None,
            created_from_template_name: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(policy.validate_scope().is_err());

        policy.group_id = None;
        assert!(policy.validate_scope().is_ok());

        policy.scope = ScriptPolicyScope::Group;
        assert!(policy.validate_scope().is_err());
    }

    #[test]
    fn test_script_template_hash_verification() {
        let now = Utc::now();
        let content = "#!/bin/bash\necho ok";
        let template = ScriptTemplate {
            id: ScriptTemplateId::new(),
            name: "uptime".into(),
            script_type: "uptime".into(),
            script_content: content.into(),
            language: ScriptLanguage::Bash,
            default_config: ScriptPolicyConfig::default(),
            version: "1".into(),
            hash: super::super::hash_script_content(content),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(template.verify_hash());
    }
}
