//! Rule-file pipeline endpoints (§6: regenerate, list, and effective-rules routes).

use aami_service::domain::rule_generator::{GroupRuleOutcome, RuleGenerator};
use aami_service::domain::resolver::{EffectiveAlertRule, PolicyResolver};
use aami_service::error::Result;
use aami_service::ids::{GroupId, TargetId};
use aami_service::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Written,
    Deleted,
}

impl From<GroupRuleOutcome> for RuleOutcome {
    fn from(outcome: GroupRuleOutcome) -> Self {
        match outcome {
            GroupRuleOutcome::Written => Self::Written,
            GroupRuleOutcome::Deleted => Self::Deleted,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupRuleOutcomeResponse {
    pub group_id: String,
    pub outcome: RuleOutcome,
}

/// `POST /prometheus/rules/regenerate`: regenerates every group with active rules.
pub async fn regenerate_all(State(state): State<AppState>) -> Result<Json<Vec<GroupRuleOutcomeResponse>>> {
    let outcomes = RuleGenerator::new()
        .generate_all_rules(state.store().as_ref(), state.rule_file_manager())
        .await?;

    Ok(Json(
        outcomes
            .into_iter()
            .map(|(group_id, outcome)| GroupRuleOutcomeResponse {
                group_id: group_id.as_str().to_string(),
                outcome: outcome.into(),
            })
            .collect(),
    ))
}

/// `POST /prometheus/rules/regenerate/:group_id`: regenerates a single group's rule file.
pub async fn regenerate_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<GroupRuleOutcomeResponse>> {
    let outcome = RuleGenerator::new()
        .generate_rules_for_group(state.store().as_ref(), state.rule_file_manager(), &group_id)
        .await?;

    Ok(Json(GroupRuleOutcomeResponse {
        group_id: group_id.as_str().to_string(),
        outcome: outcome.into(),
    }))
}

/// `GET /prometheus/rules/files`: filenames currently present in the rule-file directory.
pub async fn list_rule_files(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.rule_file_manager().list_rule_files().await?))
}

#[derive(Debug, Serialize)]
pub struct EffectiveAlertRuleResponse {
    pub rule_id: String,
    pub name: String,
    pub rendered_query: String,
    pub source_group: String,
}

impl From<EffectiveAlertRule> for EffectiveAlertRuleResponse {
    fn from(rule: EffectiveAlertRule) -> Self {
        Self {
            rule_id: rule.rule.id.as_str().to_string(),
            name: rule.rule.name,
            rendered_query: rule.rendered_query,
            source_group: rule.source_group.as_str().to_string(),
        }
    }
}

/// `GET /prometheus/rules/effective/:target_id`: the rules that would be emitted for a
/// target's groups, without writing anything to disk.
pub async fn effective_rules_for_target(
    State(state): State<AppState>,
    Path(target_id): Path<TargetId>,
) -> Result<Json<Vec<EffectiveAlertRuleResponse>>> {
    let rules = PolicyResolver::new()
        .effective_alert_rules_for_target(state.store().as_ref(), &target_id)
        .await?;

    Ok(Json(rules.into_iter().map(EffectiveAlertRuleResponse::from).collect()))
}
