//! Effective script-policy endpoints (§6: `GET /checks/target/:target_id`,
//! `GET /checks/target/hostname/:hostname`).

use aami_service::domain::model::ScriptLanguage;
use aami_service::domain::repositories::TargetRepository;
use aami_service::domain::resolver::{EffectiveCheck, PolicyResolver};
use aami_service::error::{Error, Result};
use aami_service::ids::TargetId;
use aami_service::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EffectiveCheckResponse {
    pub name: String,
    pub script_type: String,
    pub script_content: String,
    pub language: ScriptLanguage,
    pub version: String,
    pub hash: String,
    pub policy_id: String,
}

impl From<EffectiveCheck> for EffectiveCheckResponse {
    fn from(check: EffectiveCheck) -> Self {
        Self {
            name: check.name,
            script_type: check.script_type,
            script_content: check.script_content,
            language: check.language,
            version: check.version,
            hash: check.hash,
            policy_id: check.policy_id.as_str().to_string(),
        }
    }
}

async fn resolve_for_target(state: &AppState, target_id: &TargetId) -> Result<Vec<EffectiveCheckResponse>> {
    let checks = PolicyResolver::new()
        .effective_checks_for_target(state.store().as_ref(), target_id)
        .await?;

    Ok(checks.into_iter().map(EffectiveCheckResponse::from).collect())
}

/// Effective script policies for a target, resolved by id.
pub async fn by_target_id(
    State(state): State<AppState>,
    Path(target_id): Path<TargetId>,
) -> Result<Json<Vec<EffectiveCheckResponse>>> {
    Ok(Json(resolve_for_target(&state, &target_id).await?))
}

/// Effective script policies for a target, resolved by hostname.
pub async fn by_hostname(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<Vec<EffectiveCheckResponse>>> {
    let target = state
        .store()
        .get_by_hostname(&hostname)
        .await?
        .ok_or_else(|| Error::NotFound(format!("target with hostname {hostname}")))?;

    Ok(Json(resolve_for_target(&state, &target.id).await?))
}
