//! Bootstrap-token admission endpoints (§6: `POST /bootstrap-tokens/validate`,
//! `POST /bootstrap-tokens/register`).

use aami_service::domain::model::{BootstrapToken, DynamicMap, StringMap};
use aami_service::domain::token_admission::{RegisterNodeRequest, TokenAdmissionService};
use aami_service::error::{Error, Result};
use aami_service::ids::GroupId;
use aami_service::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub uses: u32,
    pub remaining_uses: u32,
}

impl From<BootstrapToken> for ValidateTokenResponse {
    fn from(token: BootstrapToken) -> Self {
        Self {
            valid: true,
            remaining_uses: token.remaining_uses(),
            uses: token.uses,
        }
    }
}

/// Validate-and-consume a bootstrap token without registering a node.
pub async fn validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateTokenRequest>,
) -> Result<Json<ValidateTokenResponse>> {
    let token = TokenAdmissionService::new()
        .validate_and_consume(state.store().as_ref(), &req.token)
        .await?;

    Ok(Json(token.into()))
}

#[derive(Debug, Deserialize)]
pub struct RegisterNodeBody {
    pub token: String,
    pub hostname: String,
    pub ip_address: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub labels: StringMap,
    #[serde(default)]
    pub metadata: DynamicMap,
}

#[derive(Debug, Serialize)]
pub struct RegisterNodeResponse {
    pub target_id: String,
    pub hostname: String,
    pub group_id: String,
    pub token_uses: u32,
    pub token_remaining: u32,
}

/// Validate a bootstrap token and register the calling node as a new Target.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterNodeBody>,
) -> Result<Json<RegisterNodeResponse>> {
    if body.token.is_empty() {
        return Err(Error::ValidationError {
            field: "token".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let registered = TokenAdmissionService::new()
        .register_node(
            state.store().as_ref(),
            RegisterNodeRequest {
                token: body.token,
                hostname: body.hostname,
                ip_address: body.ip_address,
                group_id: body.group_id,
                labels: body.labels,
                metadata: body.metadata,
            },
        )
        .await?;

    Ok(Json(RegisterNodeResponse {
        target_id: registered.target.id.as_str().to_string(),
        hostname: registered.target.hostname,
        group_id: registered.group_id.as_str().to_string(),
        token_uses: registered.token_uses,
        token_remaining: registered.token_remaining,
    }))
}
