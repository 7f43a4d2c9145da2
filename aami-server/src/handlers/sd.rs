//! Service-discovery projection endpoints (§6: `GET /sd/prometheus` + filter variants,
//! file-SD POST variant).

use std::path::PathBuf;

use aami_service::domain::model::{ExporterType, TargetStatus};
use aami_service::domain::sd_projection::{SdEntry, SdFileFormat, SdFilter, SdProjection};
use aami_service::error::{Error, Result};
use aami_service::ids::GroupId;
use aami_service::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

/// Query parameters narrowing the SD projection (§4.7 Filters).
#[derive(Debug, Deserialize, Default)]
pub struct SdQueryParams {
    pub status: Option<TargetStatus>,
    pub exporter_type: Option<ExporterType>,
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub enabled_only: bool,
}

impl From<SdQueryParams> for SdFilter {
    fn from(params: SdQueryParams) -> Self {
        Self {
            status: params.status,
            exporter_type: params.exporter_type,
            group_id: params.group_id,
            labels: Default::default(),
            enabled_only: params.enabled_only,
        }
    }
}

/// Prometheus HTTP service-discovery feed: `[{targets: [...], labels: {...}}, ...]`.
pub async fn prometheus_sd(
    State(state): State<AppState>,
    Query(params): Query<SdQueryParams>,
) -> Result<Json<Vec<SdEntry>>> {
    let filter: SdFilter = params.into();
    let entries = SdProjection::new().project(state.store().as_ref(), &filter).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct FileSdRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub format: FileSdFormat,
    #[serde(default)]
    pub filter: SdQueryParams,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum FileSdFormat {
    #[default]
    Json,
    Yaml,
}

impl From<FileSdFormat> for SdFileFormat {
    fn from(format: FileSdFormat) -> Self {
        match format {
            FileSdFormat::Json => Self::Json,
            FileSdFormat::Yaml => Self::Yaml,
        }
    }
}

/// Writes the SD projection to a file on disk, through the same atomic-write
/// primitive the rule-file manager uses (§4.7).
pub async fn write_file_sd(
    State(state): State<AppState>,
    Json(req): Json<FileSdRequest>,
) -> Result<StatusCode> {
    if req.path.as_os_str().is_empty() {
        return Err(Error::ValidationError {
            field: "path".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let filter: SdFilter = req.filter.into();
    SdProjection::new()
        .write_file_sd(state.store().as_ref(), &filter, &req.path, req.format.into())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
