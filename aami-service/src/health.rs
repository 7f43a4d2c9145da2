//! Health check handlers (§6: `GET /health`, `/health/ready`, `/health/live`).

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Error, state::AppState};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,

    /// Service name
    pub service: String,

    /// Dependency statuses
    pub dependencies: HashMap<String, DependencyStatus>,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency is healthy
    pub healthy: bool,

    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Simple health check (liveness probe).
///
/// Always returns 200 OK if the service is running. Used by orchestrators to decide
/// whether the process should be restarted.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Liveness probe: identical to [`health`], kept as a distinct route (`/health/live`)
/// since orchestrators commonly wire liveness and readiness to different paths.
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    health(State(state)).await
}

/// Readiness check with dependency validation.
///
/// Returns 200 OK if the service and its configured dependencies are ready; 503 if
/// any required (non-optional) dependency is unhealthy. The database is the only
/// store dependency the core itself depends on (§1: persistence is out of scope, but
/// the binary crate still reports on whatever pool it holds).
pub async fn readiness(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let mut dependencies = HashMap::new();
    let mut all_ready = true;

    #[cfg(feature = "database")]
    if state.config().database.is_some() {
        match state.db().await {
            Some(db_pool) => match sqlx::query("SELECT 1").fetch_one(&db_pool).await {
                Ok(_) => {
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus {
                            healthy: true,
                            message: Some("connected".to_string()),
                        },
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "database health check failed");
                    let is_optional = state.config().database.as_ref().is_some_and(|db| db.optional);
                    if !is_optional {
                        all_ready = false;
                    }
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus {
                            healthy: false,
                            message: Some(format!("connection failed: {e}")),
                        },
                    );
                }
            },
            None => {
                let is_optional = state.config().database.as_ref().is_some_and(|db| db.optional);
                let is_lazy = state.config().database.as_ref().is_some_and(|db| db.lazy_init);
                if !is_optional {
                    all_ready = false;
                }
                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus {
                        healthy: false,
                        message: Some(if is_lazy {
                            "connection initializing (lazy mode)".to_string()
                        } else {
                            "not connected".to_string()
                        }),
                    },
                );
            }
        }
    }

    dependencies.insert(
        "metrics_engine".to_string(),
        match state.engine_client().ping().await {
            Ok(true) => DependencyStatus {
                healthy: true,
                message: Some("reachable".to_string()),
            },
            Ok(false) => DependencyStatus {
                healthy: false,
                message: Some("unreachable".to_string()),
            },
            Err(e) => DependencyStatus {
                healthy: false,
                message: Some(e.to_string()),
            },
        },
    );

    let response = ReadinessResponse {
        ready: all_ready,
        service: state.config().service.name.clone(),
        dependencies,
    };

    let status = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    Ok((status, Json(response)))
}

/// Pool health metrics endpoint: database pool size, idle connections, utilization.
#[cfg(feature = "database")]
pub async fn pool_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool_health().await;
    let status = if health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "test-service".to_string(),
            version: Some("1.0.0".to_string()),
        };

        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "test-service");
    }

    #[test]
    fn test_dependency_status() {
        let status = DependencyStatus {
            healthy: true,
            message: Some("OK".to_string()),
        };

        assert!(status.healthy);
        assert_eq!(status.message, Some("OK".to_string()));
    }
}
