//! Route table for AAMI's control surface (§6), mounted under `/api/v1` plus the
//! unprefixed health checks orchestrators expect at the root.

use aami_service::prelude::*;

use crate::handlers::{bootstrap, checks, engine, jobs, rules, sd};

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/bootstrap-tokens/validate", post(bootstrap::validate))
        .route("/bootstrap-tokens/register", post(bootstrap::register))
        .route("/checks/target/:target_id", get(checks::by_target_id))
        .route("/checks/target/hostname/:hostname", get(checks::by_hostname))
        .route("/sd/prometheus", get(sd::prometheus_sd))
        .route("/sd/prometheus/file", post(sd::write_file_sd))
        .route("/prometheus/rules/regenerate", post(rules::regenerate_all))
        .route(
            "/prometheus/rules/regenerate/:group_id",
            post(rules::regenerate_group),
        )
        .route("/prometheus/rules/files", get(rules::list_rule_files))
        .route(
            "/prometheus/rules/effective/:target_id",
            get(rules::effective_rules_for_target),
        )
        .route("/prometheus/reload", post(engine::reload))
        .route("/prometheus/status", get(engine::status))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/stats", get(jobs::job_stats))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::cancel_job));

    let health = Router::new()
        .route("/health", get(aami_service::health::health))
        .route("/health/ready", get(aami_service::health::readiness))
        .route("/health/live", get(aami_service::health::liveness));

    #[cfg(feature = "database")]
    let health = health.route("/health/pool", get(aami_service::health::pool_metrics));

    Router::new().nest("/api/v1", api).merge(health).with_state(state)
}
