//! # aami-service
//!
//! Core control-plane logic for AAMI (Alert & Agent Monitoring Infrastructure): a
//! centralized configuration and control plane for a monitoring fleet.
//!
//! This crate implements the four tightly coupled subsystems that are the hard
//! engineering of the system:
//!
//! - [`domain::resolver`] — effective-policy resolution (merge alert rules and script
//!   policies across a group hierarchy, render templates).
//! - [`domain::rule_generator`] and [`domain::rule_file_manager`] — the rule-file
//!   pipeline (atomic writes, external validation, backup/restore) plus
//!   [`domain::engine_client`] to trigger and verify hot-reload.
//! - [`domain::token_admission`] — bootstrap-token issuance and validate-and-consume
//!   node registration.
//! - [`domain::job_core`] — the in-process async worker pool long-running control
//!   operations run on.
//!
//! Persistence, request routing, and CRUD handling are deliberately out of scope; the
//! core depends only on the repository contracts in [`domain::repositories`].

pub mod config;
pub mod domain;
pub mod error;
pub mod ids;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod pool_health;
pub mod repository;
pub mod retry;
pub mod server;
pub mod state;

#[cfg(feature = "database")]
pub mod database;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::health::{health, liveness, readiness};
    #[cfg(feature = "database")]
    pub use crate::health::pool_metrics;
    pub use crate::ids::{MakeTypedRequestId, RequestId};
    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
    };
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use crate::domain::{
        EffectiveAlertRule, EffectiveCheck, EngineClient, JobManager, PolicyResolver,
        RuleFileManager, RuleGenerator, SdProjection, TokenAdmissionService,
    };

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, instrument, trace, warn};
    pub use tokio;
    pub use async_trait::async_trait;
    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};
    pub use chrono::{DateTime, Duration as ChronoDuration, Utc};
    pub use futures::{future, stream, Future, Stream, StreamExt};
    pub use http::{Method, Uri};
}
