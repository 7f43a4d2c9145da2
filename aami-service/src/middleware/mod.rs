//! Cross-cutting HTTP middleware
//!
//! AAMI's control surface is thin by design (§1 Non-goals); the only middleware the
//! core needs is request-id tracking for log correlation, matching the host framework's
//! request-tracking layer.

pub mod request_tracking;

pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
