//! Route handlers for AAMI's control surface (§6). Each module stays thin: parse the
//! request, call into `aami_service`'s domain layer, map the `Result` to a response.
//! Error mapping is centralized through `aami_service::error::Error`'s `IntoResponse`.

pub mod bootstrap;
pub mod checks;
pub mod engine;
pub mod jobs;
pub mod rules;
pub mod sd;
