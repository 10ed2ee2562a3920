//! Axum HTTP API server.
//!
//! This crate provides:
//! - The long-form trigger: validate, create the job record, enqueue
//! - Job record lookup for status polling
//! - Per-IP rate limiting, CORS and request IDs
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{trigger_long_form, TriggerResponse};
pub use state::AppState;
