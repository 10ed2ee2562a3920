//! HTTP handlers.

pub mod health;
pub mod jobs;

pub use health::{health, ready};
pub use jobs::{get_job, trigger_long_form_job};
