//! Business logic behind the handlers.

pub mod trigger;

pub use trigger::{trigger_long_form, TriggerResponse};
