//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Jobs reaching an outcome (completed, failed, cancelled, suspended, retried).
    pub const JOBS_TOTAL: &str = "vchain_pipeline_jobs_total";

    /// Generated segments by outcome.
    pub const SEGMENTS_TOTAL: &str = "vchain_pipeline_segments_total";

    /// Continuity extractions by outcome (extracted, skipped).
    pub const CONTINUITY_TOTAL: &str = "vchain_pipeline_continuity_total";

    /// Step invocations by whether the memoized result was replayed.
    pub const STEPS_TOTAL: &str = "vchain_pipeline_steps_total";

    /// Wall time of one pipeline run (until completion, failure or suspension).
    pub const RUN_DURATION_SECONDS: &str = "vchain_pipeline_run_duration_seconds";
}

pub fn record_job(outcome: &'static str) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_segment(outcome: &'static str) {
    counter!(names::SEGMENTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_continuity(outcome: &'static str) {
    counter!(names::CONTINUITY_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_step(replayed: bool) {
    counter!(names::STEPS_TOTAL, "replayed" => if replayed { "true" } else { "false" }).increment(1);
}

pub fn record_run_duration(secs: f64) {
    histogram!(names::RUN_DURATION_SECONDS).record(secs);
}
