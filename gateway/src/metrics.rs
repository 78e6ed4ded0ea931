//! Metrics definitions for the transcription gateway.
//!
//! This module defines all metrics keys used by the service and
//! provides a helper [`describe_metrics`] to set metadata for
//! each metric using the `metrics` crate.

/// Metrics key for the number of currently open sessions.
pub(crate) const METRICS_ID_SESSIONS_OPEN: &str = "gateway.sessions.open";
/// Metrics key for sessions evicted by a newer session for the same user.
pub(crate) const METRICS_ID_SESSIONS_EVICTED: &str = "gateway.sessions.evicted";
/// Metrics key for admission rejections due to an exhausted budget.
pub(crate) const METRICS_ID_ADMISSION_REJECTED: &str = "gateway.admission.rejected";
/// Metrics key for the number of transcription tasks currently in flight, across all users.
pub(crate) const METRICS_ID_TASKS_INFLIGHT: &str = "gateway.tasks.inflight";
/// Metrics key for the duration of a single transcription task.
pub(crate) const METRICS_ID_TASK_DURATION: &str = "gateway.tasks.duration";
/// Metrics key for transcription tasks that hit the per-packet timeout.
pub(crate) const METRICS_ID_TASK_TIMEOUT: &str = "gateway.tasks.timeout";
/// Metrics key for successfully completed transcriptions.
pub(crate) const METRICS_ID_TASK_SUCCESS: &str = "gateway.tasks.success";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set metadata on the
/// different metrics.
pub(crate) fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_SESSIONS_OPEN,
        metrics::Unit::Count,
        "Number of currently open sessions"
    );

    metrics::describe_counter!(
        METRICS_ID_SESSIONS_EVICTED,
        metrics::Unit::Count,
        "Number of sessions closed because a newer session for the same user registered"
    );

    metrics::describe_counter!(
        METRICS_ID_ADMISSION_REJECTED,
        metrics::Unit::Count,
        "Number of sessions rejected at admission due to an exhausted usage budget"
    );

    metrics::describe_gauge!(
        METRICS_ID_TASKS_INFLIGHT,
        metrics::Unit::Count,
        "Number of transcription tasks currently in flight across all users"
    );

    metrics::describe_histogram!(
        METRICS_ID_TASK_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of a single transcription task"
    );

    metrics::describe_counter!(
        METRICS_ID_TASK_TIMEOUT,
        metrics::Unit::Count,
        "Number of transcription tasks that exceeded the per-packet deadline"
    );

    metrics::describe_counter!(
        METRICS_ID_TASK_SUCCESS,
        metrics::Unit::Count,
        "Number of transcription tasks that completed successfully"
    );
}
