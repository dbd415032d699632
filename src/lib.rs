//! Core library for holdgate.  This module wires the compliance handlers
//! to the HTTP event bridge used by the add-in shell: each lifecycle event
//! is posted with a snapshot of the compose session, the registered handler
//! runs against it and the response carries the disposition plus the field
//! changes the shell must apply to the live compose window.

mod config;
pub mod host;
pub mod policy;
pub mod token;

pub use config::AppConfig;

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    DefaultBodyLimit, Path, State,
};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, routing::post, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use crate::host::{ComposeSnapshot, HostCall, MemoryHost, Recipient};
use crate::policy::{HandlerRegistry, PolicyConfig};
use crate::token::{Disposition, EventToken};

pub use crate::host::ComposeHost;
pub use crate::policy::SendHandler;

/// Field values that differ between the posted snapshot and the session
/// after the handler ran.  Absent fields were left untouched.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<Recipient>>,
}

impl SessionChanges {
    fn between(before: &ComposeSnapshot, after: &ComposeSnapshot) -> Self {
        Self {
            sensitivity_label: (before.sensitivity_label != after.sensitivity_label)
                .then(|| after.sensitivity_label.clone()),
            bcc: (before.bcc != after.bcc).then(|| after.bcc.clone()),
        }
    }

    fn is_empty(&self) -> bool {
        self.sensitivity_label.is_none() && self.bcc.is_none()
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event: String,
    pub handler: String,
    pub disposition: Disposition,
    pub changes: SessionChanges,
    pub host_calls: Vec<HostCall>,
    pub ts: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: i32,
    pub message: String,
    pub http_status: u16,
}

/// Counters exposed on `/metrics`.
pub struct Metrics {
    pub events_total: BTreeMap<&'static str, AtomicU64>,
    pub blocks_total: AtomicU64,
    pub labels_applied_total: AtomicU64,
    pub hold_added_total: AtomicU64,
    pub hold_removed_total: AtomicU64,
    pub host_failures_total: AtomicU64,
    // Handler latency histogram (ms upper bounds)
    pub hist_buckets: Vec<u64>,
    pub hist_counts: Vec<AtomicU64>,
    pub hist_sum_ms: AtomicU64,
    pub hist_count: AtomicU64,
}

impl Metrics {
    fn new(events: &[&'static str]) -> Self {
        let buckets: Vec<u64> = vec![1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 2000];
        Self {
            events_total: events.iter().map(|e| (*e, AtomicU64::new(0))).collect(),
            blocks_total: AtomicU64::new(0),
            labels_applied_total: AtomicU64::new(0),
            hold_added_total: AtomicU64::new(0),
            hold_removed_total: AtomicU64::new(0),
            host_failures_total: AtomicU64::new(0),
            hist_counts: buckets.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_buckets: buckets,
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
        }
    }

    fn observe_latency(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        for (idx, ub) in self.hist_buckets.iter().enumerate() {
            if ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
}

/// Shared application state: handler bindings, the policy values and
/// metrics.
#[derive(Clone)]
pub struct AppState {
    pub registry: HandlerRegistry,
    pub policy: Arc<PolicyConfig>,
    /// Maximum accepted request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
    /// Handler chains slower than this are logged
    pub handler_warn_ms: u64,
    pub metrics: Arc<Metrics>,
    pub process_start_instant: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, policy: PolicyConfig) -> Self {
        let registry = HandlerRegistry::new(config.send_handler);
        let metrics = Metrics::new(&registry.events());
        Self {
            registry,
            policy: Arc::new(policy),
            max_request_bytes: config.max_request_bytes,
            handler_warn_ms: config.handler_warn_ms,
            metrics: Arc::new(metrics),
            process_start_instant: Instant::now(),
        }
    }
}

/// Build state from environment variables (see `AppConfig::from_env`) with
/// the fixed legal-hold policy.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    tracing::info!(
        send_handler = ?config.send_handler,
        max_request_bytes = ?config.max_request_bytes,
        handler_warn_ms = config.handler_warn_ms,
        "configuration loaded"
    );
    Ok(AppState::new(config, PolicyConfig::default()))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/events/:event", post(event_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router.with_state(state)
}

fn respond_with_error(err: ErrorResponse) -> axum::response::Response {
    let status = StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}

fn unknown_event(event: &str) -> ErrorResponse {
    ErrorResponse {
        error_code: 4004,
        message: format!("No handler registered for event '{}'", event),
        http_status: 404,
    }
}

/// Run the handler registered for `event` against `snapshot` and collect
/// its disposition and the resulting session changes.
pub async fn run_event(
    state: &AppState,
    event: &str,
    snapshot: ComposeSnapshot,
) -> Result<EventResponse, ErrorResponse> {
    let handler = state
        .registry
        .get(event)
        .ok_or_else(|| unknown_event(event))?;

    let host = MemoryHost::new(snapshot.clone());
    let (token, completion) = EventToken::new(event);
    let start = Instant::now();
    handler.handle(&host, token, &state.policy).await;
    let disposition = completion.wait().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if elapsed_ms > state.handler_warn_ms {
        tracing::warn!(
            event,
            handler = handler.name(),
            elapsed_ms,
            warn_ms = state.handler_warn_ms,
            "handler exceeded warn threshold"
        );
    }

    let after = host.snapshot();
    let changes = SessionChanges::between(&snapshot, &after);
    if changes.is_empty() {
        tracing::debug!(event, "compose session left unchanged");
    } else {
        tracing::info!(
            event,
            label = ?changes.sensitivity_label,
            bcc_len = changes.bcc.as_ref().map(|b| b.len()),
            "compose session changes to apply"
        );
    }
    let host_calls = host.calls();
    record_metrics(state, event, &disposition, &snapshot, &after, &host_calls, elapsed_ms);

    Ok(EventResponse {
        event: event.to_string(),
        handler: handler.name().to_string(),
        disposition,
        changes,
        host_calls,
        ts: chrono::Utc::now().to_rfc3339(),
    })
}

fn record_metrics(
    state: &AppState,
    event: &str,
    disposition: &Disposition,
    before: &ComposeSnapshot,
    after: &ComposeSnapshot,
    calls: &[HostCall],
    elapsed_ms: u64,
) {
    let m = &state.metrics;
    if let Some(counter) = m.events_total.get(event) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
    if disposition.is_block() {
        m.blocks_total.fetch_add(1, Ordering::Relaxed);
    }
    if before.sensitivity_label != after.sensitivity_label {
        m.labels_applied_total.fetch_add(1, Ordering::Relaxed);
    }
    let hold = state.policy.hold_mailbox.as_str();
    let had_hold = before.bcc.iter().any(|r| r.is(hold));
    let has_hold = after.bcc.iter().any(|r| r.is(hold));
    match (had_hold, has_hold) {
        (false, true) => {
            m.hold_added_total.fetch_add(1, Ordering::Relaxed);
        }
        (true, false) => {
            m.hold_removed_total.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
    let failures = calls.iter().filter(|c| !c.ok).count() as u64;
    m.host_failures_total.fetch_add(failures, Ordering::Relaxed);
    m.observe_latency(elapsed_ms);
}

/// Handler for `/events/:event`.
async fn event_handler(
    state: State<AppState>,
    Path(event): Path<String>,
    payload: Result<Json<ComposeSnapshot>, JsonRejection>,
) -> axum::response::Response {
    if state.registry.get(&event).is_none() {
        tracing::warn!(event = %event, "event without registered handler");
        return respond_with_error(unknown_event(&event));
    }
    let snapshot = match payload {
        Ok(Json(inner)) => inner,
        Err(rejection) => return handle_json_rejection(&state, rejection),
    };
    match run_event(&state, &event, snapshot).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => respond_with_error(err),
    }
}

fn handle_json_rejection(state: &AppState, rejection: JsonRejection) -> axum::response::Response {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            tracing::warn!(limit = ?state.max_request_bytes, "request body exceeded configured limit");
            let message = match state.max_request_bytes {
                Some(limit) => format!("Request too large (body exceeded limit {} bytes)", limit),
                None => "Request too large".to_string(),
            };
            respond_with_error(ErrorResponse {
                error_code: 4001,
                message,
                http_status: 413,
            })
        }
        other => other.into_response(),
    }
}

/// Readiness / liveness endpoint.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "events": state.registry.events(),
        "targetLabel": state.policy.target_label,
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use std::fmt::Write as _;
    let m = &state.metrics;
    let mut buf = String::new();

    writeln!(
        &mut buf,
        "# HELP holdgate_events_total Events handled per launch event\n# TYPE holdgate_events_total counter"
    )
    .ok();
    for (event, counter) in &m.events_total {
        writeln!(
            &mut buf,
            "holdgate_events_total{{event=\"{}\"}} {}",
            event,
            counter.load(Ordering::Relaxed)
        )
        .ok();
    }
    let counters = [
        (
            "holdgate_blocks_total",
            "Events resolved with a blocking disposition",
            &m.blocks_total,
        ),
        (
            "holdgate_labels_applied_total",
            "Sensitivity labels set by the classification reconciler",
            &m.labels_applied_total,
        ),
        (
            "holdgate_hold_added_total",
            "Hold mailbox additions to bcc",
            &m.hold_added_total,
        ),
        (
            "holdgate_hold_removed_total",
            "Hold mailbox removals from bcc",
            &m.hold_removed_total,
        ),
        (
            "holdgate_host_failures_total",
            "Host calls that reported a failure status",
            &m.host_failures_total,
        ),
    ];
    for (name, help, counter) in counters {
        writeln!(&mut buf, "# HELP {} {}\n# TYPE {} counter", name, help, name).ok();
        writeln!(&mut buf, "{} {}", name, counter.load(Ordering::Relaxed)).ok();
    }

    writeln!(
        &mut buf,
        "# HELP holdgate_handler_latency_ms Handler chain latency histogram milliseconds\n# TYPE holdgate_handler_latency_ms histogram"
    )
    .ok();
    let mut cumulative: u64 = 0;
    for (i, ub) in m.hist_buckets.iter().enumerate() {
        cumulative += m.hist_counts[i].load(Ordering::Relaxed);
        writeln!(
            &mut buf,
            "holdgate_handler_latency_ms_bucket{{le=\"{}\"}} {}",
            ub, cumulative
        )
        .ok();
    }
    let count = m.hist_count.load(Ordering::Relaxed);
    writeln!(
        &mut buf,
        "holdgate_handler_latency_ms_bucket{{le=\"+Inf\"}} {}",
        count
    )
    .ok();
    writeln!(
        &mut buf,
        "holdgate_handler_latency_ms_sum {}",
        m.hist_sum_ms.load(Ordering::Relaxed)
    )
    .ok();
    writeln!(&mut buf, "holdgate_handler_latency_ms_count {}", count).ok();

    writeln!(
        &mut buf,
        "# HELP holdgate_process_uptime_seconds Process uptime seconds\n# TYPE holdgate_process_uptime_seconds gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "holdgate_process_uptime_seconds {}",
        state.process_start_instant.elapsed().as_secs_f64()
    )
    .ok();
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buf,
    )
        .into_response()
}
