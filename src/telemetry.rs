//! Structured tracing for timing and persistence diagnostics.
//!
//! Events land as JSON lines in a side file, kept apart from the free-form
//! debug log so tooling can consume them directly. Without a subscriber the
//! emit helpers cost nothing.

use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn tracing_log_path() -> PathBuf {
    env::var("DREAMTERM_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("dreamterm_trace.jsonl"))
}

/// Install the JSON subscriber when any logging is enabled. Second and
/// later calls are no-ops.
pub(crate) fn init_tracing(config: &AppConfig) {
    if config.no_logs || !(config.logs || config.log_timings) {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(tracing_log_path())
        {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Emit one timing record for a completed command round trip.
pub(crate) fn record_round_trip(request_id: u64, elapsed: Duration) {
    tracing::info!(
        target: "dreamterm::timing",
        request_id,
        elapsed_ms = elapsed.as_millis() as u64,
        "command round trip"
    );
}
