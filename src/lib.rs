pub mod ai;
pub mod bot;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod importer;
pub mod models;
pub mod pipeline;

use crate::errors::{AppError, AppResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// JSON logs into a daily-rolling file under `<data_dir>/logs`. The worker
/// guard lives for the whole process; dropping it would lose buffered lines.
pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "factory.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
