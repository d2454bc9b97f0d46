use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::{ConfigError, Settings};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs stdout logging plus, when `LOG_FILE` is set, an append-only
/// JSON-lines file sink. Returns the counters exposed on `/status`.
pub fn init(settings: &Settings) -> Result<LogStats, ConfigError> {
    let stats = LogStats::new();

    let default_level = if settings.deploy_env.is_development() {
        "debug"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    let file_layer = match settings.paths.log_file.as_deref() {
        Some(log_file) => {
            let file = open_log_file(log_file)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
        }
        None => None,
    };

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stats.layer())
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(err) = result {
        eprintln!("Logging already initialized: {}", err);
    }

    Ok(stats)
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<std::fs::File, ConfigError> {
    let log_file_error = |err: std::io::Error| ConfigError::LogFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_file_error)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)
}

#[derive(Debug)]
struct Counters {
    session_id: String,
    started_at: DateTime<Utc>,
    total: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
}

/// Event counters fed by a `tracing` layer.
#[derive(Debug, Clone)]
pub struct LogStats {
    counters: Arc<Counters>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogStatsSnapshot {
    pub session_id: String,
    pub started_at: String,
    pub uptime_seconds: i64,
    pub total_logs: u64,
    pub warnings: u64,
    pub errors: u64,
}

impl LogStats {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            counters: Arc::new(Counters {
                session_id: started_at.format("%Y%m%d_%H%M%S").to_string(),
                started_at,
                total: AtomicU64::new(0),
                warnings: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
        }
    }

    pub fn layer(&self) -> LogStatsLayer {
        LogStatsLayer {
            counters: self.counters.clone(),
        }
    }

    pub fn snapshot(&self) -> LogStatsSnapshot {
        let counters = &self.counters;
        LogStatsSnapshot {
            session_id: counters.session_id.clone(),
            started_at: counters.started_at.to_rfc3339(),
            uptime_seconds: (Utc::now() - counters.started_at).num_seconds(),
            total_logs: counters.total.load(Ordering::Relaxed),
            warnings: counters.warnings.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for LogStats {
    fn default() -> Self {
        Self::new()
    }
}

fn record(counters: &Counters, level: &Level) {
    counters.total.fetch_add(1, Ordering::Relaxed);
    if *level == Level::WARN {
        counters.warnings.fetch_add(1, Ordering::Relaxed);
    } else if *level == Level::ERROR {
        counters.errors.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct LogStatsLayer {
    counters: Arc<Counters>,
}

impl<S: Subscriber> Layer<S> for LogStatsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        record(&self.counters, event.metadata().level());
    }
}
