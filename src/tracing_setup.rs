use std::path::Path;

use eyre::{Result, WrapErr};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{Builder, Rotation},
};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the daily log files written inside `log_dir`
pub const LOG_FILE_PREFIX: &str = "nacos-bridge";

/// Open a daily rolling log file in `dir` behind a non-blocking writer.
///
/// Buffered lines are flushed when the returned guard is dropped.
pub fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .wrap_err_with(|| format!("Failed to open log file in {}", dir.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize tracing with an explicit filter, format and optional log directory.
///
/// `level` is any `EnvFilter` directive (`warn`, `nacos_bridge=debug,info`, ...). When
/// `log_dir` is given, output goes to daily files inside it instead of stdout, and the
/// returned guard must be kept alive until the process exits.
pub fn init_tracing_with_config(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let (result, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            let result = if json_format {
                Registry::default()
                    .with(env_filter)
                    .with(fmt_layer.json().with_span_list(true))
                    .try_init()
            } else {
                Registry::default()
                    .with(env_filter)
                    .with(fmt_layer)
                    .try_init()
            };
            (result, Some(guard))
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true);
            let result = if json_format {
                Registry::default()
                    .with(env_filter)
                    .with(fmt_layer.json().with_span_list(true))
                    .try_init()
            } else {
                Registry::default()
                    .with(env_filter)
                    .with(fmt_layer.with_ansi(true))
                    .try_init()
            };
            (result, None)
        }
    };
    result.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        "nacos-bridge logging initialized with level: {}, json: {}, dir: {:?}",
        level,
        json_format,
        log_dir
    );
    Ok(guard)
}

/// Create a span covering the setup of a watcher
pub fn create_watch_span(kind: &str, target: &str) -> tracing::Span {
    tracing::info_span!("watch", watch.kind = kind, watch.target = target)
}

/// Create a span covering one upstream client call
pub fn create_client_span(operation: &str, target: &str) -> tracing::Span {
    tracing::debug_span!(
        "client_call",
        client.operation = operation,
        client.target = target,
    )
}
