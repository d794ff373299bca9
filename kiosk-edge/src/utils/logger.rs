//! Logging Infrastructure
//!
//! `RUST_LOG` wins over the configured level. Output is plain text or JSON,
//! to stdout or to a daily rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with optional JSON and file output.
///
/// Keep the returned guard alive for the life of the process when logging
/// to a file; dropping it flushes and stops the writer.
pub fn init_logger_with_file(
    log_level: Option<&str>,
    json: bool,
    log_dir: Option<&str>,
) -> Option<WorkerGuard> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let appender = log_dir
        .map(Path::new)
        .filter(|p| p.exists())
        .map(|p| tracing_appender::rolling::daily(p, "kiosk-edge"));

    match (appender, json) {
        (Some(appender), json) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = builder.with_writer(writer).with_ansi(false);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            Some(guard)
        }
        (None, true) => {
            builder.json().init();
            None
        }
        (None, false) => {
            builder.init();
            None
        }
    }
}
