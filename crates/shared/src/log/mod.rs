// Logging module
// Console + optional daily rolling file output through the tracing ecosystem
//
// Levels follow the tools' numeric convention:
// 0 = errors only, 1 = warnings, 2 = info, 3 = debug, 4 = trace

use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default log file name when a log directory is configured
pub const DEFAULT_LOG_FILE: &str = "pather.log";

/// Map a numeric console level to a tracing filter directive
pub fn map_log_level(level: i32) -> &'static str {
    match level {
        i32::MIN..=0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `log_level`. With a `log_dir`, a second
/// non-ANSI layer writes to a daily rolling file named `file_name`.
pub fn initialize_logging(log_dir: Option<&str>, log_level: &str, file_name: Option<&str>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false);

    if let Some(dir) = log_dir {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let file_appender = rolling::daily(dir, file_name.unwrap_or(DEFAULT_LOG_FILE));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The writer must outlive every log call; tools run until exit
        std::mem::forget(guard);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .try_init();
    }
}
