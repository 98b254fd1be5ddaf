//! Tracing configuration and log routing.
//!
//! The server logs to stdout with a compact formatter and mirrors everything into a file: the
//! path in `LOAN_RAG_LOG_FILE` when set, otherwise `logs/loan-rag.log`. The CLI keeps stdout
//! clean for command output and logs to stderr only. File writes go through a non-blocking
//! writer so indexing workers never wait on log I/O.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log lines are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact stdout layer plus an append-only file layer.
    StdoutAndFile,
    /// Stderr only; used by command-line tools whose stdout carries results.
    Stderr,
}

/// Configure tracing subscribers for the requested output.
///
/// Respects `RUST_LOG` for filtering and defaults to `info`.
pub fn init_tracing(output: LogOutput) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match output {
        LogOutput::Stderr => {
            registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .compact(),
                )
                .init();
        }
        LogOutput::StdoutAndFile => {
            let stdout_layer = fmt::layer().with_target(false).compact();
            let registry = registry.with(stdout_layer);
            match configure_file_writer() {
                Some(writer) => {
                    let file_layer = fmt::layer()
                        .with_writer(writer)
                        .with_target(true)
                        .with_ansi(false)
                        .compact();
                    registry.with(file_layer).init();
                }
                None => registry.init(),
            }
        }
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when the logs directory cannot be created or the target file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let file = match std::env::var("LOAN_RAG_LOG_FILE") {
        Ok(path) => std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
            .ok()?,
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all("logs") {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            let appender = tracing_appender::rolling::never("logs", "loan-rag.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            return Some(writer);
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}
