//! Structured single-line JSON logging with request correlation.
//!
//! Call [`configure`] once at startup, obtain handles with [`get_logger`],
//! and bracket each request with [`set_request_id`] / [`clear_context`]
//! (or [`context::with_request_id`] for async handlers). Every record,
//! whether it comes from a [`Logger`] handle or from a dependency logging
//! through `tracing`, is enriched with request, pod and host identity and
//! written as one JSON line to every configured sink.
//!
//! The [`info!`] family of macros emits through a handle like the methods
//! do, and also records the enclosing function under `func_name`.

pub mod level;
pub mod record;
pub mod context;
pub mod identity;
pub mod trace;
pub mod processor;
pub mod render;
pub mod pipeline;
pub mod sink;
pub mod console_sink;
pub mod file_sink;
pub mod memory_sink;
pub mod dispatch;
pub mod layer;
pub mod logger;
pub mod init;
pub mod env;

pub use context::{bind_context, clear_context, set_request_id, unbind_context};
pub use init::{configure, configure_from_env, LogConfig};
pub use level::LogLevel;
pub use logger::{Fields, Logger};

/// Logger name used when [`get_logger`] is called without one.
pub const ROOT_LOGGER: &str = "root";

/// A handle bound to the process-wide pipeline.
///
/// Handles obtained before [`configure`] is called are valid; their
/// records are discarded until configuration happens.
pub fn get_logger<'a>(name: impl Into<Option<&'a str>>) -> Logger {
    init::global().logger(name.into().unwrap_or(ROOT_LOGGER))
}
