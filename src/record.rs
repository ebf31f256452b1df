use crate::level::LogLevel;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::error::Error;

/// Top-level keys written by the pipeline itself.
pub mod keys {
    pub const TIMESTAMP: &str = "timestamp";
    pub const LEVEL: &str = "level";
    pub const LOGGER: &str = "logger";
    pub const MESSAGE: &str = "message";
    pub const FILENAME: &str = "filename";
    pub const FUNC_NAME: &str = "func_name";
    pub const LINENO: &str = "lineno";
    pub const REQUEST_ID: &str = "request_id";
    pub const POD_NAME: &str = "pod_name";
    pub const HOST_NAME: &str = "host_name";
    pub const EXCEPTION: &str = "exception";
    pub const STACK: &str = "stack";
    pub const STACK_INFO: &str = "stack_info";

    pub const DD_TRACE_ID: &str = "dd.trace_id";
    pub const DD_SPAN_ID: &str = "dd.span_id";
    pub const DD_SERVICE: &str = "dd.service";
    pub const DD_ENV: &str = "dd.env";
    pub const DD_VERSION: &str = "dd.version";
}

/// Source location captured at the point of emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Callsite {
    pub file: Option<String>,
    /// Enclosing function or, when only that is known, the module path.
    pub function: Option<String>,
    pub line: Option<u32>,
}

/// A record on its way through the pipeline.
///
/// `fields` is the mapping that eventually gets serialized and starts out
/// holding caller-supplied fields only; everything else is emission
/// metadata the processors read from.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub level: LogLevel,
    pub logger: String,
    pub emitted_at: DateTime<Utc>,
    pub callsite: Callsite,
    /// Raw event text, moved into `message` by the rename step.
    pub event: Option<String>,
    /// Rendered error chain, when the emission carried an error.
    pub exception: Option<String>,
    /// Whether a backtrace of the emitting thread was requested.
    pub stack_info: bool,
    pub fields: Map<String, Value>,
}

impl EventRecord {
    /// Start a record stamped with the current time.
    pub fn new(level: LogLevel, logger: impl Into<String>) -> Self {
        EventRecord {
            level,
            logger: logger.into(),
            emitted_at: Utc::now(),
            callsite: Callsite::default(),
            event: None,
            exception: None,
            stack_info: false,
            fields: Map::new(),
        }
    }

    pub fn with_event(mut self, text: impl Into<String>) -> Self {
        self.event = Some(text.into());
        self
    }

    /// The free text of the record: a string `message` field if there is
    /// one, else the raw event text.
    pub fn text(&self) -> Option<&str> {
        self.fields
            .get(keys::MESSAGE)
            .and_then(Value::as_str)
            .or(self.event.as_deref())
    }
}

/// Render an error and its `source()` chain, one cause per line.
pub fn format_error_chain(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn error_chain_lists_every_cause() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "connection reset"));
        assert_eq!(format_error_chain(&err), "query failed\nCaused by: connection reset");
    }

    #[test]
    fn text_prefers_message_over_event() {
        let mut record = EventRecord::new(LogLevel::Info, "app").with_event("raw");
        assert_eq!(record.text(), Some("raw"));
        record
            .fields
            .insert(keys::MESSAGE.to_string(), Value::from("final"));
        assert_eq!(record.text(), Some("final"));
    }

    #[test]
    fn text_falls_back_to_event_when_message_is_not_a_string() {
        let mut record = EventRecord::new(LogLevel::Info, "app").with_event("raw");
        record.fields.insert(keys::MESSAGE.to_string(), Value::from(17));
        assert_eq!(record.text(), Some("raw"));
    }
}
