use crate::context::AmbientContext;
use crate::identity::ProcessIdentity;
use crate::level::LogLevel;
use crate::record::{keys, EventRecord};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
#[error("failed to serialize record: {0}")]
pub struct RenderError(#[from] serde_json::Error);

/// Final stage: one compact JSON document, no trailing newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    pub fn render(&self, record: &EventRecord) -> Result<String, RenderError> {
        Ok(serde_json::to_string(&record.fields)?)
    }
}

/// Line emitted in place of a record whose processing failed.
///
/// Built only from plain strings so that serializing it cannot fail; it
/// still carries every guaranteed top-level key.
pub(crate) fn fallback_line(
    level: LogLevel,
    logger: &str,
    original: Option<&str>,
    failure: &str,
    identity: &ProcessIdentity,
    ambient: &AmbientContext,
) -> String {
    let mut fields = Map::new();
    let mut put = |key: &str, value: &str| {
        fields.insert(key.to_string(), Value::String(value.to_string()));
    };
    put(
        keys::TIMESTAMP,
        &Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    );
    put(keys::LEVEL, level.as_str());
    put(keys::LOGGER, logger);
    put(keys::MESSAGE, "log record processing failed");
    put("logging_error", failure);
    if let Some(original) = original {
        put("original_message", original);
    }
    if let Some(request_id) = &ambient.request_id {
        put(keys::REQUEST_ID, request_id);
    }
    put(keys::POD_NAME, &identity.pod_name);
    put(keys::HOST_NAME, &identity.host_name);

    serde_json::to_string(&fields).unwrap_or_else(|_| {
        format!(
            r#"{{"level":"{}","message":"log record processing failed"}}"#,
            level.as_str()
        )
    })
}

/// Convert a float into JSON, keeping non-finite values as strings.
pub fn float_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_line() {
        let mut record = EventRecord::new(LogLevel::Info, "app");
        record
            .fields
            .insert("message".into(), Value::from("multi\nline"));
        let line = JsonRenderer.render(&record).unwrap();
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"], "multi\nline");
    }

    #[test]
    fn fallback_line_has_guaranteed_keys() {
        let identity = ProcessIdentity::new("pod", "host");
        let ambient = AmbientContext::default().with_request_id("r-9");
        let line = fallback_line(
            LogLevel::Warning,
            "app",
            Some("original \"quoted\""),
            "boom",
            &identity,
            &ambient,
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        for key in ["timestamp", "level", "logger", "message", "pod_name", "host_name"] {
            assert!(parsed.get(key).is_some(), "missing {key}");
        }
        assert_eq!(parsed["original_message"], "original \"quoted\"");
        assert_eq!(parsed["request_id"], "r-9");
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(float_value(1.5), Value::from(1.5));
        assert_eq!(float_value(f64::NAN), Value::from("NaN"));
        assert_eq!(float_value(f64::INFINITY), Value::from("inf"));
    }
}
