use crate::context::AmbientContext;
use crate::identity::ProcessIdentity;
use crate::level::LogLevel;
use crate::record::{keys, EventRecord};
use crate::trace::{TraceProvider, TraceSettings};
use chrono::SecondsFormat;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::path::Path;
use std::sync::Arc;

/// What the pipeline should do with a record after a processor ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Drop the record; no further processor runs.
    Drop,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{processor}: {reason}")]
pub struct ProcessorError {
    pub processor: &'static str,
    pub reason: String,
}

impl ProcessorError {
    pub fn new(processor: &'static str, reason: impl Into<String>) -> Self {
        ProcessorError {
            processor,
            reason: reason.into(),
        }
    }
}

/// One enrichment step of the pipeline.
///
/// Processors only touch the record they are handed and the ambient
/// snapshot, so they can run concurrently on any thread.
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(
        &self,
        record: &mut EventRecord,
        ambient: &AmbientContext,
    ) -> Result<Flow, ProcessorError>;
}

/// Per-component minimum levels.
///
/// The effective threshold of a logger is the maximum of the global
/// minimum and the longest matching component override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelThresholds {
    pub minimum: LogLevel,
    pub overrides: Vec<(String, LogLevel)>,
}

impl LevelThresholds {
    pub fn new(minimum: LogLevel) -> Self {
        LevelThresholds {
            minimum,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, component: impl Into<String>, level: LogLevel) -> Self {
        self.overrides.push((component.into(), level));
        self
    }

    pub fn threshold_for(&self, logger: &str) -> LogLevel {
        let component = self
            .overrides
            .iter()
            .filter(|(prefix, _)| component_matches(prefix, logger))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, level)| *level);

        match component {
            Some(level) => level.max(self.minimum),
            None => self.minimum,
        }
    }

    pub fn enabled(&self, level: LogLevel, logger: &str) -> bool {
        level >= self.threshold_for(logger)
    }
}

fn component_matches(prefix: &str, logger: &str) -> bool {
    match logger.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with("::") || rest.starts_with('.'),
        None => false,
    }
}

pub struct LevelFilter {
    pub thresholds: LevelThresholds,
}

impl Processor for LevelFilter {
    fn name(&self) -> &'static str {
        "level_filter"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        if self.thresholds.enabled(record.level, &record.logger) {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Drop)
        }
    }
}

/// Copies bound ambient fields in; fields the caller passed win.
pub struct MergeContext;

impl Processor for MergeContext {
    fn name(&self) -> &'static str {
        "merge_context"
    }

    fn process(
        &self,
        record: &mut EventRecord,
        ambient: &AmbientContext,
    ) -> Result<Flow, ProcessorError> {
        for (key, value) in &ambient.bound {
            if !record.fields.contains_key(key) {
                record.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(Flow::Continue)
    }
}

/// Writes the emission time as UTC RFC 3339 with a `Z` suffix.
pub struct TimeStamper;

impl Processor for TimeStamper {
    fn name(&self) -> &'static str {
        "timestamper"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        let stamp = record
            .emitted_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        record
            .fields
            .insert(keys::TIMESTAMP.to_string(), Value::String(stamp));
        Ok(Flow::Continue)
    }
}

pub struct CallsiteAdder;

impl Processor for CallsiteAdder {
    fn name(&self) -> &'static str {
        "callsite_adder"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        let callsite = record.callsite.clone();
        if let Some(file) = callsite.file {
            let name = Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(file);
            record
                .fields
                .insert(keys::FILENAME.to_string(), Value::String(name));
        }
        if let Some(function) = callsite.function {
            record
                .fields
                .insert(keys::FUNC_NAME.to_string(), Value::String(function));
        }
        if let Some(line) = callsite.line {
            record
                .fields
                .insert(keys::LINENO.to_string(), Value::from(line));
        }
        Ok(Flow::Continue)
    }
}

pub struct AddLevelAndName;

impl Processor for AddLevelAndName {
    fn name(&self) -> &'static str {
        "add_level_and_name"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        record.fields.insert(
            keys::LEVEL.to_string(),
            Value::from(record.level.as_str()),
        );
        record
            .fields
            .insert(keys::LOGGER.to_string(), Value::String(record.logger.clone()));
        Ok(Flow::Continue)
    }
}

/// Writes `request_id` (only when set), `pod_name` and `host_name`.
pub struct InjectProcessContext {
    pub identity: ProcessIdentity,
}

impl Processor for InjectProcessContext {
    fn name(&self) -> &'static str {
        "inject_process_context"
    }

    fn process(
        &self,
        record: &mut EventRecord,
        ambient: &AmbientContext,
    ) -> Result<Flow, ProcessorError> {
        match &ambient.request_id {
            Some(id) => {
                record
                    .fields
                    .insert(keys::REQUEST_ID.to_string(), Value::String(id.clone()));
            }
            None => {
                record.fields.remove(keys::REQUEST_ID);
            }
        }
        record.fields.insert(
            keys::POD_NAME.to_string(),
            Value::String(self.identity.pod_name.clone()),
        );
        record.fields.insert(
            keys::HOST_NAME.to_string(),
            Value::String(self.identity.host_name.clone()),
        );
        Ok(Flow::Continue)
    }
}

pub struct TraceCorrelation {
    pub provider: Arc<dyn TraceProvider>,
    pub settings: TraceSettings,
}

impl Processor for TraceCorrelation {
    fn name(&self) -> &'static str {
        "trace_correlation"
    }

    fn process(
        &self,
        record: &mut EventRecord,
        ambient: &AmbientContext,
    ) -> Result<Flow, ProcessorError> {
        let Some(span) = self.provider.active_span(ambient) else {
            return Ok(Flow::Continue);
        };
        let fields = &mut record.fields;
        fields.insert(keys::DD_TRACE_ID.to_string(), Value::String(span.trace_id));
        fields.insert(keys::DD_SPAN_ID.to_string(), Value::String(span.span_id));
        fields.insert(
            keys::DD_SERVICE.to_string(),
            Value::String(self.settings.service.clone()),
        );
        fields.insert(
            keys::DD_ENV.to_string(),
            Value::String(self.settings.env.clone()),
        );
        fields.insert(
            keys::DD_VERSION.to_string(),
            Value::String(self.settings.version.clone()),
        );
        Ok(Flow::Continue)
    }
}

/// Moves the raw event text into `message`.
///
/// A caller-supplied `message` is kept and the raw text discarded. A
/// record with neither gets an empty message.
pub struct RenameEventToMessage;

impl Processor for RenameEventToMessage {
    fn name(&self) -> &'static str {
        "rename_event_to_message"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        let event = record.event.take();
        if !record.fields.contains_key(keys::MESSAGE) {
            let message = event.unwrap_or_default();
            record
                .fields
                .insert(keys::MESSAGE.to_string(), Value::String(message));
        }
        Ok(Flow::Continue)
    }
}

/// Renders the error chain under `exception` and, when requested, a
/// backtrace under `stack`.
pub struct FormatException;

impl Processor for FormatException {
    fn name(&self) -> &'static str {
        "format_exception"
    }

    fn process(&self, record: &mut EventRecord, _: &AmbientContext) -> Result<Flow, ProcessorError> {
        let requested = matches!(
            record.fields.remove(keys::STACK_INFO),
            Some(Value::Bool(true))
        );
        if record.stack_info || requested {
            let stack = Backtrace::force_capture().to_string();
            record
                .fields
                .insert(keys::STACK.to_string(), Value::String(stack));
        }
        if let Some(exception) = record.exception.take() {
            record
                .fields
                .insert(keys::EXCEPTION.to_string(), Value::String(exception));
        }
        Ok(Flow::Continue)
    }
}
