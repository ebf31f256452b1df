use crate::context;
use crate::dispatch::Dispatcher;
use crate::level::LogLevel;
use crate::record::{format_error_chain, keys, Callsite, EventRecord};
use crate::render::float_value;
use crate::trace::{span_ids, TraceIdVisitor, TraceIds};
use serde_json::Value;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::span::{Attributes, Id};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns every event into an
/// [`EventRecord`] and hands it to a [`Dispatcher`].
///
/// This is how output of dependencies (which log through `tracing`, or
/// through `log` bridged by `tracing-log`) ends up as the same JSON lines
/// as output of [`crate::logger::Logger`] handles. The event's target is
/// the logger name and its `message` is the raw event text.
pub struct JsonLogLayer {
    dispatcher: Arc<Dispatcher>,
}

impl JsonLogLayer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl<S> Layer<S> for JsonLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    /// Events below the installed thresholds are rejected here, before any
    /// field is visited. Spans always pass since they carry trace ids.
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        metadata.is_span()
            || self
                .dispatcher
                .enabled(LogLevel::from(*metadata.level()), metadata.target())
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        self.dispatcher.max_level_hint()
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = TraceIdVisitor::default();
        attrs.record(&mut visitor);

        let inherited = match span.parent() {
            Some(parent) => {
                let extensions = parent.extensions();
                extensions.get::<TraceIds>().map(|ids| ids.trace_id.clone())
            }
            None => None,
        };
        let trace_id = visitor
            .trace_id
            .or(inherited)
            .unwrap_or_else(|| id.into_u64().to_string());

        span.extensions_mut().replace(TraceIds { trace_id });
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();

        let mut record = EventRecord::new(LogLevel::from(*meta.level()), meta.target());
        record.callsite = Callsite {
            file: meta.file().map(str::to_string),
            function: meta.module_path().map(str::to_string),
            line: meta.line(),
        };

        let mut visitor = FieldVisitor { record: &mut record };
        event.record(&mut visitor);

        let mut ambient = context::current();
        ambient.span = ctx.event_span(event).and_then(|span| span_ids(&span));

        self.dispatcher.dispatch(record, &ambient);
    }
}

use tracing::field::{Field, Visit};

/// Copies event fields into an [`EventRecord`].
///
/// `message` becomes the raw event text, error values become the
/// record's exception, and the `log.*` fields added by the `log` bridge
/// replace the bridge's own target and callsite.
pub struct FieldVisitor<'a> {
    pub record: &'a mut EventRecord,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.record.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.insert_event(value.to_string()),
            "log.target" => self.record.logger = value.to_string(),
            "log.module_path" => self.record.callsite.function = Some(value.to_string()),
            "log.file" => self.record.callsite.file = Some(value.to_string()),
            _ => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "log.line" {
            self.record.callsite.line = u32::try_from(value).ok();
        } else {
            self.insert(field, Value::from(value));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, float_value(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == keys::STACK_INFO {
            self.record.stack_info = value;
        } else {
            self.insert(field, Value::from(value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record.exception = Some(format_error_chain(value));
        if field.name() != "error" {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.insert_event(format!("{:?}", value)),
            "log.target" | "log.module_path" | "log.file" => {
                let text = format!("{:?}", value);
                self.record_str(field, text.trim_matches('"'));
            }
            _ => self.insert(field, Value::String(format!("{:?}", value))),
        }
    }
}

impl<'a> FieldVisitor<'a> {
    fn insert_event(&mut self, text: String) {
        self.record.event = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::LogConfig;
    use crate::memory_sink::MemorySink;
    use crate::sink::SinkSet;
    use crate::trace::{NoopTraceProvider, TracingSpanProvider};
    use tracing_subscriber::layer::SubscriberExt;

    fn setup(tracer: Arc<dyn crate::trace::TraceProvider>) -> (Arc<Dispatcher>, MemorySink) {
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::new();
        dispatcher.configure_with(
            &LogConfig::default().with_minimum_level(LogLevel::Debug),
            SinkSet::new().with(Arc::new(sink.clone())),
            tracer,
        );
        (dispatcher, sink)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("upstream timed out")]
    struct Upstream;

    #[test]
    fn tracing_event_becomes_json_line() {
        let (dispatcher, sink) = setup(Arc::new(NoopTraceProvider));
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(user_id = 42, ratio = 0.5, admin = false, "login throttled");
        });

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let line = &records[0];
        assert_eq!(line["message"], "login throttled");
        assert_eq!(line["level"], "WARNING");
        assert_eq!(line["logger"], module_path!());
        assert_eq!(line["user_id"], 42);
        assert_eq!(line["ratio"], 0.5);
        assert_eq!(line["admin"], false);
        assert_eq!(line["filename"], "layer.rs");
        assert!(line.get("event").is_none());
        assert!(line.get("dd.trace_id").is_none());
    }

    #[test]
    fn noisy_dependency_is_suppressed() {
        let (dispatcher, sink) = setup(Arc::new(NoopTraceProvider));
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "hyper::proto::h1", "parsed headers");
            tracing::error!(target: "hyper::proto::h1", "connection error");
        });

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["message"], "connection error");
        assert_eq!(records[0]["logger"], "hyper::proto::h1");
    }

    #[test]
    fn callsites_below_threshold_are_disabled() {
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::new();
        dispatcher.configure_with(
            &LogConfig::default().with_minimum_level(LogLevel::Error),
            SinkSet::new().with(Arc::new(sink.clone())),
            Arc::new(NoopTraceProvider),
        );
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            assert!(!tracing::enabled!(target: "hyper::proto::h1", tracing::Level::TRACE));
            assert!(!tracing::enabled!(target: "app.routes", tracing::Level::WARN));
            assert!(tracing::enabled!(target: "app.routes", tracing::Level::ERROR));
        });
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn caller_event_field_does_not_replace_message() {
        let (dispatcher, sink) = setup(Arc::new(NoopTraceProvider));
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(event = "signup", "user created");
        });

        let records = sink.records();
        assert_eq!(records[0]["message"], "user created");
        assert_eq!(records[0]["event"], "signup");
    }

    #[test]
    fn error_values_render_as_exception() {
        let (dispatcher, sink) = setup(Arc::new(NoopTraceProvider));
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            let err = Upstream;
            tracing::error!(error = &err as &(dyn std::error::Error + 'static), "fetch failed");
        });

        let records = sink.records();
        assert_eq!(records[0]["exception"], "upstream timed out");
        assert!(records[0].get("error").is_none());
    }

    #[test]
    fn span_ids_are_attached_when_tracer_active() {
        let (dispatcher, sink) = setup(Arc::new(TracingSpanProvider));
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside");
            let root = tracing::info_span!("request", trace_id = "abc123");
            let _root = root.enter();
            let child = tracing::info_span!("db");
            let _child = child.enter();
            tracing::info!("inside");
        });

        let records = sink.records();
        assert!(records[0].get("dd.trace_id").is_none());
        assert_eq!(records[1]["dd.trace_id"], "abc123");
        assert!(records[1]["dd.span_id"].is_string());
        assert_eq!(records[1]["dd.env"], "development");
    }

    #[test]
    fn handle_emission_sees_open_span() {
        let (dispatcher, sink) = setup(Arc::new(TracingSpanProvider));
        let logger = dispatcher.logger("app.routes");
        let subscriber = tracing_subscriber::registry().with(dispatcher.layer());

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", trace_id = 777u64);
            let _enter = span.enter();
            logger.info("handled", ());
        });

        let records = sink.records();
        assert_eq!(records[0]["dd.trace_id"], "777");
        assert_eq!(records[0]["logger"], "app.routes");
    }
}
