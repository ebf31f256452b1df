use crate::context::AmbientContext;
use crate::env::{env_or, DD_ENV_ENV, DD_SERVICE_ENV, DD_VERSION_ENV};
use tracing::field::{Field, Visit};
use tracing_subscriber::registry::{LookupSpan, Registry, SpanRef};

/// Identifiers of the span open at emission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIds {
    pub trace_id: String,
    pub span_id: String,
}

/// Deployment metadata attached next to trace ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub service: String,
    pub env: String,
    pub version: String,
}

impl TraceSettings {
    pub fn from_env() -> Self {
        TraceSettings {
            service: env_or(DD_SERVICE_ENV, "rag-api"),
            env: env_or(DD_ENV_ENV, "development"),
            version: env_or(DD_VERSION_ENV, "1.0.0"),
        }
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        TraceSettings {
            service: "rag-api".to_string(),
            env: "development".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Source of trace correlation ids, queried once per record.
///
/// Whether a real tracer is wired in is decided at startup by the
/// provider passed to [`crate::dispatch::Dispatcher::configure_with`].
pub trait TraceProvider: Send + Sync {
    /// Span open on the emitting task, or `None` when there is none.
    fn active_span(&self, ambient: &AmbientContext) -> Option<SpanIds>;

    /// Whether this provider reads spans at all. When it does not, spans
    /// below the minimum level need not be recorded.
    fn correlates(&self) -> bool {
        true
    }
}

/// Provider used when no tracing integration is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceProvider;

impl TraceProvider for NoopTraceProvider {
    fn active_span(&self, _ambient: &AmbientContext) -> Option<SpanIds> {
        None
    }

    fn correlates(&self) -> bool {
        false
    }
}

/// Correlates records with the `tracing` span they were emitted in.
///
/// Trace ids come from a `trace_id` field on the span or one of its
/// ancestors, falling back to the root span's id. Span ids are registry
/// ids and are only unique among spans alive at the same time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSpanProvider;

impl TraceProvider for TracingSpanProvider {
    fn active_span(&self, ambient: &AmbientContext) -> Option<SpanIds> {
        ambient.span.clone()
    }
}

/// Span extension holding the trace id resolved when the span was created.
#[derive(Debug, Clone)]
pub(crate) struct TraceIds {
    pub(crate) trace_id: String,
}

/// Picks an explicit `trace_id` field out of span attributes.
#[derive(Default)]
pub(crate) struct TraceIdVisitor {
    pub(crate) trace_id: Option<String>,
}

impl Visit for TraceIdVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "trace_id" {
            self.trace_id = Some(value.to_string());
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "trace_id" {
            self.trace_id = Some(value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "trace_id" {
            self.trace_id = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "trace_id" {
            self.trace_id = Some(format!("{:?}", value).trim_matches('"').to_string());
        }
    }
}

pub(crate) fn span_ids<'a, R>(span: &SpanRef<'a, R>) -> Option<SpanIds>
where
    R: LookupSpan<'a>,
{
    let extensions = span.extensions();
    let ids = extensions.get::<TraceIds>()?;
    Some(SpanIds {
        trace_id: ids.trace_id.clone(),
        span_id: span.id().into_u64().to_string(),
    })
}

/// Ids of the span current on this thread, looked up through the default
/// subscriber's registry.
///
/// Returns `None` when called from inside a subscriber callback, when no
/// span is entered, or when the default subscriber is not registry-backed.
pub fn current_span_ids() -> Option<SpanIds> {
    tracing::Span::current()
        .with_subscriber(|(id, dispatch)| {
            let registry = dispatch.downcast_ref::<Registry>()?;
            let span = registry.span(id)?;
            span_ids(&span)
        })
        .flatten()
}
