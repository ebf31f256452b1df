use crate::console_sink::ConsoleSink;
use crate::context::AmbientContext;
use crate::file_sink::FileSink;
use crate::identity::ProcessIdentity;
use crate::init::{ConfigError, LogConfig};
use crate::layer::JsonLogLayer;
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::pipeline::Pipeline;
use crate::processor::LevelThresholds;
use crate::record::EventRecord;
use crate::sink::SinkSet;
use crate::trace::{NoopTraceProvider, TraceProvider, TracingSpanProvider};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

struct Installed {
    pipeline: Pipeline,
    sinks: SinkSet,
    /// Known up front only for the standard chain; `None` lets every
    /// `tracing` event reach the pipeline.
    filter: Option<EventFilter>,
}

struct EventFilter {
    thresholds: LevelThresholds,
    /// Whether spans below the minimum level still have to be recorded
    /// for trace correlation.
    keep_spans: bool,
}

/// Holds the installed pipeline and sinks and routes records through them.
///
/// Reconfiguring swaps the whole installation atomically: emitters already
/// inside [`Dispatcher::dispatch`] finish against the old one, every later
/// record sees only the new one. Nothing is emitted until the first
/// installation.
#[derive(Default)]
pub struct Dispatcher {
    installed: ArcSwapOption<Installed>,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install the standard chain with the default console and file sinks.
    ///
    /// Records are correlated with `tracing` spans only when
    /// `config.trace_enabled` is set.
    pub fn configure(&self, config: &LogConfig) -> Result<(), ConfigError> {
        let sinks = default_sinks(config)?;
        let tracer: Arc<dyn TraceProvider> = if config.trace_enabled {
            Arc::new(TracingSpanProvider)
        } else {
            Arc::new(NoopTraceProvider)
        };
        self.configure_with(config, sinks, tracer);
        Ok(())
    }

    /// Install the standard chain with explicit sinks and trace provider.
    pub fn configure_with(
        &self,
        config: &LogConfig,
        sinks: SinkSet,
        tracer: Arc<dyn TraceProvider>,
    ) {
        let filter = EventFilter {
            thresholds: config.thresholds(),
            keep_spans: tracer.correlates(),
        };
        let pipeline = Pipeline::standard(
            filter.thresholds.clone(),
            ProcessIdentity::current().clone(),
            tracer,
            config.trace.clone(),
        );
        self.swap(Some(Installed {
            pipeline,
            sinks,
            filter: Some(filter),
        }));
    }

    /// Replace whatever was installed before with `pipeline` and `sinks`.
    pub fn install(&self, pipeline: Pipeline, sinks: SinkSet) {
        self.swap(Some(Installed {
            pipeline,
            sinks,
            filter: None,
        }));
    }

    /// Remove the installation; later records are discarded.
    pub fn reset(&self) {
        self.swap(None);
    }

    fn swap(&self, next: Option<Installed>) {
        let previous = self.installed.swap(next.map(Arc::new));
        // Callsite interest was computed against the previous thresholds.
        tracing::callsite::rebuild_interest_cache();
        if let Some(previous) = previous {
            previous.sinks.flush();
        }
    }

    pub fn is_configured(&self) -> bool {
        self.installed.load().is_some()
    }

    /// Whether a record at `level` from component `target` would pass the
    /// installed level filter. Always `false` before the first
    /// installation.
    pub fn enabled(&self, level: LogLevel, target: &str) -> bool {
        match &*self.installed.load() {
            Some(installed) => installed
                .filter
                .as_ref()
                .map_or(true, |filter| filter.thresholds.enabled(level, target)),
            None => false,
        }
    }

    /// Most verbose `tracing` level any record could pass with, counting
    /// spans when trace correlation needs them.
    pub fn max_level_hint(&self) -> Option<LevelFilter> {
        match &*self.installed.load() {
            Some(installed) => match &installed.filter {
                Some(filter) if !filter.keep_spans => {
                    Some(filter.thresholds.minimum.tracing_filter())
                }
                _ => None,
            },
            None => Some(LevelFilter::OFF),
        }
    }

    /// Run one record through the pipeline and fan the line out.
    pub fn dispatch(&self, record: EventRecord, ambient: &AmbientContext) {
        let Some(installed) = self.installed.load_full() else {
            return;
        };
        if let Some(line) = installed.pipeline.run(record, ambient) {
            installed.sinks.write_line(&line);
        }
    }

    pub fn flush(&self) {
        if let Some(installed) = self.installed.load_full() {
            installed.sinks.flush();
        }
    }

    pub fn logger(self: &Arc<Self>, name: impl Into<String>) -> Logger {
        Logger::new(name, Arc::clone(self))
    }

    /// A `tracing` layer routing events through this dispatcher.
    pub fn layer(self: &Arc<Self>) -> JsonLogLayer {
        JsonLogLayer::new(Arc::clone(self))
    }
}

fn default_sinks(config: &LogConfig) -> Result<SinkSet, ConfigError> {
    let mut sinks = SinkSet::new();
    if config.console {
        sinks.push(Arc::new(ConsoleSink::stdout()));
    }
    let file = FileSink::open(&config.log_directory, &config.log_filename, config.rotation)
        .map_err(|source| ConfigError::FileSink {
            path: config.log_directory.join(&config.log_filename),
            source,
        })?;
    sinks.push(Arc::new(file));
    Ok(sinks)
}
