use crate::dispatch::Dispatcher;
use crate::env::{env_flag, env_opt, DD_TRACE_ENABLED_ENV, LOG_LEVEL_ENV};
use crate::file_sink::FileRotation;
use crate::level::LogLevel;
use crate::processor::LevelThresholds;
use crate::trace::TraceSettings;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

/// Components whose low-severity output is suppressed, with the minimum
/// level they are raised to.
pub const NOISY_COMPONENTS: &[(&str, LogLevel)] = &[
    ("tower_http::trace", LogLevel::Error),
    ("hyper", LogLevel::Error),
    ("hyper_util", LogLevel::Warning),
    ("h2", LogLevel::Warning),
    ("axum", LogLevel::Warning),
    ("reqwest", LogLevel::Warning),
    ("rustls", LogLevel::Warning),
];

/// Logging configuration.
///
/// **Fields**
/// - `minimum_level`: records below this level are dropped everywhere.
/// - `log_directory` / `log_filename`: location of the file sink.
/// - `rotation`: rollover policy of the file sink.
/// - `console`: whether lines are also written to stdout.
/// - `noisy_components`: component prefix to elevated threshold.
/// - `trace_enabled`: whether records are correlated with the open
///   `tracing` span.
/// - `trace`: service metadata attached to trace-correlated records.
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub minimum_level: LogLevel,
    pub log_directory: PathBuf,
    pub log_filename: String,
    pub rotation: FileRotation,
    pub console: bool,
    pub noisy_components: Vec<(String, LogLevel)>,
    pub trace_enabled: bool,
    pub trace: TraceSettings,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            minimum_level: LogLevel::Info,
            log_directory: PathBuf::from("logs"),
            log_filename: "application.log".to_string(),
            rotation: FileRotation::Never,
            console: true,
            noisy_components: NOISY_COMPONENTS
                .iter()
                .map(|(name, level)| (name.to_string(), *level))
                .collect(),
            trace_enabled: false,
            trace: TraceSettings::default(),
        }
    }
}

impl LogConfig {
    /// Defaults, with the minimum level and trace settings read from the
    /// environment. An unknown `LOG_LEVEL` falls back to INFO.
    pub fn from_env() -> Self {
        let minimum_level = env_opt(LOG_LEVEL_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            minimum_level,
            trace_enabled: env_flag(DD_TRACE_ENABLED_ENV),
            trace: TraceSettings::from_env(),
            ..Self::default()
        }
    }

    pub fn with_minimum_level(mut self, level: LogLevel) -> Self {
        self.minimum_level = level;
        self
    }

    pub fn with_log_filename(mut self, filename: impl Into<String>) -> Self {
        self.log_filename = filename.into();
        self
    }

    pub fn with_log_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.log_directory = directory.into();
        self
    }

    pub fn with_rotation(mut self, rotation: FileRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    pub fn thresholds(&self) -> LevelThresholds {
        self.noisy_components
            .iter()
            .fold(LevelThresholds::new(self.minimum_level), |t, (name, level)| {
                t.with_override(name.clone(), *level)
            })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot open log file {path}: {source}")]
    FileSink {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
}

static GLOBAL: LazyLock<Arc<Dispatcher>> = LazyLock::new(Dispatcher::new);

/// The process-wide dispatcher behind [`configure`] and [`crate::get_logger`].
pub fn global() -> &'static Arc<Dispatcher> {
    &GLOBAL
}

/// Configure process-wide logging.
///
/// **Effects**
///
/// Replaces any previous configuration of the process-wide dispatcher
/// (calling this twice leaves one set of sinks, not two), and on the first
/// call installs a global `tracing` subscriber whose layer routes every
/// `tracing` event, and every `log` record bridged into `tracing`, through
/// the same pipeline as [`crate::logger::Logger`] handles.
pub fn configure(config: &LogConfig) -> Result<(), ConfigError> {
    global().configure(config)?;
    install_global_subscriber();
    Ok(())
}

/// [`configure`] with [`LogConfig::from_env`].
pub fn configure_from_env() -> Result<(), ConfigError> {
    configure(&LogConfig::from_env())
}

fn install_global_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let subscriber = Registry::default().with(global().layer());
        if let Err(e) = subscriber.try_init() {
            eprintln!("global tracing subscriber already set, tracing events bypass the log pipeline: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = LogConfig::default();
        assert_eq!(config.minimum_level, LogLevel::Info);
        assert_eq!(config.log_directory, PathBuf::from("logs"));
        assert_eq!(config.log_filename, "application.log");
        assert_eq!(config.rotation, FileRotation::Never);
    }

    #[test]
    fn thresholds_include_noisy_components() {
        let thresholds = LogConfig::default()
            .with_minimum_level(LogLevel::Debug)
            .thresholds();
        assert_eq!(thresholds.minimum, LogLevel::Debug);
        assert_eq!(thresholds.threshold_for("hyper::client"), LogLevel::Error);
        assert_eq!(thresholds.threshold_for("reqwest"), LogLevel::Warning);
        assert_eq!(thresholds.threshold_for("my_service::routes"), LogLevel::Debug);
    }
}
