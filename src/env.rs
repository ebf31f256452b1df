//! Environment variable names read at startup.
//!
//! Only [`crate::init::LogConfig::from_env`], [`crate::identity`] and
//! [`crate::trace::TraceSettings::from_env`] touch the environment; the
//! pipeline itself never does.

/// Minimum level, one of `DEBUG`, `INFO`, `WARNING`, `ERROR`, `CRITICAL`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Kubernetes pod name injected through the downward API.
pub const POD_NAME_ENV: &str = "POD_NAME";

/// Host name fallback when `/etc/hostname` is unavailable.
pub const HOSTNAME_ENV: &str = "HOSTNAME";

/// Enables trace correlation when set to `true` or `1`.
pub const DD_TRACE_ENABLED_ENV: &str = "DD_TRACE_ENABLED";

/// Deployed service name used for trace correlation.
pub const DD_SERVICE_ENV: &str = "DD_SERVICE";

/// Deployment environment used for trace correlation.
pub const DD_ENV_ENV: &str = "DD_ENV";

/// Deployed version used for trace correlation.
pub const DD_VERSION_ENV: &str = "DD_VERSION";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a boolean flag; anything but `true`/`1` (any case) is `false`.
pub fn env_flag(key: &str) -> bool {
    env_opt(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
