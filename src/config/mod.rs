//! # Configuration Management
//!
//! A backup run is configured from three layers: built-in defaults, the JSON
//! event payload, and a snapshot of the process environment. [`BackupConfig::resolve`]
//! merges them into one validated record. Logging is configured separately
//! through [`ObservabilityConfig`].

pub mod event;
pub mod settings;

pub use event::{EnvSnapshot, EventPayload, ENV_OVERRIDES, PGDUMP_PATH_VAR};
pub use settings::{
    AuthStrategy, BackupConfig, DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_PART_SIZE,
    DEFAULT_PGDUMP_DIR, DEFAULT_PORT, DEFAULT_REGION, DEFAULT_STORAGE_CLASS, MAX_PART_SIZE,
    MIN_PART_SIZE,
};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable output
    pub json_logging: bool,

    /// Service name attached to the startup log line
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: crate::APP_NAME.to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("DUMPSTREAM_LOG_LEVEL")
                .ok()
                .filter(|level| !level.is_empty())
                .unwrap_or(defaults.log_level),
            json_logging: std::env::var("DUMPSTREAM_LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logging),
            service_name: defaults.service_name,
        }
    }
}
