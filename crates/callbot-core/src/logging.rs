//! `tracing`-backed logging setup, mirroring `infra-common`'s
//! `logging::setup` module almost verbatim.

use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration for the scaffolding binary and any embedding
/// application.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit structured JSON instead of human-readable text.
    pub json: bool,
    /// Include file/line information in each event.
    pub file_info: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            app_name: "callbot-core".to_string(),
        }
    }
}

/// Install a global `tracing` subscriber built from `config`. Safe to call
/// once per process; a second call is a no-op logged at debug level.
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = fmt().with_env_filter(filter).with_file(config.file_info).with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    tracing::info!(app = %config.app_name, "logging initialized");
}
