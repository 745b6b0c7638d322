//! Tracing configuration for structured logging
//!
//! Applications configure subscribers; the library only emits trace events.
//! The CLI initializes a console subscriber here, mapping repeated `-v`
//! flags to filter levels.

use crate::error::{Result, RestoreError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Initialize the console tracing subscriber
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when the filter string cannot
    /// be parsed.
    pub fn init(self) -> Result<()> {
        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())
        }
        .map_err(|e| RestoreError::invalid_config(format!("invalid tracing filter: {}", e)))?;

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact();

        Registry::default().with(filter).with(fmt_layer).init();
        Ok(())
    }
}

/// Initialize tracing for the CLI with a verbosity level
///
/// Respects `RUST_LOG` when set; otherwise maps verbosity to a level filter.
///
/// # Errors
/// Returns `RestoreError::InvalidConfig` when `RUST_LOG` contains an
/// unparseable filter.
pub fn init_cli_tracing(verbosity: u8) -> Result<()> {
    let mut config = TracingConfig::new().with_verbosity(verbosity);
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(env_filter);
    }
    config.init()
}
