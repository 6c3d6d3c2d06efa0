//! Tracing setup.
//!
//! All output goes to stderr. When the Graph core runs inside a tool-call
//! host, stdout carries the host protocol and must not receive log lines.
//!
//! ```ignore
//! use officecal_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log setup failure.
#[derive(Debug, Error)]
pub enum TracingError {
    /// Another subscriber was installed first.
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive is malformed.
    #[error("invalid log filter: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading while debugging.
    Pretty,
    /// One short line per event.
    #[default]
    Compact,
    /// One JSON object per line, for hosts that collect structured logs.
    Json,
}

/// Log subscriber settings.
///
/// The filter comes from, in order: [`directive`](Self::directive),
/// `RUST_LOG`, then `officecal={level}`.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Show source file and line.
    pub source_locations: bool,
    /// Show the emitting module.
    pub targets: bool,
    pub directive: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::cli()
    }
}

impl TracingConfig {
    /// Warnings and errors only, compact lines.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            source_locations: false,
            targets: false,
            directive: None,
        }
    }

    /// `--debug`: everything down to debug, with module and source location.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            source_locations: true,
            targets: true,
            ..Self::cli()
        }
    }

    /// JSON lines at info level for a long-running tool host.
    #[must_use]
    pub fn host() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            targets: true,
            ..Self::cli()
        }
    }

    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Uses `directive` instead of `RUST_LOG` and the default level.
    #[must_use]
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Filter applied when neither a directive nor `RUST_LOG` is given.
    pub fn fallback_directive(&self) -> String {
        format!("officecal={}", self.level)
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref directive) = self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.fallback_directive())))
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the directive is malformed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.targets)
        .with_file(config.source_locations)
        .with_line_number(config.source_locations);

    let output = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(filter).with(output),
    )?;
    Ok(())
}
