//! Tracing configuration for the command-line frontend
//!
//! The library only emits events and spans; subscribers are installed here,
//! by the binary.

use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(PathBuf),
}

/// Keeps background log writers alive until dropped
#[derive(Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
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
            0 => "warn,dimo_imaging=info",
            1 => "info,dimo_imaging=debug",
            _ => "debug,dimo_imaging=trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = self
            .env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| self.verbosity_to_filter().to_string());
        Ok(EnvFilter::try_new(directives)?)
    }

    /// Install the global subscriber
    ///
    /// The returned guard must be held for the life of the process when
    /// logging to a file.
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let registry = Registry::default().with(self.filter()?);

        match &self.output {
            TracingOutput::Console => {
                let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
                match self.format {
                    TracingFormat::Console => registry.with(layer.with_ansi(true).compact()).try_init()?,
                    TracingFormat::Compact => registry.with(layer.with_ansi(false).compact()).try_init()?,
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => registry
                        .with(layer.json().with_current_span(true).with_span_list(true))
                        .try_init()?,
                }
                Ok(TracingGuard::default())
            },
            #[cfg(feature = "tracing-files")]
            TracingOutput::File(path) => {
                use tracing_appender::{non_blocking, rolling};

                let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("dimo-imaging.log"));
                let (writer, guard) = non_blocking(rolling::never(directory, file_name));
                let layer = fmt::layer().with_writer(writer).with_ansi(false);
                match self.format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        registry.with(layer.compact()).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        registry
                            .with(layer.json().with_current_span(true).with_span_list(true))
                            .try_init()?;
                    },
                }
                Ok(TracingGuard { _file: Some(guard) })
            },
        }
    }
}

/// Initialize tracing with CLI defaults
pub fn init_cli_tracing(verbosity: u8, log_file: Option<PathBuf>) -> anyhow::Result<TracingGuard> {
    let config = TracingConfig::new().with_verbosity(verbosity);
    match log_file {
        #[cfg(feature = "tracing-files")]
        Some(path) => config.with_output(TracingOutput::File(path)).init(),
        #[cfg(not(feature = "tracing-files"))]
        Some(path) => {
            let guard = config.init()?;
            tracing::warn!(
                path = %path.display(),
                "File logging requires the tracing-files feature, logging to stderr"
            );
            Ok(guard)
        },
        None => config.init(),
    }
}

/// Span creation helpers for CLI operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for one CLI command
    pub fn command(name: &str, input: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "command",
            command = %name,
            input = %input.display()
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{error, info};

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::fmt::Display, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// Log the timing of a finished operation
    pub fn performance_metric(operation: &str, duration_ms: u64, backend: Option<&str>) {
        info!(
            operation = %operation,
            duration_ms,
            backend = backend.unwrap_or("cpu"),
            "Operation finished"
        );
    }
}
