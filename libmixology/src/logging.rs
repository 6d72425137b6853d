//! Log output for binaries and embedding hosts
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever owns the process. Machines tag their events with a `machine`
//! field (`discovery`, `search`, ...), so JSON output can be filtered per
//! screen downstream.
//!
//! Filter precedence: `RUST_LOG`, then `--verbose`, then
//! `MIXOLOGY_LOG_LEVEL`, then [`DEFAULT_DIRECTIVES`].
//!
//! ```no_run
//! use libmixology::logging::LoggingConfig;
//!
//! LoggingConfig::from_env(false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use crate::error::MixologyError;

/// Quiet for dependencies, favorite writes still visible
pub const DEFAULT_DIRECTIVES: &str = "warn,libmixology=info";

/// Every machine transition, plus the CLI itself
pub const VERBOSE_DIRECTIVES: &str = "info,libmixology=debug,mix=debug,sqlx=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line text on stderr
    #[default]
    Text,
    /// One JSON object per event, event fields flattened
    Json,
    /// Multi-line with source locations
    Pretty,
}

impl FromStr for LogFormat {
    type Err = MixologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(MixologyError::InvalidInput(format!(
                "log format '{}' (expected text, json or pretty)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `warn,libmixology::features=debug`
    pub directives: String,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            directives: DEFAULT_DIRECTIVES.to_string(),
            verbose: false,
        }
    }
}

impl LoggingConfig {
    /// Read `MIXOLOGY_LOG_FORMAT` and `MIXOLOGY_LOG_LEVEL`
    ///
    /// Unparseable formats fall back to text.
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var("MIXOLOGY_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let directives = std::env::var("MIXOLOGY_LOG_LEVEL")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());

        Self {
            format,
            directives,
            verbose,
        }
    }

    /// Directives the subscriber will use when `RUST_LOG` is unset
    pub fn effective_directives(&self) -> &str {
        if self.verbose {
            VERBOSE_DIRECTIVES
        } else {
            &self.directives
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(self.effective_directives()).unwrap_or_else(|e| {
                eprintln!("Ignoring log directives '{}': {}", self.effective_directives(), e);
                EnvFilter::new(DEFAULT_DIRECTIVES)
            })
        })
    }

    /// Install the global subscriber, writing to stderr
    ///
    /// Returns false if the host already installed one.
    pub fn init(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        let result = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder.with_target(true).with_ansi(false).try_init(),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    format = ?self.format,
                    directives = self.effective_directives(),
                    "Logging ready"
                );
                true
            }
            Err(_) => false,
        }
    }
}
