//! Logging setup.
//!
//! The library only emits `tracing` events; the binary decides where they go.
//! [`init`] installs one `fmt` layer writing to stderr, so console replies on
//! stdout are never interleaved with log lines. `RUST_LOG` wins over the
//! configured level when it is set.
//!
//! ```no_run
//! use dio_aggregator::config::AppConfig;
//! use dio_aggregator::logging::{self, LogSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! logging::init(&LogSettings::from_app_config(&config)?);
//! tracing::info!("console ready");
//! # Ok(())
//! # }
//! ```

use std::io;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::AppConfig;
use crate::error::{AggregatorError, AggregatorResult};

/// How each event is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line with colors, for a terminal
    Pretty,
    /// One line per event, no colors
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Subscriber settings for [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Most verbose level emitted when `RUST_LOG` is unset.
    pub level: Level,
    /// Event rendering.
    pub format: LogFormat,
    /// Add source locations and span open/close events.
    pub verbose: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            verbose: false,
        }
    }
}

impl LogSettings {
    /// Settings at the configured level, other options at their defaults.
    pub fn from_app_config(config: &AppConfig) -> AggregatorResult<Self> {
        Ok(Self {
            level: level_from_str(&config.application.log_level)?,
            ..Self::default()
        })
    }

    /// Same settings with `format`.
    pub fn format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    /// Same settings with source locations and span events on or off.
    pub fn verbose(self, verbose: bool) -> Self {
        Self { verbose, ..self }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()));
        let spans = if self.verbose {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(spans)
            .with_file(self.verbose)
            .with_line_number(self.verbose)
            .with_thread_names(true);

        match self.format {
            LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => layer.compact().with_ansi(false).with_filter(filter).boxed(),
            LogFormat::Json => layer.json().with_filter(filter).boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// `try_init` only fails when a subscriber or `log` logger is already
/// installed (test harness, embedding application); that one is kept.
/// Returns whether this call installed the subscriber.
pub fn init(settings: &LogSettings) -> bool {
    match tracing_subscriber::registry().with(settings.layer()).try_init() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Keeping existing log subscriber");
            false
        }
    }
}

/// Level name as written in configuration files, case-insensitive.
pub fn level_from_str(name: &str) -> AggregatorResult<Level> {
    Level::from_str(name.trim()).map_err(|_| {
        AggregatorError::Configuration(format!(
            "unknown log level '{}', expected trace, debug, info, warn or error",
            name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_from_str("trace").unwrap(), Level::TRACE);
        assert_eq!(level_from_str("WARN").unwrap(), Level::WARN);
        assert_eq!(level_from_str(" debug ").unwrap(), Level::DEBUG);
        assert!(level_from_str("verbose").is_err());
        assert!(level_from_str("").is_err());
    }

    #[test]
    fn test_settings_from_app_config() {
        let mut app = AppConfig::default();
        app.application.log_level = "error".into();
        let settings = LogSettings::from_app_config(&app).unwrap();
        assert_eq!(settings.level, Level::ERROR);
        assert_eq!(settings.format, LogFormat::Compact);
        assert!(!settings.verbose);

        app.application.log_level = "loud".into();
        assert!(LogSettings::from_app_config(&app).is_err());
    }

    #[test]
    fn test_init_twice() {
        init(&LogSettings::default());
        let json = LogSettings::default().format(LogFormat::Json).verbose(true);
        assert!(!init(&json));
    }
}
