//! Tracing subscriber for the `mpa` binary.
//!
//! The library itself only emits `tracing` events. [`init_from_config`]
//! installs a subscriber driven by the `[logging]` section: a default level
//! (`RUST_LOG` takes precedence when set) and one of three line formats.
//! Everything goes to stderr; stdout is reserved for command output.
//!
//! ```no_run
//! use mpa_scpi::{config::MpaConfig, logging};
//!
//! # fn main() -> mpa_scpi::error::AppResult<()> {
//! let config = MpaConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(host = %config.instrument.host, "Starting");
//! # Ok(())
//! # }
//! ```

use crate::config::MpaConfig;
use crate::error::{AppResult, MpaError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// How each event is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line with colour, for a terminal.
    Pretty,
    /// Single line, no colour.
    Compact,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = MpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(MpaError::Configuration(format!(
                "Unknown log format '{s}' (expected pretty, compact or json)"
            ))),
        }
    }
}

/// The `[logging]` section, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Level used when `RUST_LOG` is unset.
    pub level: Level,
    /// Event rendering.
    pub format: LogFormat,
}

impl LogSettings {
    /// Parse the level and format names from `config`.
    pub fn from_config(config: &MpaConfig) -> AppResult<Self> {
        let level = Level::from_str(config.logging.level.trim()).map_err(|_| {
            MpaError::Configuration(format!(
                "Unknown log level '{}' (expected trace, debug, info, warn or error)",
                config.logging.level
            ))
        })?;
        Ok(Self {
            level,
            format: config.logging.format.parse()?,
        })
    }
}

/// Install the subscriber described by `config.logging`.
pub fn init_from_config(config: &MpaConfig) -> AppResult<()> {
    init(LogSettings::from_config(config)?)
}

/// Install a global subscriber. A second call leaves the first one in place.
pub fn init(settings: LogSettings) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str().to_lowercase()));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(layer.pretty().with_filter(filter))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(layer.compact().with_ansi(false).with_filter(filter))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .try_init(),
    };

    match installed {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(MpaError::Configuration(format!(
            "Failed to install tracing subscriber: {e}"
        ))),
    }
}
