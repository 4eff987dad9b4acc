//! Configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. built-in defaults ([`MpaConfig::default`])
//! 2. a TOML file (`config/mpa.toml` by default)
//! 3. environment variables prefixed with `MPA_`, with `__` separating nested keys
//!
//! Durations are written in humantime notation (`"500ms"`, `"2s"`, `"1m"`).
//!
//! # Example
//! ```no_run
//! use mpa_scpi::config::MpaConfig;
//!
//! # fn main() -> mpa_scpi::error::AppResult<()> {
//! // MPA_INSTRUMENT__HOST=10.10.40.197 overrides the file
//! let config = MpaConfig::load()?;
//! config.validate()?;
//! println!("Instrument: {}:{}", config.instrument.host, config.instrument.base_port);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, MpaError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/mpa.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MPA_";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MpaConfig {
    /// How to reach the instrument
    pub instrument: InstrumentConfig,
    /// Read timeouts and settle delays
    pub timing: Timing,
    /// Telemetry logger settings
    pub telemetry: TelemetryConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

/// Instrument address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Host name or IP address
    pub host: String,
    /// Well-known port where the bootstrap handshake starts
    pub base_port: u16,
}

/// Timeouts and delays used by the session.
///
/// Reads delimited by silence always take their full timeout, so these values
/// directly set how long each operation lasts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    /// TCP connect timeout for each bootstrap leg
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Read timeout for the two bootstrap port queries
    #[serde(with = "humantime_serde")]
    pub port_query_timeout: Duration,
    /// Upper bound for replies ending in the `No error` status line
    #[serde(with = "humantime_serde")]
    pub reply_timeout: Duration,
    /// Silence window ending a telemetry read
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
    /// Silence window used to discard stale input before a telemetry read
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// Silence window for each register peek read
    #[serde(with = "humantime_serde")]
    pub peek_timeout: Duration,
    /// Silence window ending an application launch
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
    /// Wait after starting a test, while the link comes up
    #[serde(with = "humantime_serde")]
    pub test_start_settle: Duration,
    /// Wait after closing an application
    #[serde(with = "humantime_serde")]
    pub application_settle: Duration,
    /// Wait after clearing an optical overload
    #[serde(with = "humantime_serde")]
    pub overload_reset_settle: Duration,
}

/// Telemetry logger settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Application to select before polling, e.g. `TermEth100GL2Traffic_101`
    pub application: Option<String>,
    /// CSV output file
    pub output: PathBuf,
    /// Stop once the errored-seconds count reaches this value
    pub error_threshold: u64,
    /// Time between samples
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 8000,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            port_query_timeout: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(500),
            drain_timeout: Duration::from_millis(500),
            peek_timeout: Duration::from_secs(1),
            launch_timeout: Duration::from_secs(1),
            test_start_settle: Duration::from_secs(1),
            application_settle: Duration::from_secs(60),
            overload_reset_settle: Duration::from_secs(60),
        }
    }
}

impl Timing {
    /// Short timeouts and no settle delays, for tests against local mocks.
    pub fn immediate() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            port_query_timeout: Duration::from_millis(100),
            reply_timeout: Duration::from_millis(500),
            poll_timeout: Duration::from_millis(50),
            drain_timeout: Duration::from_millis(10),
            peek_timeout: Duration::from_millis(50),
            launch_timeout: Duration::from_millis(50),
            test_start_settle: Duration::ZERO,
            application_settle: Duration::ZERO,
            overload_reset_settle: Duration::ZERO,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            application: None,
            output: PathBuf::from("data.txt"),
            error_threshold: 2,
            interval: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for MpaConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentConfig::default(),
            timing: Timing::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MpaConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// The provider stack, exposed so callers can merge extra layers.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(MpaConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(MpaError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(MpaError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.instrument.host.trim().is_empty() {
            return Err(MpaError::Configuration(
                "Instrument host must not be empty".to_string(),
            ));
        }

        if self.instrument.base_port == 0 {
            return Err(MpaError::Configuration(
                "Instrument base_port must be non-zero".to_string(),
            ));
        }

        if self.timing.connect_timeout.is_zero() || self.timing.reply_timeout.is_zero() {
            return Err(MpaError::Configuration(
                "connect_timeout and reply_timeout must be non-zero".to_string(),
            ));
        }

        if self.telemetry.error_threshold == 0 {
            return Err(MpaError::Configuration(
                "telemetry.error_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
