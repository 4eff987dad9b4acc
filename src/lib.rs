//! # MPA SCPI Control Library
//!
//! Remote control of MPA-series bit-error-rate testers over their SCPI socket
//! interface. The instrument never sends a prompt, so replies are framed either
//! by its `No error` status text or by silence; everything in this crate is
//! built around that.
//!
//! ## Crate Structure
//!
//! - **`transport`**: the `Transport` trait with TCP and scripted mock
//!   implementations; reads end at a terminator or a timeout.
//! - **`protocol`**: the command table, the `Reply` scanner and the status
//!   classifier that logs instrument-reported errors.
//! - **`session`**: the three-hop bootstrap handshake and the transaction
//!   engine every operation goes through.
//! - **`operations`**: laser/traffic toggles, test and application control,
//!   diagnostics readings and I2C register peeks, as methods on `Session`.
//! - **`ber`**: decoding of the 16-bit pre-FEC BER word.
//! - **`telemetry`**: the poll loop and its CSV, in-memory and channel sinks.
//! - **`config`**: Figment-based configuration (TOML file plus `MPA_*` environment).
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `MpaError` enum used across the crate.
//!
//! ## Example
//!
//! ```no_run
//! use mpa_scpi::config::MpaConfig;
//! use mpa_scpi::session::Session;
//!
//! # async fn example() -> mpa_scpi::error::AppResult<()> {
//! let config = MpaConfig::load()?;
//! let mut session = Session::bootstrap_from_config(&config).await?;
//! session.laser_on().await?;
//! session.test_start().await?;
//! println!("link: {:?}", session.link_status().await?);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod ber;
pub mod config;
pub mod error;
pub mod logging;
pub mod operations;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use error::{AppResult, MpaError};
pub use session::{Session, Transaction};
