//! Custom error types for the library.
//!
//! `MpaError` is the single error type returned by every fallible operation in
//! the crate. It is built with `thiserror`, so lower-level errors (I/O, figment,
//! csv) convert into it with `?`.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`** / **`ConnectTimeout`**: a TCP connection could not be opened.
//!   Fatal during bootstrap; nothing in the crate retries.
//! - **`MalformedPortReply`**: a bootstrap discovery leg answered with something that
//!   is not a port number. The handshake stops before the next leg.
//! - **`NotConnected`** / **`Io`**: the control channel is closed or failed mid-session.
//! - **`UnexpectedReply`**: an operation needed a particular reply shape (a register
//!   value, an application name) and did not get it.
//! - **`InvalidArgument`**: caller-supplied values outside what the instrument accepts.
//! - **`Config`** / **`Configuration`**: figment parse failures and semantic validation
//!   failures respectively.
//! - **`Csv`** / **`Storage`**: telemetry sink failures.
//!
//! Errors the *instrument* reports (`-200, "Execution error"` and friends) are not
//! represented here. They are logged by the status classifier and the reply is still
//! handed back to the caller; see [`crate::protocol::classifier`].

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, MpaError>;

/// Errors produced by the transport, session and operation layers.
#[derive(Error, Debug)]
pub enum MpaError {
    /// Opening a TCP connection failed.
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        /// `host:port` that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Opening a TCP connection did not complete in time.
    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// `host:port` that was dialled.
        addr: String,
        /// Connect timeout that elapsed.
        timeout: Duration,
    },

    /// A bootstrap discovery leg did not answer with a port number.
    #[error("Bootstrap leg {leg} returned a malformed port reply: {reply:?}")]
    MalformedPortReply {
        /// 1 for the module-port query, 2 for the system-port query.
        leg: u8,
        /// The raw (trimmed) reply text.
        reply: String,
    },

    /// The transport was used after it was closed.
    #[error("Control channel not connected")]
    NotConnected,

    /// I/O failure on an open control channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply did not have the shape the operation requires.
    #[error("Unexpected reply to {operation}: {reply:?}")]
    UnexpectedReply {
        /// Operation that issued the command.
        operation: &'static str,
        /// Raw reply text.
        reply: String,
    },

    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The CSV telemetry sink failed.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A telemetry sink could not accept a row.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<figment::Error> for MpaError {
    fn from(value: figment::Error) -> Self {
        MpaError::Config(Box::new(value))
    }
}

impl MpaError {
    /// Whether the error means the control channel is gone and the session must be
    /// bootstrapped again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MpaError::Connection { .. }
                | MpaError::ConnectTimeout { .. }
                | MpaError::MalformedPortReply { .. }
                | MpaError::NotConnected
                | MpaError::Io(_)
        )
    }
}
