//! Byte-stream transports to the instrument.
//!
//! The instrument has no prompt, so the only generic way to know a reply is
//! complete is to stop hearing from it. [`Transport::read_until`] therefore
//! returns whatever accumulated when either the terminator shows up or the
//! timeout runs out; running out of time is the normal end of most reads.
//!
//! - [`tcp`]: the real socket transport
//! - [`mock`]: a scripted in-memory instrument for tests and dry runs

pub mod mock;
pub mod tcp;

pub use mock::{MockConnector, MockEvent, MockTransport};
pub use tcp::{TcpConnector, TcpTransport};

use crate::error::AppResult;
use crate::protocol::commands::LINE_TERMINATOR;
use async_trait::async_trait;
use std::time::Duration;

/// A bidirectional byte stream to one instrument port.
#[async_trait]
pub trait Transport: Send {
    /// `host:port` label used in logs.
    fn peer(&self) -> &str;

    /// Write raw bytes.
    async fn write(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Write `line` followed by [`LINE_TERMINATOR`].
    async fn write_line(&mut self, line: &str) -> AppResult<()> {
        let framed = format!("{line}{LINE_TERMINATOR}");
        self.write(framed.as_bytes()).await
    }

    /// Read until `terminator` has been received or `timeout` has elapsed.
    ///
    /// The returned bytes include the terminator when it was found. Input
    /// received after the terminator stays buffered for the next read. An empty
    /// terminator never matches.
    async fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> AppResult<Vec<u8>>;

    /// Release the connection. Calling it twice is harmless.
    async fn close(&mut self) -> AppResult<()>;
}

/// Opens transports; lets bootstrap run against sockets or mocks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Connect to `host:port`, giving up after `timeout`.
    async fn connect(&self, host: &str, port: u16, timeout: Duration)
        -> AppResult<Self::Transport>;
}

/// Position just past the first occurrence of `needle` in `haystack`.
pub(crate) fn find_terminator(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| start + needle.len())
}
