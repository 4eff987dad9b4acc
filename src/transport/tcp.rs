//! TCP transport to the instrument's control ports.
//!
//! Every leg of the bootstrap handshake and the final control channel are
//! plain TCP connections carrying ASCII lines.
//!
//! # Example
//!
//! ```no_run
//! use mpa_scpi::transport::{TcpTransport, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> mpa_scpi::error::AppResult<()> {
//! let mut transport =
//!     TcpTransport::connect("10.10.40.197", 8000, Duration::from_secs(30)).await?;
//! transport.write_line("*REM").await?;
//! let reply = transport
//!     .read_until(b"****$$$$", Duration::from_secs(2))
//!     .await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use super::{find_terminator, Connector, Transport};
use crate::error::{AppResult, MpaError};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// TCP connection to one instrument port.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` after `close()`.
    stream: Option<TcpStream>,
    /// Bytes received but not yet returned by `read_until`.
    pending: BytesMut,
    addr: String,
}

impl TcpTransport {
    /// Connect to `host:port`, failing with `ConnectTimeout` after `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> AppResult<Self> {
        let addr = format!("{host}:{port}");
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to instrument port"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connection timed out");
                MpaError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout,
                }
            })?
            .map_err(|source| {
                tracing::error!(addr = %addr, error = %source, "TCP connection failed");
                MpaError::Connection {
                    addr: addr.clone(),
                    source,
                }
            })?;

        // Commands are short and strictly request/response.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::info!(addr = %addr, "Connected");
        Ok(Self::from_stream(stream, addr))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        Self {
            stream: Some(stream),
            pending: BytesMut::with_capacity(4096),
            addr,
        }
    }

    /// Whether `close()` has not been called yet.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn peer(&self) -> &str {
        &self.addr
    }

    async fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let stream = self.stream.as_mut().ok_or(MpaError::NotConnected)?;
        tracing::trace!(
            addr = %self.addr,
            data = %String::from_utf8_lossy(bytes).escape_default(),
            "Sending"
        );
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> AppResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(MpaError::NotConnected)?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(end) = find_terminator(&self.pending, terminator) {
                let framed = self.pending.split_to(end);
                return Ok(framed.to_vec());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, stream.read_buf(&mut self.pending)).await {
                // Silence: the reply is as complete as it will get.
                Err(_) => break,
                Ok(Ok(0)) => {
                    tracing::debug!(addr = %self.addr, "Peer closed the connection");
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(addr = %self.addr, error = %e, "Read failed");
                    return Err(e.into());
                }
            }
        }

        let accumulated = self.pending.split();
        tracing::trace!(
            addr = %self.addr,
            bytes = accumulated.len(),
            "Read ended on timeout"
        );
        Ok(accumulated.to_vec())
    }

    async fn close(&mut self) -> AppResult<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(addr = %self.addr, error = %e, "TCP shutdown failed");
            }
            self.pending.clear();
            tracing::debug!(addr = %self.addr, "Connection closed");
        }
        Ok(())
    }
}

/// Opens [`TcpTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> AppResult<TcpTransport> {
        TcpTransport::connect(host, port, timeout).await
    }
}
