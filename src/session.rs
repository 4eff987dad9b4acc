//! Control session: bootstrap handshake and the transaction engine.
//!
//! # Bootstrap
//!
//! The instrument does not accept commands on its well-known port. Instead it
//! hands out the control port through two discovery hops:
//!
//! ```text
//! base port (8000)  --*REM, MOD:FUNC:PORT?-->   "8002"    close
//! 8002              --*REM, :SYST:FUNC:PORT?--> "8006"    close
//! 8006              --*REM-->                   (kept open as the session)
//! ```
//!
//! Neither discovery reply is terminated, so each is read with a sentinel
//! that never arrives and ends when the short port-query timeout expires.
//!
//! # Transactions
//!
//! A [`Transaction`] describes one command/response exchange: the command,
//! whether the status query is appended, how the reply ends (the `No error`
//! literal or silence), how long to wait, and whether to classify the reply.
//! [`Session::transact`] runs it. Operations take `&mut Session`, so at most
//! one exchange is ever in flight on a channel.

use crate::config::{MpaConfig, Timing};
use crate::error::{AppResult, MpaError};
use crate::protocol::commands::LINE_TERMINATOR;
use crate::protocol::{
    classifier, Command, Reply, Scpi, ERROR_FREE, PORT_SENTINEL, SILENCE,
};
use crate::transport::{Connector, TcpConnector, TcpTransport, Transport};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// How the end of a reply is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// The reply ends with the instrument's `No error` status text.
    ErrorFree,
    /// The reply ends when the instrument stops sending.
    Silence,
}

impl Terminator {
    /// Bytes passed to [`Transport::read_until`].
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Terminator::ErrorFree => ERROR_FREE,
            Terminator::Silence => SILENCE,
        }
    }
}

/// Description of one command/response exchange.
#[derive(Debug, Clone)]
pub struct Transaction {
    operation: &'static str,
    command: Command,
    terminator: Terminator,
    timeout: Option<Duration>,
    classify: bool,
    drain: Option<Duration>,
}

impl Transaction {
    /// A command expected to succeed quickly: the status query is appended, the
    /// read ends at `No error`, and the reply is classified.
    pub fn checked(operation: &'static str, command: impl Into<Command>) -> Self {
        Self {
            operation,
            command: command.into().with_status_query(),
            terminator: Terminator::ErrorFree,
            timeout: None,
            classify: true,
            drain: None,
        }
    }

    /// A polling-style read: the command is sent as-is and the read ends when
    /// the instrument falls silent. The reply is not classified.
    pub fn silent(operation: &'static str, command: impl Into<Command>) -> Self {
        Self {
            operation,
            command: command.into(),
            terminator: Terminator::Silence,
            timeout: None,
            classify: false,
            drain: None,
        }
    }

    /// Override the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Discard input for `window` before writing the command.
    pub fn with_drain(mut self, window: Duration) -> Self {
        self.drain = Some(window);
        self
    }

    /// Send the command bare while keeping the `No error` terminator.
    pub fn without_status_query(mut self) -> Self {
        self.command = self.command.without_status_query();
        self
    }

    /// Enable or disable status classification of the reply.
    pub fn with_classification(mut self, enabled: bool) -> Self {
        self.classify = enabled;
        self
    }
}

/// A live control channel to the instrument's per-module port.
pub struct Session<T: Transport = TcpTransport> {
    transport: T,
    host: String,
    port: u16,
    timing: Timing,
}

impl Session<TcpTransport> {
    /// Run the bootstrap handshake over TCP.
    pub async fn bootstrap(host: &str, base_port: u16, timing: Timing) -> AppResult<Self> {
        Self::bootstrap_with(&TcpConnector, host, base_port, timing).await
    }

    /// Run the bootstrap handshake using the instrument section of `config`.
    pub async fn bootstrap_from_config(config: &MpaConfig) -> AppResult<Self> {
        Self::bootstrap(
            &config.instrument.host,
            config.instrument.base_port,
            config.timing,
        )
        .await
    }
}

impl<T: Transport> Session<T> {
    /// Run the bootstrap handshake with any connector.
    ///
    /// Each discovery leg is closed before the next one opens. A connection
    /// failure or a reply that is not a port number aborts the handshake.
    #[instrument(skip(connector, timing))]
    pub async fn bootstrap_with<C>(
        connector: &C,
        host: &str,
        base_port: u16,
        timing: Timing,
    ) -> AppResult<Self>
    where
        C: Connector<Transport = T>,
    {
        let module_port =
            discover_port(connector, host, base_port, Scpi::ModulePortQuery, 1, &timing).await?;
        let control_port =
            discover_port(connector, host, module_port, Scpi::SystemPortQuery, 2, &timing)
                .await?;

        let mut transport = connector
            .connect(host, control_port, timing.connect_timeout)
            .await?;
        transport.write_line(Scpi::RemoteMode.as_str()).await?;

        info!(
            module_port,
            control_port, "Remote control session established"
        );
        Ok(Self::from_transport(transport, host, control_port, timing))
    }

    /// Wrap a transport that already addresses the control port.
    pub fn from_transport(transport: T, host: &str, port: u16, timing: Timing) -> Self {
        Self {
            transport,
            host: host.to_string(),
            port,
            timing,
        }
    }

    /// Instrument host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Control port the session is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Timeouts and delays in effect.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one exchange and return the reply.
    ///
    /// A reply ending at `No error` also takes the rest of that status line
    /// when it has already arrived, so the next reply starts clean.
    /// Instrument-reported errors are logged by the classifier (when the
    /// transaction asks for it); the reply is returned either way.
    #[instrument(
        level = "debug",
        skip_all,
        fields(peer = %self.transport.peer(), operation = transaction.operation)
    )]
    pub async fn transact(&mut self, transaction: &Transaction) -> AppResult<Reply> {
        if let Some(window) = transaction.drain {
            let stale = self.drain(window).await?;
            if !stale.is_empty() {
                debug!(
                    operation = transaction.operation,
                    stale = ?stale.as_str(),
                    "Discarded stale input"
                );
            }
        }

        let line = transaction.command.wire();
        self.transport.write_line(&line).await?;

        let timeout = transaction
            .timeout
            .unwrap_or_else(|| self.default_timeout(transaction.terminator));
        let mut raw = self
            .transport
            .read_until(transaction.terminator.bytes(), timeout)
            .await?;
        if transaction.terminator == Terminator::ErrorFree && raw.ends_with(ERROR_FREE) {
            let rest = self
                .transport
                .read_until(LINE_TERMINATOR.as_bytes(), Duration::ZERO)
                .await?;
            raw.extend_from_slice(&rest);
        }
        let reply = Reply::from_bytes(&raw);

        debug!(
            operation = transaction.operation,
            command = %line,
            reply = ?reply.as_str(),
            "Transaction complete"
        );

        if transaction.classify {
            classifier::classify(&reply, transaction.operation);
        }
        Ok(reply)
    }

    /// Write a command without reading anything back.
    pub async fn send(&mut self, command: &Command) -> AppResult<()> {
        let line = command.wire();
        debug!(command = %line, "Sending without reading");
        self.transport.write_line(&line).await
    }

    /// Read and return whatever arrives within `window`.
    pub async fn drain(&mut self, window: Duration) -> AppResult<Reply> {
        let raw = self.transport.read_until(SILENCE, window).await?;
        Ok(Reply::from_bytes(&raw))
    }

    /// Release the control channel. Later operations fail with `NotConnected`.
    pub async fn close(&mut self) -> AppResult<()> {
        info!(host = %self.host, port = self.port, "Closing session");
        self.transport.close().await
    }

    /// Sleep for a settle delay; zero skips the sleep.
    pub(crate) async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "Waiting for instrument to settle");
            tokio::time::sleep(delay).await;
        }
    }

    fn default_timeout(&self, terminator: Terminator) -> Duration {
        match terminator {
            Terminator::Silence => self.timing.poll_timeout,
            Terminator::ErrorFree => self.timing.reply_timeout,
        }
    }
}

/// One discovery leg: connect, ask for the next port, close.
async fn discover_port<C: Connector>(
    connector: &C,
    host: &str,
    port: u16,
    query: Scpi,
    leg: u8,
    timing: &Timing,
) -> AppResult<u16> {
    let mut transport = connector.connect(host, port, timing.connect_timeout).await?;
    transport.write_line(Scpi::RemoteMode.as_str()).await?;
    transport.write_line(query.as_str()).await?;
    let raw = transport
        .read_until(PORT_SENTINEL, timing.port_query_timeout)
        .await;
    transport.close().await?;

    let reply = Reply::from_bytes(&raw?);
    let next = parse_port(&reply, leg)?;
    debug!(leg, port, next, "Discovered next port");
    Ok(next)
}

fn parse_port(reply: &Reply, leg: u8) -> AppResult<u16> {
    match reply.as_str().trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(MpaError::MalformedPortReply {
            leg,
            reply: reply.as_str().to_string(),
        }),
    }
}
