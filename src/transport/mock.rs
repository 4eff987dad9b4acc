//! Scripted in-memory instrument.
//!
//! [`MockTransport`] hands every written line to a responder closure; whatever
//! the closure returns is queued as input for the next `read_until`. Reads
//! never wait: when the terminator is not queued the whole queue is returned,
//! which is what a real read would produce once the instrument falls silent.
//!
//! All transports created from one [`MockConnector`] share an event log, so
//! tests can check which ports were opened, what was sent, and when each
//! connection was closed.
//!
//! ```
//! use mpa_scpi::transport::{MockTransport, Transport};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let mut transport = MockTransport::new(|line: &str| match line {
//!     ":OUTPUT:OPTIC? ;:SYSTem:ERRor?" => Some("ON\n0, \"No error\"\n".to_string()),
//!     _ => None,
//! });
//! transport.write_line(":OUTPUT:OPTIC? ;:SYSTem:ERRor?").await.unwrap();
//! let reply = transport
//!     .read_until(b"No error", Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! assert_eq!(reply, b"ON\n0, \"No error");
//! assert_eq!(transport.sent_lines(), vec![":OUTPUT:OPTIC? ;:SYSTem:ERRor?"]);
//! # })
//! ```

use super::{find_terminator, Connector, Transport};
use crate::error::{AppResult, MpaError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Produces the instrument's answer to one written line, if any.
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// Something that happened on a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// A connection to `port` was opened.
    Connected(u16),
    /// `line` was written to `port` (without its newline).
    Sent(u16, String),
    /// The connection to `port` was closed.
    Closed(u16),
}

type EventLog = Arc<Mutex<Vec<MockEvent>>>;

fn lock_log(log: &EventLog) -> MutexGuard<'_, Vec<MockEvent>> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport driven by a responder closure.
pub struct MockTransport {
    port: u16,
    label: String,
    responder: Responder,
    pending: VecDeque<u8>,
    closed: bool,
    log: EventLog,
}

impl MockTransport {
    /// Standalone mock with its own event log.
    pub fn new(responder: impl FnMut(&str) -> Option<String> + Send + 'static) -> Self {
        Self::with_log(0, Box::new(responder), Arc::new(Mutex::new(Vec::new())))
    }

    fn with_log(port: u16, responder: Responder, log: EventLog) -> Self {
        Self {
            port,
            label: format!("mock:{port}"),
            responder,
            pending: VecDeque::new(),
            closed: false,
            log,
        }
    }

    /// Queue unsolicited input, as if the instrument had sent it on its own.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    /// Copy of the shared event log.
    pub fn events(&self) -> Vec<MockEvent> {
        lock_log(&self.log).clone()
    }

    /// Lines written to this transport, in order.
    pub fn sent_lines(&self) -> Vec<String> {
        lock_log(&self.log)
            .iter()
            .filter_map(|event| match event {
                MockEvent::Sent(port, line) if *port == self.port => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn peer(&self) -> &str {
        &self.label
    }

    async fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        if self.closed {
            return Err(MpaError::NotConnected);
        }
        let text = String::from_utf8_lossy(bytes);
        for line in text.split_terminator('\n') {
            lock_log(&self.log).push(MockEvent::Sent(self.port, line.to_string()));
            if let Some(answer) = (self.responder)(line) {
                self.pending.extend(answer.as_bytes());
            }
        }
        Ok(())
    }

    async fn read_until(&mut self, terminator: &[u8], _timeout: Duration) -> AppResult<Vec<u8>> {
        if self.closed {
            return Err(MpaError::NotConnected);
        }
        let queued = self.pending.make_contiguous();
        let take = find_terminator(queued, terminator).unwrap_or(queued.len());
        Ok(self.pending.drain(..take).collect())
    }

    async fn close(&mut self) -> AppResult<()> {
        if !self.closed {
            self.closed = true;
            lock_log(&self.log).push(MockEvent::Closed(self.port));
        }
        Ok(())
    }
}

/// Hands out [`MockTransport`]s for registered ports.
///
/// Connecting to a port without a registered responder fails with
/// `ConnectionRefused`, like a closed TCP port.
pub struct MockConnector {
    routes: Mutex<HashMap<u16, Responder>>,
    log: EventLog,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Connector with no ports open.
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Accept one connection on `port`, answering with `responder`.
    pub fn route(
        self,
        port: u16,
        responder: impl FnMut(&str) -> Option<String> + Send + 'static,
    ) -> Self {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(port, Box::new(responder));
        self
    }

    /// Copy of the event log shared by every transport this connector opened.
    pub fn events(&self) -> Vec<MockEvent> {
        lock_log(&self.log).clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, host: &str, port: u16, _timeout: Duration) -> AppResult<MockTransport> {
        let responder = self
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&port)
            .ok_or_else(|| MpaError::Connection {
                addr: format!("{host}:{port}"),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })?;
        lock_log(&self.log).push(MockEvent::Connected(port));
        Ok(MockTransport::with_log(port, responder, self.log.clone()))
    }
}
