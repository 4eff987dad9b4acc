//! Mock instrument served over real TCP sockets.
//!
//! [`MockInstrument`] listens on three local ports, one per bootstrap leg. The
//! two discovery ports answer the port query with the next port number (or a
//! scripted reply), and the control port hands each received line to a
//! responder closure. Connection events are recorded so tests can check the
//! handshake order.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answers one line received on the control port.
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// Connection event seen by the mock, numbered by bootstrap leg (1-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    Accepted(u8),
    Closed(u8),
}

type Shared<T> = Arc<Mutex<Vec<T>>>;

pub struct MockInstrumentBuilder {
    module_reply: Option<String>,
    control_reply: Option<String>,
    responder: Responder,
}

impl MockInstrumentBuilder {
    /// Reply to the module-port query on the base port, instead of the real port.
    pub fn module_reply(mut self, reply: &str) -> Self {
        self.module_reply = Some(reply.to_string());
        self
    }

    /// Reply to the system-port query on the module port, instead of the real port.
    pub fn control_reply(mut self, reply: &str) -> Self {
        self.control_reply = Some(reply.to_string());
        self
    }

    /// Answer lines on the control port.
    pub fn responder(
        mut self,
        responder: impl FnMut(&str) -> Option<String> + Send + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub async fn start(self) -> MockInstrument {
        let base = bind().await;
        let module = bind().await;
        let control = bind().await;

        let base_port = port_of(&base);
        let module_port = port_of(&module);
        let control_port = port_of(&control);

        let events: Shared<ServerEvent> = Arc::new(Mutex::new(Vec::new()));
        let control_lines: Shared<String> = Arc::new(Mutex::new(Vec::new()));

        let tasks = vec![
            tokio::spawn(serve_discovery(
                base,
                1,
                self.module_reply.unwrap_or_else(|| module_port.to_string()),
                events.clone(),
            )),
            tokio::spawn(serve_discovery(
                module,
                2,
                self.control_reply
                    .unwrap_or_else(|| control_port.to_string()),
                events.clone(),
            )),
            tokio::spawn(serve_control(
                control,
                self.responder,
                events.clone(),
                control_lines.clone(),
            )),
        ];

        MockInstrument {
            base_port,
            module_port,
            control_port,
            events,
            control_lines,
            tasks,
        }
    }
}

pub struct MockInstrument {
    pub base_port: u16,
    pub module_port: u16,
    pub control_port: u16,
    events: Shared<ServerEvent>,
    control_lines: Shared<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockInstrument {
    pub fn builder() -> MockInstrumentBuilder {
        MockInstrumentBuilder {
            module_reply: None,
            control_reply: None,
            responder: Box::new(|_| None),
        }
    }

    /// Mock whose control port answers every line with `No error`.
    pub async fn acknowledging() -> MockInstrument {
        Self::builder()
            .responder(|line: &str| (line != "*REM").then(|| "0, \"No error\"\n".to_string()))
            .start()
            .await
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Lines received on the control port, without newlines.
    pub fn control_lines(&self) -> Vec<String> {
        self.control_lines.lock().unwrap().clone()
    }

    /// Give server tasks a moment to observe disconnects.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

impl Drop for MockInstrument {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

fn port_of(listener: &TcpListener) -> u16 {
    listener.local_addr().unwrap().port()
}

async fn serve_discovery(listener: TcpListener, leg: u8, reply: String, events: Shared<ServerEvent>) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    events.lock().unwrap().push(ServerEvent::Accepted(leg));

    serve_lines(stream, |line| {
        line.contains("FUNC:PORT?").then(|| format!("{reply}\n"))
    })
    .await;

    events.lock().unwrap().push(ServerEvent::Closed(leg));
}

async fn serve_control(
    listener: TcpListener,
    mut responder: Responder,
    events: Shared<ServerEvent>,
    lines: Shared<String>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    events.lock().unwrap().push(ServerEvent::Accepted(3));

    serve_lines(stream, |line| {
        lines.lock().unwrap().push(line.to_string());
        responder(line)
    })
    .await;

    events.lock().unwrap().push(ServerEvent::Closed(3));
}

/// Answer each received line until the client disconnects.
async fn serve_lines(stream: TcpStream, mut answer: impl FnMut(&str) -> Option<String>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(reply) = answer(&line) {
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }
}
