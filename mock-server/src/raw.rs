//! A TCP server that answers every connection with a fixed byte script.
//!
//! # Design
//! Each accepted connection reads the request head, reports it, then writes
//! the script's parts in order with an optional pause between them. A script
//! either closes the socket when done or holds it open until the peer goes
//! away, reporting that as [`Event::PeerClosed`]. An empty script that holds
//! open is a server that never answers.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const MAX_REQUEST_LEN: usize = 64 * 1024;

/// What a scripted connection does once it has read the request.
#[derive(Debug, Clone, Default)]
pub struct Script {
    parts: Vec<Bytes>,
    pause: Duration,
    hold_open: bool,
}

impl Script {
    /// Write `response` in one go, then close.
    pub fn new(response: impl Into<Bytes>) -> Self {
        Self::parts([response.into()])
    }

    /// Write each part in turn, then close.
    pub fn parts<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Accept and read the request, but never answer.
    pub fn silent() -> Self {
        Self::default().hold_open()
    }

    /// Sleep for `pause` before every part.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Keep the socket open after the last part until the peer closes it.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

/// Something a scripted connection observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The request bytes, up to and including the blank line.
    Request(Vec<u8>),
    /// The peer closed (or reset) a held-open connection.
    PeerClosed,
}

/// A running scripted server.
#[derive(Debug)]
pub struct ScriptedServer {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<Event>,
}

impl ScriptedServer {
    /// Bind to an ephemeral localhost port and serve `script` to every
    /// connection. Must be called from within a tokio runtime.
    pub async fn start(script: Script) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (events_tx, events) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let socket = match listener.accept().await {
                    Ok((socket, _)) => socket,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        break;
                    }
                };
                let script = script.clone();
                let events_tx = events_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(socket, &script, &events_tx).await {
                        tracing::debug!(error = %e, "scripted connection ended with error");
                    }
                });
            }
        });
        Ok(Self { addr, events })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The `host:port` string a client should connect to.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the next event from any connection.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

async fn serve(
    mut socket: TcpStream,
    script: &Script,
    events: &mpsc::UnboundedSender<Event>,
) -> io::Result<()> {
    let request = read_request_head(&mut socket).await?;
    let _ = events.send(Event::Request(request));

    for part in &script.parts {
        if !script.pause.is_zero() {
            tokio::time::sleep(script.pause).await;
        }
        socket.write_all(part).await?;
        socket.flush().await?;
    }

    if script.hold_open {
        // Whatever the peer sends now is ignored; EOF or reset ends the wait.
        let mut scratch = [0u8; 1024];
        loop {
            match socket.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = events.send(Event::PeerClosed);
        return Ok(());
    }
    socket.shutdown().await
}

async fn read_request_head(socket: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut request = Vec::new();
    let mut scratch = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        if request.len() > MAX_REQUEST_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too long"));
        }
        let n = socket.read(&mut scratch).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&scratch[..n]);
    }
    Ok(request)
}
