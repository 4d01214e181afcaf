//! [`CommandServer`] – TCP listener for the command channel.
//!
//! * `Upgrade: websocket` requests → bidirectional bridge to the [`Rover`].
//! * `GET /status` → 200 OK with the status snapshot as JSON.
//! * Anything else → 404.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use pirover_runtime::{CommandReply, Rover, RoverCommand};
use pirover_types::RoverError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::protocol::{notification_frame, parse_command, reply_frame};

/// Default TCP port for the command channel.
pub const DEFAULT_PORT: u16 = 5000;

pub struct CommandServer {
    rover: Arc<Rover>,
    port: u16,
}

impl CommandServer {
    /// Create a server for `rover` on the [`DEFAULT_PORT`].
    pub fn new(rover: Arc<Rover>) -> Self {
        Self {
            rover,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Channel`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), RoverError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RoverError::Channel(format!("bind error on {addr}: {e}")))?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "command channel listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let rover = Arc::clone(&self.rover);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, rover).await {
                            warn!(%peer, error = %e, "client connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-connection handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    rover: Arc<Rover>,
) -> Result<(), RoverError> {
    // `peek` leaves the request in the socket for the WebSocket handshake.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| RoverError::Channel(format!("peek error from {peer}: {e}")))?;

    let head = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = head.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, rover).await
    } else {
        let request_line = head.lines().next().unwrap_or_default().to_string();
        serve_http(stream, &request_line, &rover).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plain HTTP: GET /status
// ─────────────────────────────────────────────────────────────────────────────

async fn serve_http(
    mut stream: TcpStream,
    request_line: &str,
    rover: &Rover,
) -> Result<(), RoverError> {
    // Drain the peeked request so closing the socket does not reset it.
    let mut discard = [0u8; 1024];
    let _ = stream.read(&mut discard).await;

    let mut parts = request_line.split_whitespace();
    let (status, body) = match (parts.next(), parts.next()) {
        (Some("GET"), Some("/status")) => {
            let snapshot = rover.state().snapshot();
            let body = serde_json::to_string(&snapshot)
                .map_err(|e| RoverError::Channel(format!("status encoding failed: {e}")))?;
            ("200 OK", body)
        }
        _ => ("404 Not Found", r#"{"error":"not found"}"#.to_string()),
    };
    debug!(request = request_line, status, "http request");

    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| RoverError::Channel(format!("HTTP write error: {e}")))?;
    let _ = stream.shutdown().await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket: commands in, notifications out
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws(stream: TcpStream, peer: SocketAddr, rover: Arc<Rover>) -> Result<(), RoverError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| RoverError::Channel(format!("WS handshake from {peer}: {e}")))?;
    info!(%peer, "command client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut bus_rx = rover.bus().subscribe_all();

    loop {
        tokio::select! {
            // ── Downstream: bus → client ────────────────────────────────────
            result = bus_rx.recv() => {
                match result {
                    Ok(event) => match notification_frame(&event) {
                        Ok(frame) => {
                            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "notification encoding failed"),
                    },
                    Err(RecvError::Lagged(n)) => warn!(%peer, skipped = n, "client lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
            // ── Upstream: client → rover ────────────────────────────────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = reply_frame(&dispatch(&rover, text.as_str()));
                        if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%peer, error = %e, "websocket read failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(%peer, "command client disconnected");
    Ok(())
}

fn dispatch(rover: &Rover, text: &str) -> Result<CommandReply, RoverError> {
    let command: RoverCommand = parse_command(text)?;
    debug!(?command, "command received");
    rover.handle(command).inspect_err(|e| debug!(error = %e, "command refused"))
}
