//! TCP transport
//!
//! Each accepted connection logs in with a single frame, is handed to the tick
//! thread as an [`Admission`], and then runs two tasks: a reader that forwards
//! decoded frames to the session's inbound queue and a writer that drains the
//! session's outbox to the socket. The tick thread never touches a socket.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::player::WindowMode;
use crate::metrics::Metrics;
use crate::net::connection::{Admission, ClientLink};
use crate::net::framing::{read_frame, write_message, Frame, FramingError};
use crate::net::outbox::{Delivery, OutboundMessage};
use crate::net::protocol::{client, LoginRequest};

/// Time a new connection gets to send its login frame
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted username
const MAX_USERNAME_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("no login frame within {0:?}")]
    Timeout(Duration),
    #[error("expected login opcode {expected}, got {got}")]
    UnexpectedOpcode { expected: u8, got: u8 },
    #[error("malformed login: {0}")]
    Malformed(#[from] crate::net::reader::DecodeError),
    #[error("invalid username {0:?}")]
    InvalidUsername(String),
    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// TCP game server
pub struct GameServer {
    config: ServerConfig,
    admissions: Sender<Admission>,
    metrics: Arc<Metrics>,
}

impl GameServer {
    pub fn new(config: ServerConfig, admissions: Sender<Admission>, metrics: Arc<Metrics>) -> Self {
        Self { config, admissions, metrics }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        info!("Game server listening on {}", self.bind_addr());
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let admissions = self.admissions.clone();
            let metrics = self.metrics.clone();
            let default_mode = self.config.default_window_mode;

            tokio::spawn(async move {
                metrics.connections_active.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = handle_connection(stream, addr, default_mode, admissions, metrics.clone()).await {
                    warn!(%addr, "Connection error: {}", e);
                }
                metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}

/// Validate the opening frame
fn parse_login(frame: &Frame, default_mode: WindowMode) -> Result<(String, WindowMode), LoginError> {
    if frame.opcode != client::LOGIN {
        return Err(LoginError::UnexpectedOpcode { expected: client::LOGIN, got: frame.opcode });
    }
    let login = LoginRequest::decode(&frame.payload)?;
    let username = login.username.trim().to_string();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(LoginError::InvalidUsername(login.username));
    }
    let mode = match login.window_mode {
        1..=3 => WindowMode::from_raw(login.window_mode),
        _ => default_mode,
    };
    Ok((username, mode))
}

/// Handle a single connection until either side goes away
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    default_mode: WindowMode,
    admissions: Sender<Admission>,
    metrics: Arc<Metrics>,
) -> Result<(), LoginError> {
    stream.set_nodelay(true).map_err(FramingError::Io)?;
    let (mut reader, writer) = stream.into_split();

    let frame = tokio::time::timeout(LOGIN_TIMEOUT, read_frame(&mut reader))
        .await
        .map_err(|_| LoginError::Timeout(LOGIN_TIMEOUT))??;
    let (username, window_mode) = parse_login(&frame, default_mode)?;
    info!(%addr, %username, ?window_mode, "Login");

    let (link, ends) = ClientLink::pair(addr);
    if admissions.send(Admission { username, window_mode, link }).is_err() {
        warn!(%addr, "Game loop is not accepting players");
        return Ok(());
    }

    tokio::spawn(write_loop(writer, ends.outbound, addr, metrics.clone()));
    read_loop(reader, ends.inbound, addr, &metrics).await;
    Ok(())
}

/// Forward frames until the socket closes or the session is dropped
async fn read_loop(mut reader: OwnedReadHalf, inbound: Sender<Frame>, addr: SocketAddr, metrics: &Metrics) {
    loop {
        match read_frame(&mut reader).await {
            Ok(frame) => {
                metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                metrics.bytes_received.fetch_add(2 + frame.payload.len() as u64, Ordering::Relaxed);
                if inbound.send(frame).is_err() {
                    debug!(%addr, "Session gone, stopping reader");
                    break;
                }
            }
            Err(FramingError::ConnectionClosed) => {
                debug!(%addr, "Connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(%addr, "Read error: {}", e);
                break;
            }
        }
    }
}

/// Drain the outbox to the socket, flushing on immediate messages
async fn write_loop(
    writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    addr: SocketAddr,
    metrics: Arc<Metrics>,
) {
    let mut writer = BufWriter::new(writer);
    while let Some(message) = outbound.recv().await {
        let flush = message.delivery == Delivery::Immediate;
        if let Err(e) = write_message(&mut writer, &message.bytes, flush).await {
            debug!(%addr, "Write error: {}", e);
            return;
        }
        metrics.record_sent(message.bytes.len());
    }
    // Session dropped: push out anything buffered, then close
    if let Err(e) = writer.flush().await {
        debug!(%addr, "Final flush failed: {}", e);
    }
    let _ = writer.shutdown().await;
}
