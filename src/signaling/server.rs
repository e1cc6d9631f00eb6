use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RegistryHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};

pub const DEFAULT_SIGNALING_PORT: u16 = 3479;

/// Runtime knobs for the WebSocket front end
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    /// Longest accepted display name, in characters, after trimming
    pub max_display_name_len: usize,
    /// Capacity of the registry actor's command queue
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            max_display_name_len: 64,
            command_buffer: 1024,
        }
    }
}

pub struct SignalingServer {
    handle: RegistryHandle,
    config: ServerConfig,
}

impl Default for SignalingServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl SignalingServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            handle: RegistryHandle::spawn(config.command_buffer),
            config,
        }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Signaling server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, config).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

/// Per-connection state kept by the read loop
struct Session {
    id: ConnectionId,
    joined: bool,
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RegistryHandle,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let id = handle.connect(tx.clone()).await?;
    let mut session = Session { id, joined: false };
    info!("WebSocket connection {} from {}", id, addr);

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + config.pong_timeout);
                debug!("Ping sent to {}", id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        match handle_text_message(&text, &tx, &handle, &config, &mut session).await {
                            Ok(()) => {}
                            Err(SignalingError::Internal(e)) => {
                                error!("Registry unavailable for {}: {}", id, e);
                                break;
                            }
                            Err(e) => send_error(&tx, &e.to_string()),
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", id);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(id).await;

    send_task.abort();
    info!("WebSocket disconnected: {} ({})", id, addr);

    Ok(())
}

fn send_error(tx: &mpsc::UnboundedSender<OutboundMessage>, message: &str) {
    let err = ServerMessage::Error {
        message: message.to_string(),
    };
    match serde_json::to_string(&err) {
        Ok(json) => {
            let _ = tx.send(OutboundMessage::from(json));
        }
        Err(e) => error!("Failed to encode error message: {}", e),
    }
}

/// Trim and bound a requested display name
fn validate_display_name(raw: &str, max_len: usize) -> Result<String, SignalingError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SignalingError::InvalidDisplayName("must not be empty"));
    }
    if name.chars().count() > max_len {
        return Err(SignalingError::InvalidDisplayName("too long"));
    }
    Ok(name.to_string())
}

async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RegistryHandle,
    config: &ServerConfig,
    session: &mut Session,
) -> Result<(), SignalingError> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(tx, &format!("Invalid message: {}", e));
            return Ok(());
        }
    };

    let id = session.id;
    if !session.joined && !matches!(client_msg, ClientMessage::Join { .. }) {
        return Err(SignalingError::NotJoined);
    }

    match client_msg {
        ClientMessage::Join { display_name } => {
            let name = validate_display_name(&display_name, config.max_display_name_len)?;
            handle.join(id, name).await?;
            session.joined = true;
        }

        ClientMessage::CallUser { target_id } => {
            if target_id == id {
                return Err(SignalingError::SelfCall);
            }
            handle.call_user(id, target_id).await?;
        }

        ClientMessage::AnswerCall { accept, target_id } => {
            handle.answer_call(accept, id, target_id).await?;
        }

        ClientMessage::HangUp => handle.hang_up(id).await?,

        ClientMessage::SendSignal { signal, target_id } => {
            handle.send_signal(id, target_id, signal).await?;
        }
    }

    Ok(())
}
