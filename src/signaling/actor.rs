use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::messages::ServerMessage;
use super::registry::{Registry, Transport};
use super::types::{ConnectionId, OutboundMessage, SignalingError};

/// Commands sent to the registry actor
pub(crate) enum RegistryCommand {
    Connect {
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Join {
        id: ConnectionId,
        display_name: String,
    },
    CallUser {
        caller: ConnectionId,
        callee: ConnectionId,
    },
    AnswerCall {
        accept: bool,
        callee: ConnectionId,
        caller: ConnectionId,
    },
    HangUp {
        id: ConnectionId,
    },
    SendSignal {
        from: ConnectionId,
        to: ConnectionId,
        signal: String,
    },
    Disconnect {
        id: ConnectionId,
    },
}

/// Outbound channels of every open connection, joined or not.
#[derive(Default)]
struct Connections {
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
}

impl Connections {
    fn encode(msg: &ServerMessage) -> Option<OutboundMessage> {
        match serde_json::to_string(msg) {
            Ok(json) => Some(OutboundMessage::from(json)),
            Err(e) => {
                error!("Failed to encode {:?}: {}", msg, e);
                None
            }
        }
    }
}

impl Transport for Connections {
    fn send_to(&mut self, target: ConnectionId, msg: &ServerMessage) {
        let Some(tx) = self.peers.get(&target) else {
            debug!("No connection {} for outbound message", target);
            return;
        };
        if let Some(out) = Self::encode(msg) {
            let _ = tx.send(out);
        }
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        // encode once; OutboundMessage clones are cheap
        if let Some(out) = Self::encode(msg) {
            for tx in self.peers.values() {
                let _ = tx.send(out.clone());
            }
        }
    }
}

pub(crate) async fn registry_actor(mut rx: mpsc::Receiver<RegistryCommand>) {
    let mut registry = Registry::new();
    let mut connections = Connections::default();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RegistryCommand::Connect { peer_tx, reply } => {
                let mut id = ConnectionId::generate();
                while connections.peers.contains_key(&id) {
                    id = ConnectionId::generate();
                }

                connections.peers.insert(id, peer_tx);
                connections.send_to(id, &ServerMessage::Welcome { your_id: id });

                info!("Connection {} registered", id);
                let _ = reply.send(id);
            }

            RegistryCommand::Join { id, display_name } => {
                registry.join(&mut connections, id, display_name);
            }

            RegistryCommand::CallUser { caller, callee } => {
                registry.call_user(&mut connections, caller, callee);
            }

            RegistryCommand::AnswerCall {
                accept,
                callee,
                caller,
            } => {
                registry.answer_call(&mut connections, accept, callee, caller);
            }

            RegistryCommand::HangUp { id } => {
                registry.hang_up(&mut connections, id);
            }

            RegistryCommand::SendSignal { from, to, signal } => {
                registry.send_signal(&mut connections, from, to, signal);
            }

            RegistryCommand::Disconnect { id } => {
                // the departing connection gets nothing further
                connections.peers.remove(&id);
                registry.disconnect(&mut connections, id);
                info!("Connection {} closed", id);
            }
        }
    }
}

/// Handle to communicate with the registry actor
#[derive(Clone)]
pub struct RegistryHandle {
    pub(crate) tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry actor and return a handle to it
    pub fn spawn(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RegistryCommand>(buffer);
        tokio::spawn(registry_actor(rx));
        Self { tx }
    }

    /// Register a new connection. The connection receives a `welcome` message
    /// carrying its id before anything else.
    pub async fn connect(
        &self,
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnectionId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Connect {
            peer_tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    pub async fn join(&self, id: ConnectionId, display_name: String) -> Result<(), SignalingError> {
        self.send(RegistryCommand::Join { id, display_name }).await
    }

    pub async fn call_user(
        &self,
        caller: ConnectionId,
        callee: ConnectionId,
    ) -> Result<(), SignalingError> {
        self.send(RegistryCommand::CallUser { caller, callee }).await
    }

    pub async fn answer_call(
        &self,
        accept: bool,
        callee: ConnectionId,
        caller: ConnectionId,
    ) -> Result<(), SignalingError> {
        self.send(RegistryCommand::AnswerCall {
            accept,
            callee,
            caller,
        })
        .await
    }

    pub async fn hang_up(&self, id: ConnectionId) -> Result<(), SignalingError> {
        self.send(RegistryCommand::HangUp { id }).await
    }

    pub async fn send_signal(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        signal: String,
    ) -> Result<(), SignalingError> {
        self.send(RegistryCommand::SendSignal { from, to, signal })
            .await
    }

    /// Drop the connection and everything it owns in the registry
    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.tx.send(RegistryCommand::Disconnect { id }).await;
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
