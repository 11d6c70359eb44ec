// THEORY:
// `ServerEvent`s are the server's outward-facing log: connections coming and
// going, commands sent or dropped, and whatever the actuators report back.
// They are published on an `EventBus`, a `tokio::sync::broadcast` channel, so
// any number of observers (a console logger, a GUI) can subscribe without the
// server knowing about them. Publishing never blocks; a subscriber that falls
// behind loses the oldest events.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::broadcast;

use sentry_vision::protocol::{CommandId, StatusReport};

use crate::correlation::Correlated;
use crate::registry::{ClientId, DeliveryError};

/// Why a client left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame or ended the stream.
    Closed,
    /// A read or write on the socket failed.
    SocketError(String),
    /// A broadcast could not be handed to the client.
    Evicted(DeliveryError),
    /// No pong arrived within the keep-alive window.
    PongTimeout,
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Anything other than a clean close or a shutdown.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Closed | Self::Shutdown)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed by peer"),
            Self::SocketError(err) => write!(f, "socket error: {err}"),
            Self::Evicted(err) => write!(f, "evicted: {err}"),
            Self::PongTimeout => f.write_str("pong timeout"),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Listening {
        addr: SocketAddr,
    },
    ClientConnected {
        client: ClientId,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client: ClientId,
        addr: SocketAddr,
        reason: DisconnectReason,
    },
    Hello {
        client: ClientId,
        node: Option<String>,
    },
    CommandSent {
        id: Option<CommandId>,
        kind: &'static str,
        recipients: usize,
    },
    CommandDropped {
        id: Option<CommandId>,
        kind: &'static str,
    },
    Acknowledged {
        client: ClientId,
        id: CommandId,
        command: Option<Correlated>,
    },
    Status {
        client: ClientId,
        report: StatusReport,
        command: Option<Correlated>,
    },
    Raw {
        client: ClientId,
        text: String,
        reason: String,
    },
}

fn id_or_dash(id: &Option<CommandId>) -> &str {
    id.as_ref().map(CommandId::as_str).unwrap_or("-")
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening { addr } => write!(f, "[SERVER] listening on ws://{addr}"),
            Self::ClientConnected { client, addr } => {
                write!(f, "[SERVER] {client} connected from {addr}")
            }
            Self::ClientDisconnected {
                client,
                addr,
                reason,
            } => write!(f, "[SERVER] {client} ({addr}) disconnected: {reason}"),
            Self::Hello { client, node } => match node {
                Some(node) => write!(f, "[RX] {client} HELLO from {node}"),
                None => write!(f, "[RX] {client} HELLO"),
            },
            Self::CommandSent {
                id,
                kind,
                recipients,
            } => write!(f, "[TX] {kind} {} to {recipients} client(s)", id_or_dash(id)),
            Self::CommandDropped { id, kind } => write!(
                f,
                "[SENDER] No clients connected; {kind} {} dropped",
                id_or_dash(id)
            ),
            Self::Acknowledged {
                client,
                id,
                command,
            } => match command {
                Some(c) => write!(f, "[RX] {client} ACK {id} ({} after {:?})", c.kind, c.elapsed),
                None => write!(f, "[RX] {client} ACK {id} (unknown command)"),
            },
            Self::Status { client, report, .. } => {
                write!(
                    f,
                    "[RX] {client} STATUS {} {} pan={} tilt={}",
                    report.id, report.state, report.pan, report.tilt
                )?;
                if let Some(err) = &report.error {
                    write!(f, " error={err}")?;
                }
                Ok(())
            }
            Self::Raw { client, text, .. } => write!(f, "[RX] {client} RAW {text}"),
        }
    }
}

/// Fan-out channel for `ServerEvent`s.
#[derive(Clone)]
pub struct EventBus {
    pub events_tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel::<ServerEvent>(capacity.max(1));
        Self { events_tx }
    }

    /// Publishes `event`; having no subscribers is not an error.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }
}
