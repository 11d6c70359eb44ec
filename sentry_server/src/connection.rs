// THEORY:
// One task per WebSocket connection. The task owns the socket and nothing else:
// it registers itself with the network actor, then multiplexes four things
// until one of them ends the connection:
//
// 1.  **Outbound**: payloads the actor queued for this client. The queue is
//     bounded; the actor sees a full queue as a failed send and evicts us,
//     which closes the queue and ends this loop.
// 2.  **Inbound**: text frames are decoded and forwarded to the actor.
//     A HELLO is answered with HELLO_ACK right here, on this socket only.
// 3.  **Keep-alive**: a ping every interval; if the pong does not come back
//     within the timeout the connection is dropped.
// 4.  **Shutdown**: the server-wide stop flag closes the socket cleanly.

use std::fmt::Display;
use std::future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use sentry_vision::protocol::{ClientMessage, Inbound, ServerMessage, decode_inbound};

use crate::events::DisconnectReason;
use crate::network::Control;
use crate::registry::{ClientSink, DeliveryError};

/// The registry's handle on a live connection: its bounded outbound queue.
#[derive(Debug)]
pub struct OutboundSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl OutboundSink {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

impl ClientSink for OutboundSink {
    fn deliver(&mut self, payload: &str) -> Result<(), DeliveryError> {
        self.tx.try_send(Arc::from(payload)).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub interval: Duration,
    pub timeout: Duration,
}

/// The reply a connection sends straight back for `message`, if any.
pub fn respond_to(message: &ClientMessage) -> Option<ServerMessage> {
    match message {
        ClientMessage::Hello { .. } => Some(ServerMessage::HelloAck),
        ClientMessage::Ack { .. } | ClientMessage::Status(_) => None,
    }
}

/// Everything a connection task needs from the server.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub control: mpsc::UnboundedSender<Control<OutboundSink>>,
    pub keepalive: KeepAlive,
    pub queue_capacity: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Sends one frame, giving up once `limit` has passed so a stalled peer
/// cannot hold the task away from its shutdown and pong deadlines.
pub(crate) async fn send_within<W>(
    ws_tx: &mut W,
    message: Message,
    limit: Duration,
) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match time::timeout(limit, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("write stalled for {limit:?}")),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

pub(crate) async fn run(socket: WebSocket, addr: SocketAddr, ctx: ConnectionContext) {
    let (out_tx, mut out_rx) = mpsc::channel::<Arc<str>>(ctx.queue_capacity.max(1));
    let (reply_tx, reply_rx) = oneshot::channel();
    let register = Control::Register {
        addr,
        sink: OutboundSink::new(out_tx),
        reply: reply_tx,
    };
    if ctx.control.send(register).is_err() {
        return;
    }
    let Ok(client) = reply_rx.await else {
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown = ctx.shutdown.clone();
    let keepalive = ctx.keepalive;
    let write_limit = keepalive.timeout;
    let mut ping = time::interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pong_deadline: Option<Instant> = None;

    // `None` means the actor already dropped us from the registry.
    let reason: Option<DisconnectReason> = loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = send_within(&mut ws_tx, Message::Close(None), write_limit).await;
                    break Some(DisconnectReason::Shutdown);
                }
            }
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    let message = Message::Text(text.to_string());
                    if let Err(err) = send_within(&mut ws_tx, message, write_limit).await {
                        break Some(DisconnectReason::SocketError(err));
                    }
                }
                None => {
                    let _ = send_within(&mut ws_tx, Message::Close(None), write_limit).await;
                    break None;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let inbound = decode_inbound(&text);
                    if let Inbound::Message(message) = &inbound {
                        if let Some(reply) = respond_to(message) {
                            match reply.encode() {
                                Ok(payload) => {
                                    let message = Message::Text(payload);
                                    if let Err(err) = send_within(&mut ws_tx, message, write_limit).await {
                                        break Some(DisconnectReason::SocketError(err));
                                    }
                                    debug!(%client, kind = reply.kind(), "[TX] direct reply");
                                }
                                Err(err) => warn!(%client, error = %err, "failed to encode reply"),
                            }
                        }
                    }
                    let _ = ctx.control.send(Control::Inbound { client, inbound });
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let inbound = Inbound::Raw {
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        reason: "binary frame".to_string(),
                    };
                    let _ = ctx.control.send(Control::Inbound { client, inbound });
                }
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                // Pings are answered by the socket layer.
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break Some(DisconnectReason::Closed),
                Some(Err(err)) => break Some(DisconnectReason::SocketError(err.to_string())),
            },
            _ = ping.tick() => {
                if pong_deadline.is_none() {
                    let ping = Message::Ping(Vec::new());
                    if let Err(err) = send_within(&mut ws_tx, ping, write_limit).await {
                        break Some(DisconnectReason::SocketError(err));
                    }
                    pong_deadline = Some(Instant::now() + keepalive.timeout);
                }
            }
            _ = wait_until(pong_deadline) => {
                let _ = send_within(&mut ws_tx, Message::Close(None), write_limit).await;
                break Some(DisconnectReason::PongTimeout);
            }
        }
    };

    if let Some(reason) = reason {
        let _ = ctx.control.send(Control::Unregister { client, reason });
    }
}
