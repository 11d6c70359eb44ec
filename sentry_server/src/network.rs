// THEORY:
// The network context: one OS thread, one single-threaded tokio runtime, and
// everything that touches sockets or server state living inside it.
//
// Key pieces:
// 1.  **`NetworkActor`**: the sole owner of the `Registry` and the
//     `Correlator`. It reacts to two inputs, commands from the capture loop
//     and control messages from connection tasks, one at a time.
// 2.  **Accept loop**: axum serves WebSocket upgrades on `/` and `/ws`; each
//     upgrade becomes a connection task (see `connection`).
// 3.  **`CommandSender`**: the only way into this context from outside. It
//     tries a non-blocking enqueue first; if the queue is full it waits on the
//     network runtime for at most the handoff timeout, then gives up.
// 4.  **`ServerHandle`**: returned by `spawn`. It carries the sender, the event
//     bus and the stop flag, and joins the thread on shutdown or drop.

use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use sentry_vision::HandoffError;
use sentry_vision::core_modules::dispatcher::CommandSink;
use sentry_vision::protocol::{ClientMessage, Inbound, MotionCommand};

use crate::ServerConfig;
use crate::connection::{self, ConnectionContext, KeepAlive, OutboundSink};
use crate::correlation::Correlator;
use crate::error::ServerError;
use crate::events::{DisconnectReason, EventBus, ServerEvent};
use crate::registry::{ClientId, ClientSink, Registry};

/// Messages from connection tasks to the actor.
#[derive(Debug)]
pub(crate) enum Control<S> {
    Register {
        addr: SocketAddr,
        sink: S,
        reply: oneshot::Sender<ClientId>,
    },
    Unregister {
        client: ClientId,
        reason: DisconnectReason,
    },
    Inbound {
        client: ClientId,
        inbound: Inbound,
    },
}

pub(crate) struct NetworkActor<S> {
    registry: Registry<S>,
    correlator: Correlator,
    events: EventBus,
}

impl<S: ClientSink> NetworkActor<S> {
    pub(crate) fn new(events: EventBus, correlation_capacity: usize) -> Self {
        Self {
            registry: Registry::new(),
            correlator: Correlator::new(correlation_capacity),
            events,
        }
    }

    /// Broadcasts one command to every connected client.
    pub(crate) fn deliver(&mut self, command: MotionCommand) {
        let kind = command.kind();
        let id = command.id().cloned();
        let payload = match command.encode() {
            Ok(payload) => payload,
            Err(err) => {
                error!(kind, error = %err, "failed to encode command");
                return;
            }
        };

        if self.registry.is_empty() {
            warn!(kind, id = ?id, "[SENDER] No clients connected; message dropped");
            self.events.publish(ServerEvent::CommandDropped { id, kind });
            return;
        }

        if let Some(id) = &id {
            self.correlator.record(id.clone(), kind, Instant::now());
        }

        let report = self.registry.broadcast(&payload);
        for eviction in report.evicted.iter() {
            warn!(
                client = %eviction.client,
                addr = %eviction.addr,
                error = %eviction.error,
                "dropping client after failed send"
            );
            self.events.publish(ServerEvent::ClientDisconnected {
                client: eviction.client,
                addr: eviction.addr,
                reason: DisconnectReason::Evicted(eviction.error.clone()),
            });
        }

        if report.is_dropped() {
            warn!(kind, id = ?id, "[SENDER] No client accepted the message; dropped");
            self.events.publish(ServerEvent::CommandDropped { id, kind });
        } else {
            debug!(kind, id = ?id, recipients = report.delivered.len(), "[TX] {payload}");
            self.events.publish(ServerEvent::CommandSent {
                id,
                kind,
                recipients: report.delivered.len(),
            });
        }
    }

    pub(crate) fn handle_control(&mut self, control: Control<S>) {
        match control {
            Control::Register { addr, sink, reply } => {
                let client = self.registry.register(addr, sink);
                if reply.send(client).is_err() {
                    self.registry.unregister(client);
                    return;
                }
                info!(%client, %addr, clients = self.registry.len(), "client connected");
                self.events.publish(ServerEvent::ClientConnected { client, addr });
            }
            Control::Unregister { client, reason } => {
                // Evicted clients are already gone and were reported then.
                let Some(entry) = self.registry.unregister(client) else {
                    return;
                };
                if reason.is_abnormal() {
                    warn!(%client, addr = %entry.addr, %reason, "client disconnected abnormally");
                } else {
                    info!(%client, addr = %entry.addr, %reason, "client disconnected");
                }
                self.events.publish(ServerEvent::ClientDisconnected {
                    client,
                    addr: entry.addr,
                    reason,
                });
            }
            Control::Inbound { client, inbound } => self.handle_inbound(client, inbound),
        }
    }

    fn handle_inbound(&mut self, client: ClientId, inbound: Inbound) {
        let now = Instant::now();
        match inbound {
            Inbound::Message(ClientMessage::Hello { node }) => {
                info!(%client, node = ?node, "[RX] HELLO");
                self.registry.set_node(client, node.clone());
                self.events.publish(ServerEvent::Hello { client, node });
            }
            Inbound::Message(ClientMessage::Ack { id }) => {
                let command = self.correlator.lookup(&id, now);
                match &command {
                    Some(c) => debug!(%client, %id, kind = c.kind, elapsed = ?c.elapsed, "[RX] ACK"),
                    None => debug!(%client, %id, "[RX] ACK for unknown command"),
                }
                self.events.publish(ServerEvent::Acknowledged {
                    client,
                    id,
                    command,
                });
            }
            Inbound::Message(ClientMessage::Status(report)) => {
                let key = report.cmd_id.as_ref().unwrap_or(&report.id);
                let command = self.correlator.lookup(key, now);
                debug!(
                    %client,
                    id = %report.id,
                    state = %report.state,
                    pan = report.pan,
                    tilt = report.tilt,
                    "[RX] STATUS"
                );
                if let Some(err) = &report.error {
                    warn!(%client, id = %report.id, error = %err, "actuator reported an error");
                }
                self.events.publish(ServerEvent::Status {
                    client,
                    report,
                    command,
                });
            }
            Inbound::Raw { text, reason } => {
                debug!(%client, %reason, "[RX] raw: {text}");
                self.events.publish(ServerEvent::Raw {
                    client,
                    text,
                    reason,
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<MotionCommand>,
        mut control: mpsc::UnboundedReceiver<Control<S>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(message) = control.recv() => self.handle_control(message),
                Some(command) = commands.recv() => {
                    self.deliver(command);
                    // Connection tasks share this thread; let them flush before the next command.
                    tokio::task::yield_now().await;
                }
                else => break,
            }
        }
        let closed = self.registry.clear();
        info!(clients = closed, "network loop stopped");
    }
}

/// Thread-safe entry point into the network context's command queue.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<MotionCommand>,
    runtime: Handle,
    timeout: Duration,
}

impl CommandSender {
    pub fn new(tx: mpsc::Sender<MotionCommand>, runtime: Handle, timeout: Duration) -> Self {
        Self {
            tx,
            runtime,
            timeout,
        }
    }
}

impl CommandSink for CommandSender {
    fn submit(&self, command: MotionCommand) -> Result<(), HandoffError> {
        let command = match self.tx.try_send(command) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(HandoffError::Closed),
            Err(TrySendError::Full(command)) => command,
        };

        // Blocking on the runtime from inside async code would panic.
        if Handle::try_current().is_ok() {
            return Err(HandoffError::Full);
        }

        let tx = self.tx.clone();
        let timeout = self.timeout;
        match self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, tx.send(command)).await })
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HandoffError::Closed),
            Err(_) => Err(HandoffError::Timeout(timeout)),
        }
    }
}

/// Owner's handle on the running server.
pub struct ServerHandle {
    sender: CommandSender,
    events: EventBus,
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Handle on the network runtime, for spawning observers next to the server.
    pub fn runtime(&self) -> &Handle {
        &self.sender.runtime
    }

    /// Stops the network loop and waits for the thread to exit.
    pub fn shutdown(mut self) -> Result<(), ServerError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), ServerError> {
        let _ = self.shutdown.send(true);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ServerError::Panicked),
            None => Ok(()),
        }
    }
}

impl CommandSink for ServerHandle {
    fn submit(&self, command: MotionCommand) -> Result<(), HandoffError> {
        self.sender.submit(command)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(error = %err, "network thread did not stop cleanly");
        }
    }
}

#[derive(Clone)]
struct AppState {
    connection: ConnectionContext,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::run(socket, addr, state.connection))
}

/// Starts the server on its own thread and returns once it is listening.
/// Must be called from outside any tokio runtime.
pub fn spawn(config: ServerConfig) -> Result<ServerHandle, ServerError> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;
    let handle = runtime.handle().clone();

    let (command_tx, command_rx) = mpsc::channel(config.command_queue.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ready_tx, ready_rx) = oneshot::channel();
    let events = EventBus::new(config.event_capacity);
    let handoff_timeout = config.handoff_timeout();

    let thread_events = events.clone();
    let thread = std::thread::Builder::new()
        .name("sentry-network".into())
        .spawn(move || {
            runtime.block_on(serve(config, command_rx, shutdown_rx, thread_events, ready_tx));
        })
        .map_err(ServerError::Thread)?;

    match ready_rx.blocking_recv() {
        Ok(Ok(local_addr)) => Ok(ServerHandle {
            sender: CommandSender::new(command_tx, handle, handoff_timeout),
            events,
            shutdown: shutdown_tx,
            local_addr,
            thread: Some(thread),
        }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(ServerError::Startup)
        }
    }
}

async fn serve(
    config: ServerConfig,
    commands: mpsc::Receiver<MotionCommand>,
    shutdown: watch::Receiver<bool>,
    events: EventBus,
    ready: oneshot::Sender<Result<SocketAddr, ServerError>>,
) {
    let bind_addr = config.bind_addr();
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let _ = ready.send(Err(ServerError::Bind {
                addr: bind_addr,
                source,
            }));
            return;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(source) => {
            let _ = ready.send(Err(ServerError::Bind {
                addr: bind_addr,
                source,
            }));
            return;
        }
    };

    let (control_tx, control_rx) = mpsc::unbounded_channel::<Control<OutboundSink>>();
    let state = AppState {
        connection: ConnectionContext {
            control: control_tx,
            keepalive: KeepAlive {
                interval: config.ping_interval(),
                timeout: config.pong_timeout(),
            },
            queue_capacity: config.client_queue,
            shutdown: shutdown.clone(),
        },
    };
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state);

    let actor = NetworkActor::<OutboundSink>::new(events.clone(), config.correlation_capacity);
    let actor_task = tokio::spawn(actor.run(commands, control_rx, shutdown.clone()));

    info!("Sentry server listening on ws://{}", local_addr);
    events.publish(ServerEvent::Listening { addr: local_addr });
    let _ = ready.send(Ok(local_addr));

    let mut stop = shutdown.clone();
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !*stop.borrow_and_update() {
            if stop.changed().await.is_err() {
                break;
            }
        }
    })
    .await;

    if let Err(err) = result {
        error!(error = %err, "server error");
    }
    if let Err(err) = actor_task.await {
        error!(error = %err, "network actor failed");
    }
    info!("Sentry server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeliveryError;
    use crate::registry::tests::{MemorySink, addr};
    use futures_util::{SinkExt, StreamExt};
    use sentry_vision::protocol::{CommandId, MotionIntent, PanDir, StatusReport};
    use std::io::{Read, Write};
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    type Client =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    fn actor() -> (NetworkActor<MemorySink>, broadcast::Receiver<ServerEvent>) {
        let events = EventBus::new(64);
        let rx = events.subscribe();
        (NetworkActor::new(events, 16), rx)
    }

    fn register(actor: &mut NetworkActor<MemorySink>, port: u16, sink: MemorySink) -> ClientId {
        let (reply, mut rx) = oneshot::channel();
        actor.handle_control(Control::Register {
            addr: addr(port),
            sink,
            reply,
        });
        rx.try_recv().expect("registered")
    }

    fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn move_left() -> MotionCommand {
        MotionCommand::directional(MotionIntent::pan_only(PanDir::Left), 2)
    }

    #[test]
    fn empty_registry_records_exactly_one_drop() {
        let (mut actor, mut rx) = actor();
        actor.deliver(move_left());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::CommandDropped { kind: "MOVE_DIR", .. }));
    }

    #[test]
    fn failing_client_is_evicted_and_the_other_still_receives() {
        let (mut actor, mut rx) = actor();
        let a = register(&mut actor, 5001, MemorySink::failing(DeliveryError::Closed));
        let healthy = MemorySink::default();
        let b = register(&mut actor, 5002, healthy.clone());
        drain(&mut rx);

        actor.deliver(move_left());
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::ClientDisconnected { client, reason: DisconnectReason::Evicted(_), .. } if *client == a
        )));
        assert!(events.iter().any(|e| matches!(e, ServerEvent::CommandSent { recipients: 1, .. })));
        assert_eq!(actor.client_count(), 1);

        actor.deliver(move_left());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::CommandSent { recipients: 1, .. }));
        assert_eq!(healthy.count(), 2);

        // The evicted connection's own unregister must not report it twice.
        actor.handle_control(Control::Unregister {
            client: a,
            reason: DisconnectReason::Closed,
        });
        assert!(drain(&mut rx).is_empty());
        assert!(actor.registry.get(b).is_some());
    }

    #[test]
    fn acks_and_status_reports_are_correlated() {
        let (mut actor, mut rx) = actor();
        let client = register(&mut actor, 5003, MemorySink::default());
        let command = move_left();
        let id = command.id().cloned().expect("id");
        actor.deliver(command);
        drain(&mut rx);

        actor.handle_control(Control::Inbound {
            client,
            inbound: Inbound::Message(ClientMessage::Ack { id: id.clone() }),
        });
        actor.handle_control(Control::Inbound {
            client,
            inbound: Inbound::Message(ClientMessage::Status(StatusReport {
                id: id.clone(),
                state: "DONE".to_string(),
                pan: 80,
                tilt: 90,
                error: None,
                cmd_id: None,
            })),
        });
        actor.handle_control(Control::Inbound {
            client,
            inbound: Inbound::Message(ClientMessage::Ack {
                id: CommandId::new("never-sent"),
            }),
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        match &events[0] {
            ServerEvent::Acknowledged { id: acked, command, .. } => {
                assert_eq!(acked, &id);
                assert_eq!(command.map(|c| c.kind), Some("MOVE_DIR"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(&events[1], ServerEvent::Status { command: Some(_), .. }));
        assert!(matches!(&events[2], ServerEvent::Acknowledged { command: None, .. }));
    }

    #[test]
    fn hello_is_recorded_without_broadcasting() {
        let (mut actor, mut rx) = actor();
        let sender = MemorySink::default();
        let other = MemorySink::default();
        let client = register(&mut actor, 5004, sender.clone());
        register(&mut actor, 5005, other.clone());
        drain(&mut rx);

        actor.handle_control(Control::Inbound {
            client,
            inbound: Inbound::Message(ClientMessage::Hello {
                node: Some("esp32_sentry".to_string()),
            }),
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::Hello { node: Some(n), .. } if n == "esp32_sentry"));
        assert_eq!(sender.count(), 0);
        assert_eq!(other.count(), 0);
        assert_eq!(
            actor.registry.get(client).and_then(|e| e.node.as_deref()),
            Some("esp32_sentry")
        );
    }

    #[test]
    fn raw_payloads_are_forwarded_as_events() {
        let (mut actor, mut rx) = actor();
        let client = register(&mut actor, 5006, MemorySink::default());
        drain(&mut rx);

        actor.handle_control(Control::Inbound {
            client,
            inbound: sentry_vision::protocol::decode_inbound("hello there"),
        });
        let events = drain(&mut rx);
        assert!(matches!(&events[0], ServerEvent::Raw { text, .. } if text == "hello there"));
    }

    #[test]
    fn handoff_times_out_on_a_full_queue_and_reports_closed_queues() {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let (tx, rx) = mpsc::channel(1);
        let sender = CommandSender::new(tx, runtime.handle().clone(), Duration::from_millis(20));

        assert_eq!(sender.submit(move_left()), Ok(()));
        assert_eq!(
            sender.submit(move_left()),
            Err(HandoffError::Timeout(Duration::from_millis(20)))
        );
        drop(rx);
        assert_eq!(sender.submit(move_left()), Err(HandoffError::Closed));
    }

    #[test]
    fn spawned_server_reports_drops_and_answers_health_checks() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = spawn(config).expect("server");
        let mut events = server.subscribe();

        server.submit(move_left()).expect("handoff");
        let event = server
            .runtime()
            .block_on(async { tokio::time::timeout(Duration::from_secs(2), events.recv()).await })
            .expect("event in time")
            .expect("event");
        assert!(matches!(event, ServerEvent::CommandDropped { .. }));

        let mut stream = std::net::TcpStream::connect(server.local_addr()).expect("connect");
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .expect("request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("response");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok"));

        server.shutdown().expect("clean shutdown");
    }

    #[test]
    fn bind_failure_is_reported_to_the_caller() {
        let first = spawn(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        })
        .expect("first server");

        let second = spawn(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: first.local_addr().port(),
            ..ServerConfig::default()
        });
        assert!(matches!(second, Err(ServerError::Bind { .. })));
        first.shutdown().expect("clean shutdown");
    }

    fn local_server(ping_interval_ms: u64, pong_timeout_ms: u64) -> ServerHandle {
        spawn(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ping_interval_ms,
            pong_timeout_ms,
            ..ServerConfig::default()
        })
        .expect("server")
    }

    fn client_runtime() -> tokio::runtime::Runtime {
        Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime")
    }

    async fn connect(server: SocketAddr) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{server}/ws"))
            .await
            .expect("connect");
        client
    }

    /// Waits for the first event `pick` accepts.
    async fn wait_for<T>(
        events: &mut broadcast::Receiver<ServerEvent>,
        mut pick: impl FnMut(&ServerEvent) -> Option<T>,
    ) -> T {
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(found) = pick(&event) {
                            return found;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await;
        found.expect("event in time")
    }

    fn connected(event: &ServerEvent) -> Option<ClientId> {
        match event {
            ServerEvent::ClientConnected { client, .. } => Some(*client),
            _ => None,
        }
    }

    /// Next text frame, skipping control frames. `None` if nothing arrives in time.
    async fn next_text(client: &mut Client, limit: Duration) -> Option<String> {
        let read = tokio::time::timeout(limit, async {
            while let Some(Ok(message)) = client.next().await {
                if let WsMessage::Text(text) = message {
                    return Some(text);
                }
            }
            None
        })
        .await;
        read.ok().flatten()
    }

    #[test]
    fn hello_is_answered_on_the_sender_socket_only() {
        let server = local_server(5000, 2000);
        let runtime = client_runtime();
        let mut events = server.subscribe();
        let addr = server.local_addr();

        runtime.block_on(async {
            let mut a = connect(addr).await;
            let a_id = wait_for(&mut events, connected).await;
            let mut b = connect(addr).await;
            wait_for(&mut events, connected).await;

            a.send(WsMessage::Text(r#"{"type":"HELLO","node":"esp32_sentry"}"#.to_string()))
                .await
                .expect("send hello");
            assert_eq!(
                next_text(&mut a, Duration::from_secs(2)).await.as_deref(),
                Some(r#"{"type":"HELLO_ACK"}"#)
            );
            let hello_from = wait_for(&mut events, |event| match event {
                ServerEvent::Hello { client, .. } => Some(*client),
                _ => None,
            })
            .await;
            assert_eq!(hello_from, a_id);

            assert_eq!(next_text(&mut a, Duration::from_millis(200)).await, None);
            assert_eq!(next_text(&mut b, Duration::from_millis(200)).await, None);
        });

        server.shutdown().expect("clean shutdown");
    }

    #[test]
    fn dropped_peer_does_not_stop_delivery_to_the_others() {
        let server = local_server(5000, 2000);
        let runtime = client_runtime();
        let mut events = server.subscribe();
        let addr = server.local_addr();

        let mut b = runtime.block_on(async {
            let a = connect(addr).await;
            let a_id = wait_for(&mut events, connected).await;
            let b = connect(addr).await;
            wait_for(&mut events, connected).await;

            drop(a);
            wait_for(&mut events, |event| match event {
                ServerEvent::ClientDisconnected { client, .. } if *client == a_id => Some(()),
                _ => None,
            })
            .await;
            b
        });

        server.submit(move_left()).expect("handoff");
        runtime.block_on(async {
            let text = next_text(&mut b, Duration::from_secs(2)).await.expect("command");
            assert!(text.contains("MOVE_DIR"));
            let recipients = wait_for(&mut events, |event| match event {
                ServerEvent::CommandSent { recipients, .. } => Some(*recipients),
                _ => None,
            })
            .await;
            assert_eq!(recipients, 1);
        });

        server.shutdown().expect("clean shutdown");
    }

    #[test]
    fn silent_peer_is_dropped_after_a_missed_pong() {
        let server = local_server(300, 150);
        let runtime = client_runtime();
        let mut events = server.subscribe();
        let addr = server.local_addr();

        runtime.block_on(async {
            // Never polled again, so the ping is never answered.
            let _silent = connect(addr).await;
            let id = wait_for(&mut events, connected).await;
            let reason = wait_for(&mut events, |event| match event {
                ServerEvent::ClientDisconnected { client, reason, .. } if *client == id => {
                    Some(reason.clone())
                }
                _ => None,
            })
            .await;
            assert!(matches!(reason, DisconnectReason::PongTimeout));
        });

        server.shutdown().expect("clean shutdown");
    }

    #[test]
    fn reading_client_keeps_up_with_a_command_burst() {
        const BURST: usize = 200;
        let server = local_server(5000, 2000);
        let runtime = client_runtime();
        let mut events = server.subscribe();
        let addr = server.local_addr();

        let client = runtime.block_on(async {
            let client = connect(addr).await;
            wait_for(&mut events, connected).await;
            client
        });
        let reader = runtime.spawn(async move {
            let mut client = client;
            let mut received = 0;
            while received < BURST && next_text(&mut client, Duration::from_secs(5)).await.is_some() {
                received += 1;
            }
            received
        });

        for _ in 0..BURST {
            server.submit(move_left()).expect("handoff");
        }
        assert_eq!(runtime.block_on(reader).expect("reader"), BURST);

        let evicted = std::iter::from_fn(|| loop {
            match events.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        })
        .any(|event| matches!(event, ServerEvent::ClientDisconnected { .. }));
        assert!(!evicted);

        server.shutdown().expect("clean shutdown");
    }
}
