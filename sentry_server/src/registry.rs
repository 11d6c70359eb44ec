// THEORY:
// The `Registry` is the set of currently connected actuators. It is owned by
// the network actor and never shared, so it is a plain map with no locking.
//
// Delivery goes through the `ClientSink` trait rather than a socket. For live
// connections the sink is the bounded outbound queue of the connection task;
// tests substitute in-memory sinks. A sink that refuses a payload (queue full
// or task gone) is evicted on the spot, and the broadcast continues with the
// remaining clients: one bad client never blocks the others.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Identifies one connection for its whole lifetime. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
}

/// Where the registry pushes encoded payloads for one client.
pub trait ClientSink {
    fn deliver(&mut self, payload: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug)]
pub struct ClientEntry<S> {
    pub addr: SocketAddr,
    /// Node name announced in HELLO, if any.
    pub node: Option<String>,
    pub sink: S,
}

/// A client that was removed during a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub client: ClientId,
    pub addr: SocketAddr,
    pub error: DeliveryError,
}

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<ClientId>,
    pub evicted: Vec<Eviction>,
}

impl BroadcastReport {
    /// Nobody received the payload.
    pub fn is_dropped(&self) -> bool {
        self.delivered.is_empty()
    }
}

#[derive(Debug)]
pub struct Registry<S> {
    next_id: u64,
    clients: BTreeMap<ClientId, ClientEntry<S>>,
}

impl<S: ClientSink> Registry<S> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            clients: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, addr: SocketAddr, sink: S) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.insert(
            id,
            ClientEntry {
                addr,
                node: None,
                sink,
            },
        );
        id
    }

    pub fn unregister(&mut self, client: ClientId) -> Option<ClientEntry<S>> {
        self.clients.remove(&client)
    }

    pub fn get(&self, client: ClientId) -> Option<&ClientEntry<S>> {
        self.clients.get(&client)
    }

    pub fn set_node(&mut self, client: ClientId, node: Option<String>) {
        if let Some(entry) = self.clients.get_mut(&client) {
            entry.node = node;
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    /// Sends `payload` to every client registered when the call starts.
    /// Clients whose sink fails are removed before returning.
    pub fn broadcast(&mut self, payload: &str) -> BroadcastReport {
        let snapshot: Vec<ClientId> = self.clients.keys().copied().collect();
        let mut report = BroadcastReport::default();

        for client in snapshot {
            let Some(entry) = self.clients.get_mut(&client) else {
                continue;
            };
            match entry.sink.deliver(payload) {
                Ok(()) => report.delivered.push(client),
                Err(error) => {
                    let addr = entry.addr;
                    self.clients.remove(&client);
                    report.evicted.push(Eviction {
                        client,
                        addr,
                        error,
                    });
                }
            }
        }

        report
    }

    /// Drops every client, closing their sinks.
    pub fn clear(&mut self) -> usize {
        let count = self.clients.len();
        self.clients.clear();
        count
    }
}

impl<S: ClientSink> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
