use crate::{Result, ServerConnection};
use futures::future::join_all;
use kestrel_core::Endpoint;
use kestrel_protocol::Request;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bucket for a queue: the memcache client hash over the queue name.
///
/// Routing uses the bare queue name rather than the full command key, so
/// `jobs`, `jobs/close/open` and `jobs/abort` always meet on one server.
pub(crate) fn bucket(queue: &str, buckets: usize) -> usize {
    let hash = (crc32fast::hash(queue.as_bytes()) >> 16) & 0x7fff;
    let hash = if hash == 0 { 1 } else { hash };
    hash as usize % buckets
}

/// Every configured Kestrel server, one connection each.
///
/// Queue operations are routed to a single server; administrative commands
/// are broadcast because each server owns an independent set of queues.
pub struct ServerSet {
    connections: Vec<ServerConnection>,
}

impl ServerSet {
    /// An empty endpoint list falls back to the default local server.
    pub fn new(endpoints: Vec<Endpoint>, connect_timeout: Duration) -> Self {
        let endpoints = if endpoints.is_empty() {
            vec![Endpoint::default()]
        } else {
            endpoints
        };

        ServerSet {
            connections: endpoints
                .into_iter()
                .map(|endpoint| ServerConnection::new(endpoint, connect_timeout))
                .collect(),
        }
    }

    pub fn from_connections(connections: Vec<ServerConnection>) -> Self {
        ServerSet { connections }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.connections.iter().map(ServerConnection::endpoint)
    }

    pub fn connections(&self) -> &[ServerConnection] {
        &self.connections
    }

    /// Connection that serves `queue`
    pub fn route(&mut self, queue: &str) -> &mut ServerConnection {
        let index = bucket(queue, self.connections.len());
        &mut self.connections[index]
    }

    pub fn connection_for(&self, queue: &str) -> &ServerConnection {
        &self.connections[bucket(queue, self.connections.len())]
    }

    /// Connect every endpoint; returns how many are up.
    pub async fn connect_all(&mut self) -> usize {
        self.broadcast("connect", |conn| conn.connect())
            .await
            .len()
    }

    async fn broadcast<'a, T, F, Fut>(&'a mut self, what: &str, op: F) -> Vec<(Endpoint, T)>
    where
        F: Fn(&'a mut ServerConnection) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let pending = self.connections.iter_mut().map(|conn| {
            let endpoint = conn.endpoint().clone();
            let fut = op(conn);
            async move { (endpoint, fut.await) }
        });

        join_all(pending)
            .await
            .into_iter()
            .filter_map(|(endpoint, result)| match result {
                Ok(value) => Some((endpoint, value)),
                Err(e) => {
                    warn!(%endpoint, "Skipping endpoint for '{}': {}", what, e);
                    None
                }
            })
            .collect()
    }

    /// Send an `OK`-answered command everywhere; one entry per responding server.
    pub async fn broadcast_ok(&mut self, request: &Request) -> Vec<(Endpoint, bool)> {
        let what = request.to_string();
        self.broadcast(&what, |conn| conn.command_ok(request)).await
    }

    pub async fn broadcast_line(&mut self, request: &Request) -> Vec<(Endpoint, String)> {
        let what = request.to_string();
        self.broadcast(&what, |conn| conn.command_line(request)).await
    }

    pub async fn broadcast_block(&mut self, request: &Request) -> Vec<(Endpoint, Vec<String>)> {
        let what = request.to_string();
        self.broadcast(&what, |conn| conn.command_block(request)).await
    }

    /// Fire a command that gets no reply; returns how many servers it reached.
    pub async fn broadcast_send(&mut self, request: &Request) -> usize {
        let what = request.to_string();
        self.broadcast(&what, |conn| conn.send_only(request))
            .await
            .len()
    }

    /// Drop every session. Safe to call repeatedly.
    pub fn close_all(&mut self) {
        for conn in &mut self.connections {
            conn.disconnect();
        }
    }
}
