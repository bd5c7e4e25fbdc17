use crate::{ClientConfig, ClientError, ReadState, Result, ServerSet};
use bytes::Bytes;
use kestrel_core::{validate_payload, validate_queue_name, Endpoint, StatsSnapshot};
use kestrel_protocol::{fetch_key, parse_dump, parse_flat, peek_key, Request};
use std::time::Duration;
use tracing::{debug, warn};

/// Async client for one or more Kestrel servers.
///
/// Every call takes `&mut self`; a connection is never shared between two
/// in-flight requests.
pub struct KestrelAsyncClient {
    servers: ServerSet,
}

/// Whole seconds for the wire, rounded up so short expiries stay finite
fn expire_secs(expire: Option<Duration>) -> u64 {
    match expire {
        Some(e) if e.subsec_nanos() > 0 => e.as_secs().saturating_add(1),
        Some(e) => e.as_secs(),
        None => 0,
    }
}

fn decode(item: Option<Bytes>) -> Result<Option<String>> {
    item.map(|data| validate_payload(&data).map(str::to_string).map_err(ClientError::from))
        .transpose()
}

impl KestrelAsyncClient {
    /// Client for `endpoints` with the default connect timeout; nothing is
    /// dialled until the first command.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let timeout = ClientConfig::default().connect_timeout();
        KestrelAsyncClient {
            servers: ServerSet::new(endpoints, timeout),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(KestrelAsyncClient {
            servers: ServerSet::new(config.endpoints()?, config.connect_timeout()),
        })
    }

    pub fn with_servers(servers: ServerSet) -> Self {
        KestrelAsyncClient { servers }
    }

    pub fn servers(&self) -> &ServerSet {
        &self.servers
    }

    /// Dial every endpoint now. Fails only when none is reachable.
    pub async fn connect(&mut self) -> Result<usize> {
        let up = self.servers.connect_all().await;
        if up == 0 {
            let endpoints: Vec<String> = self.servers.endpoints().map(ToString::to_string).collect();
            return Err(ClientError::ConnectionError(format!(
                "no server reachable: {}",
                endpoints.join(", ")
            )));
        }
        debug!("Connected to {} of {} servers", up, self.servers.len());
        Ok(up)
    }

    /// Reliable-read state of `queue` on the connection that serves it
    pub fn read_state(&self, queue: &str) -> ReadState {
        self.servers.connection_for(queue).read_state(queue)
    }

    /// Fetch and remove one message; waits up to `timeout` on the server.
    pub async fn get(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        validate_queue_name(queue)?;
        let item = self.servers.route(queue).get(&fetch_key(queue, timeout)).await?;
        decode(item)
    }

    /// Enqueue a textual message; `true` when the server stored it.
    pub async fn put<M: AsRef<[u8]>>(
        &mut self,
        queue: &str,
        message: M,
        expire: Option<Duration>,
    ) -> Result<bool> {
        validate_queue_name(queue)?;
        let text = validate_payload(message.as_ref())?;
        self.servers
            .route(queue)
            .set(queue, Bytes::copy_from_slice(text.as_bytes()), expire_secs(expire))
            .await
    }

    /// Drop the queue on its server; `true` when it existed.
    pub async fn delete(&mut self, queue: &str) -> Result<bool> {
        validate_queue_name(queue)?;
        self.servers.route(queue).delete(queue).await
    }

    /// Reliable fetch: closes the previous read on `queue` and opens a new
    /// one when a message is returned.
    pub async fn next(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        validate_queue_name(queue)?;
        let conn = self.servers.route(queue);
        let item = conn.next(queue, timeout).await?;
        match decode(item) {
            Ok(item) => Ok(item),
            Err(e) => {
                // The caller never sees this message, so it must not be
                // acknowledged by the following next()
                warn!(queue, "Returning undecodable message: {}", e);
                conn.abort(queue).await?;
                Err(e)
            }
        }
    }

    /// Look at the head of the queue without removing it
    pub async fn peek(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        validate_queue_name(queue)?;
        let item = self.servers.route(queue).get(&peek_key(queue, timeout)).await?;
        decode(item)
    }

    /// Return the open read on `queue` to the server. Always `true` once
    /// the command went out; aborting with nothing open is a no-op.
    pub async fn abort(&mut self, queue: &str) -> Result<bool> {
        validate_queue_name(queue)?;
        self.servers.route(queue).abort(queue).await?;
        Ok(true)
    }

    /// Acknowledge the open read on `queue`
    pub async fn finish(&mut self, queue: &str) -> Result<bool> {
        validate_queue_name(queue)?;
        self.servers.route(queue).finish(queue).await?;
        Ok(true)
    }

    /// Empty `queue` on every server
    pub async fn flush(&mut self, queue: &str) -> Result<bool> {
        validate_queue_name(queue)?;
        let request = Request::Flush {
            queue: queue.to_string(),
        };
        Ok(all_ok(self.servers.broadcast_ok(&request).await))
    }

    /// Empty every queue on every server
    pub async fn flush_all(&mut self) -> Result<bool> {
        Ok(all_ok(self.servers.broadcast_ok(&Request::FlushAll).await))
    }

    /// Ask every server to reload its configuration
    pub async fn reload(&mut self) -> Result<bool> {
        Ok(all_ok(self.servers.broadcast_ok(&Request::Reload).await))
    }

    /// `STATS` (or `DUMP_STATS` with `dump`) text from every server that answered
    pub async fn raw_stats(&mut self, dump: bool) -> Result<String> {
        let request = if dump { Request::DumpStats } else { Request::Stats };
        let text = self
            .servers
            .broadcast_block(&request)
            .await
            .into_iter()
            .flat_map(|(_, lines)| lines)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }

    /// Parsed statistics, merged across servers in endpoint order
    pub async fn stats(&mut self) -> Result<StatsSnapshot> {
        let flat = self.servers.broadcast_block(&Request::Stats).await;
        let dump = self.servers.broadcast_block(&Request::DumpStats).await;

        let mut snapshot = StatsSnapshot::default();
        for (_, lines) in flat {
            snapshot.merge(StatsSnapshot {
                server: parse_flat(&lines.join("\n")),
                ..Default::default()
            });
        }
        for (_, lines) in dump {
            snapshot.merge(StatsSnapshot {
                queues: parse_dump(&lines.join("\n")),
                ..Default::default()
            });
        }
        Ok(snapshot)
    }

    /// Version reported by each server, one per line
    pub async fn version(&mut self) -> Result<String> {
        let versions: Vec<String> = self
            .servers
            .broadcast_line(&Request::Version)
            .await
            .into_iter()
            .map(|(_, line)| match line.strip_prefix("VERSION ") {
                Some(version) => version.to_string(),
                None => line,
            })
            .collect();
        Ok(versions.join("\n"))
    }

    /// Stop every server. No reply is expected and the sessions are closed.
    pub async fn shutdown(&mut self) -> Result<()> {
        let reached = self.servers.broadcast_send(&Request::Shutdown).await;
        debug!("Shutdown sent to {} of {} servers", reached, self.servers.len());
        Ok(())
    }

    /// Close every connection. Open reads are aborted by the servers.
    pub fn close(&mut self) {
        self.servers.close_all();
    }
}

fn all_ok(results: Vec<(Endpoint, bool)>) -> bool {
    results.into_iter().all(|(_, ok)| ok)
}
