use crate::tracker::Release;
use crate::transport::server_error;
use crate::{ClientError, ReadState, ReadTracker, Result, TcpTransport, Transport};
use bytes::Bytes;
use kestrel_core::Endpoint;
use kestrel_protocol::{abort_key, finish_key, next_key, Reply, Request};
use std::time::Duration;
use tracing::{debug, warn};

/// A lazily-established session with one Kestrel server.
///
/// Owns the reliable-read state for every queue routed to it. Any transport
/// failure drops the session: the server aborts its open reads when the
/// socket goes away, so the tracker is cleared with it.
pub struct ServerConnection {
    endpoint: Endpoint,
    connect_timeout: Duration,
    transport: Option<Box<dyn Transport>>,
    reads: ReadTracker,
}

impl ServerConnection {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        ServerConnection {
            endpoint,
            connect_timeout,
            transport: None,
            reads: ReadTracker::new(),
        }
    }

    /// Wrap an already established transport
    pub fn with_transport(endpoint: Endpoint, transport: Box<dyn Transport>) -> Self {
        ServerConnection {
            endpoint,
            connect_timeout: Duration::from_secs(3),
            transport: Some(transport),
            reads: ReadTracker::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn reads(&self) -> &ReadTracker {
        &self.reads
    }

    pub fn read_state(&self, queue: &str) -> ReadState {
        self.reads.state(queue)
    }

    /// Establish the session if it is not up yet
    pub async fn connect(&mut self) -> Result<()> {
        self.transport().await.map(|_| ())
    }

    async fn transport(&mut self) -> Result<&mut Box<dyn Transport>> {
        if self.transport.is_none() {
            let transport = TcpTransport::connect(&self.endpoint, self.connect_timeout).await?;
            debug!(endpoint = %self.endpoint, "connected");
            self.transport = Some(Box::new(transport));
        }
        self.transport
            .as_mut()
            .ok_or_else(|| ClientError::ConnectionError(self.endpoint.to_string()))
    }

    /// Drop the session on transport errors so the next call reconnects.
    fn settle<T>(&mut self, request: &Request, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() {
                warn!(endpoint = %self.endpoint, "'{}' failed: {}", request, e);
                self.disconnect();
            }
        }
        result
    }

    async fn exchange_value(&mut self, request: &Request) -> Result<Option<Bytes>> {
        let result = async {
            let transport = self.transport().await?;
            transport.send(request).await?;
            Ok::<_, ClientError>(transport.read_value().await?.map(|value| value.data))
        }
        .await;
        self.settle(request, result)
    }

    async fn exchange_reply(&mut self, request: &Request) -> Result<(Reply, String)> {
        let result = async {
            let transport = self.transport().await?;
            transport.send(request).await?;
            let line = transport.read_line().await?;
            Ok::<_, ClientError>((Reply::parse(&line), line))
        }
        .await;
        self.settle(request, result)
    }

    fn unexpected(request: &Request, line: String) -> ClientError {
        ClientError::UnexpectedReply {
            command: request.to_string(),
            reply: line,
        }
    }

    /// `get <key>`; `None` when the queue is empty
    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>> {
        let request = Request::Get {
            key: key.to_string(),
        };
        self.exchange_value(&request).await
    }

    /// `set`; `true` when the server answered `STORED`
    pub async fn set(&mut self, key: &str, data: Bytes, expire_secs: u64) -> Result<bool> {
        let request = Request::Set {
            key: key.to_string(),
            flags: 0,
            expire_secs,
            data,
        };
        match self.exchange_reply(&request).await? {
            (Reply::Stored, _) => Ok(true),
            (reply, line) if reply == Reply::NotStored || reply.is_error() => {
                warn!(endpoint = %self.endpoint, "{} refused: {}", request, line);
                Ok(false)
            }
            (_, line) => {
                let err = Self::unexpected(&request, line);
                self.settle(&request, Err(err))
            }
        }
    }

    /// `delete <key>`; `true` when the server answered `DELETED`
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        let request = Request::Delete {
            key: key.to_string(),
        };
        match self.exchange_reply(&request).await? {
            (Reply::Deleted, _) => Ok(true),
            (Reply::NotFound, _) | (Reply::End, _) => Ok(false),
            (reply, line) if reply.is_error() => {
                warn!(endpoint = %self.endpoint, "{} refused: {}", request, line);
                Ok(false)
            }
            (_, line) => {
                let err = Self::unexpected(&request, line);
                self.settle(&request, Err(err))
            }
        }
    }

    /// Reliable fetch: acknowledges the previous read and opens a new one
    pub async fn next(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<Bytes>> {
        let request = Request::Get {
            key: next_key(queue, timeout),
        };
        let item = self.exchange_value(&request).await?;
        self.reads.record_next(queue, item.is_some());
        Ok(item)
    }

    /// Acknowledge the open read on `queue`, if any
    pub async fn finish(&mut self, queue: &str) -> Result<()> {
        self.release(queue, Release::Finish).await
    }

    /// Hand the open read on `queue` back to the server, if any
    pub async fn abort(&mut self, queue: &str) -> Result<()> {
        self.release(queue, Release::Abort).await
    }

    async fn release(&mut self, queue: &str, how: Release) -> Result<()> {
        let key = match how {
            Release::Finish => finish_key(queue),
            Release::Abort => abort_key(queue),
        };
        let request = Request::Get { key };
        // The server answers END whether or not a read was open
        self.exchange_value(&request).await?;
        self.reads.record_release(queue, how);
        Ok(())
    }

    /// Administrative command answered by `OK`; `false` on an error reply
    pub async fn command_ok(&mut self, request: &Request) -> Result<bool> {
        match self.exchange_reply(request).await? {
            (Reply::Ok, _) => Ok(true),
            (reply, line) if reply.is_error() => {
                warn!(endpoint = %self.endpoint, "{} refused: {}", request, line);
                Ok(false)
            }
            (_, line) => {
                let err = Self::unexpected(request, line);
                self.settle(request, Err(err))
            }
        }
    }

    /// Administrative command answered by a single line
    pub async fn command_line(&mut self, request: &Request) -> Result<String> {
        match self.exchange_reply(request).await? {
            (reply, _) if reply.is_error() => Err(server_error(reply)),
            (_, line) => Ok(line),
        }
    }

    /// Administrative command answered by lines terminated with `END`
    pub async fn command_block(&mut self, request: &Request) -> Result<Vec<String>> {
        let result = async {
            let transport = self.transport().await?;
            transport.send(request).await?;
            transport.read_block_until_end().await
        }
        .await;
        self.settle(request, result)
    }

    /// Command the server never answers; the session is dropped afterwards.
    pub async fn send_only(&mut self, request: &Request) -> Result<()> {
        let result = async {
            let transport = self.transport().await?;
            transport.send(request).await
        }
        .await;
        let result = self.settle(request, result);
        self.disconnect();
        result
    }

    /// Close the session; returns the queues whose open reads the server
    /// will now abort.
    pub fn disconnect(&mut self) -> Vec<String> {
        let released = self.reads.clear();
        if self.transport.take().is_some() {
            if released.is_empty() {
                debug!(endpoint = %self.endpoint, "disconnected");
            } else {
                debug!(endpoint = %self.endpoint, ?released, "disconnected with open reads");
            }
        }
        released
    }
}
