//! Scoped client acquisition for request handlers.
//!
//! A handler asks the [`ClientFactory`] for a [`ScopedClient`] at the start
//! of a unit of work. The client's connections are closed when the scope
//! ends, on every exit path, so reads left open by a failed handler go back
//! to the servers.
//!
//! Async handlers use [`ClientFactory::acquire_async`] and the
//! [`AsyncQueueService`] seam instead; the blocking client refuses to run
//! inside an async runtime.

use crate::{ClientConfig, KestrelAsyncClient, KestrelClient, Result};
use async_trait::async_trait;
use kestrel_core::StatsSnapshot;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Queue operations a request-handling layer depends on
pub trait QueueService {
    fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool>;

    fn dequeue(&mut self, queue: &str) -> Result<Option<String>>;

    fn flush(&mut self, queue: &str) -> Result<bool>;

    fn flush_all(&mut self) -> Result<bool>;

    fn stats(&mut self) -> Result<StatsSnapshot>;
}

impl QueueService for KestrelClient {
    fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool> {
        self.put(queue, text, None)
    }

    fn dequeue(&mut self, queue: &str) -> Result<Option<String>> {
        self.get(queue, None)
    }

    fn flush(&mut self, queue: &str) -> Result<bool> {
        KestrelClient::flush(self, queue)
    }

    fn flush_all(&mut self) -> Result<bool> {
        KestrelClient::flush_all(self)
    }

    fn stats(&mut self) -> Result<StatsSnapshot> {
        KestrelClient::stats(self)
    }
}

/// Async counterpart of [`QueueService`]
#[async_trait]
pub trait AsyncQueueService: Send {
    async fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool>;

    async fn dequeue(&mut self, queue: &str) -> Result<Option<String>>;

    async fn flush(&mut self, queue: &str) -> Result<bool>;

    async fn flush_all(&mut self) -> Result<bool>;

    async fn stats(&mut self) -> Result<StatsSnapshot>;
}

#[async_trait]
impl AsyncQueueService for KestrelAsyncClient {
    async fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool> {
        self.put(queue, text, None).await
    }

    async fn dequeue(&mut self, queue: &str) -> Result<Option<String>> {
        self.get(queue, None).await
    }

    async fn flush(&mut self, queue: &str) -> Result<bool> {
        KestrelAsyncClient::flush(self, queue).await
    }

    async fn flush_all(&mut self) -> Result<bool> {
        KestrelAsyncClient::flush_all(self).await
    }

    async fn stats(&mut self) -> Result<StatsSnapshot> {
        KestrelAsyncClient::stats(self).await
    }
}

/// Builds one client per unit of work from a shared configuration
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    config: ClientConfig,
}

impl ClientFactory {
    pub fn new(config: ClientConfig) -> Self {
        ClientFactory { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A fresh client bound to the caller's scope
    pub fn acquire(&self) -> Result<ScopedClient> {
        Ok(ScopedClient {
            client: KestrelClient::from_config(&self.config)?,
        })
    }

    /// A fresh async client bound to the caller's scope
    pub fn acquire_async(&self) -> Result<ScopedAsyncClient> {
        Ok(ScopedAsyncClient {
            client: KestrelAsyncClient::from_config(&self.config)?,
        })
    }

    /// Run `f` with a scoped client; connections close when it returns.
    pub fn scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ScopedClient) -> Result<T>,
    {
        let mut client = self.acquire()?;
        f(&mut client)
    }
}

/// Client that closes its connections when dropped
pub struct ScopedClient {
    client: KestrelClient,
}

impl ScopedClient {
    /// End the scope early
    pub fn release(self) {}
}

impl Deref for ScopedClient {
    type Target = KestrelClient;

    fn deref(&self) -> &KestrelClient {
        &self.client
    }
}

impl DerefMut for ScopedClient {
    fn deref_mut(&mut self) -> &mut KestrelClient {
        &mut self.client
    }
}

impl QueueService for ScopedClient {
    fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool> {
        self.client.enqueue(queue, text)
    }

    fn dequeue(&mut self, queue: &str) -> Result<Option<String>> {
        self.client.dequeue(queue)
    }

    fn flush(&mut self, queue: &str) -> Result<bool> {
        QueueService::flush(&mut self.client, queue)
    }

    fn flush_all(&mut self) -> Result<bool> {
        QueueService::flush_all(&mut self.client)
    }

    fn stats(&mut self) -> Result<StatsSnapshot> {
        QueueService::stats(&mut self.client)
    }
}

impl Drop for ScopedClient {
    fn drop(&mut self) {
        debug!("Closing scoped client");
        self.client.close();
    }
}

/// Async client that closes its connections when dropped
pub struct ScopedAsyncClient {
    client: KestrelAsyncClient,
}

impl ScopedAsyncClient {
    pub fn release(self) {}
}

impl Deref for ScopedAsyncClient {
    type Target = KestrelAsyncClient;

    fn deref(&self) -> &KestrelAsyncClient {
        &self.client
    }
}

impl DerefMut for ScopedAsyncClient {
    fn deref_mut(&mut self) -> &mut KestrelAsyncClient {
        &mut self.client
    }
}

#[async_trait]
impl AsyncQueueService for ScopedAsyncClient {
    async fn enqueue(&mut self, queue: &str, text: &str) -> Result<bool> {
        self.client.enqueue(queue, text).await
    }

    async fn dequeue(&mut self, queue: &str) -> Result<Option<String>> {
        self.client.dequeue(queue).await
    }

    async fn flush(&mut self, queue: &str) -> Result<bool> {
        AsyncQueueService::flush(&mut self.client, queue).await
    }

    async fn flush_all(&mut self) -> Result<bool> {
        AsyncQueueService::flush_all(&mut self.client).await
    }

    async fn stats(&mut self) -> Result<StatsSnapshot> {
        AsyncQueueService::stats(&mut self.client).await
    }
}

impl Drop for ScopedAsyncClient {
    fn drop(&mut self) {
        debug!("Closing scoped async client");
        self.client.close();
    }
}
