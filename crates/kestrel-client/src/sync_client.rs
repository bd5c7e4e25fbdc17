use crate::{ClientConfig, ClientError, KestrelAsyncClient, ReadState, Result, ServerSet};
use kestrel_core::{Endpoint, StatsSnapshot};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

const INSIDE_RUNTIME: &str =
    "blocking client used inside an async runtime; use KestrelAsyncClient instead";

fn check_not_async() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(ClientError::RuntimeError(INSIDE_RUNTIME.to_string()));
    }
    Ok(())
}

/// Drive `fut` on the client's private runtime
fn block_on<T>(runtime: &Option<Runtime>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    check_not_async()?;
    match runtime {
        Some(runtime) => runtime.block_on(fut),
        None => Err(ClientError::RuntimeError("client runtime is gone".to_string())),
    }
}

/// Blocking client for Kestrel (drives [`KestrelAsyncClient`] to completion)
pub struct KestrelClient {
    inner: KestrelAsyncClient,
    /// Only `None` while dropping
    runtime: Option<Runtime>,
}

impl KestrelClient {
    /// Client for `endpoints`; connections are opened on first use
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        Self::wrap(KestrelAsyncClient::new(endpoints))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::wrap(KestrelAsyncClient::from_config(config)?)
    }

    pub fn with_servers(servers: ServerSet) -> Result<Self> {
        Self::wrap(KestrelAsyncClient::with_servers(servers))
    }

    /// Connect to `endpoints` right away
    pub fn connect(endpoints: Vec<Endpoint>) -> Result<Self> {
        let mut client = Self::new(endpoints)?;
        block_on(&client.runtime, client.inner.connect())?;
        Ok(client)
    }

    /// Fails inside an async runtime, where `block_on` would panic
    fn wrap(inner: KestrelAsyncClient) -> Result<Self> {
        check_not_async()?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(KestrelClient {
            inner,
            runtime: Some(runtime),
        })
    }

    pub fn servers(&self) -> &ServerSet {
        self.inner.servers()
    }

    pub fn read_state(&self, queue: &str) -> ReadState {
        self.inner.read_state(queue)
    }

    pub fn get(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        block_on(&self.runtime, self.inner.get(queue, timeout))
    }

    pub fn put<M: AsRef<[u8]>>(
        &mut self,
        queue: &str,
        message: M,
        expire: Option<Duration>,
    ) -> Result<bool> {
        block_on(&self.runtime, self.inner.put(queue, message, expire))
    }

    pub fn delete(&mut self, queue: &str) -> Result<bool> {
        block_on(&self.runtime, self.inner.delete(queue))
    }

    pub fn next(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        block_on(&self.runtime, self.inner.next(queue, timeout))
    }

    pub fn peek(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        block_on(&self.runtime, self.inner.peek(queue, timeout))
    }

    pub fn abort(&mut self, queue: &str) -> Result<bool> {
        block_on(&self.runtime, self.inner.abort(queue))
    }

    pub fn finish(&mut self, queue: &str) -> Result<bool> {
        block_on(&self.runtime, self.inner.finish(queue))
    }

    pub fn flush(&mut self, queue: &str) -> Result<bool> {
        block_on(&self.runtime, self.inner.flush(queue))
    }

    pub fn flush_all(&mut self) -> Result<bool> {
        block_on(&self.runtime, self.inner.flush_all())
    }

    pub fn reload(&mut self) -> Result<bool> {
        block_on(&self.runtime, self.inner.reload())
    }

    pub fn raw_stats(&mut self, dump: bool) -> Result<String> {
        block_on(&self.runtime, self.inner.raw_stats(dump))
    }

    pub fn stats(&mut self) -> Result<StatsSnapshot> {
        block_on(&self.runtime, self.inner.stats())
    }

    pub fn version(&mut self) -> Result<String> {
        block_on(&self.runtime, self.inner.version())
    }

    pub fn shutdown(&mut self) -> Result<()> {
        block_on(&self.runtime, self.inner.shutdown())
    }

    /// Close every connection; safe to call more than once
    pub fn close(&mut self) {
        // Sockets deregister from the reactor that owns them
        let _guard = self.runtime.as_ref().map(Runtime::enter);
        self.inner.close();
    }
}

impl Drop for KestrelClient {
    fn drop(&mut self) {
        self.close();
        // A blocking shutdown panics when dropped from async code
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
