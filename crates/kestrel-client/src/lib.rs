mod async_client;
mod config;
mod connection;
mod scope;
mod server_set;
mod sync_client;
mod tracker;
mod transport;

pub use async_client::KestrelAsyncClient;
pub use config::ClientConfig;
pub use connection::ServerConnection;
pub use scope::{AsyncQueueService, ClientFactory, QueueService, ScopedAsyncClient, ScopedClient};
pub use server_set::ServerSet;
pub use sync_client::KestrelClient;
pub use tracker::{ReadState, ReadTracker};
pub use transport::{FramedTransport, TcpTransport, Transport};

pub use kestrel_core::{Endpoint, StatValue, StatsSnapshot};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] kestrel_protocol::ProtocolError),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid queue name: {0}")]
    InvalidQueueName(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<kestrel_core::CoreError> for ClientError {
    fn from(err: kestrel_core::CoreError) -> Self {
        use kestrel_core::CoreError;

        match err {
            CoreError::InvalidPayload(_) => ClientError::InvalidPayload(err.to_string()),
            CoreError::InvalidQueueName { .. } => ClientError::InvalidQueueName(err.to_string()),
            CoreError::InvalidEndpoint(..) => ClientError::ConfigError(err.to_string()),
        }
    }
}

impl ClientError {
    /// Errors after which the connection's stream position is unknown
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionError(_)
                | ClientError::ProtocolError(_)
                | ClientError::UnexpectedReply { .. }
                | ClientError::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
