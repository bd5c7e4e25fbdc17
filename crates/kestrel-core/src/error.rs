use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Invalid payload: message must be UTF-8 text (invalid byte at offset {0})")]
    InvalidPayload(usize),
}

pub type Result<T> = std::result::Result<T, CoreError>;
