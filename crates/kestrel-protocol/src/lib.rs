mod codec;
mod command;
mod reply;
mod request;
mod stats;

pub use codec::{Frame, KestrelCodec, Value};
pub use command::{abort_key, fetch_key, finish_key, next_key, peek_key, queue_of};
pub use reply::Reply;
pub use request::Request;
pub use stats::{parse_dump, parse_flat, parse_snapshot, parse_stat_line};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),

    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Longest response line accepted before the peer is considered broken
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Largest value block accepted in a `VALUE` response: 64MB
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;
