use crate::{ClientError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kestrel_core::Endpoint;
use kestrel_protocol::{Frame, KestrelCodec, Reply, Request, Value};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Request/response primitive a Kestrel connection is built on.
///
/// Implementors only need to move frames; the reply helpers are shared.
#[async_trait]
pub trait Transport: Send {
    /// Write one request to the server
    async fn send(&mut self, request: &Request) -> Result<()>;

    /// Read the next response frame
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Read a single reply line
    async fn read_line(&mut self) -> Result<String> {
        match self.read_frame().await? {
            Frame::Line(line) => Ok(line),
            Frame::Value(value) => Err(ClientError::UnexpectedReply {
                command: "line".to_string(),
                reply: format!("VALUE {}", value.key),
            }),
        }
    }

    /// Read the answer to a `get`: one optional `VALUE` block then `END`
    async fn read_value(&mut self) -> Result<Option<Value>> {
        match self.read_frame().await? {
            Frame::Value(value) => {
                let terminator = self.read_line().await?;
                if terminator != "END" {
                    return Err(ClientError::UnexpectedReply {
                        command: "get".to_string(),
                        reply: terminator,
                    });
                }
                Ok(Some(value))
            }
            Frame::Line(line) => match Reply::parse(&line) {
                Reply::End => Ok(None),
                reply if reply.is_error() => Err(server_error(reply)),
                _ => Err(ClientError::UnexpectedReply {
                    command: "get".to_string(),
                    reply: line,
                }),
            },
        }
    }

    /// Read lines up to (not including) the `END` terminator
    async fn read_block_until_end(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            match Reply::parse(&line) {
                Reply::End => return Ok(lines),
                reply if reply.is_error() => return Err(server_error(reply)),
                _ => lines.push(line),
            }
        }
    }
}

pub(crate) fn server_error(reply: Reply) -> ClientError {
    match reply {
        Reply::ClientError(msg) => ClientError::ServerError(format!("CLIENT_ERROR {}", msg)),
        Reply::ServerError(msg) => ClientError::ServerError(format!("SERVER_ERROR {}", msg)),
        other => ClientError::ServerError(format!("{:?}", other)),
    }
}

/// Transport over any byte stream, framed with [`KestrelCodec`]
pub struct FramedTransport<S> {
    framed: Framed<S, KestrelCodec>,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        FramedTransport {
            framed: Framed::new(stream, KestrelCodec),
        }
    }
}

pub type TcpTransport = FramedTransport<TcpStream>;

impl TcpTransport {
    /// Open a TCP connection, giving up after `timeout`
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let address = endpoint.address();
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                ClientError::ConnectionError(format!("connect to {} timed out", address))
            })?
            .map_err(|e| ClientError::ConnectionError(format!("{}: {}", address, e)))?;

        stream.set_nodelay(true)?;

        Ok(FramedTransport::new(stream))
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, request: &Request) -> Result<()> {
        self.framed.send(request).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::ConnectionError(
                "Connection closed by server".to_string(),
            )),
        }
    }
}
