//! Client helpers for the status and command channels.
//!
//! Used by the control CLI and by integration tests to talk to a running
//! daemon over TCP.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mklauncher_types::Container;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::protocol::{Subscription, decode_container, encode_container};
use crate::transport::{CodecError, MultipartCodec};

/// Strip the `tcp://` scheme from an announced endpoint address.
#[must_use]
pub fn endpoint_address(dsn: &str) -> &str {
    dsn.strip_prefix("tcp://").unwrap_or(dsn)
}

/// Errors that can occur with the channel clients
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
}

/// Subscriber on the status channel
pub struct StatusClient {
    framed: Framed<TcpStream, MultipartCodec>,
}

impl StatusClient {
    /// Connect to a status endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, MultipartCodec::new()),
        })
    }

    /// Subscribe to a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription frame cannot be sent.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), ClientError> {
        let frame = Subscription::Subscribe(topic.to_string()).to_frame();
        self.framed.send(vec![frame]).await?;
        Ok(())
    }

    /// Unsubscribe from a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription frame cannot be sent.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), ClientError> {
        let frame = Subscription::Unsubscribe(topic.to_string()).to_frame();
        self.framed.send(vec![frame]).await?;
        Ok(())
    }

    /// Wait for the next broadcast and return its topic and envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection closes or the broadcast is malformed.
    pub async fn recv(&mut self) -> Result<(String, Container), ClientError> {
        let frames = self
            .framed
            .next()
            .await
            .ok_or(ClientError::ConnectionClosed)??;

        let [topic, envelope] = frames.as_slice() else {
            return Err(ClientError::UnexpectedMessage(format!(
                "expected 2 frames, got {}",
                frames.len()
            )));
        };

        let topic = String::from_utf8_lossy(topic).into_owned();
        let container = decode_container(envelope)?;
        Ok((topic, container))
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if nothing arrives in time.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<(String, Container), ClientError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| ClientError::Timeout)?
    }
}

/// Dealer-side client on the command channel
pub struct CommandClient {
    framed: Framed<TcpStream, MultipartCodec>,
}

impl CommandClient {
    /// Connect to a command endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, MultipartCodec::new()),
        })
    }

    /// Send a command envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn send(&mut self, container: &Container) -> Result<(), ClientError> {
        let frame = encode_container(container)?;
        self.framed.send(vec![frame]).await?;
        Ok(())
    }

    /// Send raw frames, bypassing envelope serialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_frames(&mut self, frames: Vec<bytes::Bytes>) -> Result<(), ClientError> {
        self.framed.send(frames).await?;
        Ok(())
    }

    /// Wait up to `timeout` for a reply.
    ///
    /// Successful launcher commands are not acknowledged, so `Ok(None)` after
    /// the timeout means no error was reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection closes or the reply is malformed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Container>, ClientError> {
        let Ok(next) = tokio::time::timeout(timeout, self.framed.next()).await else {
            return Ok(None);
        };

        let mut frames = next.ok_or(ClientError::ConnectionClosed)??;
        let envelope = frames
            .pop()
            .ok_or_else(|| ClientError::UnexpectedMessage("empty reply".to_string()))?;
        Ok(Some(decode_container(&envelope)?))
    }

    /// Send a command and wait up to `timeout` for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the reply is malformed.
    pub async fn request(
        &mut self,
        container: &Container,
        timeout: Duration,
    ) -> Result<Option<Container>, ClientError> {
        self.send(container).await?;
        self.recv_timeout(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_address_strips_scheme() {
        assert_eq!(endpoint_address("tcp://127.0.0.1:5555"), "127.0.0.1:5555");
        assert_eq!(endpoint_address("localhost:1"), "localhost:1");
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(ClientError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(ClientError::Timeout.to_string(), "Request timeout");
        let err = ClientError::UnexpectedMessage("expected 2 frames, got 1".to_string());
        assert!(err.to_string().contains("2 frames"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = CommandClient::connect(addr).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
