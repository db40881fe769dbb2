use async_trait::async_trait;
use tokio::sync::mpsc;

/// Failure to deliver one message to one connection
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("send timed out")]
    Timeout,
}

/// Outbound side of a live streaming connection
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), SendError>;
}

/// Connection backed by a queue drained by a socket writer task
///
/// Sending fails once the writer has gone away, which is how a dead socket
/// surfaces to the registry.
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    /// Returns the connection and the receiving end for the writer task
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send_text(&self, text: String) -> Result<(), SendError> {
        self.tx.send(text).await.map_err(|_| SendError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_connection_delivers_in_order() {
        let (conn, mut rx) = ChannelConnection::new(8);

        conn.send_text("one".to_string()).await.unwrap();
        conn.send_text("two".to_string()).await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_send_fails_after_writer_drops() {
        let (conn, rx) = ChannelConnection::new(8);
        drop(rx);

        assert_eq!(
            conn.send_text("lost".to_string()).await,
            Err(SendError::Closed)
        );
    }
}
