//! Event sinks: where relay frames go.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use super::Frame;

/// Errors raised while writing to or closing a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("the receiving side of the sink has gone away")]
    Disconnected,

    #[error("sink is already closed")]
    AlreadyClosed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A destination for frames, closed exactly once by its owner.
///
/// Writes must be delivered in the order they are issued. Implementations
/// that can observe the consumer going away should override
/// [`closed`](Self::closed) so the relay stops pulling from upstream.
pub trait EventSink: Send {
    /// Writes one frame.
    fn write(&mut self, frame: Frame) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Closes the sink. A second call returns [`SinkError::AlreadyClosed`].
    fn close(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Resolves once the consumer can no longer receive frames.
    fn closed(&self) -> impl Future<Output = ()> + Send {
        std::future::pending()
    }
}

/// A sink that encodes frames and pushes them into a bounded channel.
///
/// The receiving half is handed to the HTTP connection as a streamed response
/// body; dropping it (because the client disconnected) makes every later
/// write fail with [`SinkError::Disconnected`] and resolves
/// [`closed`](EventSink::closed).
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a sink together with the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl EventSink for ChannelSink {
    async fn write(&mut self, frame: Frame) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::AlreadyClosed)?;
        let bytes = frame.encode()?;
        tx.send(bytes).await.map_err(|_| SinkError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        // dropping the only sender ends the response body
        self.tx.take().map(drop).ok_or(SinkError::AlreadyClosed)
    }

    async fn closed(&self) {
        if let Some(tx) = &self.tx {
            tx.closed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_arrive_encoded_and_in_order() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        sink.write(Frame::Text("a".into())).await.unwrap();
        sink.write(Frame::Done).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"data: {\"text\":\"a\"}\n\n"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"data: [DONE]\n\n"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_close_is_rejected() {
        let (mut sink, _rx) = ChannelSink::channel(1);
        sink.close().await.unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.close().await, Err(SinkError::AlreadyClosed)));
        assert!(matches!(
            sink.write(Frame::Done).await,
            Err(SinkError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn dropped_receiver_disconnects() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        sink.closed().await;
        assert!(matches!(
            sink.write(Frame::Text("x".into())).await,
            Err(SinkError::Disconnected)
        ));
    }
}
