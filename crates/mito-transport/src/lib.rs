//! Host transport seam.
//!
//! The broker never knows how bytes reach the backend: a notebook widget comm,
//! an iframe `postMessage`, or a Streamlit component value all look like a
//! synchronous, fire-and-forget [`HostTransport::send`] of one encoded frame.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    Closed,
    #[error("host transport error: {0}")]
    Host(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

pub trait HostTransport: Send + Sync {
    /// Hands one JSON-encoded request frame to the host. Delivery guarantees,
    /// if any, belong to the host.
    fn send(&self, frame: Bytes) -> TransportResult<()>;
}

impl<F> HostTransport for F
where
    F: Fn(Bytes) -> TransportResult<()> + Send + Sync,
{
    fn send(&self, frame: Bytes) -> TransportResult<()> {
        (self)(frame)
    }
}

/// Forwards frames into an unbounded channel drained by a host writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostTransport for ChannelTransport {
    fn send(&self, frame: Bytes) -> TransportResult<()> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// In-memory transport for tests and dev hosts: keeps every frame it was
/// given and fans them out to subscribers (a fake backend, usually).
#[derive(Debug)]
pub struct LocalTransport {
    sent: parking_lot::Mutex<Vec<Bytes>>,
    fanout: broadcast::Sender<Bytes>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            fanout: broadcast::channel(256).0,
        }
    }
}

impl LocalTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.fanout.subscribe()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl HostTransport for LocalTransport {
    fn send(&self, frame: Bytes) -> TransportResult<()> {
        trace!(target: "mito::transport", bytes = frame.len(), "local frame sent");
        self.sent.lock().push(frame.clone());
        // No subscriber simply means nobody is listening yet.
        let _ = self.fanout.send(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_transport_records_and_fans_out() {
        let transport = LocalTransport::new();
        let mut rx = transport.subscribe();
        transport
            .send(Bytes::from_static(b"{\"id\":\"_a\"}"))
            .expect("send ok");
        let frame = rx.recv().await.expect("receive ok");
        assert_eq!(frame, Bytes::from_static(b"{\"id\":\"_a\"}"));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn channel_transport_reports_closed_reader() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let err = transport
            .send(Bytes::from_static(b"{}"))
            .expect_err("reader dropped");
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn closures_are_transports() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let transport = {
            let seen = seen.clone();
            move |frame: Bytes| -> TransportResult<()> {
                seen.lock().push(frame);
                Ok(())
            }
        };
        transport.send(Bytes::from_static(b"x")).expect("send ok");
        assert_eq!(seen.lock().len(), 1);
    }
}
