//! The LNS transport seam.
//!
//! The actual muxs link (TLS WebSocket, discovery handshake, reconnect
//! backoff) is an external collaborator. The station core only needs a
//! bidirectional message stream with connect/disconnect events, captured
//! by the [`Transport`] trait. [`MockTransport`] is the in-tree
//! channel-backed implementation used by tests and the `--sim` mode.

use crate::error::StationError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events surfaced by the transport to the station reactor.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Text(String),
    Binary(Vec<u8>),
    Disconnected,
}

/// A frame the station pushed toward the LNS.
#[derive(Debug, Clone, PartialEq)]
pub enum OutFrame {
    Text(String),
    Binary(Vec<u8>),
}

#[async_trait]
pub trait Transport: Send {
    /// The next transport event; `None` once the transport is gone for
    /// good (shutdown).
    async fn next_event(&mut self) -> Option<TransportEvent>;

    async fn send_text(&mut self, text: String) -> Result<(), StationError>;

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), StationError>;

    /// Asks the transport to drop the current connection (session
    /// termination); the reconnect policy lives outside the core.
    async fn close(&mut self);
}

/// Channel-backed transport for tests.
pub struct MockTransport {
    events: mpsc::Receiver<TransportEvent>,
    out: mpsc::Sender<OutFrame>,
}

/// The test side of a [`MockTransport`] pair.
pub struct MockTransportHandle {
    pub events: mpsc::Sender<TransportEvent>,
    pub out: mpsc::Receiver<OutFrame>,
}

/// Builds a connected transport/handle pair.
pub fn mock_pair() -> (MockTransport, MockTransportHandle) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (out_tx, out_rx) = mpsc::channel(64);
    (
        MockTransport {
            events: event_rx,
            out: out_tx,
        },
        MockTransportHandle {
            events: event_tx,
            out: out_rx,
        },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn send_text(&mut self, text: String) -> Result<(), StationError> {
        self.out
            .send(OutFrame::Text(text))
            .await
            .map_err(|_| StationError::TransportClosed)
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), StationError> {
        self.out
            .send(OutFrame::Binary(data))
            .await
            .map_err(|_| StationError::TransportClosed)
    }

    async fn close(&mut self) {
        // The peer decides when (and whether) to reconnect; nothing to do
        // beyond draining the link.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_pair_carries_frames_both_ways() {
        let (mut transport, mut handle) = mock_pair();
        handle
            .events
            .send(TransportEvent::Text("hello".into()))
            .await
            .unwrap();
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Text("hello".into()))
        );
        transport.send_text("world".into()).await.unwrap();
        assert_eq!(handle.out.recv().await, Some(OutFrame::Text("world".into())));
    }
}
