//! Transport seam — the duplex stream the client runs over
//!
//! The client only ever sees text frames and closure notifications; the
//! WebSocket details live behind these traits so tests can drive the state
//! machine without a network.

use async_trait::async_trait;

use crate::error::ClientError;

/// One inbound item from the transport.
#[derive(Debug, Clone)]
pub enum TransportFrame {
    /// A text frame (the protocol is JSON text only)
    Text(String),
    /// The peer closed the stream
    Closed { code: u16, reason: String },
    /// The stream failed
    Error(String),
}

/// Write half of an open transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, text: String) -> Result<(), ClientError>;

    /// Initiate closure with a close code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ClientError>;
}

/// Read half of an open transport. `None` means the stream is exhausted.
#[async_trait]
pub trait FrameStream: Send {
    async fn next(&mut self) -> Option<TransportFrame>;
}

/// Opens transports. The returned halves are already open; implementations
/// must not resolve before the stream is ready to carry frames.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError>;
}
