//! Client error taxonomy

use thiserror::Error;

/// Everything that can go wrong between the client and the gateway.
///
/// Connection-level failures surface both through [`connect()`] and the state
/// subscriber stream; per-request failures only reach the awaiting caller.
///
/// [`connect()`]: crate::client::GatewayClient::connect
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// A `connect()` attempt is already in flight
    #[error("already connecting")]
    AlreadyConnecting,

    /// The transport did not open within the connect timeout
    #[error("connection timeout")]
    ConnectionTimeout,

    /// Transport-level failure (dial error, socket error, serialization)
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway rejected the connect handshake
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The gateway answered a request with an error
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Reconnection gave up after the attempt cap
    #[error("max reconnection attempts reached")]
    MaxReconnectAttempts,

    /// The transport closed; rejects every request still pending
    #[error("gateway closed ({code}): {reason}")]
    Closed { code: u16, reason: String },

    /// No open transport to send on
    #[error("gateway not connected")]
    NotConnected,
}
