//! Connection state — internal phase machine and the observable projection

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

/// Internal lifecycle phase of the one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No connection, none wanted
    Idle,
    /// Opening the transport
    Connecting,
    /// Transport open, waiting for a challenge or the handshake timer
    AwaitingHandshake,
    /// Handshake request sent, awaiting the gateway's verdict
    HandshakeSent,
    /// Handshake acknowledged; requests may flow
    Ready,
    /// Transport closed or failed
    Closed,
}

/// Atomic wrapper so `send()` can gate on the phase without locking.
#[derive(Debug)]
pub struct AtomicPhase(AtomicU32);

impl AtomicPhase {
    #[must_use]
    pub const fn new(phase: ConnectionPhase) -> Self {
        Self(AtomicU32::new(phase as u32))
    }

    #[must_use]
    pub fn load(&self) -> ConnectionPhase {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionPhase::Idle,
            1 => ConnectionPhase::Connecting,
            2 => ConnectionPhase::AwaitingHandshake,
            3 => ConnectionPhase::HandshakeSent,
            4 => ConnectionPhase::Ready,
            _ => ConnectionPhase::Closed,
        }
    }

    pub fn store(&self, phase: ConnectionPhase) {
        self.0.store(phase as u32, Ordering::SeqCst);
    }
}

/// What state subscribers see. Distinct from [`ConnectionPhase`]: UI layers
/// render this triple directly, no further translation happens in the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,
}

impl ConnectionState {
    #[must_use]
    pub fn idle() -> Self {
        Self {
            connected: false,
            connecting: false,
            error: None,
        }
    }

    #[must_use]
    pub fn connecting() -> Self {
        Self {
            connected: false,
            connecting: true,
            error: None,
        }
    }

    #[must_use]
    pub fn connected() -> Self {
        Self {
            connected: true,
            connecting: false,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            connecting: false,
            error: Some(error.into()),
        }
    }
}
