//! Persistent duplex client for the agent gateway.
//!
//! [`GatewayClient`] keeps one logical WebSocket connection to a gateway:
//! it drives the protocol v3 connect handshake, correlates request frames to
//! their responses, fans streaming chat events out to subscribers, and
//! reconnects with exponential backoff when the connection drops unexpectedly.
//!
//! ```no_run
//! use tether_client::{GatewayClient, GatewayConfig, DEFAULT_SESSION};
//!
//! # async fn run() -> Result<(), tether_client::ClientError> {
//! let client = GatewayClient::new(GatewayConfig::default());
//! let _messages = client.on_message(|m| println!("{}: {}", m.id, m.content));
//! client.connect().await?;
//! client.send("hello", DEFAULT_SESSION);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod reconnect;
pub mod state;
pub mod subscribe;
pub mod transport;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{GatewayClient, DEFAULT_SESSION};
pub use config::GatewayConfig;
pub use error::ClientError;
pub use reconnect::ReconnectConfig;
pub use state::ConnectionState;
pub use subscribe::Subscription;

pub use tether_protocol as protocol;
