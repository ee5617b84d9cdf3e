//! Client configuration and gateway endpoint resolution

use std::time::Duration;

use tracing::warn;

use crate::reconnect::ReconnectConfig;

const DEFAULT_LOCAL_URL: &str = "ws://127.0.0.1:18789";

/// Configuration for one [`GatewayClient`](crate::client::GatewayClient).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Endpoint used for loopback callers (and as the fallback).
    pub local_url: String,
    /// Endpoint used for non-local callers, when configured.
    pub remote_url: Option<String>,
    /// Bearer token attached to every handshake, passed through verbatim.
    pub auth_token: Option<String>,
    /// How long the transport gets to open before `connect()` gives up.
    pub connect_timeout: Duration,
    /// Settling time before the handshake is sent unchallenged.
    pub handshake_delay: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            local_url: DEFAULT_LOCAL_URL.to_string(),
            remote_url: None,
            auth_token: None,
            connect_timeout: Duration::from_secs(15),
            handshake_delay: Duration::from_millis(750),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Config pointing at an explicit endpoint.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// The endpoint this client dials: the remote url when configured,
    /// otherwise the local one.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.remote_url.as_deref().unwrap_or(&self.local_url)
    }

    /// Resolve the endpoint for a caller running on `host`: loopback hosts get
    /// the local gateway, everything else the remote one (when configured).
    #[must_use]
    pub fn url_for_host(&self, host: &str) -> &str {
        if is_loopback_host(host) {
            &self.local_url
        } else {
            self.endpoint()
        }
    }

    /// Warn when a token would travel over a plaintext remote connection.
    pub fn warn_if_insecure(&self) {
        if self.auth_token.is_none() {
            return;
        }
        let Some(remote) = self.remote_url.as_deref() else {
            return;
        };
        let is_plaintext_remote = url::Url::parse(remote).is_ok_and(|u| {
            u.scheme() == "ws" && !u.host_str().is_some_and(is_loopback_host)
        });
        if is_plaintext_remote {
            warn!(
                "auth token configured for plaintext gateway {remote}; consider wss://"
            );
        }
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_is_local() {
        let config = GatewayConfig::default();
        assert_eq!(config.endpoint(), DEFAULT_LOCAL_URL);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.handshake_delay, Duration::from_millis(750));
    }

    #[test]
    fn test_with_url_prefers_remote() {
        let config = GatewayConfig::with_url("wss://gw.example.ts.net/ws");
        assert_eq!(config.endpoint(), "wss://gw.example.ts.net/ws");
    }

    #[test]
    fn test_url_for_host_loopback() {
        let config = GatewayConfig::with_url("wss://gw.example.ts.net/ws");
        assert_eq!(config.url_for_host("localhost"), DEFAULT_LOCAL_URL);
        assert_eq!(config.url_for_host("127.0.0.1"), DEFAULT_LOCAL_URL);
        assert_eq!(config.url_for_host("0.0.0.0"), DEFAULT_LOCAL_URL);
        assert_eq!(
            config.url_for_host("dashboard.example.com"),
            "wss://gw.example.ts.net/ws"
        );
    }

    #[test]
    fn test_url_for_host_without_remote_falls_back() {
        let config = GatewayConfig::default();
        assert_eq!(config.url_for_host("dashboard.example.com"), DEFAULT_LOCAL_URL);
    }
}
