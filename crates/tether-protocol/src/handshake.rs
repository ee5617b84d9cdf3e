//! Connect handshake — protocol v3 parameters and the challenge payload

use serde::{Deserialize, Serialize};

/// Gateway protocol version this client speaks (both floor and ceiling).
pub const PROTOCOL_VERSION: u32 = 3;

/// Parameters of the `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    pub scopes: Vec<String>,
    pub caps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
}

/// Client descriptor sent in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
    pub instance_id: String,
}

/// Bearer token passthrough. The client never interprets the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    pub token: String,
}

/// Payload of the `connect.challenge` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengePayload {
    pub nonce: String,
}

impl ConnectParams {
    /// Build the webchat operator handshake, optionally carrying a bearer token.
    pub fn webchat(token: Option<&str>) -> Self {
        Self {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo {
                id: "webchat-ui".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                platform: "web".to_string(),
                mode: "webchat".to_string(),
                instance_id: uuid::Uuid::new_v4().to_string(),
            },
            role: "operator".to_string(),
            scopes: vec!["operator.admin".to_string()],
            caps: Vec::new(),
            auth: token.map(|t| AuthParams {
                token: t.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webchat_params_shape() {
        let params = ConnectParams::webchat(None);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["minProtocol"], 3);
        assert_eq!(json["maxProtocol"], 3);
        assert_eq!(json["client"]["id"], "webchat-ui");
        assert_eq!(json["client"]["mode"], "webchat");
        assert_eq!(json["client"]["platform"], "web");
        assert_eq!(json["role"], "operator");
        assert_eq!(json["scopes"][0], "operator.admin");
        assert!(json["client"]["instanceId"].is_string());
        // No auth key at all when there is no token
        assert!(json.get("auth").is_none());
    }

    #[test]
    fn test_webchat_params_with_token() {
        let params = ConnectParams::webchat(Some("secret123"));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["auth"]["token"], "secret123");
    }

    #[test]
    fn test_fresh_instance_id_per_handshake() {
        let a = ConnectParams::webchat(None);
        let b = ConnectParams::webchat(None);
        assert_ne!(a.client.instance_id, b.client.instance_id);
    }

    #[test]
    fn test_challenge_payload_parse() {
        let payload: ChallengePayload = serde_json::from_str(r#"{"nonce":"n-42"}"#).unwrap();
        assert_eq!(payload.nonce, "n-42");
    }
}
