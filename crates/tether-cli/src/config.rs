use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use tether_client::GatewayConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Gateway dialed when nothing else is configured.
    #[serde(default = "default_local_url")]
    pub local_url: String,
    /// Remote gateway; takes precedence over `local_url` when set.
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Bearer token sent with the connect handshake.
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for GatewaySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySection")
            .field("local_url", &self.local_url)
            .field("remote_url", &self.remote_url)
            .field(
                "token",
                &self.token.as_deref().map(mask_secret),
            )
            .finish()
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            local_url: default_local_url(),
            remote_url: None,
            token: None,
        }
    }
}

fn default_local_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}

pub fn default_config_toml() -> String {
    let config = TetherConfig::default();
    toml::to_string_pretty(&config).unwrap_or_default()
}

impl TetherConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if !path.exists() && custom_path.is_none() {
            // No config is fine; defaults dial the local gateway
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if config
            .gateway
            .token
            .as_deref()
            .is_some_and(|t| !t.is_empty() && !content.contains("${"))
        {
            warn!(
                "Gateway token is hardcoded in config file. For security, use environment variables: token = \"${{TETHER_GATEWAY_TOKEN}}\""
            );
        }

        Ok(config)
    }

    /// Resolve the effective client configuration: config file, then
    /// environment, then command-line flags, most specific wins.
    pub fn gateway_config(&self, url_flag: &Option<String>, token_flag: &Option<String>) -> GatewayConfig {
        let mut config = GatewayConfig {
            local_url: self.gateway.local_url.clone(),
            remote_url: self.gateway.remote_url.clone(),
            auth_token: self.gateway.token.clone(),
            ..GatewayConfig::default()
        };

        if let Ok(url) = std::env::var("TETHER_GATEWAY_URL") {
            if !url.is_empty() {
                config.remote_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("TETHER_GATEWAY_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Some(url) = url_flag {
            config.remote_url = Some(url.clone());
        }
        if let Some(token) = token_flag {
            config.auth_token = Some(token.clone());
        }

        config
    }
}

/// Expand ${VAR} references against the environment. Unset variables expand
/// to the empty string.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let mut pos = 0;
    while pos < result.len() {
        if let Some(start) = result[pos..].find("${") {
            let abs_start = pos + start;
            if let Some(end) = result[abs_start..].find('}') {
                let var_name = &result[abs_start + 2..abs_start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                let value_len = value.len();
                result = format!(
                    "{}{}{}",
                    &result[..abs_start],
                    value,
                    &result[abs_start + end + 1..]
                );
                pos = abs_start + value_len;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    result
}
