//! TOML configuration, loaded once at startup and passed by reference
//! into every component. No component reads ambient process state.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CourierError;

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Inbound Telegram subscription config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Source-channel allow-list; only these chats are observed.
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    /// Sender allow-list (numeric IDs or handles). Empty = everyone.
    #[serde(default)]
    pub allowed_senders: Vec<String>,
}

/// Outbound Twilio WhatsApp gateway config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Sender identity, e.g. "whatsapp:+14155238886".
    #[serde(default)]
    pub whatsapp_from: String,
    /// Recipient identities; each send is independent.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Template SID for the text-only fallback. Empty = no fallback.
    #[serde(default)]
    pub text_template_sid: Option<String>,
    /// Template SID for the image-carrying fallback. Empty = no fallback.
    #[serde(default)]
    pub media_template_sid: Option<String>,
    /// Body is truncated to this length before template substitution.
    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
}

/// Media hosting config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Public base URL the gateway fetches media from. Must be reachable
    /// over the public internet, so localhost is rejected.
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default = "default_media_port")]
    pub port: u16,
    /// Route prefix for the serving endpoint (no slashes).
    #[serde(default = "default_media_route")]
    pub route: String,
    /// Directory hosted files live in; created at startup.
    #[serde(default = "default_hosting_dir")]
    pub hosting_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            public_base_url: String::new(),
            port: default_media_port(),
            route: default_media_route(),
            hosting_dir: default_hosting_dir(),
        }
    }
}

fn default_max_body_len() -> usize {
    1024
}

fn default_media_port() -> u16 {
    8080
}

fn default_media_route() -> String {
    "media".to_string()
}

fn default_hosting_dir() -> String {
    "media".to_string()
}

impl Config {
    /// Check that every required field is present and consistent.
    ///
    /// All problems are collected into one error so a misconfigured
    /// deployment fails with the full list, not one field at a time.
    pub fn validate(&self) -> Result<(), CourierError> {
        let mut problems = Vec::new();

        if self.telegram.bot_token.is_empty() {
            problems.push("telegram.bot_token is empty".to_string());
        }
        if self.telegram.chat_ids.is_empty() {
            problems.push("telegram.chat_ids is empty".to_string());
        }
        if self.twilio.account_sid.is_empty() {
            problems.push("twilio.account_sid is empty".to_string());
        }
        if self.twilio.auth_token.is_empty() {
            problems.push("twilio.auth_token is empty".to_string());
        }
        if self.twilio.whatsapp_from.is_empty() {
            problems.push("twilio.whatsapp_from is empty".to_string());
        }
        if self.twilio.recipients.is_empty() {
            problems.push("twilio.recipients is empty".to_string());
        }

        match url_host(&self.media.public_base_url) {
            None => problems.push(
                "media.public_base_url must start with http:// or https://".to_string(),
            ),
            Some(host) => {
                if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
                    problems.push(
                        "media.public_base_url cannot point to localhost; \
                         the gateway needs a publicly reachable URL"
                            .to_string(),
                    );
                }
            }
        }

        if self.media.route.contains('/') {
            problems.push("media.route must be a single path segment".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CourierError::Config(problems.join("; ")))
        }
    }
}

/// Extract the host from an http(s) URL, or `None` for any other scheme.
fn url_host(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let end = rest.find(['/', ':', '?']).unwrap_or(rest.len());
    let host = &rest[..end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Load configuration from a TOML file.
pub fn load(path: &str) -> Result<Config, CourierError> {
    let path = Path::new(path);
    let content = std::fs::read_to_string(path)
        .map_err(|e| CourierError::Config(format!("failed to read {}: {e}", path.display())))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| CourierError::Config(format!("failed to parse config: {e}")))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            chat_ids = [-100123]

            [twilio]
            account_sid = "ACxxxx"
            auth_token = "secret"
            whatsapp_from = "whatsapp:+14155238886"
            recipients = ["whatsapp:+4915112345678"]

            [media]
            public_base_url = "https://relay.example.com"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = valid_config();
        assert_eq!(cfg.twilio.max_body_len, 1024);
        assert_eq!(cfg.media.port, 8080);
        assert_eq!(cfg.media.route, "media");
        assert_eq!(cfg.media.hosting_dir, "media");
        assert!(cfg.twilio.text_template_sid.is_none());
        assert!(cfg.telegram.allowed_senders.is_empty());
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_collected() {
        let cfg: Config = toml::from_str(
            r#"
            [telegram]
            [twilio]
            [media]
            public_base_url = "https://relay.example.com"
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("telegram.bot_token"));
        assert!(msg.contains("telegram.chat_ids"));
        assert!(msg.contains("twilio.account_sid"));
        assert!(msg.contains("twilio.recipients"));
    }

    #[test]
    fn test_localhost_base_url_rejected() {
        let mut cfg = valid_config();
        cfg.media.public_base_url = "http://localhost:8080".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("localhost"));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let mut cfg = valid_config();
        cfg.media.public_base_url = "ftp://relay.example.com".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn test_url_host_extraction() {
        assert_eq!(url_host("https://relay.example.com/media"), Some("relay.example.com"));
        assert_eq!(url_host("http://localhost:8080"), Some("localhost"));
        assert_eq!(url_host("relay.example.com"), None);
        assert_eq!(url_host("https://"), None);
    }
}
