//! Environment-derived configuration, read once at startup.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mail::ImapConfig;

/// Sender identity of the LMS notifier, in the canonical display form.
pub const DEFAULT_EXPECTED_SENDER: &str = "\"iACADEMY-NEO\" <messages@neolms.com>";

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    /// Full webhook URL, token included.
    pub webhook_url: SecretString,
    /// Only mail from this sender is considered.
    pub expected_sender: String,
    /// Optional fixed text sent above every delivery.
    pub message_text: Option<String>,
}

impl Config {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap = ImapConfig {
            host: env_or("BRIDGE_IMAP_HOST", "imap.gmail.com"),
            port: parse_var("BRIDGE_IMAP_PORT", 993)?,
            username: require("BRIDGE_EMAIL_USERNAME")?,
            password: SecretString::from(require("BRIDGE_EMAIL_PASSWORD")?),
            use_tls: parse_var("BRIDGE_IMAP_TLS", true)?,
        };

        Ok(Self {
            imap,
            webhook_url: SecretString::from(require("BRIDGE_WEBHOOK_URL")?),
            expected_sender: env_or("BRIDGE_EXPECTED_SENDER", DEFAULT_EXPECTED_SENDER),
            message_text: std::env::var("BRIDGE_MESSAGE_TEXT").ok(),
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
