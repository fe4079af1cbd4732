//! Error types for the bridge.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mail(#[from] MailError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox transport errors. All of these end the session.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS negotiation with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("Plain connections are not supported; enable TLS")]
    TlsRequired,

    #[error("Authentication failed for {username}: {reason}")]
    Auth { username: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IDLE wait failed: {0}")]
    Idle(String),

    #[error("Mailbox session is not connected")]
    Disconnected,
}

/// Per-message extraction errors — skip the message, keep the loop alive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Missing landmark in notification HTML: {0}")]
    MissingLandmark(&'static str),

    #[error("Unparseable event timestamp {raw:?}: {reason}")]
    BadTimestamp { raw: String, reason: String },

    #[error("Message has no HTML body")]
    NoHtmlBody,

    #[error("Notification body is empty after conversion")]
    EmptyBody,
}

/// Per-delivery errors — the message is lost from the chat side, the loop
/// continues.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Argument validation errors from the chunk splitter.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("Cannot split an empty string")]
    EmptyInput,

    #[error("Chunk size must be at least 1, got {0}")]
    InvalidChunkSize(usize),
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
