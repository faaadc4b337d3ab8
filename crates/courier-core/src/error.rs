use thiserror::Error;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Error from the inbound event source.
    #[error("channel error: {0}")]
    Channel(String),

    /// Error from the media pipeline (download, conversion, hosting).
    #[error("media error: {0}")]
    Media(String),

    /// Programmer error: an operation was called with arguments it can
    /// never accept (e.g. composing a collage from zero images).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Structured rejection from the outbound gateway.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A structured failure returned by the outbound messaging gateway.
///
/// The gateway attaches a numeric error code to most rejections; the
/// dispatch protocol keys its one-time template fallback off that code.
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// Machine-readable error code, when the gateway provided one.
    pub code: Option<i64>,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    /// Build an error with no machine-readable code (transport failures).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}
