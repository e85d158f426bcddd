//! Error types for the transaction firewall

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the transaction firewall
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Interception errors
    #[error("Interceptor install failed for binding '{binding}': {reason}")]
    InterceptInstall { binding: String, reason: String },

    #[error("Transaction blocked by risk verdict: score {score}, {}", .reasons.join("; "))]
    TransactionBlocked { score: u8, reasons: Vec<String> },

    #[error("Wallet provider not available")]
    ProviderUnavailable,

    #[error("Wallet connect failed: {0}")]
    ConnectFailed(String),

    // Correlation errors
    #[error("Duplicate pending wait for token {0}")]
    DuplicateWait(String),

    #[error("Wait timed out after {0}ms")]
    WaitTimeout(u64),

    // Message channel errors
    #[error("Message channel closed: {0}")]
    ChannelClosed(String),

    // Remote scorer errors
    #[error("Scorer request timed out after {0}ms")]
    ScorerTimeout(u64),

    #[error("Scorer returned HTTP {status}")]
    ScorerHttp { status: u16 },

    #[error("Scorer transport error: {0}")]
    ScorerTransport(String),

    #[error("Scorer response failed validation: {0}")]
    ScorerSchema(String),

    // Analysis errors
    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ScorerTimeout(_)
                | Error::ScorerHttp { .. }
                | Error::ScorerTransport(_)
        )
    }

    /// Check if this error means a signing call must be refused to the caller
    pub fn is_blocking(&self) -> bool {
        matches!(self, Error::TransactionBlocked { .. })
    }
}

// Conversion from reqwest errors, preserving the timeout distinction
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::ScorerTimeout(0)
        } else {
            Error::ScorerTransport(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
