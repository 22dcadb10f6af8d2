//! Error types for the DDNS system
//!
//! Every failure the sync loop can observe maps onto one variant here, and
//! [`Error::severity`] tells the loop how far the failure reaches: the whole
//! process, a single domain mapping, or just the current tick.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (startup only)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The named interface does not exist on this host
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// The interface exists but carries no publishable IPv6 address
    #[error("No address available: {0}")]
    NoAddressAvailable(String),

    /// Provider throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network failure, timeout, or provider-side 5xx
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Provider refused the write because of a conflicting record
    #[error("Record conflict: {0}")]
    RecordConflict(String),

    /// Provider does not accept the domain (or prefix) of a mapping
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Provider-specific error without a better classification
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// How far a failure reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stop the sync loop; only an operator can fix this
    Fatal,
    /// Disable the affected domain mapping, keep syncing the others
    SkipMapping,
    /// Log and try again on the next tick
    Retry,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an "interface not found" error
    pub fn interface_not_found(interface: impl Into<String>) -> Self {
        Self::InterfaceNotFound(interface.into())
    }

    /// Create a "no address available" error
    pub fn no_address(msg: impl Into<String>) -> Self {
        Self::NoAddressAvailable(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a transient network error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Create a record conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::RecordConflict(msg.into())
    }

    /// Create an invalid domain error
    pub fn invalid_domain(msg: impl Into<String>) -> Self {
        Self::InvalidDomain(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify the error for the sync loop
    pub fn severity(&self) -> Severity {
        match self {
            Error::Config(_) | Error::Authentication(_) => Severity::Fatal,
            Error::InvalidDomain(_) => Severity::SkipMapping,
            _ => Severity::Retry,
        }
    }

    /// Short, stable name of the error kind for log fields and events
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Authentication(_) => "AuthenticationFailed",
            Error::InterfaceNotFound(_) => "InterfaceNotFound",
            Error::NoAddressAvailable(_) => "NoAddressAvailable",
            Error::RateLimited(_) => "RateLimited",
            Error::TransientNetwork(_) => "TransientNetworkError",
            Error::RecordConflict(_) => "RecordConflict",
            Error::InvalidDomain(_) => "InvalidDomain",
            Error::Provider { .. } => "ProviderError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Other(_) => "Other",
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
