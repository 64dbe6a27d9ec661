//! Error types and handling for Spotledger
//!
//! Per-reading problems (bad timestamps, non-numeric values, missing prices)
//! never surface through these types: they are counted and skipped inside the
//! reconciliation. What reaches a caller is either an upstream failure or a
//! local storage/configuration problem.

use thiserror::Error;

/// Result type alias for Spotledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Main error type for Spotledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A timestamp could not be resolved to a valid instant
    #[error("Malformed timestamp '{input}': {message}")]
    MalformedTimestamp { input: String, message: String },

    /// Upstream rejected the credential (never retried)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Network failure or gateway timeout (retried by the fetch client)
    #[error("Transient error: {message}")]
    Transient { message: String },

    /// Retry budget used up; carries the last underlying error
    #[error("Fetch failed after {attempts} attempts: {last}")]
    FetchExhausted {
        attempts: u32,
        last: Box<LedgerError>,
    },

    /// Non-transient, non-auth HTTP failure (never retried)
    #[error("API error: HTTP {status} - {message}")]
    Api { status: u16, message: String },

    /// A cached blob failed structural validation
    #[error("Cache corruption for {year}: {message}")]
    CacheCorruption { year: i32, message: String },

    /// Final surfaced form of an unrecovered upstream failure
    #[error("Reconciliation failed for {year}: {source}")]
    Reconciliation {
        year: i32,
        #[source]
        source: Box<LedgerError>,
    },

    /// No price is available for the current hour
    #[error("Price unavailable: {message}")]
    PriceUnavailable { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl LedgerError {
    /// Create a new malformed timestamp error
    pub fn malformed_timestamp<S: Into<String>, M: Into<String>>(input: S, message: M) -> Self {
        LedgerError::MalformedTimestamp {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        LedgerError::Auth {
            message: message.into(),
        }
    }

    /// Create a new transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        LedgerError::Transient {
            message: message.into(),
        }
    }

    /// Wrap the last error seen once the retry budget is spent
    pub fn fetch_exhausted(attempts: u32, last: LedgerError) -> Self {
        LedgerError::FetchExhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        LedgerError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new cache corruption error
    pub fn cache_corruption<S: Into<String>>(year: i32, message: S) -> Self {
        LedgerError::CacheCorruption {
            year,
            message: message.into(),
        }
    }

    /// Wrap an unrecovered error as the final reconciliation failure
    pub fn reconciliation(year: i32, source: LedgerError) -> Self {
        match source {
            already @ LedgerError::Reconciliation { .. } => already,
            other => LedgerError::Reconciliation {
                year,
                source: Box::new(other),
            },
        }
    }

    /// Create a new price unavailable error
    pub fn price_unavailable<S: Into<String>>(message: S) -> Self {
        LedgerError::PriceUnavailable {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        LedgerError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        LedgerError::Io {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        LedgerError::Serialization {
            message: message.into(),
        }
    }

    /// Whether the fetch client should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient { .. })
    }

    /// Whether this error (or the error it wraps) is an authentication failure
    pub fn is_auth(&self) -> bool {
        match self {
            LedgerError::Auth { .. } => true,
            LedgerError::Reconciliation { source, .. } => source.is_auth(),
            LedgerError::FetchExhausted { last, .. } => last.is_auth(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LedgerError {
    fn from(err: serde_yaml::Error) -> Self {
        LedgerError::serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::transient(err.to_string())
    }
}

impl From<chrono::ParseError> for LedgerError {
    fn from(err: chrono::ParseError) -> Self {
        LedgerError::validation("datetime".to_string(), err.to_string())
    }
}
