//! # Lookup Error Types
//!
//! Error types for lookup operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Lookup Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Payload             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Parse                  │ │
//! │  │  InvalidUrl     │  │  HttpStatus     │  │                         │ │
//! │  │  ConfigLoad...  │  │  Timeout        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Domain      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Database       │  │  Invalid        │  │  Cancelled / Internal   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inside the search state machine a transport or payload error is not
//! fatal: it is reported as `LookupResult::Error` and counted like a miss.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for fallible operations in this crate.
///
/// Distinct from [`LookupResult`](crate::source::LookupResult), which is the
/// found / not-found / error answer of a single source.
pub type Result<T, E = LookupError> = std::result::Result<T, E>;

/// Lookup error type covering all possible lookup failures.
#[derive(Debug, Error)]
pub enum LookupError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid lookup configuration.
    #[error("Invalid lookup configuration: {0}")]
    InvalidConfig(String),

    /// Invalid source URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not be sent or the connection dropped.
    #[error("Network error: {0}")]
    Network(String),

    /// The source answered with a non-success status.
    #[error("HTTP {status} from {source_name}")]
    HttpStatus { source_name: String, status: u16 },

    /// The source did not answer within the per-lookup timeout.
    #[error("Lookup timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local store failure.
    #[error("Database error: {0}")]
    Database(#[from] tally_db::DbError),

    /// A record failed domain validation.
    #[error("Invalid record: {0}")]
    Invalid(#[from] tally_core::CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The lookup was cancelled before it finished.
    #[error("Lookup cancelled")]
    Cancelled,

    /// Internal error (panicked task, closed channel).
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tally_core::ValidationError> for LookupError {
    fn from(err: tally_core::ValidationError) -> Self {
        LookupError::Invalid(err.into())
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Parse(err.to_string())
        } else {
            LookupError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for LookupError {
    fn from(err: url::ParseError) -> Self {
        LookupError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for LookupError {
    fn from(err: std::io::Error) -> Self {
        LookupError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for LookupError {
    fn from(err: toml::de::Error) -> Self {
        LookupError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl LookupError {
    /// Returns true if the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Network failures
    /// - Timeouts
    /// - 429 and 5xx responses
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - 4xx responses other than 429
    /// - Unparseable payloads
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Network(_) | LookupError::Timeout(_) => true,
            LookupError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LookupError::InvalidConfig(_)
                | LookupError::InvalidUrl(_)
                | LookupError::ConfigLoadFailed(_)
        )
    }
}
