//! Unified error handling for merobridge.
//!
//! Host-facing operations (store access, configuration loading) share this
//! error type. Device-side failures have their own types in the devices crate
//! and are converted into logs or backoff before they reach the host.

/// Unified error type for merobridge host contracts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object or state not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("dev1.0".to_string());
        assert_eq!(err.to_string(), "Not found: dev1.0");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
