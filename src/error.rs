//! Error types for the translation layer.
//!
//! `TranslateError` is the single error type of the crate. Built on `thiserror`,
//! it keeps every failure mode in one enum so callers can use `?` everywhere.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading configuration files or
//!   environment overrides.
//! - **`Configuration`**: Semantic configuration problems that pass parsing but are
//!   logically wrong (an unknown log level, an alignment node without live sources).
//! - **`NoPrincipalSource`**: A reconstruction node found no upstream whose session
//!   lifecycle it can follow. Raised only while the node is being constructed.
//! - **`UnknownNode`**: A `NodeId` that does not belong to the graph it was used with.
//! - **`Document`**: A document body could not be converted to or from JSON.
//! - **`Payload`**: A payload does not fit the data keys it is being packed under.
//!
//! Only construction-time errors reach callers. Problems met while documents are
//! flowing are handled (and logged) by the node that sees them.

use thiserror::Error;

use crate::stream::NodeId;

/// Convenience alias for results using the crate error type.
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Configuration load error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("No principal session source upstream of reconstruction node '{node}'")]
    NoPrincipalSource { node: String },

    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Payload does not match data keys: {0}")]
    Payload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranslateError::NoPrincipalSource {
            node: "img".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No principal session source upstream of reconstruction node 'img'"
        );
    }

    #[test]
    fn test_document_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TranslateError = serde_err.into();
        assert!(err.to_string().starts_with("Document error"));
    }
}
