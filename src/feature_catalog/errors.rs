//! # Feature Mapping Error Types
//!
//! Errors raised while loading a feature mapping configuration and while
//! resolving property paths against the loaded model.
//!
//! ## Error Categories
//!
//! - **Mapping Errors**: the requested feature type or property has no mapping,
//!   or the mapping exists but cannot be expressed as a plain column reference
//! - **Configuration Errors**: file I/O, YAML parsing and structural validation
//!
//! None of these are retryable: the caller reports them to the requester.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    #[error("No mapping found for feature type `{feature_type}`")]
    UnknownFeatureType { feature_type: String },

    #[error("Property `{path}` is not mapped for feature type `{feature_type}`")]
    UnmappableProperty { feature_type: String, path: String },

    #[error("Property `{path}` of feature type `{feature_type}` cannot be expressed as a column: {reason}")]
    UnsupportedPropertyKind {
        feature_type: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid property path: {0}")]
    InvalidPropertyPath(String),
}

impl MappingError {
    /// Create an `UnmappableProperty` error for a path rendered with `/` separators
    pub fn unmappable(feature_type: impl Into<String>, path: impl Into<String>) -> Self {
        MappingError::UnmappableProperty {
            feature_type: feature_type.into(),
            path: path.into(),
        }
    }

    /// True for failures caused by the request rather than by the store's capabilities
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MappingError::UnknownFeatureType { .. }
                | MappingError::UnmappableProperty { .. }
                | MappingError::InvalidPropertyPath(_)
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaConfigError {
    #[error("Failed to read mapping configuration file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse mapping configuration: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid mapping configuration: {message}")]
    InvalidConfig { message: String },
}

impl SchemaConfigError {
    /// Create an `InvalidConfig` error scoped to one feature type
    ///
    /// # Example
    /// ```ignore
    /// SchemaConfigError::feature_type_error("app:Road", "duplicate property `app:name`")
    /// ```
    pub fn feature_type_error(feature_type: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaConfigError::InvalidConfig {
            message: format!(
                "feature type '{}': {}",
                feature_type.into(),
                message.into()
            ),
        }
    }
}
