use thiserror::Error;

/// Core error types for featurebundle domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
}

impl CoreError {
    /// Create a new InvalidReference error
    pub fn invalid_reference(reference: impl Into<String>) -> Self {
        Self::InvalidReference(reference.into())
    }

    /// Create a new UnknownFeature error
    pub fn unknown_feature(feature: impl Into<String>) -> Self {
        Self::UnknownFeature(feature.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_reference("ConfigMap-");
        assert_eq!(err.to_string(), "Invalid object reference: ConfigMap-");

        let err = CoreError::unknown_feature("Gateway");
        assert_eq!(err.to_string(), "Unknown feature: Gateway");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CoreError::from(json_err);
        assert!(err.to_string().starts_with("JSON serialization error:"));
    }
}
