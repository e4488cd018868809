use thiserror::Error;

/// Errors raised when an entity fails its own validation rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Required { field: &'static str },
    #[error("{field} too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} cannot be negative")]
    Negative { field: &'static str },
    #[error("Invalid slug: {0}")]
    InvalidSlug(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid color format: {0}")]
    InvalidColor(String),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("A category cannot be its own parent")]
    SelfParent,
    #[error("{entity_type} has no updatable field named '{field}'")]
    UnknownField {
        entity_type: &'static str,
        field: String,
    },
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_display() {
        assert_eq!(
            ValidationError::Required { field: "name" }.to_string(),
            "name cannot be empty"
        );
    }

    #[test]
    fn test_too_long_display() {
        let error = ValidationError::TooLong {
            field: "name",
            max: 200,
        };
        assert_eq!(error.to_string(), "name too long (max 200 characters)");
    }

    #[test]
    fn test_unknown_field_display() {
        let error = ValidationError::UnknownField {
            entity_type: "Product",
            field: "view_count".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Product has no updatable field named 'view_count'"
        );
    }

    #[test]
    fn test_self_parent_display() {
        assert_eq!(
            ValidationError::SelfParent.to_string(),
            "A category cannot be its own parent"
        );
    }
}
