/// Domain-level validation errors.
///
/// Raised for user-input problems (bad links, unsupported uploads, invalid
/// configuration values) before any workspace is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Input too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}
