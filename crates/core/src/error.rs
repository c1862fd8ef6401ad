#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Not found: {entity} '{key}'")]
    NotFound { entity: &'static str, key: String },
}
