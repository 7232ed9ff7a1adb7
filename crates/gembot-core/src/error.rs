use thiserror::Error;

#[derive(Debug, Error)]
pub enum GembotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

impl GembotError {
    /// Short, stable error code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            GembotError::Config(_) => "CONFIG_ERROR",
            GembotError::MissingCredential(_) => "MISSING_CREDENTIAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, GembotError>;
