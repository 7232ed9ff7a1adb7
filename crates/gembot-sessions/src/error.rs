use thiserror::Error;

/// Errors that can occur inside a locked session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `retract_last` was asked to remove a turn the request did not append.
    #[error("no turn appended by this request to retract in session {key}")]
    NothingToRetract { key: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
