use gembot_agent::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice connection failed: {0}")]
    Connect(String),

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error("language prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Speech service failure. "Could not understand" is not an error; see
/// [`crate::types::Recognition::Unrecognized`].
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognition request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("speech recognition is not configured")]
    NotConfigured,
}
