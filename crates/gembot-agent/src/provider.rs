use async_trait::async_trait;

use gembot_core::types::Turn;

/// Marker prepended to failure text so it stands out when relayed to chat.
pub const FAILURE_MARKER: &str = "\u{274c}"; // ❌

/// Caption used when an image arrives without any text.
pub const DEFAULT_IMAGE_PROMPT: &str = "What is this a picture of?";

/// Outcome of one generation call: model text or the service's failure detail.
///
/// Model-side refusals and API errors are ordinary values here, not faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Text(String),
    Failure(String),
}

impl GenerationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, GenerationResult::Failure(_))
    }

    /// Text to show the user. Failures carry the [`FAILURE_MARKER`] prefix.
    pub fn display_text(&self) -> String {
        match self {
            GenerationResult::Text(text) => text.clone(),
            GenerationResult::Failure(detail) => format!("{FAILURE_MARKER}{detail}"),
        }
    }
}

impl From<ProviderError> for GenerationResult {
    fn from(err: ProviderError) -> Self {
        GenerationResult::Failure(err.to_string())
    }
}

/// One image plus its MIME type, sent inline with a prompt.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Interface to the external generative model.
///
/// Implementations never return errors: every failure becomes
/// [`GenerationResult::Failure`].
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Send `history` followed by `prompt` as a new user turn.
    async fn generate_text(&self, history: &[Turn], prompt: &str) -> GenerationResult;

    /// Single-shot request with one image and a caption.
    ///
    /// An empty `prompt` is replaced by [`DEFAULT_IMAGE_PROMPT`]. Nothing is
    /// recorded by the client; the caller decides what goes into history.
    async fn generate_from_image(&self, image: &ImageInput, prompt: &str) -> GenerationResult;
}

/// Transport-level failures inside a provider, before they are folded into
/// a [`GenerationResult::Failure`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Empty response (finish reason: {0})")]
    Empty(String),
}
