pub mod chunk;
pub mod fetch;
pub mod gemini;
pub mod pipeline;
pub mod provider;
pub mod sanitize;

pub use chunk::chunk;
pub use fetch::{AttachmentFetcher, AttachmentRef, FetchError, FetchedImage};
pub use gemini::GeminiClient;
pub use provider::{GenerationClient, GenerationResult, ImageInput, ProviderError};
pub use sanitize::sanitize;
pub use pipeline::{
    run_ask, run_history, run_reset, AskOutcome, AskRequest, MessageContext, PipelineError,
    ReplyTarget, TransportError, Trigger,
};
