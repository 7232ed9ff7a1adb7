//! Shared message pipeline, used by every entry point of a channel adapter.
//!
//! The `ask` command (slash or prefix) and passive triggers (mention, DM) both
//! call [`run_ask`]; the adapter only supplies a [`ReplyTarget`] for delivery.

pub mod context;
pub mod process;
pub mod reply;

pub use context::MessageContext;
pub use process::{
    deliver, render_history, run_ask, run_history, run_reset, AskOutcome, AskRequest,
    PipelineError, Trigger, EMPTY_PROMPT_HINT, FETCH_FAILED_TEXT, IMAGE_REACTION,
    NO_HISTORY_TEXT, RESET_TEXT, TEXT_REACTION,
};
pub use reply::{ReplyTarget, TransportError};
