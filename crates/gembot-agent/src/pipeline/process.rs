//! Ask / reset / history, shared by all channel adapters.
//!
//! `run_ask` runs one logical request:
//! sanitize → (fetch image) → lock session → append user turn → generate →
//! append model turn (or retract on failure) → unlock → chunked delivery.
//!
//! The session lock spans the whole read-generate-record sequence, so two
//! concurrent requests on one key can never interleave their turns.

use tracing::{debug, info, warn};

use gembot_core::config::{HISTORY_CHUNK_CHARS, REPLY_CHUNK_CHARS};
use gembot_core::types::{SessionKey, Turn};

use crate::chunk::chunk;
use crate::fetch::{select_image, AttachmentRef};
use crate::provider::{GenerationResult, ImageInput, DEFAULT_IMAGE_PROMPT};
use crate::sanitize::sanitize;

use super::context::MessageContext;
use super::reply::{ReplyTarget, TransportError};

pub const IMAGE_REACTION: &str = "\u{1f3a8}"; // 🎨
pub const TEXT_REACTION: &str = "\u{1f4ac}"; // 💬
pub const FETCH_FAILED_TEXT: &str = "Unable to download the image.";
pub const RESET_TEXT: &str = "\u{1f916} Chat history has been reset.";
pub const NO_HISTORY_TEXT: &str = "No conversation history available.";
pub const EMPTY_PROMPT_HINT: &str = "Ask me something, or attach an image for me to look at.";

/// What started the request. Passive triggers get an acknowledgment reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Command,
    Passive,
}

pub struct AskRequest<'a> {
    pub session: SessionKey,
    /// Raw message or command text, before sanitizing.
    pub content: &'a str,
    pub attachments: &'a [AttachmentRef],
    pub trigger: Trigger,
}

/// How a request ended. Every variant has already been reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Answered {
        result: GenerationResult,
        chunks: usize,
    },
    FetchFailed,
    EmptyPrompt,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("delivery failed after {sent} chunk(s): {source}")]
    Delivery {
        sent: usize,
        #[source]
        source: TransportError,
    },
}

/// Run the ask pipeline and deliver the answer to `target`.
///
/// A generation `Failure` is delivered like any answer, but the user turn
/// recorded for this request is retracted so history keeps alternating.
/// If delivery fails after a successful generation, both turns stay recorded.
pub async fn run_ask<C, T>(
    ctx: &C,
    target: &T,
    req: AskRequest<'_>,
) -> Result<AskOutcome, PipelineError>
where
    C: MessageContext + ?Sized,
    T: ReplyTarget + ?Sized,
{
    let prompt = sanitize(req.content);
    let image_ref = select_image(req.attachments);

    if prompt.trim().is_empty() && image_ref.is_none() {
        debug!(session = %req.session, "empty prompt, nothing to ask");
        say_all(target, &[EMPTY_PROMPT_HINT.to_string()]).await?;
        return Ok(AskOutcome::EmptyPrompt);
    }

    if req.trigger == Trigger::Passive {
        let emoji = if image_ref.is_some() {
            IMAGE_REACTION
        } else {
            TEXT_REACTION
        };
        if let Err(e) = target.react(emoji).await {
            debug!(error = %e, "acknowledgment reaction failed");
        }
    }
    if let Err(e) = target.typing().await {
        debug!(error = %e, "typing indicator failed");
    }

    let image = match image_ref {
        Some(att) => match ctx.fetcher().fetch(att).await {
            Ok(img) => Some(ImageInput {
                bytes: img.bytes,
                mime_type: img.mime_type,
            }),
            Err(e) => {
                warn!(session = %req.session, error = %e, "attachment fetch failed");
                say_all(target, &[FETCH_FAILED_TEXT.to_string()]).await?;
                return Ok(AskOutcome::FetchFailed);
            }
        },
        None => None,
    };

    let result = {
        let mut guard = ctx.sessions().lock(&req.session).await;
        let generator = ctx.generator();

        let result = match &image {
            Some(img) => {
                info!(session = %req.session, provider = generator.name(), "image prompt");
                let caption = if prompt.trim().is_empty() {
                    DEFAULT_IMAGE_PROMPT
                } else {
                    prompt.as_str()
                };
                guard.append(Turn::user(caption));
                generator.generate_from_image(img, caption).await
            }
            None => {
                info!(session = %req.session, provider = generator.name(), "text prompt");
                let history = guard.history().to_vec();
                guard.append(Turn::user(prompt.as_str()));
                generator.generate_text(&history, &prompt).await
            }
        };

        match &result {
            GenerationResult::Text(text) => guard.append(Turn::model(text.as_str())),
            GenerationResult::Failure(detail) => {
                warn!(session = %req.session, detail = %detail, "generation failed");
                if let Err(e) = guard.retract_last() {
                    warn!(error = %e, "could not retract user turn");
                }
            }
        }
        result
    };

    let chunks = chunk(&result.display_text(), REPLY_CHUNK_CHARS);
    if let Err(e) = say_all(target, &chunks).await {
        warn!(session = %req.session, error = %e, "answer recorded but not delivered");
        return Err(e);
    }

    Ok(AskOutcome::Answered {
        result,
        chunks: chunks.len(),
    })
}

/// Clear the session and acknowledge. Waits for any in-flight request on it.
pub async fn run_reset<C, T>(ctx: &C, target: &T, session: &SessionKey) -> Result<(), PipelineError>
where
    C: MessageContext + ?Sized,
    T: ReplyTarget + ?Sized,
{
    let removed = ctx.sessions().reset(session).await;
    info!(session = %session, removed, "history reset");
    say_all(target, &[RESET_TEXT.to_string()]).await
}

/// Show the session's history, chunked at the transport's hard limit.
pub async fn run_history<C, T>(
    ctx: &C,
    target: &T,
    session: &SessionKey,
) -> Result<(), PipelineError>
where
    C: MessageContext + ?Sized,
    T: ReplyTarget + ?Sized,
{
    let turns = ctx.sessions().snapshot(session).await;
    if turns.is_empty() {
        return say_all(target, &[NO_HISTORY_TEXT.to_string()]).await;
    }
    deliver(target, &render_history(&turns), HISTORY_CHUNK_CHARS).await
}

/// One `**Role:** content` line per turn.
pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("**{}:** {}", t.role.label(), t.text().trim()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split `text` at `max_chars` and send each piece in order.
pub async fn deliver<T>(target: &T, text: &str, max_chars: usize) -> Result<(), PipelineError>
where
    T: ReplyTarget + ?Sized,
{
    say_all(target, &chunk(text, max_chars)).await
}

async fn say_all<T>(target: &T, chunks: &[String]) -> Result<(), PipelineError>
where
    T: ReplyTarget + ?Sized,
{
    for (sent, piece) in chunks.iter().enumerate() {
        target
            .say(piece)
            .await
            .map_err(|source| PipelineError::Delivery { sent, source })?;
    }
    Ok(())
}
