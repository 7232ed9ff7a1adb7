//! Per-guild voice sessions.
//!
//! State machine for one guild:
//!
//! ```text
//! Disconnected ──join──▶ AwaitingLanguage ──pick──▶ Listening ──leave / loop exit──▶ Disconnected
//!                              │
//!                              └──timeout / leave──▶ Disconnected
//! ```
//!
//! `Disconnected` is the absence of an entry. Each entry owns a cancellation
//! token and, once listening, the handles of the listener and its supervisor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gembot_agent::pipeline::deliver;
use gembot_agent::ReplyTarget;
use gembot_core::config::{LanguageChoice, VoiceConfig, DISCORD_MESSAGE_LIMIT};

use crate::error::VoiceError;
use crate::types::{
    LanguagePrompt, Recognition, SpeechRecognizer, UtteranceSource, VoiceConnector,
};

pub const NOT_IN_VOICE_TEXT: &str = "You need to be in a voice channel to use this command.";
pub const NOT_CONNECTED_TEXT: &str = "I am not connected to a voice channel.";
pub const ALREADY_CONNECTED_TEXT: &str =
    "I am already in a voice channel here. Use leave first.";
pub const NO_RECOGNIZER_TEXT: &str = "Speech recognition is not configured for this bot.";
pub const NO_SELECTION_TEXT: &str = "No language selected. Command cancelled.";
pub const STT_CANCELED_TEXT: &str = "Speech-to-text operation canceled.";
pub const DISCONNECTED_TEXT: &str = "Disconnected from the voice channel!";

/// How long `leave` waits for the listener to wind down before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// The invoking user's current voice channel, as seen by the chat adapter.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub guild_id: u64,
    /// `(channel_id, channel_name)`; `None` when the user is not in voice.
    pub voice_channel: Option<(u64, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    NotInVoice,
    AlreadyConnected,
    Unavailable,
    ConnectFailed(String),
    /// Nobody picked a language in time; the bot disconnected again.
    NoSelection,
    /// `leave` ran while the join was still in progress.
    Cancelled,
    Listening { language: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotConnected,
    Left { stopped_listening: bool },
}

/// Why a listener loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Cancelled,
    Disconnected,
    ServiceError,
    Fault,
}

enum Phase {
    AwaitingLanguage,
    Listening {
        language: String,
        listener: Listener,
    },
}

/// The capture loop and the supervisor that cleans up after it.
struct Listener {
    supervisor: JoinHandle<()>,
    worker: AbortHandle,
}

impl Listener {
    fn is_running(&self) -> bool {
        !self.supervisor.is_finished()
    }

    /// Wait for the loop to observe cancellation, then abort whatever is left.
    async fn stop(mut self) {
        if tokio::time::timeout(STOP_GRACE, &mut self.supervisor)
            .await
            .is_err()
        {
            warn!("voice listener ignored cancellation, aborting");
            self.worker.abort();
            self.supervisor.abort();
        }
    }
}

struct GuildVoice {
    /// Distinguishes this connection from a later one in the same guild.
    id: u64,
    cancel: CancellationToken,
    phase: Phase,
}

enum Selection {
    Picked(LanguageChoice),
    NoneChosen,
    Cancelled,
}

pub struct VoiceManager {
    connector: Arc<dyn VoiceConnector>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    languages: [LanguageChoice; 2],
    selection_timeout: Duration,
    loop_delay: Duration,
    sessions: Arc<DashMap<u64, GuildVoice>>,
    next_id: AtomicU64,
}

impl VoiceManager {
    pub fn new(
        connector: Arc<dyn VoiceConnector>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            connector,
            recognizer,
            languages: config.languages.clone(),
            selection_timeout: Duration::from_secs(config.selection_timeout_secs),
            loop_delay: Duration::from_millis(config.loop_delay_ms),
            sessions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = timeout;
        self
    }

    pub fn is_active(&self, guild_id: u64) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    /// Selected language of a listening session.
    pub fn language(&self, guild_id: u64) -> Option<String> {
        self.sessions.get(&guild_id).and_then(|s| match &s.phase {
            Phase::Listening { language, .. } => Some(language.clone()),
            Phase::AwaitingLanguage => None,
        })
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Connect to the caller's voice channel, ask for a language and start
    /// the listener.
    ///
    /// Suspends until a language is picked or the selection timeout elapses.
    /// Errors are only returned when a status message cannot be delivered.
    pub async fn join(
        &self,
        req: JoinRequest,
        prompt: &dyn LanguagePrompt,
        reply: Arc<dyn ReplyTarget>,
    ) -> Result<JoinOutcome, VoiceError> {
        let guild = req.guild_id;
        let Some((channel_id, channel_name)) = req.voice_channel else {
            reply.say(NOT_IN_VOICE_TEXT).await?;
            return Ok(JoinOutcome::NotInVoice);
        };
        let Some(recognizer) = self.recognizer.clone() else {
            reply.say(NO_RECOGNIZER_TEXT).await?;
            return Ok(JoinOutcome::Unavailable);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let claimed = match self.sessions.entry(guild) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(GuildVoice {
                    id,
                    cancel: cancel.clone(),
                    phase: Phase::AwaitingLanguage,
                });
                true
            }
        };
        if !claimed {
            reply.say(ALREADY_CONNECTED_TEXT).await?;
            return Ok(JoinOutcome::AlreadyConnected);
        }

        let source = match self.connector.connect(guild, channel_id).await {
            Ok(source) => source,
            Err(e) => {
                warn!(guild, error = %e, "voice connect failed");
                self.sessions.remove_if(&guild, |_, s| s.id == id);
                reply
                    .say(&format!("Could not join {channel_name}: {e}"))
                    .await?;
                return Ok(JoinOutcome::ConnectFailed(e.to_string()));
            }
        };
        if cancel.is_cancelled() {
            // leave ran while connecting; its disconnect may have raced ours.
            if let Err(e) = self.connector.disconnect(guild).await {
                warn!(guild, error = %e, "voice disconnect failed");
            }
            return Ok(JoinOutcome::Cancelled);
        }
        info!(guild, channel = %channel_name, "joined voice channel");
        if let Err(e) = reply.say(&format!("Joined {channel_name}!")).await {
            self.teardown(guild, id).await;
            return Err(e.into());
        }

        let selection = tokio::select! {
            () = cancel.cancelled() => Selection::Cancelled,
            picked = tokio::time::timeout(
                self.selection_timeout,
                prompt.choose(&self.languages, self.selection_timeout),
            ) => match picked {
                Ok(Ok(Some(choice))) => Selection::Picked(choice),
                Ok(Ok(None)) | Err(_) => Selection::NoneChosen,
                Ok(Err(e)) => {
                    warn!(guild, error = %e, "language prompt failed");
                    Selection::NoneChosen
                }
            },
        };
        prompt.dismiss().await;

        let choice = match selection {
            Selection::Picked(choice) => choice,
            Selection::Cancelled => return Ok(JoinOutcome::Cancelled),
            Selection::NoneChosen => {
                debug!(guild, "no language selected");
                self.teardown(guild, id).await;
                reply.say(NO_SELECTION_TEXT).await?;
                return Ok(JoinOutcome::NoSelection);
            }
        };

        if let Err(e) = reply
            .say(&format!("Selected language: {}", choice.code))
            .await
        {
            self.teardown(guild, id).await;
            return Err(e.into());
        }

        let listener = self.spawn_listener(
            guild,
            id,
            source,
            recognizer,
            choice.code.clone(),
            cancel.clone(),
            reply,
        );
        let mut pending = Some(listener);
        if let Some(mut session) = self.sessions.get_mut(&guild) {
            if session.id == id {
                if let Some(listener) = pending.take() {
                    session.phase = Phase::Listening {
                        language: choice.code.clone(),
                        listener,
                    };
                }
            }
        }
        if pending.is_some() && cancel.is_cancelled() {
            return Ok(JoinOutcome::Cancelled);
        }

        Ok(JoinOutcome::Listening {
            language: choice.code,
        })
    }

    /// Stop listening (if running), disconnect and acknowledge.
    pub async fn leave(
        &self,
        guild_id: u64,
        reply: &dyn ReplyTarget,
    ) -> Result<LeaveOutcome, VoiceError> {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            reply.say(NOT_CONNECTED_TEXT).await?;
            return Ok(LeaveOutcome::NotConnected);
        };

        session.cancel.cancel();
        let stopped_listening = match session.phase {
            Phase::Listening { listener, .. } => {
                let was_running = listener.is_running();
                listener.stop().await;
                if was_running {
                    reply.say(STT_CANCELED_TEXT).await?;
                }
                was_running
            }
            Phase::AwaitingLanguage => false,
        };

        if let Err(e) = self.connector.disconnect(guild_id).await {
            warn!(guild = guild_id, error = %e, "voice disconnect failed");
        }
        info!(guild = guild_id, "left voice channel");
        reply.say(DISCONNECTED_TEXT).await?;
        Ok(LeaveOutcome::Left { stopped_listening })
    }

    /// Cancel every session and disconnect. Used at process shutdown.
    pub async fn shutdown(&self) {
        let guilds: Vec<u64> = self.sessions.iter().map(|e| *e.key()).collect();
        for guild in guilds {
            if let Some((_, session)) = self.sessions.remove(&guild) {
                session.cancel.cancel();
                if let Phase::Listening { listener, .. } = session.phase {
                    listener.stop().await;
                }
                if let Err(e) = self.connector.disconnect(guild).await {
                    warn!(guild, error = %e, "voice disconnect failed during shutdown");
                }
            }
        }
    }

    /// Drop the session `id` if it is still current and disconnect.
    async fn teardown(&self, guild: u64, id: u64) {
        if self.sessions.remove_if(&guild, |_, s| s.id == id).is_some() {
            if let Err(e) = self.connector.disconnect(guild).await {
                warn!(guild, error = %e, "voice disconnect failed");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_listener(
        &self,
        guild: u64,
        id: u64,
        source: Box<dyn UtteranceSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
        language: String,
        cancel: CancellationToken,
        sink: Arc<dyn ReplyTarget>,
    ) -> Listener {
        let sessions = Arc::clone(&self.sessions);
        let connector = Arc::clone(&self.connector);
        let delay = self.loop_delay;

        let worker = tokio::spawn(listen_loop(
            source,
            recognizer,
            Arc::clone(&sink),
            language,
            cancel.clone(),
            delay,
        ));
        let worker_abort = worker.abort_handle();

        let supervisor = tokio::spawn(async move {
            let exit = match worker.await {
                Ok(exit) => exit,
                Err(e) => {
                    warn!(guild, error = %e, "voice listener crashed");
                    if e.is_panic() && !cancel.is_cancelled() {
                        if let Err(e) = sink
                            .say("An error occurred: the voice listener stopped unexpectedly")
                            .await
                        {
                            warn!(guild, error = %e, "could not report listener crash");
                        }
                    }
                    LoopExit::Fault
                }
            };
            info!(guild, ?exit, "voice listener stopped");

            // The loop ended by itself; leave has not run, so clean up here.
            if sessions.remove_if(&guild, |_, s| s.id == id).is_some() {
                if let Err(e) = connector.disconnect(guild).await {
                    warn!(guild, error = %e, "voice disconnect failed");
                }
            }
        });

        Listener {
            supervisor,
            worker: worker_abort,
        }
    }
}

/// Capture → recognize → post, until cancelled, disconnected or failed.
async fn listen_loop(
    mut source: Box<dyn UtteranceSource>,
    recognizer: Arc<dyn SpeechRecognizer>,
    sink: Arc<dyn ReplyTarget>,
    language: String,
    cancel: CancellationToken,
    delay: Duration,
) -> LoopExit {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return LoopExit::Cancelled,
            next = source.next_utterance() => next,
        };
        let utterance = match next {
            Ok(Some(u)) => u,
            Ok(None) => return LoopExit::Disconnected,
            Err(e) => {
                post(sink.as_ref(), &format!("An error occurred: {e}"), &cancel).await;
                return LoopExit::Fault;
            }
        };
        debug!(secs = utterance.duration().as_secs_f32(), "utterance captured");

        let recognized = tokio::select! {
            () = cancel.cancelled() => return LoopExit::Cancelled,
            r = recognizer.recognize(&utterance, &language) => r,
        };
        match recognized {
            Ok(Recognition::Transcript(text)) => match post(sink.as_ref(), &text, &cancel).await {
                Posted::Sent => {}
                Posted::Failed => return LoopExit::Fault,
                Posted::Cancelled => return LoopExit::Cancelled,
            },
            Ok(Recognition::Unrecognized) => debug!("speech not understood"),
            Err(e) => {
                post(
                    sink.as_ref(),
                    &format!("Could not request results from the speech recognition service; {e}"),
                    &cancel,
                )
                .await;
                return LoopExit::ServiceError;
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return LoopExit::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

enum Posted {
    Sent,
    Failed,
    Cancelled,
}

/// Post to the text channel. A send still pending at cancellation is dropped.
async fn post(sink: &dyn ReplyTarget, text: &str, cancel: &CancellationToken) -> Posted {
    tokio::select! {
        () = cancel.cancelled() => Posted::Cancelled,
        sent = deliver(sink, text, DISCORD_MESSAGE_LIMIT) => match sent {
            Ok(()) => Posted::Sent,
            Err(e) => {
                warn!(error = %e, "could not post voice message");
                Posted::Failed
            }
        },
    }
}
