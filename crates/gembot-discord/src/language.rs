//! Two-button language picker for voice transcription.
//!
//! Each prompt registers a oneshot sender under a random nonce; the button
//! custom ids carry `lang:{nonce}:{index}`. `interaction_create` routes
//! component clicks to [`LanguagePrompts::resolve`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateEmbed, CreateInteractionResponse, CreateMessage,
};
use serenity::http::Http;
use serenity::model::application::{ButtonStyle, ComponentInteraction};
use serenity::model::id::{ChannelId, MessageId};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use gembot_core::config::LanguageChoice;
use gembot_voice::{LanguagePrompt, VoiceError};

const PREFIX: &str = "lang";

/// Language prompts waiting for a click.
#[derive(Default)]
pub struct LanguagePrompts {
    pending: DashMap<String, oneshot::Sender<usize>>,
}

impl LanguagePrompts {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> (String, oneshot::Receiver<usize>) {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(nonce.clone(), tx);
        (nonce, rx)
    }

    fn forget(&self, nonce: &str) {
        self.pending.remove(nonce);
    }

    /// Handle a button click. Returns `false` if the click was not a language button.
    pub async fn resolve(&self, http: &Http, interaction: &ComponentInteraction) -> bool {
        let Some((nonce, index)) = parse_custom_id(&interaction.data.custom_id) else {
            return false;
        };

        match self.pending.remove(nonce) {
            Some((_, tx)) => {
                if tx.send(index).is_err() {
                    debug!(nonce, "language prompt closed before the click");
                }
            }
            None => debug!(nonce, "stale language button"),
        }

        if let Err(e) = interaction
            .create_response(http, CreateInteractionResponse::Acknowledge)
            .await
        {
            warn!(error = %e, "failed to acknowledge language button");
        }
        true
    }
}

fn parse_custom_id(custom_id: &str) -> Option<(&str, usize)> {
    let mut parts = custom_id.splitn(3, ':');
    if parts.next()? != PREFIX {
        return None;
    }
    let nonce = parts.next()?;
    let index = parts.next()?.parse().ok()?;
    (index < 2).then_some((nonce, index))
}

/// One language prompt posted to a channel.
pub struct ButtonPrompt {
    prompts: Arc<LanguagePrompts>,
    http: Arc<Http>,
    channel_id: ChannelId,
    message: Mutex<Option<MessageId>>,
}

impl ButtonPrompt {
    pub fn new(prompts: Arc<LanguagePrompts>, http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self {
            prompts,
            http,
            channel_id,
            message: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LanguagePrompt for ButtonPrompt {
    async fn choose(
        &self,
        choices: &[LanguageChoice; 2],
        timeout: Duration,
    ) -> Result<Option<LanguageChoice>, VoiceError> {
        let (nonce, rx) = self.prompts.register();

        let buttons = choices
            .iter()
            .enumerate()
            .map(|(i, choice)| {
                CreateButton::new(format!("{PREFIX}:{nonce}:{i}"))
                    .label(&choice.label)
                    .style(ButtonStyle::Primary)
            })
            .collect();
        let embed = CreateEmbed::new()
            .title("Language Selection")
            .description("Please select a language for speech recognition:")
            .colour(0x3498db);
        let msg = CreateMessage::new()
            .embed(embed)
            .components(vec![CreateActionRow::Buttons(buttons)]);

        let sent = match self.channel_id.send_message(&self.http, msg).await {
            Ok(sent) => sent,
            Err(e) => {
                self.prompts.forget(&nonce);
                return Err(VoiceError::Prompt(e.to_string()));
            }
        };
        if let Ok(mut slot) = self.message.lock() {
            *slot = Some(sent.id);
        }

        let picked = tokio::time::timeout(timeout, rx).await;
        self.prompts.forget(&nonce);
        Ok(match picked {
            Ok(Ok(index)) => choices.get(index).cloned(),
            _ => None,
        })
    }

    async fn dismiss(&self) {
        let message = self.message.lock().ok().and_then(|mut slot| slot.take());
        if let Some(id) = message {
            if let Err(e) = self.channel_id.delete_message(&self.http, id).await {
                debug!(error = %e, "could not delete language prompt");
            }
        }
    }
}
