//! Delivery targets for pipeline output: a plain channel, or a deferred slash
//! command interaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{
    CreateAttachment, CreateInteractionResponseFollowup, CreateMessage, EditInteractionResponse,
};
use serenity::http::Http;
use serenity::model::application::CommandInteraction;
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId};

use gembot_agent::{ReplyTarget, TransportError};

/// Replies posted to a channel, reacting on the triggering message if any.
pub struct ChannelReply {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: Option<MessageId>,
}

impl ChannelReply {
    pub fn new(http: Arc<Http>, channel_id: ChannelId, message_id: Option<MessageId>) -> Self {
        Self {
            http,
            channel_id,
            message_id,
        }
    }
}

#[async_trait]
impl ReplyTarget for ChannelReply {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        self.channel_id
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn react(&self, emoji: &str) -> Result<(), TransportError> {
        let Some(message_id) = self.message_id else {
            return Ok(());
        };
        self.channel_id
            .create_reaction(
                &self.http,
                message_id,
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(|e| TransportError::React(e.to_string()))
    }

    async fn typing(&self) -> Result<(), TransportError> {
        self.channel_id
            .broadcast_typing(&self.http)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn attach(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut msg = CreateMessage::new().add_file(CreateAttachment::bytes(bytes, filename));
        if let Some(caption) = caption {
            msg = msg.content(caption);
        }
        self.channel_id
            .send_message(&self.http, msg)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Attach(e.to_string()))
    }
}

/// Replies to a deferred slash command.
///
/// The first message replaces the "thinking…" placeholder; later ones go to
/// the channel so they outlive the interaction token.
pub struct InteractionReply {
    http: Arc<Http>,
    command: CommandInteraction,
    answered: AtomicBool,
}

impl InteractionReply {
    pub fn new(http: Arc<Http>, command: CommandInteraction) -> Self {
        Self {
            http,
            command,
            answered: AtomicBool::new(false),
        }
    }

    /// Overwrite the interaction's own response message.
    pub async fn edit(&self, text: &str) -> Result<(), TransportError> {
        self.answered.store(true, Ordering::SeqCst);
        self.command
            .edit_response(&self.http, EditInteractionResponse::new().content(text))
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl ReplyTarget for InteractionReply {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        if !self.answered.swap(true, Ordering::SeqCst) {
            return self.edit(text).await;
        }
        self.command
            .channel_id
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn react(&self, _emoji: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn attach(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let file = CreateAttachment::bytes(bytes, filename);
        let result = if !self.answered.swap(true, Ordering::SeqCst) {
            let mut edit = EditInteractionResponse::new().new_attachment(file);
            if let Some(caption) = caption {
                edit = edit.content(caption);
            }
            self.command
                .edit_response(&self.http, edit)
                .await
                .map(|_| ())
        } else {
            let mut followup = CreateInteractionResponseFollowup::new().add_file(file);
            if let Some(caption) = caption {
                followup = followup.content(caption);
            }
            self.command
                .create_followup(&self.http, followup)
                .await
                .map(|_| ())
        };
        result.map_err(|e| TransportError::Attach(e.to_string()))
    }
}
