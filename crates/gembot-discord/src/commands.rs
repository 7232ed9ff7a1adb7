//! Bot commands: `ask`, `reset`, `history`, `join`, `leave`, `slide`.
//!
//! Each command is reachable as a slash command and as a prefix command
//! (`!ask …`). Both forms are parsed into [`BotCommand`] and run by [`execute`].
//! Slash registration happens in `ready()` when `config.slash_commands` is true.

use std::sync::Arc;

use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditMessage,
};
use serenity::model::application::{Command, CommandInteraction, CommandOptionType};
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::prelude::Context;
use tracing::{debug, info, warn};

use gembot_agent::{
    run_ask, run_history, run_reset, AskRequest, AttachmentRef, ReplyTarget, Trigger,
};
use gembot_core::types::SessionKey;
use gembot_voice::JoinRequest;

use crate::attach::to_attachment_ref;
use crate::context::DiscordAppContext;
use crate::language::{ButtonPrompt, LanguagePrompts};
use crate::reply::InteractionReply;

pub const SLIDE_USAGE: &str = "Usage: slide <topic> <number of slides>";
pub const SLIDE_WORKING_TEXT: &str = "The bot is working on generating the slides. Please wait...";
pub const SLIDE_DONE_TEXT: &str = "Done! The presentation is ready. You can download it now";
pub const VOICE_UNAVAILABLE_TEXT: &str = "Voice transcription is not available in this build.";
pub const GUILD_ONLY_TEXT: &str = "Voice commands only work in a server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Ask(String),
    Reset,
    History,
    Join,
    Leave,
    Slide { topic: String, count: i64 },
}

/// Parse a prefix command such as `!ask what is rust?`.
///
/// `None` when `content` is not a known command; `Err` carries a usage hint.
pub fn parse_prefix(content: &str, prefix: &str) -> Option<Result<BotCommand, &'static str>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let cmd = match name.to_lowercase().as_str() {
        "ask" => BotCommand::Ask(args.to_string()),
        "reset" => BotCommand::Reset,
        "history" => BotCommand::History,
        "join" => BotCommand::Join,
        "leave" => BotCommand::Leave,
        "slide" => return Some(parse_slide_args(args)),
        _ => return None,
    };
    Some(Ok(cmd))
}

fn parse_slide_args(args: &str) -> Result<BotCommand, &'static str> {
    let (topic, count) = args.rsplit_once(char::is_whitespace).ok_or(SLIDE_USAGE)?;
    let count = count.parse().map_err(|_| SLIDE_USAGE)?;
    let topic = topic.trim().trim_matches('"').to_string();
    if topic.is_empty() {
        return Err(SLIDE_USAGE);
    }
    Ok(BotCommand::Slide { topic, count })
}

/// Register global slash commands. Call from `ready()`.
pub async fn register_commands(ctx: &Context, guild_id: Option<GuildId>, max_slides: u32) {
    let commands = vec![
        CreateCommand::new("ask")
            .description("Ask Gemini a question, with optional image support")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "query", "Your question")
                    .required(false),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::Attachment, "image", "An image to ask about")
                    .required(false),
            ),
        CreateCommand::new("reset").description("Reset the conversation history with the bot"),
        CreateCommand::new("history").description("Show the conversation history"),
        CreateCommand::new("join").description("Join your voice channel and start speech-to-text"),
        CreateCommand::new("leave").description("Leave the voice channel and cancel all operations"),
        CreateCommand::new("slide")
            .description("Generate a slide deck on a topic")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "topic", "Deck topic")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::Integer, "slide_length", "Number of slides")
                    .min_int_value(1)
                    .max_int_value(u64::from(max_slides))
                    .required(true),
            ),
    ];

    match guild_id {
        Some(gid) => match gid.set_commands(&ctx.http, commands).await {
            Ok(cmds) => info!(guild = %gid, count = cmds.len(), "registered guild slash commands"),
            Err(e) => warn!(guild = %gid, error = %e, "failed to register guild commands"),
        },
        None => match Command::set_global_commands(&ctx.http, commands).await {
            Ok(cmds) => info!(count = cmds.len(), "registered global slash commands"),
            Err(e) => warn!(error = %e, "failed to register global slash commands"),
        },
    }
}

fn from_interaction(command: &CommandInteraction) -> Option<BotCommand> {
    let opt = |name: &str| command.data.options.iter().find(|o| o.name == name);
    let cmd = match command.data.name.as_str() {
        "ask" => BotCommand::Ask(
            opt("query")
                .and_then(|o| o.value.as_str())
                .unwrap_or_default()
                .to_string(),
        ),
        "reset" => BotCommand::Reset,
        "history" => BotCommand::History,
        "join" => BotCommand::Join,
        "leave" => BotCommand::Leave,
        "slide" => BotCommand::Slide {
            topic: opt("topic")
                .and_then(|o| o.value.as_str())
                .unwrap_or_default()
                .to_string(),
            count: opt("slide_length")
                .and_then(|o| o.value.as_i64())
                .unwrap_or_default(),
        },
        _ => return None,
    };
    Some(cmd)
}

fn interaction_attachments(command: &CommandInteraction) -> Vec<AttachmentRef> {
    command
        .data
        .options
        .iter()
        .filter_map(|o| o.value.as_attachment_id())
        .filter_map(|id| command.data.resolved.attachments.get(&id))
        .map(to_attachment_ref)
        .collect()
}

/// Where a command came from and where its output goes.
pub struct Invocation {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub session: SessionKey,
    pub reply: Arc<dyn ReplyTarget>,
    /// Set for slash commands, so status lines can edit the response in place.
    pub interaction: Option<Arc<InteractionReply>>,
}

/// Dispatch a slash command interaction.
pub async fn handle_interaction<C: DiscordAppContext>(
    app: &Arc<C>,
    ctx: &Context,
    prompts: &Arc<LanguagePrompts>,
    command: CommandInteraction,
) {
    let Some(cmd) = from_interaction(&command) else {
        if let Err(e) = command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("Unknown command.")
                        .ephemeral(true),
                ),
            )
            .await
        {
            debug!(command = %command.data.name, error = %e, "failed to answer unknown command");
        }
        return;
    };

    // Defer the response (shows "thinking...").
    if let Err(e) = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await
    {
        warn!(command = %command.data.name, error = %e, "failed to defer slash command");
        return;
    }

    let attachments = interaction_attachments(&command);
    let session = app
        .session_scope()
        .key_for(command.user.id.get(), command.channel_id.get());
    let interaction = Arc::new(InteractionReply::new(Arc::clone(&ctx.http), command.clone()));
    let inv = Invocation {
        guild_id: command.guild_id,
        channel_id: command.channel_id,
        user_id: command.user.id,
        session,
        reply: interaction.clone(),
        interaction: Some(interaction),
    };

    execute(app, ctx, prompts, &inv, cmd, &attachments).await;
}

/// Run one parsed command. Failures are logged; the user sees whatever the
/// command managed to post.
pub async fn execute<C: DiscordAppContext>(
    app: &Arc<C>,
    ctx: &Context,
    prompts: &Arc<LanguagePrompts>,
    inv: &Invocation,
    cmd: BotCommand,
    attachments: &[AttachmentRef],
) {
    let reply = inv.reply.as_ref();
    let result = match cmd {
        BotCommand::Ask(query) => run_ask(
            app.as_ref(),
            reply,
            AskRequest {
                session: inv.session.clone(),
                content: &query,
                attachments,
                trigger: Trigger::Command,
            },
        )
        .await
        .map(|_| ()),
        BotCommand::Reset => run_reset(app.as_ref(), reply, &inv.session).await,
        BotCommand::History => run_history(app.as_ref(), reply, &inv.session).await,
        BotCommand::Join => {
            join(app, ctx, prompts, inv).await;
            Ok(())
        }
        BotCommand::Leave => {
            leave(app, inv).await;
            Ok(())
        }
        BotCommand::Slide { topic, count } => {
            slide(app, ctx, inv, &topic, count).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(session = %inv.session, error = %e, "command reply failed");
    }
}

/// The caller's current voice channel, from the guild cache.
fn caller_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<(u64, String)> {
    let guild = ctx.cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&user_id)?.channel_id?;
    let name = guild
        .channels
        .get(&channel_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| channel_id.to_string());
    Some((channel_id.get(), name))
}

async fn join<C: DiscordAppContext>(
    app: &Arc<C>,
    ctx: &Context,
    prompts: &Arc<LanguagePrompts>,
    inv: &Invocation,
) {
    let notice = match (app.voice(), inv.guild_id) {
        (None, _) => Some(VOICE_UNAVAILABLE_TEXT),
        (Some(_), None) => Some(GUILD_ONLY_TEXT),
        _ => None,
    };
    if let Some(text) = notice {
        if let Err(e) = inv.reply.say(text).await {
            warn!(error = %e, "join reply failed");
        }
        return;
    }
    let (Some(voice), Some(guild_id)) = (app.voice(), inv.guild_id) else {
        return;
    };

    let req = JoinRequest {
        guild_id: guild_id.get(),
        voice_channel: caller_voice_channel(ctx, guild_id, inv.user_id),
    };
    let prompt = ButtonPrompt::new(Arc::clone(prompts), Arc::clone(&ctx.http), inv.channel_id);

    match voice.join(req, &prompt, Arc::clone(&inv.reply)).await {
        Ok(outcome) => info!(guild = %guild_id, ?outcome, "voice join finished"),
        Err(e) => warn!(guild = %guild_id, error = %e, "voice join failed"),
    }
}

async fn leave<C: DiscordAppContext>(app: &Arc<C>, inv: &Invocation) {
    let (Some(voice), Some(guild_id)) = (app.voice(), inv.guild_id) else {
        let text = if app.voice().is_none() {
            VOICE_UNAVAILABLE_TEXT
        } else {
            GUILD_ONLY_TEXT
        };
        if let Err(e) = inv.reply.say(text).await {
            warn!(error = %e, "leave reply failed");
        }
        return;
    };

    match voice.leave(guild_id.get(), inv.reply.as_ref()).await {
        Ok(outcome) => info!(guild = %guild_id, ?outcome, "voice leave finished"),
        Err(e) => warn!(guild = %guild_id, error = %e, "voice leave failed"),
    }
}

/// A status message that is posted once and then edited in place.
enum StatusLine {
    Interaction(Arc<InteractionReply>),
    Message(Message),
    /// Posting the initial message failed; later updates go out as new messages.
    Detached,
}

impl StatusLine {
    async fn post(ctx: &Context, inv: &Invocation, text: &str) -> Self {
        if let Some(interaction) = &inv.interaction {
            if let Err(e) = interaction.edit(text).await {
                warn!(error = %e, "status edit failed");
            }
            return StatusLine::Interaction(Arc::clone(interaction));
        }
        match inv.channel_id.say(&ctx.http, text).await {
            Ok(msg) => StatusLine::Message(msg),
            Err(e) => {
                warn!(error = %e, "status post failed");
                StatusLine::Detached
            }
        }
    }

    async fn set(&mut self, ctx: &Context, inv: &Invocation, text: &str) {
        let result = match self {
            StatusLine::Interaction(interaction) => {
                interaction.edit(text).await.map_err(|e| e.to_string())
            }
            StatusLine::Message(msg) => msg
                .edit(ctx, EditMessage::new().content(text))
                .await
                .map_err(|e| e.to_string()),
            StatusLine::Detached => inv.reply.say(text).await.map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            warn!(error = %e, "status update failed");
        }
    }
}

async fn slide<C: DiscordAppContext>(
    app: &Arc<C>,
    ctx: &Context,
    inv: &Invocation,
    topic: &str,
    count: i64,
) {
    let mut status = StatusLine::post(ctx, inv, SLIDE_WORKING_TEXT).await;

    match app.slides().generate(topic, count).await {
        Ok(deck) => {
            info!(topic, slides = deck.slides, file = %deck.filename, "slide deck generated");
            status.set(ctx, inv, SLIDE_DONE_TEXT).await;
            if let Err(e) = inv
                .reply
                .attach(&deck.filename, deck.markdown.into_bytes(), None)
                .await
            {
                warn!(error = %e, "slide deck upload failed");
                status
                    .set(
                        ctx,
                        inv,
                        &format!("An error occurred while generating the slides: {e}"),
                    )
                    .await;
            }
        }
        Err(e) => {
            warn!(topic, error = %e, "slide generation failed");
            status
                .set(
                    ctx,
                    inv,
                    &format!("An error occurred while generating the slides: {e}"),
                )
                .await;
        }
    }
}
