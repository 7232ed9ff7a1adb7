use std::sync::{Arc, OnceLock};

use serenity::all::ActivityData;
use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info, warn};

use gembot_agent::{run_ask, AskRequest, ReplyTarget, Trigger};
use gembot_core::config::DiscordConfig;

use crate::attach::to_attachment_refs;
use crate::commands::{self, Invocation};
use crate::context::DiscordAppContext;
use crate::language::LanguagePrompts;
use crate::reply::ChannelReply;

/// Serenity event handler wired to the chat pipeline.
pub struct DiscordHandler<C: DiscordAppContext> {
    pub ctx: Arc<C>,
    pub config: DiscordConfig,
    pub bot_id: OnceLock<UserId>,
    pub prompts: Arc<LanguagePrompts>,
}

#[async_trait]
impl<C: DiscordAppContext> EventHandler for DiscordHandler<C> {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();

        // Config-driven presence.
        let status = parse_online_status(&self.config.status);
        let activity = build_activity(&self.config);
        ctx.set_presence(activity, status);

        info!(name = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");

        if self.config.slash_commands {
            commands::register_commands(&ctx, None, self.ctx.slides().max_slides()).await;
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(bot_id) = self.bot_id.get().copied() else {
            return;
        };
        if msg.author.id == bot_id || (msg.author.bot && self.config.ignore_bots) {
            return;
        }

        let is_dm = msg.guild_id.is_none();
        if is_dm && !self.config.dm_allowed {
            return;
        }

        let session = self
            .ctx
            .session_scope()
            .key_for(msg.author.id.get(), msg.channel_id.get());
        let reply: Arc<dyn ReplyTarget> = Arc::new(ChannelReply::new(
            Arc::clone(&ctx.http),
            msg.channel_id,
            Some(msg.id),
        ));
        let attachments = to_attachment_refs(&msg.attachments);

        // Prefix commands take precedence over passive triggers.
        if let Some(parsed) = commands::parse_prefix(&msg.content, &self.config.command_prefix) {
            let cmd = match parsed {
                Ok(cmd) => cmd,
                Err(usage) => {
                    if let Err(e) = reply.say(usage).await {
                        warn!(error = %e, "usage reply failed");
                    }
                    return;
                }
            };
            debug!(?cmd, author = %msg.author.id, "prefix command");

            let inv = Invocation {
                guild_id: msg.guild_id,
                channel_id: msg.channel_id,
                user_id: msg.author.id,
                session,
                reply,
                interaction: None,
            };
            let app = Arc::clone(&self.ctx);
            let prompts = Arc::clone(&self.prompts);
            tokio::spawn(async move {
                commands::execute(&app, &ctx, &prompts, &inv, cmd, &attachments).await;
            });
            return;
        }

        // Passive trigger: a DM, or a direct mention that is not @everyone.
        let mentioned = msg.mentions_user_id(bot_id) && !msg.mention_everyone;
        if !is_dm && !mentioned {
            return;
        }

        let app = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let req = AskRequest {
                session: session.clone(),
                content: &msg.content,
                attachments: &attachments,
                trigger: Trigger::Passive,
            };
            if let Err(e) = run_ask(app.as_ref(), reply.as_ref(), req).await {
                warn!(session = %session, error = %e, "passive reply failed");
            }
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) if self.config.slash_commands => {
                commands::handle_interaction(&self.ctx, &ctx, &self.prompts, command).await;
            }
            Interaction::Component(component) => {
                if !self.prompts.resolve(&ctx.http, &component).await {
                    debug!(custom_id = %component.data.custom_id, "unhandled component");
                }
            }
            _ => {}
        }
    }
}

/// Parse a config status string into serenity's `OnlineStatus`.
fn parse_online_status(s: &str) -> OnlineStatus {
    match s.to_lowercase().as_str() {
        "idle" => OnlineStatus::Idle,
        "dnd" | "do_not_disturb" => OnlineStatus::DoNotDisturb,
        "invisible" => OnlineStatus::Invisible,
        _ => OnlineStatus::Online,
    }
}

fn build_activity(config: &DiscordConfig) -> Option<ActivityData> {
    let name = config.activity_name.as_deref()?;
    let kind = config.activity_type.as_deref().unwrap_or("playing");
    Some(match kind.to_lowercase().as_str() {
        "listening" => ActivityData::listening(name),
        "watching" => ActivityData::watching(name),
        "competing" => ActivityData::competing(name),
        "custom" => ActivityData::custom(name),
        _ => ActivityData::playing(name),
    })
}
