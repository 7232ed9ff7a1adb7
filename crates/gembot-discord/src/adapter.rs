use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use gembot_core::config::DiscordConfig;

use crate::context::DiscordAppContext;
use crate::error::DiscordError;
use crate::handler::DiscordHandler;
use crate::language::LanguagePrompts;

/// Discord channel adapter.
///
/// Wraps a serenity `Client` and drives the event loop until the process exits.
/// Reconnects whenever the gateway drops.
pub struct DiscordAdapter<C: DiscordAppContext> {
    ctx: Arc<C>,
    config: DiscordConfig,
    /// Shared across reconnects so pending language buttons survive a rebuild.
    prompts: Arc<LanguagePrompts>,
    #[cfg(feature = "voice")]
    songbird: Option<Arc<songbird::Songbird>>,
}

impl<C: DiscordAppContext> DiscordAdapter<C> {
    pub fn new(config: &DiscordConfig, ctx: Arc<C>) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            ctx,
            config: config.clone(),
            prompts: Arc::new(LanguagePrompts::new()),
            #[cfg(feature = "voice")]
            songbird: None,
        })
    }

    /// Register the songbird manager behind `link` on every client we build.
    #[cfg(feature = "voice")]
    pub fn with_voice_link(mut self, link: &crate::voice_link::SongbirdLink) -> Self {
        self.songbird = Some(link.songbird());
        self
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Never returns. Runs for the lifetime of the process.
    pub async fn run(self) {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES;

        loop {
            let mut client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: connect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };

            info!("Discord: gateway connecting");

            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Build a fresh serenity `Client` with our event handler.
    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, DiscordError> {
        let handler = DiscordHandler {
            ctx: Arc::clone(&self.ctx),
            config: self.config.clone(),
            bot_id: OnceLock::new(),
            prompts: Arc::clone(&self.prompts),
        };

        let builder = Client::builder(&self.config.bot_token, intents).event_handler(handler);

        #[cfg(feature = "voice")]
        let builder = match &self.songbird {
            Some(songbird) => {
                use songbird::SerenityInit;
                builder.register_songbird_with(Arc::clone(songbird))
            }
            None => builder,
        };

        Ok(builder.await?)
    }
}
