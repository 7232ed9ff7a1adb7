use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use gembot_core::config::GembotConfig;
use gembot_discord::DiscordAdapter;
use gembot_voice::VoiceManager;

mod app;
mod http;

/// Discord chat bot backed by Gemini.
#[derive(Debug, Parser)]
#[command(name = "gembot", version, about)]
struct Cli {
    /// Config file (default: $GEMBOT_CONFIG, then ~/.gembot/gembot.toml).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gembot_gateway=info,gembot_discord=info,gembot_agent=info,gembot_voice=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > GEMBOT_CONFIG env > ~/.gembot/gembot.toml
    let config_path = cli.config.or_else(|| std::env::var("GEMBOT_CONFIG").ok());
    let config = GembotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        GembotConfig::default()
    });
    if let Err(e) = config.validate() {
        warn!(code = e.code(), "{e}");
        return Err(e.into());
    }

    #[cfg(feature = "voice")]
    let (voice, link) = build_voice(&config);
    #[cfg(not(feature = "voice"))]
    let voice: Option<VoiceManager> = None;
    let discord_cfg = config.discord.clone();
    let health = config.health.clone();

    let state = Arc::new(app::AppState::new(config, voice));
    info!(
        model = %state.generator.model(),
        scope = ?state.config.sessions.scope,
        voice = state.voice.is_some(),
        "gembot starting"
    );

    let adapter = DiscordAdapter::new(&discord_cfg, Arc::clone(&state))?;
    #[cfg(feature = "voice")]
    let adapter = adapter.with_voice_link(&link);

    tokio::spawn(adapter.run());
    info!("Discord bot started");

    if health.enabled {
        let addr: SocketAddr = health.bind.parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("health endpoint listening on {}", addr);
        let router = app::build_router(Arc::clone(&state));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(error = %e, "health server stopped");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Some(voice) = &state.voice {
        voice.shutdown().await;
    }
    Ok(())
}

/// Wire the songbird link and the configured recognizer into a voice manager.
#[cfg(feature = "voice")]
fn build_voice(config: &GembotConfig) -> (Option<VoiceManager>, Arc<gembot_discord::SongbirdLink>) {
    let link = Arc::new(gembot_discord::SongbirdLink::new(
        std::time::Duration::from_millis(config.voice.silence_ms),
    ));
    let recognizer = gembot_voice::recognizer_from_config(&config.speech);
    if recognizer.is_none() {
        warn!("no speech backend configured, voice join will be refused");
    }
    let manager = VoiceManager::new(link.clone(), recognizer, &config.voice);
    (Some(manager), link)
}
