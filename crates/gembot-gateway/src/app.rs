use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};

use gembot_agent::{AttachmentFetcher, GeminiClient, GenerationClient, MessageContext};
use gembot_core::config::GembotConfig;
use gembot_core::types::SessionScope;
use gembot_discord::DiscordAppContext;
use gembot_sessions::SessionStore;
use gembot_slides::{ImageSearch, PexelsClient, SlideGenerator};
use gembot_voice::VoiceManager;

/// Central shared state, handed to the Discord adapter and to Axum handlers.
pub struct AppState {
    pub config: GembotConfig,
    pub sessions: SessionStore,
    pub generator: GeminiClient,
    pub fetcher: AttachmentFetcher,
    pub slides: SlideGenerator,
    /// `None` when the binary was built without the `voice` feature.
    pub voice: Option<VoiceManager>,
    pub started: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: GembotConfig, voice: Option<VoiceManager>) -> Self {
        let generator = GeminiClient::new(&config.gemini);

        let deck_writer = Arc::new(generator.clone().with_model(config.slides.model.as_str()));
        let images = config
            .slides
            .pexels_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|key| {
                Arc::new(PexelsClient::new(key, &config.slides.pexels_base_url))
                    as Arc<dyn ImageSearch>
            });
        let slides = SlideGenerator::new(deck_writer, images, config.slides.max_slides);

        Self {
            sessions: SessionStore::new(),
            fetcher: AttachmentFetcher::new(config.discord.max_attachment_bytes),
            generator,
            slides,
            voice,
            started: Instant::now(),
            started_at: Utc::now(),
            config,
        }
    }
}

impl MessageContext for AppState {
    fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn generator(&self) -> &dyn GenerationClient {
        &self.generator
    }

    fn fetcher(&self) -> &AttachmentFetcher {
        &self.fetcher
    }

    fn session_scope(&self) -> SessionScope {
        self.config.sessions.scope
    }
}

impl DiscordAppContext for AppState {
    fn voice(&self) -> Option<&VoiceManager> {
        self.voice.as_ref()
    }

    fn slides(&self) -> &SlideGenerator {
        &self.slides
    }
}

/// Assemble the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
