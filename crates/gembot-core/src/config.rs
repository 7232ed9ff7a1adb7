use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::SessionScope;

// Discord hard limit is 2000 characters per message.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Chunk size for model replies; leaves headroom under the hard limit.
pub const REPLY_CHUNK_CHARS: usize = 1700;
/// Chunk size for the history listing.
pub const HISTORY_CHUNK_CHARS: usize = DISCORD_MESSAGE_LIMIT;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SPEECH_BASE_URL: &str = "https://speech.googleapis.com/v1";
pub const DEFAULT_WHISPER_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PEXELS_BASE_URL: &str = "https://api.pexels.com/v1";

/// Top-level config (gembot.toml + GEMBOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GembotConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub slides: SlidesConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Prefix for text commands (`!ask`, `!reset`, ...).
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Register and answer slash commands.
    #[serde(default = "bool_true")]
    pub slash_commands: bool,
    /// When true, direct messages trigger the pipeline.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    /// Skip messages written by any bot account, not only our own.
    #[serde(default = "bool_true")]
    pub ignore_bots: bool,
    /// Online status: `online`, `idle`, `dnd`, `invisible`.
    #[serde(default = "default_status")]
    pub status: String,
    pub activity_name: Option<String>,
    /// `playing` (default), `listening`, `watching`, `competing`, `custom`.
    pub activity_type: Option<String>,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            command_prefix: default_prefix(),
            slash_commands: true,
            dm_allowed: true,
            ignore_bots: true,
            status: default_status(),
            activity_name: None,
            activity_type: None,
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            system_instruction: default_system_instruction(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub scope: SessionScope,
}

/// A selectable speech-recognition language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageChoice {
    /// Button label, e.g. `English`.
    pub label: String,
    /// BCP-47 code passed to the recognizer, e.g. `en-US`.
    pub code: String,
}

impl LanguageChoice {
    pub fn new(label: &str, code: &str) -> Self {
        Self {
            label: label.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Exactly two mutually exclusive choices, presented without a default.
    #[serde(default = "default_languages")]
    pub languages: [LanguageChoice; 2],
    #[serde(default = "default_selection_timeout_secs")]
    pub selection_timeout_secs: u64,
    /// Pause between listen iterations.
    #[serde(default = "default_loop_delay_ms")]
    pub loop_delay_ms: u64,
    /// Silence that closes an utterance on the Discord voice link.
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            selection_timeout_secs: default_selection_timeout_secs(),
            loop_delay_ms: default_loop_delay_ms(),
            silence_ms: default_silence_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// `google` (default), `openai_whisper`, or `none`.
    #[serde(default = "default_speech_backend")]
    pub backend: String,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: default_speech_backend(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidesConfig {
    #[serde(default = "default_slides_model")]
    pub model: String,
    /// Image slides are rendered without a picture when unset.
    pub pexels_api_key: Option<String>,
    #[serde(default = "default_pexels_base_url")]
    pub pexels_base_url: String,
    #[serde(default = "default_max_slides")]
    pub max_slides: u32,
}

impl Default for SlidesConfig {
    fn default() -> Self {
        Self {
            model: default_slides_model(),
            pexels_api_key: None,
            pexels_base_url: default_pexels_base_url(),
            max_slides: default_max_slides(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_health_bind")]
    pub bind: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_health_bind(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_prefix() -> String {
    "!".to_string()
}
fn default_status() -> String {
    "online".to_string()
}
fn default_max_attachment_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}
fn default_system_instruction() -> String {
    "You are a helpful bot!".to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_p() -> f32 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_languages() -> [LanguageChoice; 2] {
    [
        LanguageChoice::new("English", "en-US"),
        LanguageChoice::new("Vietnamese", "vi-VN"),
    ]
}
fn default_selection_timeout_secs() -> u64 {
    30
}
fn default_loop_delay_ms() -> u64 {
    200
}
fn default_silence_ms() -> u64 {
    800
}
fn default_speech_backend() -> String {
    "google".to_string()
}
fn default_slides_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_pexels_base_url() -> String {
    DEFAULT_PEXELS_BASE_URL.to_string()
}
fn default_max_slides() -> u32 {
    20
}
fn default_health_bind() -> String {
    "127.0.0.1:8089".to_string()
}

impl GembotConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Sources, later ones winning:
    ///   1. `config_path`, or `~/.gembot/gembot.toml` when `None`
    ///   2. legacy credential variables (`DISCORD_TOKEN`, `GOOGLE_AI_KEY`,
    ///      `GOOGLE_SPEECH_KEY`, `PEXELS_API_KEY`)
    ///   3. `GEMBOT_*` variables, `__` separating sections
    ///      (`GEMBOT_DISCORD__BOT_TOKEN`)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::GembotError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(legacy_env("DISCORD_TOKEN", "discord.bot_token"))
            .merge(legacy_env("GOOGLE_AI_KEY", "gemini.api_key"))
            .merge(legacy_env("GOOGLE_SPEECH_KEY", "speech.api_key"))
            .merge(legacy_env("PEXELS_API_KEY", "slides.pexels_api_key"))
            .merge(Env::prefixed("GEMBOT_").split("__"))
    }

    /// Fail fast on credentials the bot cannot run without.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(crate::error::GembotError::MissingCredential(
                "discord.bot_token",
            ));
        }
        if self.gemini.api_key.trim().is_empty() {
            return Err(crate::error::GembotError::MissingCredential(
                "gemini.api_key",
            ));
        }
        Ok(())
    }
}

/// Map a single unprefixed variable onto a nested config key.
fn legacy_env(var: &'static str, key: &'static str) -> Env {
    Env::raw().only(&[var]).map(move |_| key.into())
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gembot/gembot.toml", home)
}
