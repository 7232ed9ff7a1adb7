//! Seams between the voice manager and the outside world.
//!
//! The chat adapter supplies the connector, the utterance source and the
//! language prompt; a speech service supplies the recognizer.

use std::time::Duration;

use async_trait::async_trait;

use gembot_core::config::LanguageChoice;

use crate::error::{RecognitionError, VoiceError};

/// One captured utterance: mono signed 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Transcript(String),
    /// The service heard audio but could not make out any words.
    Unrecognized,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Recognition, RecognitionError>;
}

/// Stream of utterances from a live voice connection.
#[async_trait]
pub trait UtteranceSource: Send {
    /// Wait for the next utterance. `Ok(None)` means the connection is gone.
    async fn next_utterance(&mut self) -> Result<Option<Utterance>, VoiceError>;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Box<dyn UtteranceSource>, VoiceError>;

    async fn disconnect(&self, guild_id: u64) -> Result<(), VoiceError>;
}

/// Interactive two-way language choice.
#[async_trait]
pub trait LanguagePrompt: Send + Sync {
    /// Present both choices and wait for a pick. `Ok(None)` when the prompt
    /// closes before anyone chooses.
    async fn choose(
        &self,
        choices: &[LanguageChoice; 2],
        timeout: Duration,
    ) -> Result<Option<LanguageChoice>, VoiceError>;

    /// Remove the prompt from the channel.
    async fn dismiss(&self);
}
