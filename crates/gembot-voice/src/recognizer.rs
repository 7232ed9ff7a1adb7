//! Speech recognition backends.
//!
//! Selected by `speech.backend`:
//! - `"google"`: Google Cloud Speech-to-Text REST (`speech:recognize`, LINEAR16)
//! - `"openai_whisper"`: OpenAI Whisper transcription API (multipart WAV)
//! - `"none"`: disabled, so `join` answers that transcription is unavailable

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::{debug, warn};

use gembot_core::config::{SpeechConfig, DEFAULT_SPEECH_BASE_URL, DEFAULT_WHISPER_BASE_URL};

use crate::error::RecognitionError;
use crate::types::{Recognition, SpeechRecognizer, Utterance};
use crate::wav::{encode_wav, pcm_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    None,
    Google,
    OpenAiWhisper,
}

impl SpeechBackend {
    pub fn from_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "google" | "google_stt" => Self::Google,
            "openai_whisper" | "openai" | "whisper_api" => Self::OpenAiWhisper,
            _ => Self::None,
        }
    }
}

/// Build the configured recognizer.
///
/// `None` when speech is disabled or the selected backend has no API key.
pub fn recognizer_from_config(cfg: &SpeechConfig) -> Option<Arc<dyn SpeechRecognizer>> {
    let backend = SpeechBackend::from_config(&cfg.backend);
    if backend != SpeechBackend::None && cfg.api_key.trim().is_empty() {
        warn!(backend = %cfg.backend, "speech backend selected without an API key");
        return None;
    }
    match backend {
        SpeechBackend::None => None,
        SpeechBackend::Google => Some(Arc::new(GoogleSpeech::new(
            cfg.api_key.clone(),
            cfg.base_url.as_deref().unwrap_or(DEFAULT_SPEECH_BASE_URL),
        ))),
        SpeechBackend::OpenAiWhisper => Some(Arc::new(WhisperSpeech::new(
            cfg.api_key.clone(),
            cfg.base_url.as_deref().unwrap_or(DEFAULT_WHISPER_BASE_URL),
        ))),
    }
}

// ── Google ───────────────────────────────────────────────────────────────────

pub struct GoogleSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleSpeech {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    #[serde(default)]
    alternatives: Vec<GoogleAlternative>,
}

#[derive(Deserialize)]
struct GoogleAlternative {
    #[serde(default)]
    transcript: String,
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeech {
    fn name(&self) -> &str {
        "google"
    }

    async fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Recognition, RecognitionError> {
        if self.api_key.is_empty() {
            return Err(RecognitionError::NotConfigured);
        }

        let body = serde_json::json!({
            "config": {
                "encoding": "LINEAR16",
                "sampleRateHertz": utterance.sample_rate,
                "languageCode": language,
                "audioChannelCount": 1,
            },
            "audio": { "content": STANDARD.encode(pcm_bytes(&utterance.samples)) },
        });

        let resp = self
            .client
            .post(format!("{}/speech:recognize", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, "speech API error");
            return Err(RecognitionError::Api { status, message });
        }

        let parsed: GoogleResponse = resp
            .json()
            .await
            .map_err(|e| RecognitionError::Parse(e.to_string()))?;

        let transcript = parsed
            .results
            .into_iter()
            .filter_map(|r| r.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .collect::<Vec<_>>()
            .join(" ");

        debug!(chars = transcript.len(), "google recognition done");
        Ok(as_recognition(transcript))
    }
}

// ── OpenAI Whisper ───────────────────────────────────────────────────────────

pub struct WhisperSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl WhisperSpeech {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperSpeech {
    fn name(&self) -> &str {
        "openai_whisper"
    }

    async fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Recognition, RecognitionError> {
        if self.api_key.is_empty() {
            return Err(RecognitionError::NotConfigured);
        }

        let wav = encode_wav(&utterance.samples, utterance.sample_rate, 1);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| RecognitionError::Parse(e.to_string()))?;

        // Whisper takes ISO-639-1 codes; drop any region suffix.
        let iso = language.split(['-', '_']).next().unwrap_or(language);
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("language", iso.to_string())
            .part("file", part);

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RecognitionError::Api { status, message });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RecognitionError::Parse(e.to_string()))?;
        let text = json["text"]
            .as_str()
            .ok_or_else(|| RecognitionError::Parse("no 'text' field in response".to_string()))?;

        Ok(as_recognition(text.to_string()))
    }
}

fn as_recognition(text: String) -> Recognition {
    let text = text.trim();
    if text.is_empty() {
        Recognition::Unrecognized
    } else {
        Recognition::Transcript(text.to_string())
    }
}
