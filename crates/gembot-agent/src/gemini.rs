//! Google Gemini provider over the Generative Language REST API.
//!
//! Request flow:
//!   1. Build a `generateContent` body from history + prompt (or image + caption).
//!   2. POST to `{base_url}/models/{model}:generateContent`, key in the
//!      `x-goog-api-key` header.
//!   3. Map API errors, prompt blocks and empty candidates to
//!      [`GenerationResult::Failure`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gembot_core::config::GeminiConfig;
use gembot_core::types::{Role, Turn};

use crate::provider::{
    GenerationClient, GenerationResult, ImageInput, ProviderError, DEFAULT_IMAGE_PROMPT,
};

/// Sampling settings sent with every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl From<&GeminiConfig> for GenerationSettings {
    fn from(cfg: &GeminiConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            top_k: cfg.top_k,
            max_output_tokens: cfg.max_output_tokens,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    system_instruction: Option<String>,
    settings: GenerationSettings,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        let system_instruction = Some(config.system_instruction.clone())
            .filter(|s| !s.trim().is_empty());
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            system_instruction,
            settings: GenerationSettings::from(config),
        }
    }

    /// Same credentials and settings, different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, contents: Vec<Content>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents,
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            }),
            generation_config: self.settings.clone(),
        }
    }

    async fn send(&self, body: &GenerateContentRequest) -> Result<String, ProviderError> {
        debug!(model = %self.model, turns = body.contents.len(), "sending request to Gemini");

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            return Err(ProviderError::Api {
                status,
                message: api_error_message(&text),
            });
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        extract_text(parsed)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_text(&self, history: &[Turn], prompt: &str) -> GenerationResult {
        info!(model = %self.model, history = history.len(), "text prompt");

        let mut contents: Vec<Content> = history.iter().map(Content::from).collect();
        contents.push(Content {
            role: Some(Role::User.as_str().to_string()),
            parts: vec![Part::text(prompt)],
        });

        match self.send(&self.build_request(contents)).await {
            Ok(text) => GenerationResult::Text(text),
            Err(e) => e.into(),
        }
    }

    async fn generate_from_image(&self, image: &ImageInput, prompt: &str) -> GenerationResult {
        info!(model = %self.model, mime = %image.mime_type, bytes = image.bytes.len(), "image prompt");

        let caption = if prompt.trim().is_empty() {
            DEFAULT_IMAGE_PROMPT
        } else {
            prompt
        };
        let contents = vec![Content {
            role: Some(Role::User.as_str().to_string()),
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: STANDARD.encode(&image.bytes),
                    },
                },
                Part::text(format!("\n{caption}")),
            ],
        }];

        match self.send(&self.build_request(contents)).await {
            Ok(text) => GenerationResult::Text(text),
            Err(e) => e.into(),
        }
    }
}

/// Pull the `error.message` out of a Google API error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| {
            let msg = w.error.message?;
            Some(match w.error.status {
                Some(status) if !status.is_empty() => format!("{status}: {msg}"),
                _ => msg,
            })
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_text(resp: GenerateContentResponse) -> Result<String, ProviderError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked(reason));
    }

    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Empty("no candidates".to_string()))?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::Empty(
            candidate.finish_reason.unwrap_or_else(|| "unknown".to_string()),
        ));
    }
    Ok(text)
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        Self {
            role: Some(turn.role.as_str().to_string()),
            parts: turn.parts.iter().map(Part::text).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    fn text(s: impl Into<String>) -> Self {
        Part::Text { text: s.into() }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
