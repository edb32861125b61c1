//! Blocking HTTP collaborators: text generation and embeddings against an
//! OpenAI-shaped API.
//!
//! The pipeline only ever needs single-turn request/response calls, so both
//! collaborators are plain blocking traits. Components take them as explicit
//! parameters instead of reaching for ambient credentials; tests substitute
//! scripted implementations.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const API_KEY_ENV: &str = "LITEXTRACT_API_KEY";
const API_KEY_FALLBACK_ENV: &str = "OPENAI_API_KEY";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Single-turn free-text generation. The core never relies on a structured
/// output mode; structure is recovered by the enumerated-answer parser.
pub trait TextGeneration {
    fn generate(&self, model: &str, system: Option<&str>, prompt: &str) -> Result<String>;
}

/// Text-to-vector embedding with a fixed dimensionality per model.
pub trait Embedding {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Blocking client for an OpenAI-compatible endpoint.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl ApiClient {
    /// Reads the API key from `LITEXTRACT_API_KEY`, falling back to
    /// `OPENAI_API_KEY`.
    pub fn from_env(base_url: &str) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_FALLBACK_ENV))
            .with_context(|| format!("neither {API_KEY_ENV} nor {API_KEY_FALLBACK_ENV} is set"))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TextGeneration for ApiClient {
    fn generate(&self, model: &str, system: Option<&str>, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(content) = system {
            messages.push(ChatMessage {
                role: "system",
                content,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model,
            messages,
            temperature: 0.0,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            bail!("chat completion returned {status}: {}", detail.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .context("failed to decode chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat completion response had no choices")?;

        Ok(content.trim().to_string())
    }
}

impl Embedding for ApiClient {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest { model, input: text };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            bail!("embedding request returned {status}: {}", detail.trim());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .context("failed to decode embedding response")?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .context("embedding response had no data entries")?;

        Ok(vector)
    }
}
