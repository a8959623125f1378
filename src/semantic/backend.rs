//! Text-generation backends
//!
//! The prompted embedder only needs something that turns a prompt into text.
//! `OllamaGenerator` talks to a local Ollama server; tests plug in their own
//! implementations.

use super::error::{Result, SemanticError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral";

/// A backend that completes a prompt deterministically (temperature 0)
pub trait TextGenerator: Send + Sync {
    fn generate_text(&self, prompt: &str) -> Result<String>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate_text(&self, prompt: &str) -> Result<String> {
        (**self).generate_text(prompt)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama `/api/generate` client
pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a client for `base_url` using `model`
    ///
    /// With `timeout` set to `None` requests may block indefinitely.
    pub fn new(base_url: &str, model: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SemanticError::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl TextGenerator for OllamaGenerator {
    fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generate request");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| SemanticError::Embedding(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SemanticError::Embedding(format!(
                "Ollama returned error status: {status}"
            )));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|e| SemanticError::Embedding(format!("failed to parse Ollama response: {e}")))?;

        Ok(body.response)
    }
}
