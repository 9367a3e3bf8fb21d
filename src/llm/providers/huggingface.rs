//! HuggingFace inference API provider (`POST {base}/{model_id}`).
//!
//! Text-generation models take a single `inputs` string and echo it back at
//! the start of `generated_text`; the echo is stripped before returning.
//! History entries, when a window is configured, are flattened into the
//! prompt one per line.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::llm::{InferenceError, ProviderError, classify, classify_unparsed};
use crate::subsystems::memory::Turn;

#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    client: Client,
    api_base_url: String,
    max_length: u32,
    temperature: f32,
    api_key: Option<String>,
}

impl HuggingFaceProvider {
    /// The free tier accepts anonymous requests; `api_key` raises limits.
    pub fn new(
        api_base_url: String,
        max_length: u32,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, max_length, temperature, api_key })
    }

    pub async fn complete(&self, model: &str, messages: &[Turn]) -> Result<String, InferenceError> {
        let inputs = messages
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let payload = GenerationRequest {
            inputs: &inputs,
            parameters: GenerationParameters {
                max_length: self.max_length,
                temperature: self.temperature,
                do_sample: true,
            },
        };

        let url = format!("{}/{model}", self.api_base_url.trim_end_matches('/'));
        debug!(%url, inputs_len = inputs.len(), "sending text-generation request");

        let mut req = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(%url, error = %e, "HuggingFace request failed (transport)");
            InferenceError::transport(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| InferenceError::transport(&e))?;

        if !status.is_success() {
            let err = classify(status, &body);
            error!(%status, error = %err, "HuggingFace request returned HTTP error");
            return Err(err);
        }

        let generations: Vec<Generation> = serde_json::from_str(&body).map_err(|e| {
            let err = classify_unparsed(status, &body, &e);
            error!(error = %err, "failed to deserialize HuggingFace response");
            err
        })?;

        let generated = generations
            .into_iter()
            .next()
            .and_then(|g| g.generated_text)
            .ok_or_else(|| InferenceError::Unavailable("no generated_text in response".into()))?;

        let reply = strip_echo(&generated, &inputs);
        if reply.is_empty() {
            return Err(InferenceError::Unavailable("model returned only the prompt".into()));
        }
        Ok(reply)
    }
}

/// Remove the first occurrence of the prompt from the model output.
fn strip_echo(generated: &str, prompt: &str) -> String {
    if prompt.is_empty() {
        return generated.trim().to_string();
    }
    generated.replacen(prompt, "", 1).trim().to_string()
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_length: u32,
    temperature: f32,
    do_sample: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: Option<String>,
}
