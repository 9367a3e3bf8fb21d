//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Used for OpenRouter. One instance serves every catalog model routed to
//! it; the remote model id travels with each call. All wire types are
//! private to this module.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{InferenceError, ProviderError, classify, classify_unparsed};
use crate::subsystems::memory::Turn;

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
    title: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `api_key`, when present, is sent as `Authorization: Bearer <key>`.
    /// `title` is sent as `X-Title` (OpenRouter's app attribution header).
    pub fn new(
        api_base_url: String,
        temperature: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        api_key: Option<String>,
        title: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, temperature, max_tokens, api_key, title })
    }

    pub async fn complete(&self, model: &str, messages: &[Turn]) -> Result<String, InferenceError> {
        let payload = ChatCompletionRequest {
            model,
            messages: messages
                .iter()
                .map(|t| Message { role: t.role.as_str(), content: &t.content })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(%model, messages = payload.messages.len(), "sending chat completion request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(title) = &self.title {
            req = req.header("X-Title", title.as_str());
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            InferenceError::transport(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| InferenceError::transport(&e))?;

        if !status.is_success() {
            let err = classify(status, &body);
            error!(%status, error = %err, "LLM request returned HTTP error");
            return Err(err);
        }

        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                // Some gateways report failures with a 200 and an error envelope.
                let err = classify_unparsed(status, &body, &e);
                error!(error = %err, "failed to deserialize LLM response");
                return Err(err);
            }
        };

        debug!(choices = parsed.choices.len(), "received chat completion response");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| InferenceError::Unavailable("empty or missing content in response".into()))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            format!("{}/api/v1/chat/completions", server.uri()),
            0.7,
            300,
            5,
            key.map(str::to_string),
            Some("Relay Bot".into()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_expected_body_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-title", "Relay Bot"))
            .and(body_partial_json(json!({
                "model": "vendor/model:free",
                "messages": [
                    {"role": "user", "content": "earlier"},
                    {"role": "assistant", "content": "reply"},
                    {"role": "user", "content": "hello"}
                ],
                "max_tokens": 300
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, Some("sk-test"));
        let messages = [Turn::user("earlier"), Turn::assistant("reply"), Turn::user("hello")];
        let text = p.complete("vendor/model:free", &messages).await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        for (status, expected) in [
            (401u16, InferenceError::Unauthorized),
            (402, InferenceError::InsufficientCredit),
            (429, InferenceError::RateLimited),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": {"message": "nope", "code": status}
                })))
                .mount(&server)
                .await;
            let err = provider(&server, None).complete("m", &[Turn::user("x")]).await.unwrap_err();
            assert_eq!(err, expected, "status {status}");
        }
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        let err = provider(&server, None).complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn malformed_success_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        let err = provider(&server, None).complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(d) if d.contains("malformed")));
    }

    #[tokio::test]
    async fn error_envelope_with_200_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "Rate limit exceeded", "code": 429}
            })))
            .mount(&server)
            .await;
        let err = provider(&server, None).complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert_eq!(err, InferenceError::RateLimited);
    }

    #[tokio::test]
    async fn empty_choices_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;
        let err = provider(&server, None).complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
            )
            .mount(&server)
            .await;
        let p = OpenAiCompatibleProvider::new(server.uri(), 0.7, 10, 1, None, None).unwrap();
        let err = p.complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert_eq!(err, InferenceError::Unavailable("request timed out".into()));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        let p = OpenAiCompatibleProvider::new("http://127.0.0.1:9/v1".into(), 0.7, 10, 1, None, None)
            .unwrap();
        let err = p.complete("m", &[Turn::user("x")]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }
}
