//! LLM provider abstraction and the per-model inference client.
//!
//! `LlmProvider` is an enum over concrete backends, so callers need no
//! trait-object machinery. [`InferenceClient`] maps each [`ProviderKind`]
//! to one provider instance plus its trailing history window, and is the
//! only entry point the relay uses.
//!
//! Every failure is classified into an [`InferenceError`]; raw transport
//! errors never cross this boundary.

pub mod providers;

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{ModelDescriptor, ProviderKind};
use crate::subsystems::memory::Turn;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Construction-time provider failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider setup failed: {0}")]
    Setup(String),
}

/// Classified outcome of a failed inference call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("credential rejected")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("insufficient credit")]
    InsufficientCredit,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    /// Short fixed text suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            InferenceError::Unauthorized => "The provider rejected the API key for this model.",
            InferenceError::RateLimited => {
                "Rate limit reached for this model. Please wait a moment and try again."
            }
            InferenceError::InsufficientCredit => "The provider account has run out of credits.",
            InferenceError::Unavailable(_) => "This model is unavailable right now.",
        }
    }

    /// Map an HTTP status (or an error code echoed in the body) to a class.
    pub fn from_status(code: u16, detail: impl Into<String>) -> Self {
        match code {
            401 | 403 => InferenceError::Unauthorized,
            402 => InferenceError::InsufficientCredit,
            429 => InferenceError::RateLimited,
            _ => InferenceError::Unavailable(detail.into()),
        }
    }

    /// Transport-level failure: connect error, timeout, unreadable body.
    pub(crate) fn transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Unavailable("request timed out".into())
        } else {
            InferenceError::Unavailable(e.to_string())
        }
    }
}

/// `{"error": ...}` envelope. OpenRouter nests `{code, message}`;
/// HuggingFace sends a bare string.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: serde_json::Value,
}

impl ErrorEnvelope {
    fn code(&self) -> Option<u16> {
        match self.error.get("code")? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match &self.error {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        }
    }
}

/// Classify a provider response body that did not yield text.
///
/// A numeric `error.code` in the body takes precedence over `status`.
pub(crate) fn classify(status: reqwest::StatusCode, body: &str) -> InferenceError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let code = env.code().unwrap_or(status.as_u16());
            InferenceError::from_status(code, format!("HTTP {status}: {}", env.message()))
        }
        Err(_) => InferenceError::from_status(status.as_u16(), format!("HTTP {status}: {body}")),
    }
}

/// Classify a 2xx body that failed to parse as the expected reply shape.
///
/// An error envelope still maps to its class; anything else is a malformed
/// body.
pub(crate) fn classify_unparsed(
    status: reqwest::StatusCode,
    body: &str,
    parse_err: &serde_json::Error,
) -> InferenceError {
    match classify(status, body) {
        InferenceError::Unavailable(_) => {
            InferenceError::Unavailable(format!("malformed response body: {parse_err}"))
        }
        classified => classified,
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    HuggingFace(providers::huggingface::HuggingFaceProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    /// One round-trip. `messages` ends with the new user message.
    pub async fn complete(&self, model: &str, messages: &[Turn]) -> Result<String, InferenceError> {
        match self {
            LlmProvider::OpenAiCompatible(p) => p.complete(model, messages).await,
            LlmProvider::HuggingFace(p) => p.complete(model, messages).await,
            LlmProvider::Dummy(p) => p.complete(model, messages).await,
        }
    }
}

// ── Inference client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Route {
    provider: LlmProvider,
    history_window: usize,
}

/// Routes a model descriptor to its provider.
///
/// Cheap to clone; the underlying `reqwest::Client`s are `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct InferenceClient {
    routes: HashMap<ProviderKind, Route>,
}

impl InferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `kind`, forwarding at most `history_window`
    /// history entries per call.
    pub fn with_provider(mut self, kind: ProviderKind, provider: LlmProvider, history_window: usize) -> Self {
        self.routes.insert(kind, Route { provider, history_window });
        self
    }

    pub fn history_window(&self, kind: ProviderKind) -> usize {
        self.routes.get(&kind).map_or(0, |r| r.history_window)
    }

    /// Send `history` followed by `message` to the provider behind
    /// `descriptor`. Exactly one attempt.
    ///
    /// `history` is forwarded as given; callers trim it to
    /// [`history_window`](Self::history_window) first.
    pub async fn complete(
        &self,
        descriptor: &ModelDescriptor,
        message: &str,
        history: &[Turn],
    ) -> Result<String, InferenceError> {
        let Some(route) = self.routes.get(&descriptor.provider) else {
            warn!(provider = %descriptor.provider, model = %descriptor.remote_id, "no provider configured");
            return Err(InferenceError::Unavailable(format!(
                "provider {} not configured",
                descriptor.provider
            )));
        };

        info!(provider = %descriptor.provider, model = %descriptor.remote_id, "invoking model");

        let messages = build_messages(history, message);
        route.provider.complete(&descriptor.remote_id, &messages).await
    }
}

fn build_messages(history: &[Turn], message: &str) -> Vec<Turn> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.extend_from_slice(history);
    messages.push(Turn::user(message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_catalog;
    use providers::dummy::DummyProvider;
    use reqwest::StatusCode;

    #[test]
    fn status_classes() {
        assert_eq!(InferenceError::from_status(401, ""), InferenceError::Unauthorized);
        assert_eq!(InferenceError::from_status(403, ""), InferenceError::Unauthorized);
        assert_eq!(InferenceError::from_status(402, ""), InferenceError::InsufficientCredit);
        assert_eq!(InferenceError::from_status(429, ""), InferenceError::RateLimited);
        assert!(matches!(InferenceError::from_status(500, "boom"), InferenceError::Unavailable(d) if d == "boom"));
    }

    #[test]
    fn body_code_overrides_status() {
        let body = r#"{"error":{"code":402,"message":"Insufficient credits"}}"#;
        assert_eq!(classify(StatusCode::BAD_REQUEST, body), InferenceError::InsufficientCredit);
    }

    #[test]
    fn string_error_body_keeps_status() {
        let body = r#"{"error":"Model is currently loading"}"#;
        let err = classify(StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(matches!(err, InferenceError::Unavailable(d) if d.contains("loading")));
    }

    #[test]
    fn non_json_body_uses_status() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, "slow down"), InferenceError::RateLimited);
    }

    #[test]
    fn every_class_has_a_user_message() {
        for e in [
            InferenceError::Unauthorized,
            InferenceError::RateLimited,
            InferenceError::InsufficientCredit,
            InferenceError::Unavailable("socket-detail".into()),
        ] {
            assert!(!e.user_message().is_empty());
            assert!(!e.user_message().contains("socket-detail"), "detail must not leak: {e}");
        }
    }

    #[test]
    fn build_messages_appends_new_message_last() {
        let history = vec![Turn::user("old"), Turn::assistant("reply")];
        let msgs = build_messages(&history, "new");
        assert_eq!(msgs, vec![Turn::user("old"), Turn::assistant("reply"), Turn::user("new")]);
        assert_eq!(build_messages(&[], "hi"), vec![Turn::user("hi")]);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unavailable() {
        let catalog = test_catalog();
        let client = InferenceClient::new();
        let err = client.complete(catalog.default_model(), "hi", &[]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn routes_by_provider_kind() {
        let catalog = test_catalog();
        let client = InferenceClient::new().with_provider(
            ProviderKind::HuggingFace,
            LlmProvider::Dummy(DummyProvider),
            0,
        );
        let reply = client.complete(catalog.default_model(), "ping", &[]).await.unwrap();
        assert_eq!(reply, "[echo] ping");
        assert_eq!(client.history_window(ProviderKind::HuggingFace), 0);
        assert_eq!(client.history_window(ProviderKind::OpenRouter), 0);
    }
}
