//! LLM provider implementations.
//!
//! [`build_client`] is the factory called at startup: it constructs one
//! provider per [`ProviderKind`] and wires it into an [`InferenceClient`].
//! Adding a backend = new module + new `LlmProvider` variant + new route here.

pub mod dummy;
pub mod huggingface;
pub mod openai_compatible;

use tracing::{info, warn};

use crate::catalog::{ModelCatalog, ProviderKind};
use crate::config::{ProvidersConfig, Secrets};
use crate::llm::{InferenceClient, LlmProvider, ProviderError};

/// Build the inference client for every provider kind.
///
/// API keys come from [`Secrets`] only. A missing OpenRouter key is not a
/// startup error: requests go out unauthenticated and users see the
/// `Unauthorized` message for those models.
pub fn build_client(
    config: &ProvidersConfig,
    secrets: &Secrets,
    catalog: &ModelCatalog,
) -> Result<InferenceClient, ProviderError> {
    let uses = |kind: ProviderKind| catalog.list().iter().any(|m| m.provider == kind);

    if uses(ProviderKind::OpenRouter) && secrets.openrouter_api_key.is_none() {
        warn!("OPENROUTER_API_KEY not set — openrouter models will be rejected upstream");
    }

    let or = &config.openrouter;
    let openrouter = openai_compatible::OpenAiCompatibleProvider::new(
        or.api_base_url.clone(),
        or.temperature,
        or.max_tokens,
        or.timeout_seconds,
        secrets.openrouter_api_key.clone(),
        or.title.clone(),
    )?;

    let hf = &config.huggingface;
    let huggingface = huggingface::HuggingFaceProvider::new(
        hf.api_base_url.clone(),
        hf.max_length,
        hf.temperature,
        hf.timeout_seconds,
        secrets.huggingface_api_key.clone(),
    )?;

    info!(
        openrouter_timeout_s = or.timeout_seconds,
        openrouter_window = or.history_window,
        huggingface_timeout_s = hf.timeout_seconds,
        huggingface_window = hf.history_window,
        "inference providers ready"
    );

    Ok(InferenceClient::new()
        .with_provider(ProviderKind::OpenRouter, LlmProvider::OpenAiCompatible(openrouter), or.history_window)
        .with_provider(ProviderKind::HuggingFace, LlmProvider::HuggingFace(huggingface), hf.history_window)
        .with_provider(ProviderKind::Dummy, LlmProvider::Dummy(dummy::DummyProvider), 0))
}
