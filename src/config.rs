//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), applies the
//! `RELAY_LOG_LEVEL` override and validates the model catalog. Secrets are
//! only ever read from the environment, never from TOML.

use std::{
    env, fmt, fs,
    path::Path,
};

use serde::Deserialize;

use crate::catalog::{ModelCatalog, ModelDescriptor, ProviderKind};
use crate::error::AppError;
use crate::logger;
use crate::subsystems::memory::DEFAULT_HISTORY_CAP;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// OpenRouter (OpenAI-compatible) provider settings, `[providers.openrouter]`.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// History entries forwarded with each request.
    pub history_window: usize,
    /// Sent as `X-Title`; omitted when unset.
    pub title: Option<String>,
}

/// HuggingFace inference settings, `[providers.huggingface]`.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Base URL; the model id is appended as a path segment.
    pub api_base_url: String,
    pub timeout_seconds: u64,
    pub max_length: u32,
    pub temperature: f32,
    pub history_window: usize,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub openrouter: OpenRouterConfig,
    pub huggingface: HuggingFaceConfig,
}

/// Credentials from the environment (`.env` is loaded first by `main`).
#[derive(Clone, Default)]
pub struct Secrets {
    pub telegram_bot_token: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            openrouter_api_key: var("OPENROUTER_API_KEY"),
            huggingface_api_key: var("HUGGINGFACE_API_KEY"),
        }
    }
}

// Never print secret values.
impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("telegram_bot_token", &mask(&self.telegram_bot_token))
            .field("openrouter_api_key", &mask(&self.openrouter_api_key))
            .field("huggingface_api_key", &mask(&self.huggingface_api_key))
            .finish()
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    /// Stored history entries per session; `None` uses the store default.
    pub history_cap: Option<usize>,
    pub catalog: ModelCatalog,
    pub providers: ProvidersConfig,
    pub secrets: Secrets,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    session: RawSession,
    #[serde(default)]
    catalog: RawCatalog,
    #[serde(default)]
    providers: RawProviders,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default = "default_bot_name")]
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawBot {
    fn default() -> Self {
        Self { name: default_bot_name(), log_level: default_log_level() }
    }
}

#[derive(Deserialize, Default)]
struct RawSession {
    history_cap: Option<usize>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(rename = "default", default = "default_model_key")]
    default_key: String,
    /// Empty means "use the built-in catalog".
    #[serde(default)]
    models: Vec<RawModel>,
}

impl Default for RawCatalog {
    fn default() -> Self {
        Self { default_key: default_model_key(), models: Vec::new() }
    }
}

#[derive(Deserialize)]
struct RawModel {
    key: String,
    remote_id: String,
    name: String,
    #[serde(default)]
    description: String,
    provider: ProviderKind,
}

#[derive(Deserialize, Default)]
struct RawProviders {
    #[serde(default)]
    openrouter: RawOpenRouter,
    #[serde(default)]
    huggingface: RawHuggingFace,
}

#[derive(Deserialize)]
struct RawOpenRouter {
    #[serde(default = "default_openrouter_url")]
    api_base_url: String,
    #[serde(default = "default_openrouter_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_openrouter_window")]
    history_window: usize,
    #[serde(default = "default_title")]
    title: Option<String>,
}

impl Default for RawOpenRouter {
    fn default() -> Self {
        Self {
            api_base_url: default_openrouter_url(),
            timeout_seconds: default_openrouter_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_window: default_openrouter_window(),
            title: default_title(),
        }
    }
}

#[derive(Deserialize)]
struct RawHuggingFace {
    #[serde(default = "default_huggingface_url")]
    api_base_url: String,
    #[serde(default = "default_huggingface_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_max_length")]
    max_length: u32,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default)]
    history_window: usize,
}

impl Default for RawHuggingFace {
    fn default() -> Self {
        Self {
            api_base_url: default_huggingface_url(),
            timeout_seconds: default_huggingface_timeout(),
            max_length: default_max_length(),
            temperature: default_temperature(),
            history_window: 0,
        }
    }
}

fn default_bot_name() -> String { "relay-bot".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_model_key() -> String { "free1".to_string() }
fn default_openrouter_url() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_openrouter_timeout() -> u64 { 20 }
fn default_max_tokens() -> u32 { 300 }
fn default_temperature() -> f32 { 0.7 }
fn default_openrouter_window() -> usize { 4 }
fn default_title() -> Option<String> { Some("Multi-AI Telegram Bot".to_string()) }
fn default_huggingface_url() -> String { "https://api-inference.huggingface.co/models".to_string() }
fn default_huggingface_timeout() -> u64 { 15 }
fn default_max_length() -> u32 { 200 }

/// Catalog used when the config file lists no `[[catalog.models]]`.
pub fn builtin_models() -> Vec<ModelDescriptor> {
    let m = |key: &str, remote_id: &str, name: &str, description: &str, provider| ModelDescriptor {
        key: key.to_string(),
        remote_id: remote_id.to_string(),
        display_name: name.to_string(),
        description: description.to_string(),
        provider,
    };
    vec![
        m("free1", "microsoft/DialoGPT-medium", "🆓 DialoGPT", "Microsoft conversational AI", ProviderKind::HuggingFace),
        m("free2", "facebook/blenderbot-400M-distill", "🆓 BlenderBot", "Facebook conversational AI", ProviderKind::HuggingFace),
        m("free3", "microsoft/DialoGPT-large", "🆓 DialoGPT Large", "Microsoft large model", ProviderKind::HuggingFace),
        m("openrouter", "microsoft/phi-3-mini-128k-instruct:free", "🔄 OpenRouter Free", "OpenRouter free tier", ProviderKind::OpenRouter),
    ]
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides and read secrets.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("RELAY_LOG_LEVEL").ok();
    load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        log_level_override.as_deref(),
        Secrets::from_env(),
    )
}

/// Internal loader: tests pass overrides and secrets directly instead of
/// mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    secrets: Secrets,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, log_level_override, secrets)
        .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
}

fn parse(raw: &str, log_level_override: Option<&str>, secrets: Secrets) -> Result<Config, String> {
    let parsed: RawConfig = toml::from_str(raw).map_err(|e| format!("parse error: {e}"))?;

    let models = if parsed.catalog.models.is_empty() {
        builtin_models()
    } else {
        parsed
            .catalog
            .models
            .into_iter()
            .map(|m| ModelDescriptor {
                key: m.key,
                remote_id: m.remote_id,
                display_name: m.name,
                description: m.description,
                provider: m.provider,
            })
            .collect()
    };
    let catalog = ModelCatalog::new(models, &parsed.catalog.default_key).map_err(|e| e.to_string())?;

    let or = parsed.providers.openrouter;
    let hf = parsed.providers.huggingface;
    if or.timeout_seconds == 0 || hf.timeout_seconds == 0 {
        return Err("provider timeout_seconds must be greater than zero".into());
    }

    let widest_window = or.history_window.max(hf.history_window);
    let cap = parsed.session.history_cap.unwrap_or(DEFAULT_HISTORY_CAP);
    if cap < 2 {
        return Err(format!("session.history_cap must be at least 2 (one exchange), got {cap}"));
    }
    if cap < widest_window {
        return Err(format!(
            "session.history_cap ({cap}) is smaller than the largest provider history_window ({widest_window})"
        ));
    }

    let log_level = log_level_override.unwrap_or(&parsed.bot.log_level).to_string();
    logger::parse_level(&log_level).map_err(|e| e.to_string())?;

    Ok(Config {
        bot_name: parsed.bot.name,
        log_level,
        history_cap: parsed.session.history_cap,
        catalog,
        providers: ProvidersConfig {
            openrouter: OpenRouterConfig {
                api_base_url: or.api_base_url,
                timeout_seconds: or.timeout_seconds,
                max_tokens: or.max_tokens,
                temperature: or.temperature,
                history_window: or.history_window,
                title: or.title.filter(|t| !t.is_empty()),
            },
            huggingface: HuggingFaceConfig {
                api_base_url: hf.api_base_url,
                timeout_seconds: hf.timeout_seconds,
                max_length: hf.max_length,
                temperature: hf.temperature,
                history_window: hf.history_window,
            },
        },
        secrets,
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: built-in catalog, no secrets.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        parse("", None, Secrets::default()).unwrap()
    }
}
