//! Model catalog: static registry of selectable models.
//!
//! Built once at startup from config and shared as `Arc<ModelCatalog>`.
//! Keys double as Telegram command names (`/free1`) and button tokens, so
//! they are restricted to lowercase ASCII, digits and `_`.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Commands handled by the relay itself; catalog keys may not shadow them.
pub const RESERVED_COMMANDS: &[&str] = &["start", "models", "status", "clear", "help"];

const MAX_KEY_LEN: usize = 32;

/// Remote inference backend, distinguished by wire schema and auth scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (OpenRouter).
    OpenRouter,
    /// HuggingFace text-generation inference.
    HuggingFace,
    /// Offline echo backend.
    Dummy,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub key: String,
    /// Identifier sent to the provider (e.g. `microsoft/DialoGPT-medium`).
    pub remote_id: String,
    pub display_name: String,
    pub description: String,
    pub provider: ProviderKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("model catalog is empty")]
    Empty,
    #[error("duplicate model key: {0}")]
    DuplicateKey(String),
    #[error("invalid model key '{0}': use 1-32 of [a-z0-9_]")]
    InvalidKey(String),
    #[error("model key '{0}' collides with a built-in command")]
    ReservedKey(String),
    #[error("default model '{0}' is not in the catalog")]
    UnknownDefault(String),
}

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
    default_idx: usize,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>, default_key: &str) -> Result<Self, CatalogError> {
        if models.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(models.len());
        for (i, m) in models.iter().enumerate() {
            validate_key(&m.key)?;
            if index.insert(m.key.clone(), i).is_some() {
                return Err(CatalogError::DuplicateKey(m.key.clone()));
            }
        }

        let default_idx = *index
            .get(default_key)
            .ok_or_else(|| CatalogError::UnknownDefault(default_key.to_string()))?;

        Ok(Self { models, index, default_idx })
    }

    pub fn resolve(&self, key: &str) -> Option<&ModelDescriptor> {
        self.index.get(key).map(|&i| &self.models[i])
    }

    /// Like [`resolve`](Self::resolve) but never fails: unknown keys map to
    /// the default model.
    pub fn resolve_or_default(&self, key: &str) -> &ModelDescriptor {
        self.resolve(key).unwrap_or_else(|| self.default_model())
    }

    /// All models in configuration order.
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default_idx]
    }

    pub fn default_key(&self) -> &str {
        &self.default_model().key
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
}

fn validate_key(key: &str) -> Result<(), CatalogError> {
    let well_formed = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !well_formed {
        return Err(CatalogError::InvalidKey(key.to_string()));
    }
    if RESERVED_COMMANDS.contains(&key) {
        return Err(CatalogError::ReservedKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_catalog() -> ModelCatalog {
    let m = |key: &str, provider| ModelDescriptor {
        key: key.into(),
        remote_id: format!("vendor/{key}"),
        display_name: format!("Model {key}"),
        description: format!("{key} description"),
        provider,
    };
    ModelCatalog::new(
        vec![
            m("free1", ProviderKind::HuggingFace),
            m("free2", ProviderKind::HuggingFace),
            m("openrouter", ProviderKind::OpenRouter),
        ],
        "free1",
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(key: &str) -> ModelDescriptor {
        ModelDescriptor {
            key: key.into(),
            remote_id: "x/y".into(),
            display_name: key.to_uppercase(),
            description: String::new(),
            provider: ProviderKind::Dummy,
        }
    }

    #[test]
    fn resolve_known_and_unknown() {
        let c = test_catalog();
        assert_eq!(c.resolve("free2").unwrap().remote_id, "vendor/free2");
        assert!(c.resolve("gpt-9").is_none());
    }

    #[test]
    fn list_keeps_config_order() {
        let c = test_catalog();
        let keys: Vec<_> = c.list().iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["free1", "free2", "openrouter"]);
    }

    #[test]
    fn unknown_key_falls_back_to_default() {
        let c = test_catalog();
        assert_eq!(c.resolve_or_default("gone").key, "free1");
        assert_eq!(c.resolve_or_default("free2").key, "free2");
    }

    #[test]
    fn duplicate_keys_rejected() {
        let err = ModelCatalog::new(vec![model("a"), model("a")], "a").unwrap_err();
        assert_eq!(err, CatalogError::DuplicateKey("a".into()));
    }

    #[test]
    fn empty_catalog_rejected() {
        assert_eq!(ModelCatalog::new(vec![], "a").unwrap_err(), CatalogError::Empty);
    }

    #[test]
    fn default_must_exist() {
        let err = ModelCatalog::new(vec![model("a")], "b").unwrap_err();
        assert_eq!(err, CatalogError::UnknownDefault("b".into()));
    }

    #[test]
    fn keys_must_be_command_safe() {
        let too_long = "k".repeat(33);
        for bad in ["", "Free", "free-1", "with space", too_long.as_str()] {
            assert!(
                matches!(ModelCatalog::new(vec![model(bad)], bad), Err(CatalogError::InvalidKey(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn builtin_commands_reserved() {
        let err = ModelCatalog::new(vec![model("status")], "status").unwrap_err();
        assert_eq!(err, CatalogError::ReservedKey("status".into()));
    }

    #[test]
    fn provider_kind_deserialises_lowercase() {
        #[derive(Deserialize)]
        struct W {
            p: ProviderKind,
        }
        let w: W = toml::from_str(r#"p = "huggingface""#).unwrap();
        assert_eq!(w.p, ProviderKind::HuggingFace);
        assert_eq!(ProviderKind::OpenRouter.to_string(), "openrouter");
    }
}
