//! Transport-neutral outbound replies and the model selection keyboard.

use crate::catalog::{ModelCatalog, ModelDescriptor};

/// Callback token prefix for model buttons: `model_{key}`.
pub const MODEL_TOKEN_PREFIX: &str = "model_";

const BUTTONS_PER_ROW: usize = 2;

pub fn token_for(key: &str) -> String {
    format!("{MODEL_TOKEN_PREFIX}{key}")
}

/// Decode a button token; `None` for tokens this bot did not issue.
pub fn key_from_token(token: &str) -> Option<&str> {
    token.strip_prefix(MODEL_TOKEN_PREFIX).filter(|k| !k.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Telegram HTML subset (`<b>`, `<i>`, `<code>`).
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Send a new message to the chat.
    New,
    /// Send a new message quoting the triggering one.
    Quote,
    /// Replace the text of the message that carried the pressed button.
    EditOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardButton {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

impl Keyboard {
    /// One button per catalog entry, two per row, in catalog order.
    pub fn models(catalog: &ModelCatalog) -> Self {
        let rows = catalog
            .list()
            .chunks(BUTTONS_PER_ROW)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|m: &ModelDescriptor| KeyboardButton {
                        label: m.display_name.clone(),
                        token: token_for(&m.key),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &KeyboardButton> {
        self.rows.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: Option<Keyboard>,
    pub delivery: Delivery,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), format: TextFormat::Plain, keyboard: None, delivery: Delivery::New }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self { text: text.into(), format: TextFormat::Html, keyboard: None, delivery: Delivery::New }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn quoting(mut self) -> Self {
        self.delivery = Delivery::Quote;
        self
    }

    pub fn editing_origin(mut self) -> Self {
        self.delivery = Delivery::EditOrigin;
        self
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
