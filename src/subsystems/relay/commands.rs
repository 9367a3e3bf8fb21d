//! Inbound event parsing.

use crate::catalog::ModelCatalog;

/// One inbound event, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Models,
    Help,
    Status,
    Clear,
    /// `/{key}` shortcut for a catalog entry.
    SelectModel(String),
    /// Inline button press with its opaque token.
    ButtonPress(String),
    Text(String),
    /// Non-text payload (photo, sticker…) or blank text.
    Unsupported,
    UnknownCommand(String),
}

/// Classify a message. `text` is `None` for non-text payloads.
///
/// Only the first whitespace-separated token is considered for commands. A
/// `/command@name` suffix must match `bot_username` (case-insensitive);
/// commands addressed to another bot yield `None` and must be dropped
/// without touching any session. With no known username every suffix is
/// accepted.
pub fn parse_event(text: Option<&str>, catalog: &ModelCatalog, bot_username: Option<&str>) -> Option<Event> {
    let Some(text) = text else {
        return Some(Event::Unsupported);
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Event::Unsupported);
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Some(Event::Text(text.to_string()));
    };

    let token = command.split_whitespace().next().unwrap_or_default();
    let (name, addressee) = match token.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (token, None),
    };
    if let (Some(addressee), Some(me)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(me) {
            return None;
        }
    }

    let name = name.to_ascii_lowercase();
    let event = match name.as_str() {
        "start" => Event::Start,
        "models" => Event::Models,
        "help" => Event::Help,
        "status" => Event::Status,
        "clear" => Event::Clear,
        key if catalog.contains(key) => Event::SelectModel(key.to_string()),
        _ => Event::UnknownCommand(format!("/{token}")),
    };
    Some(event)
}
