//! Relay subsystem: turns one inbound [`Event`] into at most one [`Reply`].
//!
//! ```text
//! Event ─► RelayHandler::handle
//!            ├─ commands   → SessionStore (select / clear / status)
//!            └─ Text       → lock session → InferenceClient → append_turn
//! ```
//!
//! The handler knows nothing about Telegram; the comms channel parses
//! updates into events and renders replies.

mod commands;
mod reply;

pub use commands::{Event, parse_event};
pub use reply::{
    Delivery, Keyboard, KeyboardButton, MODEL_TOKEN_PREFIX, Reply, TextFormat, escape_html,
    key_from_token, token_for,
};

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::llm::InferenceClient;
use crate::subsystems::memory::{SessionError, SessionStore, UserId};

/// Shown after an inference failure.
pub const SWITCH_MODEL_HINT: &str = "Use /models to switch to another model.";
pub const UNSUPPORTED_NOTICE: &str = "❌ Please send text messages only.";

pub struct RelayHandler {
    bot_name: String,
    catalog: Arc<ModelCatalog>,
    sessions: SessionStore,
    inference: InferenceClient,
}

impl RelayHandler {
    pub fn new(
        bot_name: impl Into<String>,
        catalog: Arc<ModelCatalog>,
        sessions: SessionStore,
        inference: InferenceClient,
    ) -> Self {
        Self { bot_name: bot_name.into(), catalog, sessions, inference }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Handle one event. Returns `None` only for button presses that change
    /// nothing; the transport still acknowledges those.
    pub async fn handle(&self, user_id: UserId, event: Event) -> Option<Reply> {
        debug!(user_id, ?event, "handling event");
        match event {
            Event::Start => Some(self.start(user_id).await),
            Event::Models => Some(
                Reply::html("🤖 <b>Choose your AI model:</b>").with_keyboard(Keyboard::models(&self.catalog)),
            ),
            Event::Help => Some(self.help()),
            Event::Status => Some(self.status(user_id).await),
            Event::Clear => {
                self.sessions.clear(user_id).await;
                info!(user_id, "conversation cleared");
                Some(Reply::html("🗑️ <b>Conversation cleared!</b>"))
            }
            Event::SelectModel(key) => Some(self.select_model(user_id, &key).await),
            Event::ButtonPress(token) => self.button_press(user_id, &token).await,
            Event::Text(text) => Some(self.relay_text(user_id, &text).await),
            Event::Unsupported => Some(Reply::plain(UNSUPPORTED_NOTICE)),
            Event::UnknownCommand(cmd) => Some(Reply::plain(format!(
                "❓ Unknown command {cmd}. Send /help for the list of commands."
            ))),
        }
    }

    async fn start(&self, user_id: UserId) -> Reply {
        let current_key = self.sessions.status(user_id).await.model_key;
        let current = self.catalog.resolve_or_default(&current_key);

        let mut text = format!(
            "🤖 <b>{}</b>\n\nSend any message and the selected model will answer.\n\n<b>Models:</b>\n",
            escape_html(&self.bot_name)
        );
        self.push_model_shortcuts(&mut text);
        text.push_str(
            "\n<b>Commands:</b>\n/models - Model selector\n/status - Current model\n/clear - Clear chat\n/help - All commands\n",
        );
        let _ = write!(text, "\n<b>Current:</b> {}\n\nSend any message to start chatting! 🚀", escape_html(&current.display_name));

        Reply::html(text).with_keyboard(Keyboard::models(&self.catalog))
    }

    fn help(&self) -> Reply {
        let mut text = format!("🤖 <b>{} commands:</b>\n\n<b>Models:</b>\n", escape_html(&self.bot_name));
        self.push_model_shortcuts(&mut text);
        text.push_str(
            "\n<b>Other commands:</b>\n/models - Model selector\n/status - Current info\n/clear - Clear chat\n/start - Restart\n\n<i>Usage:</i> just send any text message!",
        );
        Reply::html(text)
    }

    /// One `/{key} - {name}` line per catalog entry.
    fn push_model_shortcuts(&self, text: &mut String) {
        for m in self.catalog.list() {
            let _ = writeln!(text, "/{} - {}", m.key, escape_html(&m.display_name));
        }
    }

    async fn status(&self, user_id: UserId) -> Reply {
        let status = self.sessions.status(user_id).await;
        let model = self.catalog.resolve_or_default(&status.model_key);
        Reply::html(format!(
            "📊 <b>Status:</b>\n🤖 <b>Model:</b> {}\n🔧 <b>Provider:</b> {}\n💬 <b>Messages:</b> {}",
            escape_html(&model.display_name),
            model.provider,
            status.message_count
        ))
    }

    async fn select_model(&self, user_id: UserId, key: &str) -> Reply {
        match self.switch(user_id, key).await {
            Ok(model) => Reply::html(format!(
                "✅ Switched to <b>{}</b>\n{}",
                escape_html(&model.display_name),
                escape_html(&model.description)
            )),
            Err(SessionError::InvalidModel(key)) => Reply::html(format!(
                "❌ Unknown model <code>{}</code>. Use /models to see what is available.",
                escape_html(&key)
            )),
        }
    }

    async fn button_press(&self, user_id: UserId, token: &str) -> Option<Reply> {
        let Some(key) = key_from_token(token) else {
            debug!(user_id, token, "ignoring foreign button token");
            return None;
        };
        match self.switch(user_id, key).await {
            Ok(model) => Some(
                Reply::html(format!(
                    "✅ <b>Switched to {}</b>\n\n{}\n\nSend a message to start!",
                    escape_html(&model.display_name),
                    escape_html(&model.description)
                ))
                .editing_origin(),
            ),
            Err(e) => {
                debug!(user_id, error = %e, "button for unknown model");
                None
            }
        }
    }

    async fn switch(&self, user_id: UserId, key: &str) -> Result<&ModelDescriptor, SessionError> {
        self.sessions.set_model(user_id, key).await?;
        info!(user_id, model = key, "model switched");
        Ok(self.catalog.resolve_or_default(key))
    }

    /// Forward `text` to the user's model.
    ///
    /// The session guard is held for the whole exchange so a second message
    /// from the same user waits instead of interleaving its turns.
    async fn relay_text(&self, user_id: UserId, text: &str) -> Reply {
        let handle = self.sessions.get_or_create(user_id);
        let mut session = handle.lock().await;
        let model = self.catalog.resolve_or_default(session.selected_model_key());

        let history = session.history_window(self.inference.history_window(model.provider));
        let result = self.inference.complete(model, text, &history).await;
        match result {
            Ok(response) => {
                session.append_turn(text, &response);
                debug!(user_id, model = %model.key, count = session.message_count(), "exchange recorded");
                Reply::plain(format!("{}\n\n{}", model.display_name, response)).quoting()
            }
            Err(e) => {
                warn!(user_id, model = %model.key, error = %e, "inference failed");
                Reply::plain(format!("❌ {}\n\n{SWITCH_MODEL_HINT}", e.user_message()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProviderKind, test_catalog};
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;

    fn handler() -> RelayHandler {
        let catalog = Arc::new(test_catalog());
        let inference = InferenceClient::new()
            .with_provider(ProviderKind::HuggingFace, LlmProvider::Dummy(DummyProvider), 0)
            .with_provider(ProviderKind::OpenRouter, LlmProvider::Dummy(DummyProvider), 4);
        RelayHandler::new("Relay", catalog.clone(), SessionStore::new(catalog, None), inference)
    }

    #[tokio::test]
    async fn start_shows_default_model_and_full_keyboard() {
        let h = handler();
        let reply = h.handle(1, Event::Start).await.unwrap();
        assert!(reply.text.contains("Model free1"));
        assert_eq!(reply.format, TextFormat::Html);
        let kb = reply.keyboard.unwrap();
        assert_eq!(kb.buttons().count(), h.catalog().list().len());
        assert_eq!(h.sessions().len(), 1);
    }

    #[tokio::test]
    async fn help_lists_every_shortcut() {
        let reply = handler().handle(1, Event::Help).await.unwrap();
        for key in ["/free1", "/free2", "/openrouter", "/models", "/status", "/clear"] {
            assert!(reply.text.contains(key), "help is missing {key}");
        }
    }

    #[tokio::test]
    async fn select_model_confirms_and_updates_status() {
        let h = handler();
        let reply = h.handle(1, Event::SelectModel("free2".into())).await.unwrap();
        assert!(reply.text.contains("Switched to <b>Model free2</b>"));
        let status = h.handle(1, Event::Status).await.unwrap();
        assert!(status.text.contains("Model free2"));
        assert!(status.text.contains("huggingface"));
    }

    #[tokio::test]
    async fn select_unknown_model_keeps_previous() {
        let h = handler();
        let reply = h.handle(1, Event::SelectModel("ghost".into())).await.unwrap();
        assert!(reply.text.contains("Unknown model"));
        assert_eq!(h.sessions().status(1).await.model_key, "free1");
    }

    #[tokio::test]
    async fn button_press_edits_origin() {
        let h = handler();
        let reply = h.handle(1, Event::ButtonPress("model_openrouter".into())).await.unwrap();
        assert_eq!(reply.delivery, Delivery::EditOrigin);
        assert!(reply.text.contains("Model openrouter"));
        assert_eq!(h.sessions().status(1).await.model_key, "openrouter");
    }

    #[tokio::test]
    async fn button_press_unknown_or_foreign_token_is_silent() {
        let h = handler();
        assert_eq!(h.handle(1, Event::ButtonPress("model_ghost".into())).await, None);
        assert_eq!(h.handle(1, Event::ButtonPress("poll_1".into())).await, None);
        assert_eq!(h.sessions().status(1).await.model_key, "free1");
    }

    #[tokio::test]
    async fn text_relays_and_counts() {
        let h = handler();
        let reply = h.handle(1, Event::Text("hello".into())).await.unwrap();
        assert_eq!(reply.text, "Model free1\n\n[echo] hello");
        assert_eq!(reply.delivery, Delivery::Quote);
        assert_eq!(reply.format, TextFormat::Plain);
        let status = h.sessions().status(1).await;
        assert_eq!(status.message_count, 1);
        assert_eq!(status.history_len, 2);
    }

    #[tokio::test]
    async fn clear_resets_counter() {
        let h = handler();
        h.handle(1, Event::Text("a".into())).await;
        let reply = h.handle(1, Event::Clear).await.unwrap();
        assert!(reply.text.contains("cleared"));
        assert_eq!(h.sessions().status(1).await.message_count, 0);
    }

    #[tokio::test]
    async fn unsupported_and_unknown_command_notices() {
        let h = handler();
        assert_eq!(h.handle(1, Event::Unsupported).await.unwrap().text, UNSUPPORTED_NOTICE);
        let reply = h.handle(1, Event::UnknownCommand("/gpt5".into())).await.unwrap();
        assert!(reply.text.contains("/gpt5"));
        assert!(reply.text.contains("/help"));
    }

    #[tokio::test]
    async fn missing_provider_reports_unavailable_without_turn() {
        let catalog = Arc::new(test_catalog());
        let h = RelayHandler::new("Relay", catalog.clone(), SessionStore::new(catalog, None), InferenceClient::new());
        let reply = h.handle(1, Event::Text("hi".into())).await.unwrap();
        assert!(reply.text.starts_with("❌ This model is unavailable right now."));
        assert!(reply.text.ends_with(SWITCH_MODEL_HINT));
        assert_eq!(h.sessions().status(1).await.message_count, 0);
        assert_eq!(h.sessions().status(1).await.history_len, 0);
    }

    #[tokio::test]
    async fn same_user_messages_do_not_interleave() {
        let h = Arc::new(handler());
        let a = tokio::spawn({
            let h = h.clone();
            async move { h.handle(9, Event::Text("one".into())).await }
        });
        let b = tokio::spawn({
            let h = h.clone();
            async move { h.handle(9, Event::Text("two".into())).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        let handle = h.sessions().get_or_create(9);
        let session = handle.lock().await;
        let history: Vec<_> = session.history().iter().map(|t| t.content.as_str()).collect();
        // Each user entry is immediately followed by its own reply.
        assert_eq!(history.len(), 4);
        assert_eq!(history[1], format!("[echo] {}", history[0]));
        assert_eq!(history[3], format!("[echo] {}", history[2]));
    }
}
