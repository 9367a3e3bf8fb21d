//! Telegram comms channel: long-polls the Bot API, feeds events to the
//! [`RelayHandler`] and renders its replies.
//!
//! Handler failures while sending are logged and swallowed; one bad update
//! never stops the dispatcher. The only fatal condition is a polling
//! conflict: another process consuming updates for the same token.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters,
};
use teloxide::update_listeners;
use teloxide::{ApiError, RequestError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::subsystems::relay::{Delivery, Event, Keyboard, RelayHandler, Reply, TextFormat, parse_event};
use crate::subsystems::runtime::{Component, ComponentFuture};

/// Telegram caps messages at 4096 characters; chunk below that.
const MAX_MESSAGE_LENGTH: usize = 4000;

/// This bot's `@username`, used to ignore commands addressed to other bots.
#[derive(Debug, Clone)]
struct BotUsername(Option<String>);

pub struct TelegramChannel {
    channel_id: String,
    token: String,
    relay: Arc<RelayHandler>,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, token: String, relay: Arc<RelayHandler>) -> Self {
        Self { channel_id: channel_id.into(), token, relay }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.channel_id, self.token, self.relay, shutdown))
    }
}

async fn run_telegram(
    channel_id: String,
    token: String,
    relay: Arc<RelayHandler>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "telegram channel starting");

    let bot = Bot::new(token);

    let me = bot
        .get_me()
        .await
        .map_err(|e| AppError::Comms(format!("telegram getMe failed: {e}")))?;
    let username = BotUsername(me.user.username.clone());
    info!(%channel_id, username = ?username.0, "telegram bot identified");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![relay, username])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text("telegram update handler failed"))
        .build();

    // Fired by the listener error handler when another poller is detected.
    let conflict = CancellationToken::new();
    let on_conflict = conflict.clone();
    let listener_errors = Arc::new(move |err: RequestError| {
        let on_conflict = on_conflict.clone();
        async move {
            if is_conflicting_poller(&err) {
                error!(error = %err, "another instance is polling this bot token");
                on_conflict.cancel();
            } else {
                warn!(error = %err, "telegram polling error");
            }
        }
    });

    let listener = update_listeners::polling_default(bot).await;

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received — closing telegram channel");
            Ok(())
        }
        _ = conflict.cancelled() => {
            error!(%channel_id, "duplicate poller detected — stopping");
            Err(AppError::DuplicateProcess)
        }
        _ = dispatcher.dispatch_with_listener(listener, listener_errors) => {
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
            Ok(())
        }
    }
}

/// `409 Conflict: terminated by other getUpdates request`.
fn is_conflicting_poller(err: &RequestError) -> bool {
    match err {
        RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => true,
        RequestError::Api(ApiError::Unknown(msg)) => msg.starts_with("Conflict"),
        _ => false,
    }
}

async fn on_message(
    bot: Bot,
    msg: Message,
    relay: Arc<RelayHandler>,
    username: BotUsername,
) -> ResponseResult<()> {
    // Channel posts carry no sender and have no session to attach to.
    let Some(user_id) = msg.from.as_ref().map(|u| u.id.0) else {
        return Ok(());
    };

    let Some(event) = parse_event(msg.text(), relay.catalog(), username.0.as_deref()) else {
        debug!(user_id, chat_id = %msg.chat.id, "command addressed to another bot — ignored");
        return Ok(());
    };
    debug!(user_id, chat_id = %msg.chat.id, ?event, "telegram received message");

    if matches!(event, Event::Text(_)) {
        if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
            warn!(user_id, "failed to send typing action: {e}");
        }
    }

    if let Some(reply) = relay.handle(user_id, event).await {
        send_reply(&bot, msg.chat.id, Some(msg.id), reply).await;
    }
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, relay: Arc<RelayHandler>) -> ResponseResult<()> {
    let user_id = q.from.id.0;
    let token = q.data.clone().unwrap_or_default();
    debug!(user_id, %token, "telegram received button press");

    if let Some(reply) = relay.handle(user_id, Event::ButtonPress(token)).await {
        match q.message.as_ref() {
            Some(origin) => send_reply(&bot, origin.chat().id, Some(origin.id()), reply).await,
            None => debug!(user_id, "button origin message unavailable — skipping edit"),
        }
    }

    // Always acknowledge, or the client keeps a spinner on the button.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id, "failed to answer callback query: {e}");
    }
    Ok(())
}

/// Render `reply` into Bot API calls. Failures are logged, never returned.
async fn send_reply(bot: &Bot, chat_id: ChatId, origin: Option<MessageId>, reply: Reply) {
    if let (Delivery::EditOrigin, Some(message_id)) = (reply.delivery, origin) {
        let mut req = bot.edit_message_text(chat_id, message_id, reply.text);
        if reply.format == TextFormat::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        if let Err(e) = req.await {
            warn!(%chat_id, "failed to edit telegram message: {e}");
        }
        return;
    }

    let text = if reply.text.is_empty() { "(empty response)".to_string() } else { reply.text };
    let chunks = match reply.format {
        TextFormat::Plain => split_chunks(&text, MAX_MESSAGE_LENGTH),
        TextFormat::Html => split_lines(&text, MAX_MESSAGE_LENGTH),
    };
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut req = bot.send_message(chat_id, chunk);
        if reply.format == TextFormat::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        if i == 0 && reply.delivery == Delivery::Quote {
            if let Some(message_id) = origin {
                req = req.reply_parameters(quote_parameters(message_id));
            }
        }
        if i == last {
            if let Some(keyboard) = &reply.keyboard {
                req = req.reply_markup(inline_keyboard(keyboard));
            }
        }
        if let Err(e) = req.await {
            warn!(%chat_id, "failed to send telegram reply: {e}");
        }
    }
}

fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.token.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Quote the user's message, but still deliver if it was deleted meanwhile.
fn quote_parameters(message_id: MessageId) -> ReplyParameters {
    ReplyParameters::new(message_id).allow_sending_without_reply()
}

/// Split on line boundaries so HTML tags and entities stay whole. A single
/// line longer than `max_chars` falls back to [`split_chunks`].
fn split_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            chunks.extend(split_chunks(line, max_chars));
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split on character (not byte) boundaries.
fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
}
