//! Telegram long-polling loop: updates in, handler replies out.

use std::sync::Arc;
use std::time::Duration;

use fieldbot_connectors::{Message, TelegramBot};
use tracing::{error, info, warn};

use crate::handlers::{self, Reply};
use crate::state::AppState;

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Poll forever. Updates are handled one at a time, in order.
pub async fn run(state: Arc<AppState>, bot: Arc<TelegramBot>) {
    let mut offset: i64 = 0;
    info!("Polling for updates");

    loop {
        let updates = match bot.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Polling failed: {}", state.config.mask_token(&e.to_string()));
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in &updates {
            if update.update_id >= offset {
                offset = update.update_id + 1;
            }
            if let Some(message) = &update.message {
                dispatch(&state, &bot, message).await;
            }
        }
    }
}

/// Route one inbound message and send whatever the handler answers.
pub async fn dispatch(state: &AppState, bot: &TelegramBot, message: &Message) {
    let chat_id = message.chat.id;
    let sender = message.sender_name();

    if let Some((command, _args)) = message.command() {
        match handlers::handle_command(state, chat_id, message.sender_id(), &sender, command) {
            Some(Reply::Text(text)) => send_text(state, bot, chat_id, &text).await,
            Some(Reply::Document { path, caption }) => {
                if let Err(e) = bot.send_document(chat_id, &path, Some(&caption)).await {
                    error!("Failed to send report: {}", state.config.mask_token(&e.to_string()));
                    send_text(state, bot, chat_id, handlers::FAILURE_TEXT).await;
                }
            }
            None => {}
        }
        return;
    }

    if let Some(photo) = message.largest_photo() {
        if !state.config.is_allowed_chat(chat_id) {
            warn!("Photo from chat {} outside the allow-list ignored", chat_id);
            return;
        }
        let reply = match bot.fetch_file(&photo.file_id).await {
            Ok(bytes) => {
                handlers::handle_photo(state, chat_id, &sender, &bytes, message.caption.as_deref())
                    .await
            }
            Err(e) => {
                error!("Failed to download photo: {}", state.config.mask_token(&e.to_string()));
                Some(handlers::PHOTO_FAILURE_TEXT.to_string())
            }
        };
        if let Some(reply) = reply {
            send_text(state, bot, chat_id, &reply).await;
        }
        return;
    }

    if let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) {
        if let Some(reply) = handlers::handle_text(state, chat_id, &sender, text).await {
            send_text(state, bot, chat_id, &reply).await;
        }
    }
}

async fn send_text(state: &AppState, bot: &TelegramBot, chat_id: i64, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        error!("Failed to reply to chat {}: {}", chat_id, state.config.mask_token(&e.to_string()));
    }
}
