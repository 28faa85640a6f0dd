//! Core bot operations, independent of the chat transport.
//!
//! Every entry point runs the access check first; `None` means the event is
//! ignored without a reply.

use std::path::{Path, PathBuf};

use chrono::Local;
use fieldbot_core::{ExtractionResult, OperationRecord, Result};
use tracing::{error, info, warn};

use crate::state::AppState;

pub const RECEIVED_TEXT: &str =
    "Сообщение получено и будет обработано.\nРезультаты обработки появятся в отчете.";
pub const FAILURE_TEXT: &str =
    "Произошла ошибка при обработке сообщения.\nПожалуйста, попробуйте позже или обратитесь к администратору.";
pub const PHOTO_FAILURE_TEXT: &str =
    "Не удалось проанализировать фото.\nПожалуйста, попробуйте позже.";
pub const PHOTO_UNAVAILABLE_TEXT: &str =
    "Анализ фото недоступен: модель не настроена.";
pub const ADMIN_ONLY_TEXT: &str = "Команда доступна только администраторам.";
pub const EMPTY_ARCHIVE_TEXT: &str = "Нет сообщений для отчета.";

const HELP_TEXT: &str = "Доступные команды:\n\
/start - Начать работу с ботом\n\
/help - Показать это сообщение\n\
/status - Показать статус обработки отчетов\n\
/report - Сформировать отчет Excel\n\
/reset - Очистить кэш, отчеты и историю (администраторы)\n\n\
Для отправки отчета просто отправьте сообщение в чат.";

/// What to send back for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Document { path: PathBuf, caption: String },
}

/// Files removed by `/reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub workbooks: usize,
    pub archive_files: usize,
}

fn allowed(state: &AppState, chat_id: i64) -> bool {
    if state.config.is_allowed_chat(chat_id) {
        true
    } else {
        warn!("Access attempt from chat {} outside the allow-list", chat_id);
        false
    }
}

/// Archive a report, extract its operations and acknowledge.
pub async fn handle_text(
    state: &AppState,
    chat_id: i64,
    sender: &str,
    text: &str,
) -> Option<String> {
    if !allowed(state, chat_id) {
        return None;
    }
    let preview: String = text.chars().take(50).collect();
    info!(
        "Message from chat {} ({}): {}...",
        chat_id,
        sender,
        state.config.mask_token(&preview)
    );

    if let Err(e) = state.archive.append(sender, text) {
        error!("Failed to archive message: {}", e);
        return Some(FAILURE_TEXT.to_string());
    }
    state.record_message(sender);

    match state.extractor.extract(text).await {
        Ok(extraction) => {
            if let Some(reason) = extraction.fallback_reason() {
                info!("Message handled by rule-based parser ({})", reason);
            }
            Some(acknowledgement(extraction.result()))
        }
        Err(e) => {
            error!("Failed to process message: {}", e);
            Some(FAILURE_TEXT.to_string())
        }
    }
}

fn acknowledgement(result: &ExtractionResult) -> String {
    let lines: Vec<String> = result
        .records()
        .iter()
        .filter_map(describe)
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect();
    if lines.is_empty() {
        RECEIVED_TEXT.to_string()
    } else {
        format!("{}\n\nРаспознано:\n{}", RECEIVED_TEXT, lines.join("\n"))
    }
}

fn describe(record: &OperationRecord) -> Option<String> {
    let label = record.operation_label();
    if label.is_empty() {
        return None;
    }
    let mut line = label.to_string();
    if !record.culture_to.is_empty() {
        line.push_str(&format!(" ({})", record.culture_to));
    }
    if !record.pu_number.is_empty() || !record.pu_area.is_empty() {
        line.push_str(&format!(", ПУ {}/{}", record.pu_number, record.pu_area));
    }
    if !record.val_day.is_empty() || !record.val_total.is_empty() {
        line.push_str(&format!(", вал {}/{}", record.val_day, record.val_total));
    }
    Some(line)
}

/// Run photo analysis and summarize what the model saw.
pub async fn handle_photo(
    state: &AppState,
    chat_id: i64,
    sender: &str,
    jpeg: &[u8],
    caption: Option<&str>,
) -> Option<String> {
    if !allowed(state, chat_id) {
        return None;
    }
    info!("Photo from chat {} ({}), {} bytes", chat_id, sender, jpeg.len());

    let Some(analyzer) = state.photos.as_ref() else {
        return Some(PHOTO_UNAVAILABLE_TEXT.to_string());
    };
    match analyzer.analyze(jpeg, caption).await {
        Ok(report) => Some(report.summary()),
        Err(e) => {
            warn!("Photo analysis failed: {}", e);
            Some(PHOTO_FAILURE_TEXT.to_string())
        }
    }
}

/// Route a bot command. Unknown commands get the help text.
pub fn handle_command(
    state: &AppState,
    chat_id: i64,
    user_id: Option<i64>,
    sender: &str,
    command: &str,
) -> Option<Reply> {
    if !allowed(state, chat_id) {
        return None;
    }
    info!("Command /{} from chat {} ({})", command, chat_id, sender);

    let reply = match command {
        "start" => Reply::Text(format!(
            "Здравствуйте, {}! 👋\nЯ бот для обработки отчетов агрономов.\nИспользуйте /help для получения списка команд.",
            sender
        )),
        "status" => Reply::Text(status_text(state)),
        "report" => match generate_report(state) {
            Ok(Some(path)) => Reply::Document {
                caption: format!("Отчет агрономов на {}", Local::now().format("%d.%m.%Y %H:%M")),
                path,
            },
            Ok(None) => Reply::Text(EMPTY_ARCHIVE_TEXT.to_string()),
            Err(e) => {
                error!("Failed to generate report: {}", e);
                Reply::Text(FAILURE_TEXT.to_string())
            }
        },
        "reset" => {
            if !user_id.is_some_and(|id| state.config.is_admin(id)) {
                warn!("Reset denied for {} ({:?})", sender, user_id);
                return Some(Reply::Text(ADMIN_ONLY_TEXT.to_string()));
            }
            match reset(state) {
                Ok(summary) => Reply::Text(format!(
                    "Кэш анализа, отчеты ({}) и история сообщений ({}) очищены.",
                    summary.workbooks, summary.archive_files
                )),
                Err(e) => {
                    error!("Reset failed: {}", e);
                    Reply::Text(FAILURE_TEXT.to_string())
                }
            }
        }
        _ => Reply::Text(HELP_TEXT.to_string()),
    };
    Some(reply)
}

fn status_text(state: &AppState) -> String {
    let session = state.session();
    let mut text = format!(
        "Статистика обработки отчетов:\nВсего сообщений: {}\nЗаписей в кэше: {}\nИзвлечение: {}",
        session.total_messages,
        state.extractor.cache().len(),
        if state.extractor.has_backend() {
            "модель с резервным разбором по правилам"
        } else {
            "только разбор по правилам"
        }
    );
    if !session.senders.is_empty() {
        text.push_str("\n\nОтправители:");
        for (sender, count) in &session.senders {
            text.push_str(&format!("\n  {}: {}", sender, count));
        }
    }
    if let Some(path) = &session.last_workbook {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        text.push_str(&format!("\n\nПоследний отчет: {}", name));
    }
    text
}

/// Rebuild the workbook from the whole archive. `None` when nothing is archived.
///
/// Each message uses its cached extraction; a message with no cache entry is
/// parsed by rules as of the day it was received.
pub fn generate_report(state: &AppState) -> Result<Option<PathBuf>> {
    let messages = state.archive.load_all()?;
    if messages.is_empty() {
        info!("Report requested with an empty archive");
        return Ok(None);
    }

    let results: Vec<ExtractionResult> = messages
        .iter()
        .map(|m| match state.extractor.cache().get(&m.text) {
            Some(extraction) => extraction.into_result(),
            None => state
                .extractor
                .parser()
                .parse_on(&m.text, m.received_at.date_naive()),
        })
        .collect();

    let path = state.writer.render(&results)?;
    state.set_last_workbook(path.clone());
    Ok(Some(path))
}

/// Delete the cache, generated workbooks and the archive; zero the counters.
pub fn reset(state: &AppState) -> Result<ResetSummary> {
    state.extractor.cache().clear()?;
    let workbooks = remove_workbooks(&state.config.data_paths.excel)?;
    let archive_files = state.archive.clear()?;
    state.reset_session();
    info!(
        "Reset: cache cleared, {} workbooks and {} archive files removed",
        workbooks, archive_files
    );
    Ok(ResetSummary {
        workbooks,
        archive_files,
    })
}

fn remove_workbooks(dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "xlsx") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbot_core::ReferenceData;

    use crate::state::test_config;

    fn state(dir: &Path) -> AppState {
        AppState::new(test_config(dir), ReferenceData::default(), None)
    }

    #[tokio::test]
    async fn test_text_is_archived_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let reply = handle_text(&state, 10, "Иван", "Пахота зяби под мн тр\nПо Пу 26/488\nОтд 12 26/221")
            .await
            .unwrap();
        assert!(reply.starts_with(RECEIVED_TEXT));
        assert!(reply.contains("ПУ 26/488"));

        assert_eq!(state.archive.load_all().unwrap().len(), 1);
        assert_eq!(state.session().total_messages, 1);
        assert_eq!(state.extractor.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_denied_chat_gets_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.allowed_chat_ids = vec![10];
        let state = AppState::new(config, ReferenceData::default(), None);

        assert!(handle_text(&state, 99, "Чужой", "Сев").await.is_none());
        assert!(handle_photo(&state, 99, "Чужой", b"jpeg", None).await.is_none());
        assert!(handle_command(&state, 99, Some(1), "Чужой", "status").is_none());
        assert!(state.archive.load_all().unwrap().is_empty());
        assert_eq!(state.session().total_messages, 0);

        assert!(handle_text(&state, 10, "Свой", "Сев").await.is_some());
    }

    #[tokio::test]
    async fn test_archive_failure_is_generic_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let messages = state.archive.dir().to_path_buf();
        std::fs::remove_dir_all(&messages).unwrap();
        std::fs::write(&messages, "not a directory").unwrap();

        let reply = handle_text(&state, 10, "Иван", "Сев").await.unwrap();
        assert_eq!(reply, FAILURE_TEXT);
        assert_eq!(state.session().total_messages, 0);
    }

    #[tokio::test]
    async fn test_photo_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let reply = handle_photo(&state(dir.path()), 10, "Иван", b"jpeg", None)
            .await
            .unwrap();
        assert_eq!(reply, PHOTO_UNAVAILABLE_TEXT);
    }

    #[tokio::test]
    async fn test_report_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        assert_eq!(
            handle_command(&state, 10, None, "Иван", "report"),
            Some(Reply::Text(EMPTY_ARCHIVE_TEXT.to_string()))
        );

        handle_text(&state, 10, "Иван", "Сев под сах св\nПо Пу 40/120").await;
        let Some(Reply::Document { path, caption }) =
            handle_command(&state, 10, None, "Иван", "report")
        else {
            panic!("expected a document");
        };
        assert!(path.exists());
        assert!(caption.starts_with("Отчет агрономов на "));

        let Some(Reply::Text(status)) = handle_command(&state, 10, None, "Иван", "status") else {
            panic!("expected text");
        };
        assert!(status.contains("Всего сообщений: 1"));
        assert!(status.contains("Иван: 1"));
        assert!(status.contains("только разбор по правилам"));
        assert!(status.contains("Последний отчет: Отчет_агрономов_"));
    }

    #[tokio::test]
    async fn test_report_parses_uncached_messages() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        state
            .archive
            .append("Иван", "Пахота зяби под мн тр\nПо Пу 26/488")
            .unwrap();
        assert!(state.extractor.cache().is_empty());

        let path = generate_report(&state).unwrap().unwrap();
        assert!(path.starts_with(&state.config.data_paths.excel));
        assert_eq!(state.session().last_workbook, Some(path));
    }

    #[tokio::test]
    async fn test_reset_is_admin_only() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        handle_text(&state, 10, "Иван", "Сев под сах св\nПо Пу 40/120").await;
        generate_report(&state).unwrap();

        assert_eq!(
            handle_command(&state, 10, Some(2), "Иван", "reset"),
            Some(Reply::Text(ADMIN_ONLY_TEXT.to_string()))
        );
        assert_eq!(
            handle_command(&state, 10, None, "Иван", "reset"),
            Some(Reply::Text(ADMIN_ONLY_TEXT.to_string()))
        );
        assert_eq!(state.session().total_messages, 1);

        let Some(Reply::Text(reply)) = handle_command(&state, 10, Some(1), "Админ", "reset") else {
            panic!("expected text");
        };
        assert!(reply.contains("отчеты (1)"));
        assert!(reply.contains("история сообщений (1)"));
        assert!(state.extractor.cache().is_empty());
        assert!(!state.config.data_paths.cache_file.exists());
        assert!(state.archive.load_all().unwrap().is_empty());
        assert_eq!(state.session().total_messages, 0);
        assert_eq!(remove_workbooks(&state.config.data_paths.excel).unwrap(), 0);
    }

    #[test]
    fn test_unknown_command_gets_help() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let Some(Reply::Text(help)) = handle_command(&state, 10, None, "Иван", "help") else {
            panic!("expected text");
        };
        assert!(help.starts_with("Доступные команды:"));
        assert_eq!(
            handle_command(&state, 10, None, "Иван", "whatever"),
            Some(Reply::Text(help))
        );

        let Some(Reply::Text(greeting)) = handle_command(&state, 10, None, "Иван", "start") else {
            panic!("expected text");
        };
        assert!(greeting.starts_with("Здравствуйте, Иван!"));
    }
}
