//! Telegram Bot API objects, limited to the fields the bot reads.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API result.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Name used in the archive and statistics: first and last name, else username.
    pub fn display_name(&self) -> String {
        let full = match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        };
        let full = full.trim().to_string();
        if !full.is_empty() {
            return full;
        }
        self.username
            .clone()
            .unwrap_or_else(|| format!("user {}", self.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

impl Message {
    pub fn sender_name(&self) -> String {
        self.from
            .as_ref()
            .map(User::display_name)
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }

    /// Bot command and its argument text, e.g. `/report@field_bot now` → `("report", "now")`.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref()?.trim_start();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            None
        } else {
            Some((name, args))
        }
    }

    /// The highest resolution variant of an attached photo.
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_ref()?
            .iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
    }
}

/// Result of `getFile`; `file_path` is what the download endpoint expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPDATES: &str = r#"{
        "ok": true,
        "result": [
            {"update_id": 501, "message": {
                "message_id": 7, "date": 1743500000,
                "from": {"id": 42, "is_bot": false, "first_name": "Иван", "last_name": "Петров"},
                "chat": {"id": -100123, "type": "supergroup", "title": "Агрономы"},
                "text": "Пахота зяби под мн тр\nПо Пу 26/488"
            }},
            {"update_id": 502, "message": {
                "message_id": 8, "date": 1743500100,
                "from": {"id": 43, "first_name": "", "username": "sidorov"},
                "chat": {"id": 43, "type": "private"},
                "caption": "поле 3",
                "photo": [
                    {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 60},
                    {"file_id": "big", "file_unique_id": "b", "width": 1280, "height": 853, "file_size": 120000},
                    {"file_id": "mid", "file_unique_id": "m", "width": 320, "height": 213}
                ]
            }},
            {"update_id": 503}
        ]
    }"#;

    #[test]
    fn test_parse_updates() {
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(UPDATES).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        assert_eq!(updates.len(), 3);

        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat.id, -100123);
        assert_eq!(first.chat.kind, "supergroup");
        assert_eq!(first.sender_name(), "Иван Петров");
        assert_eq!(first.sender_id(), Some(42));
        assert!(first.command().is_none());

        let second = updates[1].message.as_ref().unwrap();
        assert_eq!(second.sender_name(), "sidorov");
        assert_eq!(second.largest_photo().unwrap().file_id, "big");
        assert_eq!(second.caption.as_deref(), Some("поле 3"));

        assert!(updates[2].message.is_none());
    }

    #[test]
    fn test_error_envelope() {
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(
            r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#,
        )
        .unwrap();
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        assert_eq!(resp.error_code, Some(401));
    }

    fn text_message(text: &str) -> Message {
        Message {
            message_id: 1,
            from: None,
            chat: Chat {
                id: 1,
                kind: "private".into(),
                title: None,
            },
            date: 0,
            text: Some(text.into()),
            caption: None,
            photo: None,
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(text_message("/start").command(), Some(("start", "")));
        assert_eq!(
            text_message("/report@field_bot  сейчас ").command(),
            Some(("report", "сейчас"))
        );
        assert_eq!(text_message("  /status\nlater").command(), Some(("status", "later")));
        assert_eq!(text_message("/").command(), None);
        assert_eq!(text_message("Сев 12/300").command(), None);
        assert_eq!(text_message("x").sender_name(), "unknown");
    }
}
