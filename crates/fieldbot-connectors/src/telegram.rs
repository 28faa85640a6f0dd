//! Telegram Bot API client over reqwest.

use std::path::Path;
use std::time::Duration;

use fieldbot_core::{Error, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::types::{ApiResponse, TelegramFile, Update, User};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Longer texts are rejected by the Bot API.
const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramBot {
    http: Client,
    token: String,
    api_base: String,
}

impl TelegramBot {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Client against another Bot API server (local bot server, test mock).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn mask(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, "***TOKEN***")
        }
    }

    fn transport_error(&self, method: &str, e: reqwest::Error) -> Error {
        Error::Telegram(self.mask(&format!("{}: {}", method, e.without_url())))
    }

    async fn read_response<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, e))?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            Error::Telegram(self.mask(&format!("{}: HTTP {}, unreadable body: {}", method, status, e)))
        })?;

        if !parsed.ok {
            let description = parsed.description.unwrap_or_else(|| status.to_string());
            return Err(Error::Telegram(self.mask(&format!("{}: {}", method, description))));
        }
        parsed
            .result
            .ok_or_else(|| Error::Telegram(format!("{}: response without result", method)))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;
        self.read_response(method, response).await
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", json!({}), REQUEST_TIMEOUT).await
    }

    /// Long-poll for updates starting at `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                body,
                Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT,
            )
            .await?;
        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }

    /// Send a text reply, split on line boundaries when it exceeds the message limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let body = json!({ "chat_id": chat_id, "text": chunk });
            let _: serde_json::Value = self.call("sendMessage", body, REQUEST_TIMEOUT).await?;
        }
        Ok(())
    }

    /// Upload a workbook as a document.
    pub async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.xlsx".to_string());
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(XLSX_MIME)
            .map_err(|e| self.transport_error("sendDocument", e))?;
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .timeout(REQUEST_TIMEOUT * 4)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error("sendDocument", e))?;
        let _: serde_json::Value = self.read_response("sendDocument", response).await?;
        info!("Sent document {} ({} bytes) to chat {}", file_name, size, chat_id);
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.call("getFile", json!({ "file_id": file_id }), REQUEST_TIMEOUT)
            .await
    }

    /// Download the content behind a `getFile` path.
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, file_path);
        let response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT * 2)
            .send()
            .await
            .map_err(|e| self.transport_error("download", e))?;
        if !response.status().is_success() {
            return Err(Error::Telegram(format!(
                "download {}: HTTP {}",
                file_path,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error("download", e))?;
        debug!("Downloaded {} ({} bytes)", file_path, bytes.len());
        Ok(bytes.to_vec())
    }

    /// `getFile` followed by the download.
    pub async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| Error::Telegram(format!("file {} has no download path", file_id)))?;
        self.download_file(&path).await
    }
}

fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let mut line_chars: Vec<char> = line.chars().collect();
        while !line_chars.is_empty() {
            if current_len == limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len + line_chars.len() > limit && current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let take = line_chars.len().min(limit - current_len);
            current.extend(line_chars.drain(..take));
            current_len += take;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
