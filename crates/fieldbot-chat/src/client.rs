//! Completion backend trait and the YandexGPT implementation.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, info, warn};

use crate::auth::IamAuth;
use crate::config::LLMConfig;
use crate::types::{CompletionOptions, CompletionRequest, CompletionResponse, Prompt};

/// Why a completion call produced no text.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl CompletionError {
    fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transport(_) | CompletionError::Timeout)
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

/// Anything that turns a prompt into completion text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, CompletionError>;
}

/// YandexGPT foundation-models client.
pub struct YandexGpt {
    http: Client,
    config: LLMConfig,
    auth: IamAuth,
}

impl YandexGpt {
    pub fn new(config: LLMConfig) -> fieldbot_core::Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| fieldbot_core::Error::Http(e.to_string()))?;
        let auth = IamAuth::new(http.clone(), config.credentials.clone(), config.iam_url.clone());
        info!(
            "YandexGPT client: model {}, timeout {:?}",
            config.model_uri(&config.model),
            config.timeout
        );
        Ok(Self { http, config, auth })
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    fn request_body(&self, prompt: &Prompt) -> CompletionRequest {
        let model = prompt.model.as_deref().unwrap_or(&self.config.model);
        CompletionRequest {
            model_uri: self.config.model_uri(model),
            completion_options: CompletionOptions {
                stream: false,
                temperature: prompt.temperature.unwrap_or(self.config.temperature),
                max_tokens: self.config.max_tokens,
            },
            messages: prompt.messages.clone(),
        }
    }

    async fn send(&self, body: &CompletionRequest) -> Result<String, CompletionError> {
        let authorization = self.auth.authorization().await?;
        let response = self
            .http
            .post(&self.config.completion_url)
            .header(header::AUTHORIZATION, authorization)
            .header("x-folder-id", &self.config.folder_id)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CompletionError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        if let Some(error) = parsed.error.as_ref() {
            return Err(CompletionError::Api(error.to_string()));
        }
        parsed
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Malformed("no alternatives in response".into()))
    }
}

#[async_trait]
impl CompletionBackend for YandexGpt {
    /// One call with at most one token refresh (on 401) and one retry
    /// (on transport error or timeout).
    async fn generate(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let body = self.request_body(prompt);
        debug!(
            "Completion request: {} messages, model {}",
            body.messages.len(),
            body.model_uri
        );

        let mut refreshed = false;
        let mut retried = false;
        loop {
            match self.send(&body).await {
                Err(CompletionError::Unauthorized) if !refreshed => {
                    warn!("Completion endpoint returned 401, refreshing token");
                    refreshed = true;
                    self.auth.invalidate().await;
                }
                Err(e) if e.is_transient() && !retried => {
                    warn!("Completion request failed ({}), retrying once", e);
                    retried = true;
                }
                Ok(text) => {
                    info!("Completion received: {} chars", text.chars().count());
                    return Ok(text);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    use crate::config::Credentials;

    #[derive(Clone)]
    struct Mock {
        calls: Arc<AtomicUsize>,
        mode: &'static str,
    }

    async fn completion(
        State(mock): State<Mock>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let n = mock.calls.fetch_add(1, Ordering::SeqCst);
        let ok = (
            AxumStatus::OK,
            Json(json!({"result": {"alternatives": [{"message": {"role": "assistant", "text": body["modelUri"]}}]}})),
        );
        match mock.mode {
            "ok" => {
                assert_eq!(headers["authorization"], "Api-Key k");
                assert_eq!(headers["x-folder-id"], "folder");
                ok
            }
            "unauthorized_once" if n == 0 => (AxumStatus::UNAUTHORIZED, Json(json!({}))),
            "unauthorized_once" => ok,
            "slow_once" if n == 0 => {
                tokio::time::sleep(Duration::from_millis(700)).await;
                ok
            }
            "slow_once" => ok,
            "error_body" => (AxumStatus::OK, Json(json!({"error": {"message": "quota"}}))),
            "empty" => (AxumStatus::OK, Json(json!({"result": {"alternatives": []}}))),
            _ => (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))),
        }
    }

    async fn client(mode: &'static str) -> (YandexGpt, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/completion", post(completion))
            .with_state(Mock {
                calls: calls.clone(),
                mode,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = LLMConfig::new("folder", Credentials::ApiKey("k".into()));
        config.completion_url = format!("http://{}/completion", addr);
        config.timeout = Duration::from_millis(300);
        (YandexGpt::new(config).unwrap(), calls)
    }

    #[tokio::test]
    async fn test_generate_returns_first_alternative() {
        let (gpt, calls) = client("ok").await;
        let text = gpt.generate(&Prompt::user("hi")).await.unwrap();
        assert_eq!(text, "gpt://folder/yandexgpt-lite");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let vision = gpt
            .generate(&Prompt::user("hi").with_model("yandexgpt"))
            .await
            .unwrap();
        assert_eq!(vision, "gpt://folder/yandexgpt");
    }

    #[tokio::test]
    async fn test_unauthorized_resends_once() {
        let (gpt, calls) = client("unauthorized_once").await;
        assert!(gpt.generate(&Prompt::user("hi")).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_retries_once() {
        let (gpt, calls) = client("slow_once").await;
        assert!(gpt.generate(&Prompt::user("hi")).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let (gpt, calls) = client("fail").await;
        let err = gpt.generate(&Prompt::user("hi")).await.unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_body_and_empty_alternatives() {
        let (gpt, _) = client("error_body").await;
        assert!(matches!(
            gpt.generate(&Prompt::user("hi")).await.unwrap_err(),
            CompletionError::Api(_)
        ));

        let (gpt, _) = client("empty").await;
        assert!(matches!(
            gpt.generate(&Prompt::user("hi")).await.unwrap_err(),
            CompletionError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let mut config = LLMConfig::new("folder", Credentials::ApiKey("k".into()));
        config.completion_url = "http://127.0.0.1:9/completion".into();
        let gpt = YandexGpt::new(config).unwrap();
        let err = gpt.generate(&Prompt::user("hi")).await.unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_) | CompletionError::Timeout));
    }
}
