//! Completion endpoint configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_MODEL: &str = "yandexgpt-lite";
pub const VISION_MODEL: &str = "yandexgpt";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 8000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const COMPLETION_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
pub const IAM_TOKEN_URL: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";

/// How requests to the completion endpoint are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Authorized service-account key file, exchanged for IAM tokens.
    ServiceAccountKey(PathBuf),
    /// Static API key (`Authorization: Api-Key ...`).
    ApiKey(String),
}

/// Completion client settings.
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub folder_id: String,
    pub credentials: Credentials,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub completion_url: String,
    pub iam_url: String,
}

impl LLMConfig {
    pub fn new(folder_id: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            folder_id: folder_id.into(),
            credentials,
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            completion_url: COMPLETION_URL.into(),
            iam_url: IAM_TOKEN_URL.into(),
        }
    }

    /// Read settings from environment variables.
    ///
    /// Returns `None` when the folder id or credentials are missing; the bot
    /// then runs with the rule-based parser only.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(folder_id) = var("YANDEX_FOLDER_ID") else {
            warn!("YANDEX_FOLDER_ID is not set, remote extraction disabled");
            return None;
        };

        let credentials = if let Some(path) = var("YANDEX_SA_KEY_FILE") {
            Credentials::ServiceAccountKey(PathBuf::from(path))
        } else if let Some(key) = var("YANDEX_API_KEY") {
            Credentials::ApiKey(key)
        } else {
            warn!("Neither YANDEX_SA_KEY_FILE nor YANDEX_API_KEY is set, remote extraction disabled");
            return None;
        };

        let mut config = Self::new(folder_id.trim(), credentials);
        if let Some(model) = var("YANDEX_MODEL") {
            config.model = model.trim().to_string();
        }
        config.temperature = parse_or(var("YANDEX_TEMPERATURE"), "YANDEX_TEMPERATURE", DEFAULT_TEMPERATURE);
        config.max_tokens = parse_or(var("YANDEX_MAX_TOKENS"), "YANDEX_MAX_TOKENS", DEFAULT_MAX_TOKENS);
        config.timeout = Duration::from_secs(parse_or(
            var("YANDEX_TIMEOUT_SECS"),
            "YANDEX_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        ));
        if let Some(url) = var("YANDEX_COMPLETION_URL") {
            config.completion_url = url;
        }
        if let Some(url) = var("YANDEX_IAM_URL") {
            config.iam_url = url;
        }
        Some(config)
    }

    /// Model URI for a model name in this folder (`gpt://<folder>/<model>`).
    pub fn model_uri(&self, model: &str) -> String {
        format!("gpt://{}/{}", self.folder_id, model)
    }
}

fn parse_or<T: std::str::FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} '{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_service_account() {
        let config = LLMConfig::from_lookup(lookup(&[
            ("YANDEX_FOLDER_ID", "b1gfolder"),
            ("YANDEX_SA_KEY_FILE", "key.json"),
        ]))
        .unwrap();

        assert_eq!(config.credentials, Credentials::ServiceAccountKey("key.json".into()));
        assert_eq!(config.model, "yandexgpt-lite");
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_tokens, 8000);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.model_uri(&config.model), "gpt://b1gfolder/yandexgpt-lite");
    }

    #[test]
    fn test_api_key_and_overrides() {
        let config = LLMConfig::from_lookup(lookup(&[
            ("YANDEX_FOLDER_ID", "f"),
            ("YANDEX_API_KEY", "AQVN"),
            ("YANDEX_MODEL", "yandexgpt"),
            ("YANDEX_TIMEOUT_SECS", "5"),
            ("YANDEX_MAX_TOKENS", "many"),
        ]))
        .unwrap();

        assert_eq!(config.credentials, Credentials::ApiKey("AQVN".into()));
        assert_eq!(config.model, "yandexgpt");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_service_account_preferred_over_api_key() {
        let config = LLMConfig::from_lookup(lookup(&[
            ("YANDEX_FOLDER_ID", "f"),
            ("YANDEX_SA_KEY_FILE", "sa.json"),
            ("YANDEX_API_KEY", "AQVN"),
        ]))
        .unwrap();
        assert!(matches!(config.credentials, Credentials::ServiceAccountKey(_)));
    }

    #[test]
    fn test_missing_settings_disable_remote() {
        assert!(LLMConfig::from_lookup(lookup(&[("YANDEX_API_KEY", "k")])).is_none());
        assert!(LLMConfig::from_lookup(lookup(&[("YANDEX_FOLDER_ID", "f")])).is_none());
        assert!(LLMConfig::from_lookup(lookup(&[
            ("YANDEX_FOLDER_ID", " "),
            ("YANDEX_API_KEY", "k"),
        ]))
        .is_none());
    }
}
