//! IAM token exchange for service-account keys.
//!
//! A PS256 JWT signed with the key's private key is exchanged at the IAM
//! endpoint for a short-lived `iamToken`. The token is cached in memory and
//! replaced on demand when the completion endpoint answers 401.

use std::path::Path;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::CompletionError;
use crate::config::Credentials;

const JWT_LIFETIME_SECS: i64 = 3600;
const TOKEN_MAX_AGE: Duration = Duration::from_secs(3600);

/// Authorized key file as downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub id: String,
    pub service_account_id: String,
    pub private_key: String,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, CompletionError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CompletionError::Auth(format!("cannot read key file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            CompletionError::Auth(format!("invalid key file {}: {}", path.display(), e))
        })
    }

    /// The PEM block; key files prefix it with a warning line.
    fn pem(&self) -> &str {
        match self.private_key.find("-----BEGIN") {
            Some(start) => &self.private_key[start..],
            None => &self.private_key,
        }
    }

    /// Signed JWT for the token exchange at `audience`.
    pub fn sign_jwt(&self, audience: &str) -> Result<String, CompletionError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            aud: audience.to_string(),
            iss: self.service_account_id.clone(),
            iat: now,
            exp: now + JWT_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::PS256);
        header.kid = Some(self.id.clone());

        let key = EncodingKey::from_rsa_pem(self.pem().as_bytes())
            .map_err(|e| CompletionError::Auth(format!("invalid private key: {}", e)))?;
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| CompletionError::Auth(format!("JWT signing failed: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims {
    aud: String,
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    iam_token: String,
}

struct CachedToken {
    value: String,
    obtained_at: Instant,
}

/// Produces `Authorization` header values for the completion endpoint.
pub struct IamAuth {
    http: Client,
    credentials: Credentials,
    iam_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl IamAuth {
    pub fn new(http: Client, credentials: Credentials, iam_url: impl Into<String>) -> Self {
        Self {
            http,
            credentials,
            iam_url: iam_url.into(),
            token: RwLock::new(None),
        }
    }

    /// Header value, exchanging a fresh IAM token when none is cached.
    pub async fn authorization(&self) -> Result<String, CompletionError> {
        let key_path = match &self.credentials {
            Credentials::ApiKey(key) => return Ok(format!("Api-Key {}", key)),
            Credentials::ServiceAccountKey(path) => path,
        };

        if let Some(token) = self.token.read().await.as_ref() {
            if token.obtained_at.elapsed() < TOKEN_MAX_AGE {
                return Ok(format!("Bearer {}", token.value));
            }
        }

        let token = self.exchange(key_path).await?;
        Ok(format!("Bearer {}", token))
    }

    /// Drop the cached token so the next call exchanges a new one.
    /// Static API keys have nothing to refresh.
    pub async fn invalidate(&self) {
        if matches!(self.credentials, Credentials::ServiceAccountKey(_)) {
            debug!("Invalidating cached IAM token");
            *self.token.write().await = None;
        }
    }

    async fn exchange(&self, key_path: &Path) -> Result<String, CompletionError> {
        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if token.obtained_at.elapsed() < TOKEN_MAX_AGE {
                return Ok(token.value.clone());
            }
        }

        let key = ServiceAccountKey::load(key_path)?;
        let jwt = key.sign_jwt(crate::config::IAM_TOKEN_URL)?;

        let response = self
            .http
            .post(&self.iam_url)
            .json(&serde_json::json!({ "jwt": jwt }))
            .send()
            .await
            .map_err(|e| CompletionError::Auth(format!("IAM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Auth(format!("IAM returned {}: {}", status, body)));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Auth(format!("IAM response: {}", e)))?;

        info!("IAM token obtained");
        *slot = Some(CachedToken {
            value: parsed.iam_token.clone(),
            obtained_at: Instant::now(),
        });
        Ok(parsed.iam_token)
    }
}
