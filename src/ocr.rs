use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::error::ArchiveError;
use crate::extract;

/// Refresh the cached IAM token this long before its stated expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the IAM response carries no `expiresAt`.
const TOKEN_FALLBACK_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "yandexPassportOauthToken")]
    yandex_passport_oauth_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "iamToken")]
    iam_token: Option<String>,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    #[serde(rename = "languageCodes")]
    language_codes: [&'a str; 1],
    model: &'a str,
    content: String,
}

/// Outcome of a successful recognition call. `text` is `None` when the
/// vendor reply carried no `fullText` field anywhere, which is distinct
/// from the call itself failing.
#[derive(Debug)]
pub struct Recognition {
    pub text: Option<String>,
    pub raw: Value,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct OcrClient {
    client: reqwest::Client,
    config: OcrConfig,
    timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        Self {
            client: reqwest::Client::new(),
            config,
            timeout,
            token: Mutex::new(None),
        }
    }

    /// Returns a valid IAM bearer token, exchanging the OAuth credential
    /// only when the cached one is missing or about to expire. Concurrent
    /// callers share one token through the mutex.
    async fn fetch_token(&self) -> Result<String, ArchiveError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
            if Utc::now() + margin < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting IAM token: {}", self.config.iam_url);

        let response = self
            .client
            .post(&self.config.iam_url)
            .timeout(self.timeout)
            .json(&TokenRequest {
                yandex_passport_oauth_token: &self.config.oauth_token,
            })
            .send()
            .await
            .map_err(|e| ArchiveError::auth(format!("IAM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::auth(format!(
                "IAM endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ArchiveError::auth(format!("IAM response is not valid JSON: {e}")))?;

        let value = body
            .iam_token
            .ok_or_else(|| ArchiveError::auth("IAM response has no iamToken"))?;

        info!("IAM token obtained");

        let expires_at = body.expires_at.unwrap_or_else(|| {
            Utc::now() + chrono::Duration::seconds(TOKEN_FALLBACK_LIFETIME_SECS)
        });
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at,
        });

        Ok(value)
    }

    /// Sends image bytes to the vision endpoint and pulls the recognized
    /// text out of the response tree. An auth failure is a hard stop: the
    /// vision endpoint is never contacted without a token.
    pub async fn recognize(&self, image_bytes: &[u8]) -> Result<Recognition, ArchiveError> {
        let token = self.fetch_token().await?;

        let request = RecognizeRequest {
            mime_type: "JPEG",
            language_codes: ["*"],
            model: "page",
            content: STANDARD.encode(image_bytes),
        };

        debug!("Sending recognition request: {}", self.config.vision_url);

        let response = self
            .client
            .post(&self.config.vision_url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .header("x-folder-id", &self.config.folder_id)
            .header("x-data-logging-enabled", "true")
            .json(&request)
            .send()
            .await
            .map_err(|e| ArchiveError::extraction("recognition request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Extraction {
                message: format!("vision endpoint returned {status}: {error_body}"),
                source: None,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ArchiveError::extraction("vision response is not valid JSON", e))?;

        let text = extract::find_key(&raw, "fullText")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Recognition { text, raw })
    }
}
