//! Authenticated bank session.
//!
//! One `BankSession` owns the HTTP client (with the mutual-TLS identity) and
//! the bearer token cache. Components receive it explicitly, usually behind
//! an `Arc`, and ask it for headers before each call.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quitus_core::BankConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::BankError;

/// Tokens this close to expiry are treated as expired.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Lifetimes outside zero to one year are clamped.
    pub fn new(access_token: impl Into<String>, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        let lifetime = ChronoDuration::seconds(expires_in_secs.clamp(0, MAX_TOKEN_LIFETIME_SECS));
        Self {
            access_token: access_token.into(),
            expires_at: now.checked_add_signed(lifetime).unwrap_or(now),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_SAFETY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct BankSession {
    client: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl BankSession {
    /// Builds the client. When both certificate and key paths are set they
    /// are concatenated into one PEM identity for mutual TLS.
    pub fn from_config(bank: &BankConfig, timeout: Duration) -> Result<Self, BankError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        match (&bank.certificate_path, &bank.private_key_path) {
            (Some(cert), Some(key)) => {
                let mut pem = std::fs::read(cert)?;
                pem.push(b'\n');
                pem.extend(std::fs::read(key)?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| BankError::Auth(format!("invalid client certificate: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {
                tracing::warn!("no client certificate configured, mutual TLS disabled");
            }
            _ => {
                return Err(BankError::Auth(
                    "certificate_path and private_key_path must be set together".into(),
                ));
            }
        }

        Ok(Self {
            client: builder.build()?,
            base_url: bank.base_url.trim_end_matches('/').to_string(),
            token_url: bank.token_url.clone(),
            client_id: bank.client_id.clone(),
            client_secret: bank.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Base URL extended by `segments`, each percent-encoded as a single
    /// path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, BankError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BankError::Request(format!("invalid base_url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| BankError::Request(format!("base_url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Always fetches a fresh token and replaces the cached one.
    pub async fn authenticate(&self) -> Result<CachedToken, BankError> {
        let token = self.fetch_token().await?;
        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }

    /// Cached token, refreshed when expired or inside the safety margin.
    /// The lock is held across the refresh so concurrent callers share one
    /// token request.
    pub async fn valid_token(&self) -> Result<String, BankError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = (*cached).as_ref().filter(|t| t.is_valid_at(Utc::now())) {
            return Ok(token.access_token.clone());
        }
        tracing::debug!("bearer token missing or expiring, refreshing");
        let token = self.fetch_token().await?;
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    /// Bearer token, client id and a fresh correlation id.
    pub async fn headers(&self) -> Result<HeaderMap, BankError> {
        let token = self.valid_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        headers.insert(HeaderName::from_static(CLIENT_ID_HEADER), header_value(&self.client_id)?);
        headers.insert(
            HeaderName::from_static(CORRELATION_ID_HEADER),
            header_value(&uuid::Uuid::new_v4().to_string())?,
        );
        Ok(headers)
    }

    async fn fetch_token(&self) -> Result<CachedToken, BankError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self.client.post(&self.token_url).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BankError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BankError::Auth(format!("malformed token response: {e}")))?;
        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        tracing::info!(expires_in, "bank token acquired");
        Ok(CachedToken::new(parsed.access_token, expires_in, Utc::now()))
    }

    #[cfg(test)]
    pub(crate) async fn seed_token(&self, token: CachedToken) {
        *self.token.lock().await = Some(token);
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BankError> {
    HeaderValue::from_str(value).map_err(|_| BankError::Auth("credential is not a valid header value".into()))
}
