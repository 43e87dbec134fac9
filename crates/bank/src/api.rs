use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::BankError;
use crate::session::BankSession;

/// Generation status of a requested receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetrievalStatus {
    Requested,
    Available,
    Failed,
    Unknown,
}

impl RetrievalStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "REQUESTED" | "PENDING" | "PROCESSING" | "IN_PROGRESS" => RetrievalStatus::Requested,
            "AVAILABLE" | "READY" | "COMPLETED" | "DONE" => RetrievalStatus::Available,
            "FAILED" | "ERROR" | "REJECTED" => RetrievalStatus::Failed,
            _ => RetrievalStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: RetrievalStatus,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRequest {
    pub request_id: String,
    pub status: RetrievalStatus,
    pub url: Option<String>,
}

/// A receipt the bank reports for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptListing {
    pub payment_id: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub beneficiary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Chunked body written to disk as it arrives.
    Streamed,
    /// Whole body read into memory, then written.
    Buffered,
}

/// What a transfer produced. Validation is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadMeta {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: u64,
}

/// Every call the retrieval flow makes to the bank.
#[async_trait]
pub trait ReceiptApi: Send + Sync {
    /// Generation requests already on file for a payment.
    async fn existing_requests(&self, payment_id: &str) -> Result<Vec<ExistingRequest>, BankError>;

    /// Asks the bank to generate the receipt. `None` when the response carries no request id.
    async fn request_generation(&self, payment_id: &str) -> Result<Option<String>, BankError>;

    async fn generation_status(&self, payment_id: &str, request_id: &str) -> Result<StatusReport, BankError>;

    /// Fetches `url` into `dest`, overwriting it.
    async fn download(&self, url: &str, dest: &Path, mode: TransferMode) -> Result<DownloadMeta, BankError>;

    async fn list_receipts(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ReceiptListing>, BankError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RequestEntry {
    request_id: String,
    status: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
}

// ── HTTP implementation ──────────────────────────────────────────────────────

pub struct HttpReceiptApi {
    session: Arc<BankSession>,
}

impl HttpReceiptApi {
    pub fn new(session: Arc<BankSession>) -> Self {
        Self { session }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, BankError> {
        let url = self.session.endpoint(segments)?;
        let headers = self.session.headers().await?;
        let resp = self
            .session
            .client()
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await?;
        let body = ensure_success(resp).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| BankError::Decode(format!("{}: {e}", segments.join("/"))))
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, BankError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BankError::Auth(format!("{status}: {body}")))
        }
        _ => Err(BankError::Request(format!("{status}: {body}"))),
    }
}

#[async_trait]
impl ReceiptApi for HttpReceiptApi {
    async fn existing_requests(&self, payment_id: &str) -> Result<Vec<ExistingRequest>, BankError> {
        let envelope: DataEnvelope<RequestEntry> =
            self.get_json(&["payments", payment_id, "receipts"], &[]).await?;
        Ok(envelope
            .data
            .into_iter()
            .map(|e| ExistingRequest {
                request_id: e.request_id,
                status: RetrievalStatus::parse(&e.status),
                url: e.url,
            })
            .collect())
    }

    async fn request_generation(&self, payment_id: &str) -> Result<Option<String>, BankError> {
        let url = self.session.endpoint(&["payments", payment_id, "receipts"])?;
        let headers = self.session.headers().await?;
        let resp = self
            .session
            .client()
            .post(url)
            .headers(headers)
            .send()
            .await?;
        let body = ensure_success(resp).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: GenerationResponse =
            serde_json::from_str(&body).map_err(|e| BankError::Decode(e.to_string()))?;
        Ok(parsed.request_id.filter(|id| !id.is_empty()))
    }

    async fn generation_status(&self, payment_id: &str, request_id: &str) -> Result<StatusReport, BankError> {
        let resp: StatusResponse = self
            .get_json(&["payments", payment_id, "receipts", request_id], &[])
            .await?;
        Ok(StatusReport {
            status: RetrievalStatus::parse(&resp.status),
            url: resp.url,
        })
    }

    // Storage URLs are pre-signed; no bank headers go with them.
    async fn download(&self, url: &str, dest: &Path, mode: TransferMode) -> Result<DownloadMeta, BankError> {
        let mut resp = self.session.client().get(url).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = match mode {
            TransferMode::Streamed => {
                let mut file = tokio::fs::File::create(dest).await?;
                let mut written = 0u64;
                while let Some(chunk) = resp.chunk().await? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                file.flush().await?;
                written
            }
            TransferMode::Buffered => {
                let body = resp.bytes().await?;
                tokio::fs::write(dest, &body).await?;
                body.len() as u64
            }
        };

        Ok(DownloadMeta {
            status,
            content_type,
            bytes,
        })
    }

    async fn list_receipts(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ReceiptListing>, BankError> {
        let query = [
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
        ];
        let envelope: DataEnvelope<ReceiptListing> = self.get_json(&["receipts"], &query).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_lenient() {
        assert_eq!(RetrievalStatus::parse("requested"), RetrievalStatus::Requested);
        assert_eq!(RetrievalStatus::parse(" AVAILABLE "), RetrievalStatus::Available);
        assert_eq!(RetrievalStatus::parse("Failed"), RetrievalStatus::Failed);
        assert_eq!(RetrievalStatus::parse("queued_somewhere"), RetrievalStatus::Unknown);
        assert_eq!(RetrievalStatus::parse(""), RetrievalStatus::Unknown);
    }

    #[test]
    fn listing_envelope_decodes() {
        let json = r#"{"data":[
            {"payment_id":"9f86d081884c7d659a2feaa0c55ad015","amount":"1234.56",
             "payment_date":"2025-01-15","beneficiary":"MARIA"},
            {"payment_id":"p2","amount":10.5,"payment_date":"2025-01-16"}
        ]}"#;
        let env: DataEnvelope<ReceiptListing> = serde_json::from_str(json).unwrap();
        assert_eq!(env.data.len(), 2);
        assert_eq!(env.data[0].amount, Decimal::new(123456, 2));
        assert_eq!(env.data[1].beneficiary, "");
        assert_eq!(env.data[1].payment_date, NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
    }

    #[test]
    fn empty_envelope_decodes() {
        let env: DataEnvelope<RequestEntry> = serde_json::from_str("{}").unwrap();
        assert!(env.data.is_empty());
    }

    #[test]
    fn generation_response_without_id() {
        let resp: GenerationResponse = serde_json::from_str(r#"{"message":"accepted"}"#).unwrap();
        assert_eq!(resp.request_id, None);
    }
}
