//! Per-payment receipt retrieval.
//!
//! A payment goes through: look for an already generated document, else ask
//! the bank to generate one and poll its status, then download it. Only the
//! download is retried; generation is requested at most once per fetch.

use chrono::{NaiveDate, Utc};
use quitus_core::hash::digest_hex;
use quitus_core::{note_path, ArtifactNote, RetrievalConfig};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::api::{ReceiptApi, ReceiptListing, RetrievalStatus, StatusReport, TransferMode};
use crate::error::BankError;
use crate::retry::RetryPolicy;

/// Smallest body accepted as a document.
pub const MIN_DOCUMENT_BYTES: u64 = 1024;

/// Side file (in the output directory) listing downloads lost to timeouts.
pub const PENDING_DOWNLOADS_FILE: &str = "pending_downloads.tsv";

const TRANSFER_ORDER: [TransferMode; 2] = [TransferMode::Streamed, TransferMode::Buffered];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub payment_id: String,
    pub request_id: String,
    pub status: RetrievalStatus,
    pub url: Option<String>,
}

impl RetrievalRequest {
    pub fn new(payment_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            request_id: request_id.into(),
            status: RetrievalStatus::Requested,
            url: None,
        }
    }

    /// Applies one status check. An `Available` report without a URL is
    /// not usable yet and counts as `Unknown`.
    pub fn apply(&mut self, report: StatusReport) {
        self.status = match (report.status, &report.url) {
            (RetrievalStatus::Available, None) => RetrievalStatus::Unknown,
            (status, _) => status,
        };
        if report.url.is_some() {
            self.url = report.url;
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RetrievalStatus::Available | RetrievalStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub max_poll_attempts: u32,
    pub poll_interval: Duration,
    pub download_retry: RetryPolicy,
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(cfg: &RetrievalConfig) -> Self {
        Self {
            max_poll_attempts: cfg.max_poll_attempts,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            download_retry: RetryPolicy::fixed(
                cfg.max_download_retries,
                Duration::from_secs(cfg.download_retry_interval_secs),
            ),
        }
    }
}

/// A payment to fetch. A known amount is written to the artifact note so
/// the receipt can be matched by amount later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRef {
    pub payment_id: String,
    pub amount: Option<Decimal>,
}

impl PaymentRef {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub payment_id: String,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub fetched: Vec<FetchedDocument>,
    /// Payment id and the reason it could not be fetched.
    pub unresolved: Vec<(String, String)>,
}

impl FetchReport {
    /// Tab-separated `payment_id`, `reason` lines with a header row.
    pub fn write_unresolved(&self, path: &Path) -> std::io::Result<()> {
        let mut out = String::from("payment_id\treason\n");
        for (id, reason) in &self.unresolved {
            out.push_str(&format!("{id}\t{}\n", reason.replace(['\t', '\n'], " ")));
        }
        std::fs::write(path, out)
    }
}

pub struct DocumentRetrievalClient<A: ReceiptApi> {
    api: A,
    settings: RetrievalSettings,
    out_dir: PathBuf,
}

impl<A: ReceiptApi> DocumentRetrievalClient<A> {
    pub fn new(api: A, settings: RetrievalSettings, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            settings,
            out_dir: out_dir.into(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// URL of a document generated by an earlier request, if any.
    pub async fn check_existing_document(&self, payment_id: &str) -> Result<Option<String>, BankError> {
        let requests = self.api.existing_requests(payment_id).await?;
        let url = requests
            .into_iter()
            .filter(|r| r.status == RetrievalStatus::Available)
            .find_map(|r| r.url);
        if url.is_some() {
            tracing::debug!(payment_id, "existing document found");
        }
        Ok(url)
    }

    pub async fn request_generation(&self, payment_id: &str) -> Result<RetrievalRequest, BankError> {
        let request_id = self
            .api
            .request_generation(payment_id)
            .await?
            .ok_or_else(|| BankError::Request(format!("no request id returned for payment {payment_id}")))?;
        tracing::debug!(payment_id, request_id = %request_id, "document generation requested");
        Ok(RetrievalRequest::new(payment_id, request_id))
    }

    /// Checks the status up to `max_attempts` times, sleeping `interval`
    /// between checks. Call errors count as an attempt and are retried.
    /// Returns `None` on `Failed` or when the attempts run out.
    pub async fn poll_until_available(
        &self,
        payment_id: &str,
        request_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Option<String> {
        let mut request = RetrievalRequest::new(payment_id, request_id);

        for attempt in 1..=max_attempts {
            match self.api.generation_status(payment_id, request_id).await {
                Ok(report) => request.apply(report),
                Err(e) => {
                    tracing::warn!(payment_id, attempt, error = %e, "status check failed");
                    request.status = RetrievalStatus::Unknown;
                }
            }
            tracing::debug!(payment_id, attempt, status = ?request.status, "polled");

            match request.status {
                RetrievalStatus::Available => return request.url,
                RetrievalStatus::Failed => {
                    tracing::warn!(payment_id, request_id, "bank reported generation failure");
                    return None;
                }
                RetrievalStatus::Requested | RetrievalStatus::Unknown => {}
            }

            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        tracing::warn!(payment_id, attempts = max_attempts, "document not available, giving up");
        None
    }

    /// Downloads `url` for `payment_id`, trying a streamed transfer and then
    /// a buffered one. A transfer only counts when it returns a 2xx status,
    /// at least [`MIN_DOCUMENT_BYTES`] and a document content type. When
    /// every transfer failed and one of them timed out, the URL goes to
    /// [`PENDING_DOWNLOADS_FILE`] for manual recovery.
    pub async fn download(&self, url: &str, payment_id: &str) -> Result<PathBuf, BankError> {
        match self.transfer(url, &PaymentRef::new(payment_id)).await {
            Ok(doc) => Ok(doc.path),
            Err(e) => Err(self.give_up(payment_id, url, e).await),
        }
    }

    /// Full retrieval for one payment. `max_retries` bounds download
    /// attempts only.
    pub async fn fetch_document(&self, payment_id: &str, max_retries: u32) -> Result<FetchedDocument, BankError> {
        self.fetch_payment(&PaymentRef::new(payment_id), max_retries).await
    }

    /// [`fetch_document`](Self::fetch_document) recording the payment's
    /// amount in the artifact note. The recovery side file is only written
    /// once the last download attempt has failed.
    pub async fn fetch_payment(&self, payment: &PaymentRef, max_retries: u32) -> Result<FetchedDocument, BankError> {
        let payment_id = payment.payment_id.as_str();
        let existing = match self.check_existing_document(payment_id).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(payment_id, error = %e, "could not list existing requests");
                None
            }
        };

        let url = match existing {
            Some(url) => url,
            None => {
                let request = self.request_generation(payment_id).await?;
                self.poll_until_available(
                    payment_id,
                    &request.request_id,
                    self.settings.max_poll_attempts,
                    self.settings.poll_interval,
                )
                .await
                .ok_or_else(|| BankError::PollTimeout {
                    payment_id: payment_id.to_string(),
                    attempts: self.settings.max_poll_attempts,
                })?
            }
        };

        let policy = RetryPolicy {
            max_attempts: max_retries,
            ..self.settings.download_retry
        };
        let url = url.as_str();
        match policy.run(move |_| self.transfer(url, payment)).await {
            Ok(doc) => Ok(doc),
            Err(e) => Err(self.give_up(payment_id, url, e).await),
        }
    }

    /// Fetches each payment in turn. One payment failing does not stop the
    /// others.
    pub async fn fetch_batch(&self, payments: &[PaymentRef]) -> FetchReport {
        let mut report = FetchReport::default();
        let max_retries = self.settings.download_retry.max_attempts;

        for payment in payments {
            match self.fetch_payment(payment, max_retries).await {
                Ok(doc) => report.fetched.push(doc),
                Err(e) => {
                    tracing::warn!(payment_id = %payment.payment_id, error = %e, "receipt unresolved");
                    report.unresolved.push((payment.payment_id.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            fetched = report.fetched.len(),
            unresolved = report.unresolved.len(),
            "receipt batch finished"
        );
        report
    }

    pub async fn list_receipts(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ReceiptListing>, BankError> {
        if start > end {
            return Err(BankError::Request(format!("start date {start} is after end date {end}")));
        }
        self.api.list_receipts(start, end).await
    }

    /// One download attempt: every transfer mode in turn, then the rename
    /// and the note. Never touches the recovery side file.
    async fn transfer(&self, url: &str, payment: &PaymentRef) -> Result<FetchedDocument, BankError> {
        let payment_id = payment.payment_id.as_str();
        tokio::fs::create_dir_all(&self.out_dir).await?;
        let dest = self.out_dir.join(format!("{}.pdf", artifact_stem(payment_id)));
        let part = dest.with_extension("pdf.part");

        let mut failures = Vec::new();
        let mut timed_out = false;

        for mode in TRANSFER_ORDER {
            let outcome = match self.api.download(url, &part, mode).await {
                Ok(meta) => match reject_reason(meta.status, meta.content_type.as_deref(), meta.bytes) {
                    None => Ok(()),
                    Some(reason) => Err(reason),
                },
                Err(e) => {
                    timed_out |= e.is_timeout();
                    Err(e.to_string())
                }
            };

            match outcome {
                Ok(()) => {
                    tokio::fs::rename(&part, &dest).await?;
                    let sha256 = self.write_note(&dest, payment).await?;
                    tracing::info!(payment_id, path = %dest.display(), sha256 = %sha256, ?mode, "document downloaded");
                    return Ok(FetchedDocument {
                        payment_id: payment_id.to_string(),
                        path: dest,
                        sha256,
                    });
                }
                Err(reason) => {
                    tracing::warn!(payment_id, ?mode, reason = %reason, "transfer rejected");
                    failures.push(format!("{mode:?}: {reason}"));
                    let _ = tokio::fs::remove_file(&part).await;
                }
            }
        }

        Err(BankError::Download {
            payment_id: payment_id.to_string(),
            reason: failures.join("; "),
            timed_out,
        })
    }

    /// Records a timed-out download for recovery and hands the error back.
    async fn give_up(&self, payment_id: &str, url: &str, error: BankError) -> BankError {
        if matches!(error, BankError::Download { timed_out: true, .. }) {
            if let Err(e) = self.record_pending(payment_id, url).await {
                return e;
            }
        }
        error
    }

    /// Writes the sidecar note and returns the artifact digest.
    async fn write_note(&self, artifact: &Path, payment: &PaymentRef) -> Result<String, BankError> {
        let bytes = tokio::fs::read(artifact).await?;
        let sha256 = digest_hex(&bytes);
        let note = ArtifactNote {
            payment_id: payment.payment_id.clone(),
            sha256: Some(sha256.clone()),
            amount: payment.amount,
            source_url: None,
        };
        tokio::fs::write(note_path(artifact), note.render()).await?;
        Ok(sha256)
    }

    async fn record_pending(&self, payment_id: &str, url: &str) -> Result<(), BankError> {
        let path = self.out_dir.join(PENDING_DOWNLOADS_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let line = format!("{payment_id}\t{url}\t{}\n", Utc::now().to_rfc3339());
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        tracing::warn!(payment_id, path = %path.display(), "download timed out, URL kept for recovery");
        Ok(())
    }
}

/// Why a finished transfer is not a document, if it is not.
fn reject_reason(status: u16, content_type: Option<&str>, bytes: u64) -> Option<String> {
    if !(200..300).contains(&status) {
        return Some(format!("HTTP {status}"));
    }
    if bytes < MIN_DOCUMENT_BYTES {
        return Some(format!("body too small ({bytes} bytes)"));
    }
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_lowercase())
        .unwrap_or_default();
    if mime.starts_with("text/") || mime == "application/json" || mime == "application/xml" {
        return Some(format!("unexpected content type {mime}"));
    }
    None
}

fn artifact_stem(payment_id: &str) -> String {
    payment_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
