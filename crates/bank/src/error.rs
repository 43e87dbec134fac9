use thiserror::Error;

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Document for payment {payment_id} not available after {attempts} status checks")]
    PollTimeout { payment_id: String, attempts: u32 },
    #[error("Download failed for payment {payment_id}: {reason}")]
    Download {
        payment_id: String,
        reason: String,
        /// At least one transfer ended in a timeout.
        timed_out: bool,
    },
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Config(#[from] quitus_core::ConfigError),
}

impl BankError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BankError::Timeout(_))
    }
}

// Timeouts get their own variant so retrieval can tell them apart without
// holding a live reqwest error.
impl From<reqwest::Error> for BankError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BankError::Timeout(e.to_string())
        } else {
            BankError::Http(e)
        }
    }
}
