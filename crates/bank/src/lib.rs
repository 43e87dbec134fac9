pub mod api;
pub mod error;
pub mod retrieval;
pub mod retry;
pub mod session;

pub use api::{
    DownloadMeta, ExistingRequest, HttpReceiptApi, ReceiptApi, ReceiptListing, RetrievalStatus,
    StatusReport, TransferMode,
};
pub use error::BankError;
pub use retrieval::{
    DocumentRetrievalClient, FetchReport, FetchedDocument, PaymentRef, RetrievalRequest, RetrievalSettings,
    MIN_DOCUMENT_BYTES, PENDING_DOWNLOADS_FILE,
};
pub use retry::RetryPolicy;
pub use session::{BankSession, CachedToken};
