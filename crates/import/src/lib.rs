pub mod candidates;
pub mod columns;
pub mod export;
pub mod normalize;
pub(crate) mod patterns;
pub mod receipt_match;
pub mod reconcile;
pub mod table;

pub use candidates::{candidate_from_path, load_candidates};
pub use columns::SchemaError;
pub use export::{write_csv, write_csv_file, write_xlsx, ExportError};
pub use normalize::ParseError;
pub use patterns::{amount_from_name, extract_identifier};
pub use receipt_match::{
    attach_all, AttachError, AttachmentSink, ManifestSink, MatchBasis, MatchableRecord,
    ReceiptCandidate, ReceiptMatch, ReceiptMatchReport, ReceiptMatcher,
};
pub use reconcile::{
    JoinTier, Reconciliation, ReconciliationEngine, ReconciliationSummary, ReconcileError, Registry,
};
pub use table::{read_table, Table, TableError};
