pub mod config;
pub mod hash;
pub mod money;
pub mod note;
pub mod payment;

pub use config::{
    BankConfig, Config, ConfigError, MatchingConfig, RemittanceAddress, RetrievalConfig,
};
pub use money::Money;
pub use note::{note_path, ArtifactNote};
pub use payment::{PaymentRecord, RecordStatus, ReferenceRow, AMOUNT_COLUMN, FUND_NOT_REGISTERED, OUTPUT_COLUMNS};
