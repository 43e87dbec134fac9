use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `bank.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "QUITUS_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Run configuration, usually read from `quitus.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Payment date applied to every reconciled row. The CLI `--date` flag wins.
    pub payment_date: Option<String>,
    pub remittance_address: RemittanceAddress,
    pub matching: MatchingConfig,
    pub retrieval: RetrievalConfig,
    pub bank: BankConfig,
}

/// Physical remittance address written over every reconciled row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemittanceAddress {
    pub street: String,
    pub number: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest accepted difference between record and receipt amounts.
    pub tolerance_cents: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { tolerance_cents: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_poll_attempts: u32,
    pub poll_interval_secs: u64,
    pub max_download_retries: u32,
    pub download_retry_interval_secs: u64,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 10,
            poll_interval_secs: 5,
            max_download_retries: 3,
            download_retry_interval_secs: 2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub certificate_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, then applies the [`CLIENT_SECRET_ENV`] override.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        Ok(config.with_client_secret(std::env::var(CLIENT_SECRET_ENV).ok()))
    }

    pub fn with_client_secret(mut self, secret: Option<String>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.bank.client_secret = secret;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid("retrieval.max_poll_attempts must be at least 1".into()));
        }
        if self.retrieval.max_download_retries == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_download_retries must be at least 1".into(),
            ));
        }
        if self.matching.tolerance_cents < 0 {
            return Err(ConfigError::Invalid("matching.tolerance_cents cannot be negative".into()));
        }
        Ok(())
    }

    /// Checks the fields needed to talk to the bank. Reconciliation alone
    /// does not need them, so this is separate from [`Config::validate`].
    pub fn require_bank(&self) -> Result<&BankConfig, ConfigError> {
        let bank = &self.bank;
        for (name, value) in [
            ("bank.base_url", &bank.base_url),
            ("bank.token_url", &bank.token_url),
            ("bank.client_id", &bank.client_id),
            ("bank.client_secret", &bank.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} is required")));
            }
        }
        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
payment_date = "15/01/2025"

[remittance_address]
street = "AV BRIGADEIRO FARIA LIMA"
number = "3477"
city = "SAO PAULO"
state = "SP"
zip = "04538133"

[matching]
tolerance_cents = 2

[retrieval]
max_poll_attempts = 4
poll_interval_secs = 1

[bank]
base_url = "https://api.bank.example/v1"
token_url = "https://auth.bank.example/oauth/token"
client_id = "abc"
client_secret = "from-file"
"#;

    #[test]
    fn parses_full_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.payment_date.as_deref(), Some("15/01/2025"));
        assert_eq!(config.remittance_address.city, "SAO PAULO");
        assert_eq!(config.matching.tolerance_cents, 2);
        assert_eq!(config.retrieval.max_poll_attempts, 4);
        // unspecified fields keep their defaults
        assert_eq!(config.retrieval.max_download_retries, 3);
        assert_eq!(config.retrieval.timeout_secs, 60);
        assert!(config.require_bank().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.matching.tolerance_cents, 1);
        assert_eq!(config.retrieval.max_poll_attempts, 10);
        assert!(config.payment_date.is_none());
    }

    #[test]
    fn rejects_zero_poll_attempts() {
        let err = Config::from_toml_str("[retrieval]\nmax_poll_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(Config::from_toml_str("payment_date = "), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn require_bank_names_missing_field() {
        let err = Config::default().require_bank().unwrap_err();
        assert!(err.to_string().contains("bank.base_url"), "{err}");
    }

    #[test]
    fn secret_override_replaces_file_value() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let overridden = config.clone().with_client_secret(Some("from-env".into()));
        assert_eq!(overridden.bank.client_secret, "from-env");
        let kept = config.with_client_secret(Some(String::new()));
        assert_eq!(kept.bank.client_secret, "from-file");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quitus.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.remittance_address.zip, "04538133");
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = Config::load(Path::new("/nonexistent/quitus.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/quitus.toml"));
    }
}
