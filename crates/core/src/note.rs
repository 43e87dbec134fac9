//! Sidecar note written next to each retrieved document.
//!
//! The note is a handful of `key: value` lines. Artifacts are named after
//! their payment id, so matching takes the identifier and the paid amount
//! from here rather than from the file name.

use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const NOTE_EXTENSION: &str = "note";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactNote {
    pub payment_id: String,
    pub sha256: Option<String>,
    pub amount: Option<Decimal>,
    pub source_url: Option<String>,
}

impl ArtifactNote {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            ..Default::default()
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("payment_id: {}\n", self.payment_id);
        if let Some(sha) = &self.sha256 {
            out.push_str(&format!("sha256: {sha}\n"));
        }
        if let Some(amount) = &self.amount {
            out.push_str(&format!("amount: {amount:.2}\n"));
        }
        if let Some(url) = &self.source_url {
            out.push_str(&format!("source_url: {url}\n"));
        }
        out
    }

    /// Unknown keys and malformed lines are ignored. Returns `None` when
    /// no payment id is present.
    pub fn parse(text: &str) -> Option<Self> {
        let mut note = ArtifactNote::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "payment_id" => note.payment_id = value.to_string(),
                "sha256" => note.sha256 = Some(value.to_lowercase()),
                "amount" => note.amount = Decimal::from_str(value).ok(),
                "source_url" => note.source_url = Some(value.to_string()),
                _ => {}
            }
        }
        (!note.payment_id.is_empty()).then_some(note)
    }
}

/// `receipt.pdf` -> `receipt.pdf.note`
pub fn note_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".");
    name.push(NOTE_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_then_parse() {
        let note = ArtifactNote {
            payment_id: "9f86d081884c7d659a2feaa0c55ad015".into(),
            sha256: Some("ab".repeat(32)),
            amount: Some(Decimal::new(123456, 2)),
            source_url: Some("https://bank.example/r/1?x=1:2".into()),
        };
        let text = note.render();
        assert!(text.contains("amount: 1234.56\n"));
        assert_eq!(ArtifactNote::parse(&text), Some(note));
    }

    #[test]
    fn unreadable_amount_is_dropped() {
        let note = ArtifactNote::parse("payment_id: P-1\namount: 1.234,56\n").unwrap();
        assert_eq!(note.amount, None);
    }

    #[test]
    fn parse_ignores_noise() {
        let text = "garbage line\nfoo: bar\npayment_id:  P-1 \nsha256:\n";
        let note = ArtifactNote::parse(text).unwrap();
        assert_eq!(note.payment_id, "P-1");
        assert_eq!(note.sha256, None);
    }

    #[test]
    fn parse_without_payment_id() {
        assert_eq!(ArtifactNote::parse("sha256: abc\n"), None);
        assert_eq!(ArtifactNote::parse(""), None);
    }

    #[test]
    fn note_path_appends_extension() {
        assert_eq!(
            note_path(Path::new("/tmp/out/recibo_10,00.pdf")),
            PathBuf::from("/tmp/out/recibo_10,00.pdf.note")
        );
    }
}
