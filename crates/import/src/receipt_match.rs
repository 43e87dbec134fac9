use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use quitus_core::PaymentRecord;

use crate::normalize::{decimal_to_cents, money_to_decimal, sentinel_to_amount, ParseError};
use crate::patterns::extract_identifier;

/// A record awaiting its receipt. `identifier` is taken from the title when
/// it embeds a payment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchableRecord {
    pub key: String,
    pub title: String,
    pub identifier: Option<String>,
    pub amount_cents: Option<i64>,
}

impl MatchableRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>, amount_cents: Option<i64>) -> Self {
        let title = title.into();
        Self {
            key: key.into(),
            identifier: extract_identifier(&title),
            title,
            amount_cents,
        }
    }

    /// Builds a record from a free-form amount such as `1.234,56`.
    pub fn with_amount_text(
        key: impl Into<String>,
        title: impl Into<String>,
        amount: &str,
    ) -> Result<Self, ParseError> {
        let cents = decimal_to_cents(money_to_decimal(amount)?)
            .ok_or_else(|| ParseError::Amount(amount.to_string()))?;
        Ok(Self::new(key, title, Some(cents)))
    }

    /// A reconciled payment paired with the title of its workflow card. A
    /// blank amount leaves the record matchable by identifier only.
    pub fn from_payment(
        key: impl Into<String>,
        title: impl Into<String>,
        payment: &PaymentRecord,
    ) -> Result<Self, ParseError> {
        let cents = if payment.amount.trim().is_empty() {
            None
        } else {
            let amount = sentinel_to_amount(&payment.amount)?;
            Some(decimal_to_cents(amount).ok_or_else(|| ParseError::Amount(payment.amount.clone()))?)
        };
        Ok(Self::new(key, title, cents))
    }
}

/// A retrieved document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptCandidate {
    pub path: PathBuf,
    pub identifier: Option<String>,
    pub amount_cents: Option<i64>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchBasis {
    Identifier,
    Amount { difference_cents: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptMatch {
    pub record_key: String,
    pub candidate: ReceiptCandidate,
    pub basis: MatchBasis,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptMatchReport {
    pub matches: Vec<ReceiptMatch>,
    /// Keys of records left without a receipt.
    pub unmatched: Vec<String>,
    /// Candidates no record claimed.
    pub leftover: Vec<ReceiptCandidate>,
}

pub struct ReceiptMatcher {
    pub amount_tolerance_cents: i64,
}

impl Default for ReceiptMatcher {
    fn default() -> Self {
        Self {
            amount_tolerance_cents: 1,
        }
    }
}

impl ReceiptMatcher {
    pub fn new(amount_tolerance_cents: i64) -> Self {
        Self {
            amount_tolerance_cents,
        }
    }

    /// Pairs records with candidates, each candidate used at most once.
    ///
    /// Identifier hits are settled for every record before any amount
    /// comparison, so an amount match can never take a receipt that belongs
    /// to another record by id. For amounts the smallest difference within
    /// tolerance wins; ties go to the earliest candidate.
    pub fn match_receipts(
        &self,
        records: &[MatchableRecord],
        candidates: Vec<ReceiptCandidate>,
    ) -> ReceiptMatchReport {
        let mut pool: Vec<Option<ReceiptCandidate>> = candidates.into_iter().map(Some).collect();
        let mut found: Vec<Option<ReceiptMatch>> = vec![None; records.len()];

        // ── Pass 1: identifiers ──
        for (slot, record) in found.iter_mut().zip(records) {
            let Some(id) = &record.identifier else {
                continue;
            };
            let hit = pool
                .iter()
                .position(|c| matches!(c, Some(c) if c.identifier.as_deref() == Some(id.as_str())));
            if let Some(i) = hit {
                if let Some(candidate) = pool[i].take() {
                    *slot = Some(ReceiptMatch {
                        record_key: record.key.clone(),
                        candidate,
                        basis: MatchBasis::Identifier,
                    });
                }
            }
        }

        // ── Pass 2: amounts ──
        for (slot, record) in found.iter_mut().zip(records) {
            if slot.is_some() {
                continue;
            }
            let Some((i, diff)) = self.closest_amount(record, &pool) else {
                continue;
            };
            if let Some(candidate) = pool[i].take() {
                *slot = Some(ReceiptMatch {
                    record_key: record.key.clone(),
                    candidate,
                    basis: MatchBasis::Amount {
                        difference_cents: diff,
                    },
                });
            }
        }

        let mut report = ReceiptMatchReport::default();
        for (slot, record) in found.into_iter().zip(records) {
            match slot {
                Some(m) => report.matches.push(m),
                None => report.unmatched.push(record.key.clone()),
            }
        }
        report.leftover = pool.into_iter().flatten().collect();

        tracing::info!(
            matched = report.matches.len(),
            unmatched = report.unmatched.len(),
            leftover = report.leftover.len(),
            "receipt matching finished"
        );
        report
    }

    /// Index and difference of the closest in-tolerance candidate.
    fn closest_amount(
        &self,
        record: &MatchableRecord,
        pool: &[Option<ReceiptCandidate>],
    ) -> Option<(usize, i64)> {
        let wanted = record.amount_cents?;
        let mut best: Option<(usize, i64)> = None;

        for (i, candidate) in pool.iter().enumerate() {
            let Some(candidate) = candidate else { continue };
            // A receipt carrying a different payment id is not this record's.
            if let (Some(a), Some(b)) = (&record.identifier, &candidate.identifier) {
                if a != b {
                    continue;
                }
            }
            let Some(amount) = candidate.amount_cents else { continue };

            let diff = (wanted - amount).abs();
            if diff > self.amount_tolerance_cents {
                continue;
            }
            if best.map_or(true, |(_, d)| diff < d) {
                best = Some((i, diff));
            }
        }
        best
    }
}

// ── Attachment ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where matched receipts end up. The workflow tool owning the records sits
/// behind this seam.
pub trait AttachmentSink {
    fn attach(&mut self, matched: &ReceiptMatch) -> Result<(), AttachError>;
}

#[derive(Serialize)]
struct ManifestLine<'a> {
    record_key: &'a str,
    artifact: &'a std::path::Path,
    digest: Option<&'a str>,
    #[serde(flatten)]
    basis: &'a MatchBasis,
}

/// One JSON object per line: record key, artifact path, digest and basis.
pub struct ManifestSink<W: Write> {
    writer: W,
}

impl<W: Write> ManifestSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ManifestSink<std::io::BufWriter<std::fs::File>> {
    pub fn create(path: &std::path::Path) -> Result<Self, AttachError> {
        Ok(Self::new(std::io::BufWriter::new(std::fs::File::create(path)?)))
    }
}

impl<W: Write> AttachmentSink for ManifestSink<W> {
    fn attach(&mut self, matched: &ReceiptMatch) -> Result<(), AttachError> {
        let line = ManifestLine {
            record_key: &matched.record_key,
            artifact: &matched.candidate.path,
            digest: matched.candidate.digest.as_deref(),
            basis: &matched.basis,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Hands every match in `report` to `sink`, stopping at the first failure.
pub fn attach_all(report: &ReceiptMatchReport, sink: &mut dyn AttachmentSink) -> Result<usize, AttachError> {
    for m in &report.matches {
        sink.attach(m)?;
        tracing::debug!(record = %m.record_key, artifact = %m.candidate.path.display(), "receipt attached");
    }
    Ok(report.matches.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "9f86d081884c7d659a2feaa0c55ad015";
    const ID_B: &str = "60303ae22b998861bce3b28f33eec1be";

    fn record(key: &str, title: &str, cents: Option<i64>) -> MatchableRecord {
        MatchableRecord::new(key, title, cents)
    }

    fn candidate(name: &str, id: Option<&str>, cents: Option<i64>) -> ReceiptCandidate {
        ReceiptCandidate {
            path: PathBuf::from(name),
            identifier: id.map(str::to_string),
            amount_cents: cents,
            digest: None,
        }
    }

    // ── Identifier matching ─────────────────────────────────────────────────

    #[test]
    fn identifier_wins_over_amount() {
        let records = vec![record("r1", &format!("Pagamento {ID_A}"), Some(10000))];
        let candidates = vec![
            candidate("same_amount.pdf", None, Some(10000)),
            candidate("by_id.pdf", Some(ID_A), Some(99999)),
        ];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].basis, MatchBasis::Identifier);
        assert_eq!(report.matches[0].candidate.path, PathBuf::from("by_id.pdf"));
        assert_eq!(report.leftover.len(), 1);
    }

    #[test]
    fn identifier_pass_runs_before_amounts() {
        // r1 has no id and would grab the receipt by amount if processed first.
        let records = vec![
            record("r1", "Sem id", Some(5000)),
            record("r2", &format!("Pagamento {ID_A}"), Some(5000)),
        ];
        let candidates = vec![candidate("a.pdf", Some(ID_A), Some(5000))];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].record_key, "r2");
        assert_eq!(report.unmatched, vec!["r1".to_string()]);
    }

    #[test]
    fn foreign_identifier_blocks_amount_match() {
        let records = vec![record("r1", &format!("Pagamento {ID_A}"), Some(5000))];
        let candidates = vec![candidate("b.pdf", Some(ID_B), Some(5000))];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert!(report.matches.is_empty());
        assert_eq!(report.unmatched, vec!["r1".to_string()]);
    }

    // ── Amount matching ─────────────────────────────────────────────────────

    #[test]
    fn one_cent_difference_is_within_default_tolerance() {
        let records = vec![record("r1", "Maria", Some(10000))];
        let candidates = vec![candidate("maria_100,01.pdf", None, Some(10001))];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert_eq!(
            report.matches[0].basis,
            MatchBasis::Amount {
                difference_cents: 1
            }
        );
    }

    #[test]
    fn beyond_tolerance_is_unmatched() {
        let records = vec![record("r1", "Maria", Some(10000))];
        let candidates = vec![candidate("x.pdf", None, Some(10002))];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert!(report.matches.is_empty());
        assert_eq!(report.leftover.len(), 1);
    }

    #[test]
    fn closest_amount_wins_and_ties_keep_first() {
        let records = vec![record("r1", "Maria", Some(10000))];
        let candidates = vec![
            candidate("plus.pdf", None, Some(10001)),
            candidate("minus.pdf", None, Some(9999)),
            candidate("exact.pdf", None, Some(10000)),
        ];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates.clone());
        assert_eq!(report.matches[0].candidate.path, PathBuf::from("exact.pdf"));

        let report = ReceiptMatcher::default().match_receipts(&records, candidates[..2].to_vec());
        assert_eq!(report.matches[0].candidate.path, PathBuf::from("plus.pdf"));
    }

    #[test]
    fn candidate_used_at_most_once() {
        let records = vec![
            record("r1", "Ana", Some(2500)),
            record("r2", "Bia", Some(2500)),
        ];
        let candidates = vec![candidate("c.pdf", None, Some(2500))];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].record_key, "r1");
        assert_eq!(report.unmatched, vec!["r2".to_string()]);
        assert!(report.leftover.is_empty());
    }

    #[test]
    fn missing_amounts_never_match_by_amount() {
        let records = vec![record("r1", "Ana", None)];
        let candidates = vec![candidate("c.pdf", None, None)];
        let report = ReceiptMatcher::new(100).match_receipts(&records, candidates);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn record_from_amount_text() {
        let r = MatchableRecord::with_amount_text("k", "Maria", "1.234,56").unwrap();
        assert_eq!(r.amount_cents, Some(123456));
        assert_eq!(r.identifier, None);
        assert!(MatchableRecord::with_amount_text("k", "Maria", "abc").is_err());
    }

    #[test]
    fn oversized_amount_text_is_a_parse_error() {
        let err = MatchableRecord::with_amount_text("k", "t", "79228162514264337593543950335").unwrap_err();
        assert!(matches!(err, ParseError::Amount(_)));
    }

    #[test]
    fn record_from_reconciled_payment() {
        let payment = PaymentRecord {
            amount: "18645.974444".into(),
            ..Default::default()
        };
        let r = MatchableRecord::from_payment("c1", format!("Pagamento {ID_B}"), &payment).unwrap();
        assert_eq!(r.amount_cents, Some(1864597));
        assert_eq!(r.identifier.as_deref(), Some(ID_B));

        let blank = PaymentRecord::default();
        assert_eq!(MatchableRecord::from_payment("c2", "x", &blank).unwrap().amount_cents, None);
    }

    #[test]
    fn basis_serializes_with_kind_tag() {
        let json = serde_json::to_string(&MatchBasis::Amount {
            difference_cents: 1,
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"amount","difference_cents":1}"#);
    }

    // ── Manifest ────────────────────────────────────────────────────────────

    #[test]
    fn manifest_writes_one_json_line_per_match() {
        let records = vec![
            record("card-1", &format!("Pagamento {ID_A}"), Some(100)),
            record("card-2", "Maria", Some(2000)),
        ];
        let candidates = vec![
            candidate("a.pdf", Some(ID_A), None),
            candidate("maria_20,00.pdf", None, Some(2000)),
        ];
        let report = ReceiptMatcher::default().match_receipts(&records, candidates);

        let mut sink = ManifestSink::new(Vec::new());
        assert_eq!(attach_all(&report, &mut sink).unwrap(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record_key"], "card-1");
        assert_eq!(lines[0]["kind"], "identifier");
        assert_eq!(lines[1]["artifact"], "maria_20,00.pdf");
        assert_eq!(lines[1]["kind"], "amount");
        assert_eq!(lines[1]["difference_cents"], 0);
    }
}
