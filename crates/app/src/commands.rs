use anyhow::{bail, Context, Result};
use quitus_bank::{BankSession, DocumentRetrievalClient, HttpReceiptApi, PaymentRef, RetrievalSettings};
use quitus_core::config::CLIENT_SECRET_ENV;
use quitus_core::{Config, Money};
use quitus_import::columns::{resolve_columns, ColumnSpec};
use quitus_import::normalize::{money_to_decimal, parse_date};
use quitus_import::{
    attach_all, load_candidates, read_table, write_csv_file, write_xlsx, ManifestSink, MatchBasis,
    MatchableRecord, ReceiptMatcher, ReconciliationEngine, Table,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const UNRESOLVED_FILE: &str = "unresolved.tsv";

pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::load(path).with_context(|| format!("loading {}", path.display()));
    }
    tracing::info!(path = %path.display(), "config file not found, using defaults");
    Ok(Config::default().with_client_secret(std::env::var(CLIENT_SECRET_ENV).ok()))
}

// ── reconcile ────────────────────────────────────────────────────────────────

pub fn reconcile(
    config: &Config,
    user: &Path,
    reference: &Path,
    out: &Path,
    date: Option<String>,
    xlsx: bool,
) -> Result<()> {
    let date = date
        .or_else(|| config.payment_date.clone())
        .context("no payment date: pass --date or set payment_date in the config")?;

    let user_table = read_table(user).with_context(|| format!("reading {}", user.display()))?;
    let reference_table =
        read_table(reference).with_context(|| format!("reading {}", reference.display()))?;

    let engine = ReconciliationEngine::new(config.remittance_address.clone());
    let result = engine.reconcile(&user_table, &reference_table, &date)?;

    std::fs::create_dir_all(out)?;
    write_csv_file(&result.ok, &out.join("ok.csv"))?;
    write_csv_file(&result.pending, &out.join("pending.csv"))?;
    if xlsx {
        write_xlsx(&result.ok, &out.join("ok.xlsx"))?;
        write_xlsx(&result.pending, &out.join("pending.xlsx"))?;
    }

    let s = &result.summary;
    println!("{} rows: {} ok, {} pending", s.total, s.ok, s.pending);
    println!(
        "registry: {} by account, {} by last 8 digits, {} not registered",
        s.matched_primary, s.matched_fallback, s.unmatched
    );
    if s.blank_amounts > 0 {
        println!("{} rows have no amount", s.blank_amounts);
    }
    Ok(())
}

// ── fetch / receipts ─────────────────────────────────────────────────────────

fn retrieval_client(config: &Config, out: &Path) -> Result<DocumentRetrievalClient<HttpReceiptApi>> {
    let bank = config.require_bank()?;
    let timeout = Duration::from_secs(config.retrieval.timeout_secs);
    let session = Arc::new(BankSession::from_config(bank, timeout)?);
    Ok(DocumentRetrievalClient::new(
        HttpReceiptApi::new(session),
        RetrievalSettings::from(&config.retrieval),
        out,
    ))
}

/// One payment per non-blank, non-comment line: the id, then an optional
/// amount in the second field. The header and repeated ids are dropped.
pub fn read_payments(text: &str) -> Vec<PaymentRef> {
    let mut payments: Vec<PaymentRef> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split([';', '\t']).map(str::trim);
        let id = fields.next().unwrap_or("");
        if id.is_empty() || id.eq_ignore_ascii_case("payment_id") {
            continue;
        }
        if payments.iter().any(|p| p.payment_id == id) {
            continue;
        }

        let mut payment = PaymentRef::new(id);
        match fields.next().filter(|a| !a.is_empty()).map(money_to_decimal) {
            Some(Ok(amount)) => payment = payment.with_amount(amount),
            Some(Err(e)) => tracing::warn!(payment_id = id, error = %e, "payment amount ignored"),
            None => {}
        }
        payments.push(payment);
    }
    payments
}

pub async fn fetch(config: &Config, payments: &Path, out: &Path) -> Result<()> {
    let text = std::fs::read_to_string(payments)
        .with_context(|| format!("reading {}", payments.display()))?;
    let batch = read_payments(&text);
    if batch.is_empty() {
        bail!("no payment ids in {}", payments.display());
    }

    let client = retrieval_client(config, out)?;
    let report = client.fetch_batch(&batch).await;

    std::fs::create_dir_all(out)?;
    let unresolved = out.join(UNRESOLVED_FILE);
    report.write_unresolved(&unresolved)?;

    println!("fetched {} of {} receipts", report.fetched.len(), batch.len());
    if !report.unresolved.is_empty() {
        println!(
            "{} could not be fetched, see {}",
            report.unresolved.len(),
            unresolved.display()
        );
    }
    Ok(())
}

pub async fn list_receipts(config: &Config, from: &str, to: &str) -> Result<()> {
    let start = parse_date(from).with_context(|| format!("invalid date: {from}"))?;
    let end = parse_date(to).with_context(|| format!("invalid date: {to}"))?;

    let client = retrieval_client(config, Path::new("."))?;
    let listings = client.list_receipts(start, end).await?;

    for l in &listings {
        println!(
            "{}\t{}\t{}\t{}",
            l.payment_date.format("%d/%m/%Y"),
            l.payment_id,
            Money::from_decimal(l.amount),
            l.beneficiary
        );
    }
    println!("{} receipts", listings.len());
    Ok(())
}

// ── match ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CardColumn {
    Key,
    Title,
    Amount,
}

const CARD_COLUMNS: &[ColumnSpec<CardColumn>] = &[
    ColumnSpec {
        column: CardColumn::Key,
        name: "card id",
        synonyms: &["CARD ID", "ID", "KEY"],
        required: true,
    },
    ColumnSpec {
        column: CardColumn::Title,
        name: "title",
        synonyms: &["TITLE", "TITULO", "NAME", "NOME"],
        required: true,
    },
    ColumnSpec {
        column: CardColumn::Amount,
        name: "amount",
        synonyms: &["AMOUNT", "VALOR", "VLR"],
        required: false,
    },
];

/// Workflow cards as matchable records. Cards whose amount does not parse
/// can still match by identifier.
pub fn card_records(table: &Table) -> Result<Vec<MatchableRecord>> {
    let cols = resolve_columns(&table.headers, CARD_COLUMNS)?;
    let mut records = Vec::with_capacity(table.len());

    for i in 0..table.len() {
        let key = table.cell(i, cols.get(CardColumn::Key));
        if key.is_empty() {
            continue;
        }
        let title = table.cell(i, cols.get(CardColumn::Title));
        let amount = table.cell(i, cols.get(CardColumn::Amount));

        let record = if amount.is_empty() {
            MatchableRecord::new(key, title, None)
        } else {
            MatchableRecord::with_amount_text(key, title, amount).unwrap_or_else(|e| {
                tracing::warn!(card = key, error = %e, "card amount ignored");
                MatchableRecord::new(key, title, None)
            })
        };
        records.push(record);
    }
    Ok(records)
}

pub fn match_receipts(config: &Config, records: &Path, receipts: &Path, manifest: &Path) -> Result<()> {
    let table = read_table(records).with_context(|| format!("reading {}", records.display()))?;
    let records = card_records(&table)?;
    let candidates = load_candidates(receipts)
        .with_context(|| format!("scanning {}", receipts.display()))?;

    let matcher = ReceiptMatcher::new(config.matching.tolerance_cents);
    let report = matcher.match_receipts(&records, candidates);

    let mut sink = ManifestSink::create(manifest)?;
    let attached = attach_all(&report, &mut sink)?;

    println!("{attached} of {} cards matched", records.len());
    for m in &report.matches {
        if let MatchBasis::Amount { difference_cents } = m.basis {
            if difference_cents != 0 {
                println!(
                    "{}: matched by amount, {} apart",
                    m.record_key,
                    Money::from_cents(difference_cents)
                );
            }
        }
    }
    for key in &report.unmatched {
        println!("no receipt: {key}");
    }
    for leftover in &report.leftover {
        println!("unclaimed: {}", leftover.path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "9f86d081884c7d659a2feaa0c55ad015";

    #[test]
    fn payments_skip_header_comments_and_repeats() {
        let text = "payment_id;amount\n# comment\nabc;1.234,56\n\n def \nabc;5,00\nghi;n/a\n";
        let payments = read_payments(text);
        let ids: Vec<&str> = payments.iter().map(|p| p.payment_id.as_str()).collect();
        assert_eq!(ids, vec!["abc", "def", "ghi"]);
        assert_eq!(payments[0].amount, money_to_decimal("1234.56").ok());
        assert_eq!(payments[1].amount, None);
        assert_eq!(payments[2].amount, None);
    }

    #[test]
    fn cards_become_records() {
        let table = Table::new(
            vec!["card_id".into(), "Title".into(), "Amount".into()],
            vec![
                vec!["c1".into(), format!("Pagamento {ID}"), "".into()],
                vec!["c2".into(), "Maria".into(), "1.234,56".into()],
                vec!["c3".into(), "Joao".into(), "n/a".into()],
                vec!["".into(), "orphan".into(), "1,00".into()],
            ],
        );
        let records = card_records(&table).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].identifier.as_deref(), Some(ID));
        assert_eq!(records[1].amount_cents, Some(123456));
        assert_eq!(records[2].amount_cents, None);
    }

    #[test]
    fn reconcile_writes_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.csv");
        let reference = dir.path().join("ref.csv");
        std::fs::write(
            &user,
            "Favorecido;Conta Fundo;Valor\nMaria;0001234567;1.234,56\nJoao;999;10,00\n",
        )
        .unwrap();
        std::fs::write(&reference, "CNPJ;Banco;Agencia;Conta\n12345678000190;341;0123;1234567\n").unwrap();

        let out = dir.path().join("out");
        let config = Config::default();
        reconcile(&config, &user, &reference, &out, Some("15/01/2025".into()), true).unwrap();

        let ok = read_table(&out.join("ok.csv")).unwrap();
        let pending = read_table(&out.join("pending.csv")).unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(pending.len(), 1);
        assert_eq!(ok.rows[0][0], "12345678000190");
        assert_eq!(pending.rows[0][0], quitus_core::FUND_NOT_REGISTERED);
        assert!(out.join("ok.xlsx").exists());
    }

    #[test]
    fn reconcile_needs_a_date() {
        let dir = tempfile::tempdir().unwrap();
        let err = reconcile(
            &Config::default(),
            &dir.path().join("u.csv"),
            &dir.path().join("r.csv"),
            dir.path(),
            None,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("payment date"));
    }

    #[test]
    fn match_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let receipts = dir.path().join("receipts");
        std::fs::create_dir(&receipts).unwrap();
        std::fs::write(receipts.join("maria_1.234,56.pdf"), b"pdf one").unwrap();
        std::fs::write(receipts.join("other_99,00.pdf"), b"pdf two").unwrap();

        let cards = dir.path().join("cards.csv");
        std::fs::write(&cards, "card_id;title;amount\nc1;Maria;1.234,55\nc2;Ana;5,00\n").unwrap();
        let manifest = dir.path().join("manifest.jsonl");

        match_receipts(&Config::default(), &cards, &receipts, &manifest).unwrap();

        let text = std::fs::read_to_string(&manifest).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["record_key"], "c1");
        assert_eq!(lines[0]["difference_cents"], 1);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.matching.tolerance_cents, 1);
    }
}
