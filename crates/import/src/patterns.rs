use std::sync::OnceLock;

use regex::Regex;

use crate::normalize::{decimal_to_cents, money_to_decimal};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// 32 hex digits, optionally in 8-4-4-4-12 UUID grouping.
re!(re_identifier,
    r"(?i)\b([0-9a-f]{8})-?([0-9a-f]{4})-?([0-9a-f]{4})-?([0-9a-f]{4})-?([0-9a-f]{12})\b");

re!(re_money_token,
    r"\d{1,3}(?:\.\d{3})+,\d{2}\b|\d+[.,]\d{2}\b");

/// Payment identifier embedded in free text, lower-cased and without dashes.
pub fn extract_identifier(text: &str) -> Option<String> {
    let c = re_identifier().captures(text)?;
    let id: String = (1..=5)
        .filter_map(|i| c.get(i).map(|m| m.as_str()))
        .collect::<String>()
        .to_lowercase();
    Some(id)
}

/// Amount (in cents) carried by an artifact name such as
/// `comprovante_maria_1.234,56.pdf`. The last money-looking token wins.
pub fn amount_from_name(name: &str) -> Option<i64> {
    let token = re_money_token().find_iter(name).last()?;
    decimal_to_cents(money_to_decimal(token.as_str()).ok()?)
}
