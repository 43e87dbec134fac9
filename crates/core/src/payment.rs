use serde::{Deserialize, Serialize};
use std::fmt;

/// Written into the fund tax ID column when no registry row matched.
pub const FUND_NOT_REGISTERED: &str = "FUNDO NAO CADASTRADO";

/// The fixed output schema. Every exported table uses exactly these headers
/// in exactly this order.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "CNPJ_FUNDO",
    "BANCO_FUNDO",
    "AGENCIA_FUNDO",
    "CONTA_FUNDO",
    "NOME_FAVORECIDO",
    "CPF_CNPJ_FAVORECIDO",
    "BANCO_FAVORECIDO",
    "AGENCIA_FAVORECIDO",
    "CONTA_FAVORECIDO",
    "VALOR",
    "ENDERECO",
    "NUMERO",
    "COMPLEMENTO",
    "CIDADE",
    "UF",
    "CEP",
    "DATA_PAGAMENTO",
];

/// Position of the only numeric column in [`OUTPUT_COLUMNS`].
pub const AMOUNT_COLUMN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Ok,
    Pending,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Ok => write!(f, "ok"),
            RecordStatus::Pending => write!(f, "pending"),
        }
    }
}

/// One row to be paid, already normalised. All fields are text; `amount`
/// carries the sentinel-suffixed value and only becomes numeric at export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub fund_tax_id: String,
    pub fund_bank: String,
    pub fund_branch: String,
    pub fund_account: String,
    pub beneficiary_name: String,
    pub beneficiary_document: String,
    pub beneficiary_bank: String,
    pub beneficiary_branch: String,
    pub beneficiary_account: String,
    pub amount: String,
    pub address_street: String,
    pub address_number: String,
    pub address_complement: String,
    pub address_city: String,
    pub address_state: String,
    pub address_zip: String,
    pub payment_date: String,
}

impl PaymentRecord {
    /// Field values in [`OUTPUT_COLUMNS`] order.
    pub fn values(&self) -> [&str; 17] {
        [
            &self.fund_tax_id,
            &self.fund_bank,
            &self.fund_branch,
            &self.fund_account,
            &self.beneficiary_name,
            &self.beneficiary_document,
            &self.beneficiary_bank,
            &self.beneficiary_branch,
            &self.beneficiary_account,
            &self.amount,
            &self.address_street,
            &self.address_number,
            &self.address_complement,
            &self.address_city,
            &self.address_state,
            &self.address_zip,
            &self.payment_date,
        ]
    }

    pub fn fund_registered(&self) -> bool {
        self.fund_tax_id != FUND_NOT_REGISTERED
    }

    /// Pending when the fund is unknown or any of the fund's bank, branch or
    /// account is blank. A blank amount does not make a record pending.
    pub fn status(&self) -> RecordStatus {
        let missing_bank_data = [&self.fund_bank, &self.fund_branch, &self.fund_account]
            .iter()
            .any(|f| f.trim().is_empty());

        if !self.fund_registered() || missing_bank_data {
            RecordStatus::Pending
        } else {
            RecordStatus::Ok
        }
    }
}

/// One fund's canonical bank data from the registry table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub tax_id: String,
    pub name: String,
    pub bank: String,
    pub branch: String,
    pub account: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PaymentRecord {
        PaymentRecord {
            fund_tax_id: "12345678000190".into(),
            fund_bank: "341".into(),
            fund_branch: "1234".into(),
            fund_account: "567890".into(),
            beneficiary_name: "MARIA DA SILVA".into(),
            amount: "100.004444".into(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_record_is_ok() {
        assert_eq!(complete().status(), RecordStatus::Ok);
    }

    #[test]
    fn unregistered_fund_is_pending() {
        let r = PaymentRecord { fund_tax_id: FUND_NOT_REGISTERED.into(), ..complete() };
        assert_eq!(r.status(), RecordStatus::Pending);
    }

    #[test]
    fn blank_bank_field_is_pending() {
        for blank in 0..3 {
            let mut r = complete();
            match blank {
                0 => r.fund_bank.clear(),
                1 => r.fund_branch = "  ".into(),
                _ => r.fund_account.clear(),
            }
            assert_eq!(r.status(), RecordStatus::Pending, "field {blank}");
        }
    }

    #[test]
    fn blank_amount_alone_stays_ok() {
        let r = PaymentRecord { amount: String::new(), ..complete() };
        assert_eq!(r.status(), RecordStatus::Ok);
    }

    #[test]
    fn values_follow_output_column_order() {
        let r = complete();
        let values = r.values();
        assert_eq!(values.len(), OUTPUT_COLUMNS.len());
        assert_eq!(OUTPUT_COLUMNS[AMOUNT_COLUMN], "VALOR");
        assert_eq!(values[AMOUNT_COLUMN], "100.004444");
        assert_eq!(values[0], "12345678000190");
    }
}
