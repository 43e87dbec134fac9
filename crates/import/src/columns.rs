//! Fuzzy header resolution.
//!
//! Each logical column carries an ordered synonym list. Headers and synonyms
//! are compared as accent-free upper-case word sequences, so `Conta_Fundo`,
//! `conta fundo` and `CONTA-FUNDO` all contain the phrase `CONTA FUNDO`.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

use crate::normalize::clean_text;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserColumn {
    BeneficiaryAccount,
    BeneficiaryBranch,
    BeneficiaryBank,
    BeneficiaryDocument,
    BeneficiaryName,
    FundAccount,
    Amount,
    Street,
    Number,
    Complement,
    City,
    State,
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceColumn {
    TaxId,
    Account,
    Name,
    Bank,
    Branch,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec<C: 'static> {
    pub column: C,
    /// Used in error messages.
    pub name: &'static str,
    /// Phrases in priority order, already in [`header_key`] form.
    pub synonyms: &'static [&'static str],
    pub required: bool,
}

/// Resolution order matters: a header is claimed by the first entry that
/// matches it, so specific phrases come before generic ones.
pub const USER_COLUMNS: &[ColumnSpec<UserColumn>] = &[
    ColumnSpec {
        column: UserColumn::BeneficiaryAccount,
        name: "beneficiary account",
        synonyms: &["CONTA FAVORECIDO", "CONTA DO FAVORECIDO", "CONTA BENEFICIARIO", "CONTA CREDITO", "BENEFICIARY ACCOUNT"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::BeneficiaryBranch,
        name: "beneficiary branch",
        synonyms: &["AGENCIA FAVORECIDO", "AGENCIA DO FAVORECIDO", "AGENCIA BENEFICIARIO", "AGENCIA", "AG", "BRANCH"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::BeneficiaryBank,
        name: "beneficiary bank",
        synonyms: &["BANCO FAVORECIDO", "BANCO DO FAVORECIDO", "BANCO BENEFICIARIO", "BANCO", "BANK"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::BeneficiaryDocument,
        name: "beneficiary document",
        synonyms: &["CPF CNPJ", "CPF", "CNPJ FAVORECIDO", "CNPJ", "DOCUMENTO", "INSCRICAO"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::BeneficiaryName,
        name: "beneficiary name",
        synonyms: &["NOME FAVORECIDO", "NOME DO FAVORECIDO", "NOME BENEFICIARIO", "FAVORECIDO", "BENEFICIARIO", "NOME", "NAME"],
        required: true,
    },
    ColumnSpec {
        column: UserColumn::FundAccount,
        name: "fund account",
        synonyms: &["CONTA FUNDO", "CONTA DO FUNDO", "CONTA DEBITO", "CONTA ORIGEM", "CONTA CORRENTE", "CONTA", "ACCOUNT"],
        required: true,
    },
    ColumnSpec {
        column: UserColumn::Amount,
        name: "amount",
        synonyms: &["VALOR", "VLR", "AMOUNT", "TOTAL"],
        required: true,
    },
    ColumnSpec {
        column: UserColumn::Street,
        name: "street",
        synonyms: &["ENDERECO", "LOGRADOURO", "RUA", "STREET"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::Number,
        name: "number",
        synonyms: &["NUMERO", "NUM", "NRO"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::Complement,
        name: "complement",
        synonyms: &["COMPLEMENTO", "COMPL"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::City,
        name: "city",
        synonyms: &["CIDADE", "MUNICIPIO", "CITY"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::State,
        name: "state",
        synonyms: &["UF", "ESTADO", "STATE"],
        required: false,
    },
    ColumnSpec {
        column: UserColumn::Zip,
        name: "zip",
        synonyms: &["CEP", "ZIP"],
        required: false,
    },
];

pub const REFERENCE_COLUMNS: &[ColumnSpec<ReferenceColumn>] = &[
    ColumnSpec {
        column: ReferenceColumn::TaxId,
        name: "fund tax id",
        synonyms: &["CNPJ FUNDO", "CNPJ DO FUNDO", "CNPJ", "TAX ID"],
        required: true,
    },
    ColumnSpec {
        column: ReferenceColumn::Account,
        name: "fund account",
        synonyms: &["CONTA FUNDO", "CONTA CORRENTE", "CONTA", "ACCOUNT"],
        required: true,
    },
    ColumnSpec {
        column: ReferenceColumn::Bank,
        name: "fund bank",
        synonyms: &["BANCO", "COD BANCO", "BANK"],
        required: false,
    },
    ColumnSpec {
        column: ReferenceColumn::Branch,
        name: "fund branch",
        synonyms: &["AGENCIA", "AG", "BRANCH"],
        required: false,
    },
    ColumnSpec {
        column: ReferenceColumn::Name,
        name: "fund name",
        synonyms: &["NOME FUNDO", "RAZAO SOCIAL", "NOME", "FUNDO", "NAME"],
        required: false,
    },
];

/// Logical column to header index.
#[derive(Debug, Clone)]
pub struct ResolvedColumns<C> {
    indices: HashMap<C, usize>,
}

impl<C: Copy + Eq + Hash> ResolvedColumns<C> {
    pub fn get(&self, column: C) -> Option<usize> {
        self.indices.get(&column).copied()
    }
}

/// Header text reduced to space-separated accent-free upper-case words.
pub fn header_key(header: &str) -> String {
    clean_text(&header.replace(['_', '/', '-', '.'], " "))
}

fn contains_phrase(header: &str, phrase: &str) -> bool {
    format!(" {header} ").contains(&format!(" {phrase} "))
}

/// Maps each entry to the first unclaimed header containing one of its
/// synonyms, trying synonyms in order. Fails on the first required entry
/// left without a header.
pub fn resolve_columns<C: Copy + Eq + Hash>(
    headers: &[String],
    specs: &[ColumnSpec<C>],
) -> Result<ResolvedColumns<C>, SchemaError> {
    let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
    let mut claimed = vec![false; keys.len()];
    let mut indices = HashMap::new();

    for spec in specs {
        let found = spec.synonyms.iter().find_map(|syn| {
            keys.iter()
                .enumerate()
                .find(|(i, key)| !claimed[*i] && contains_phrase(key, syn))
                .map(|(i, _)| i)
        });

        match found {
            Some(i) => {
                claimed[i] = true;
                indices.insert(spec.column, i);
            }
            None if spec.required => {
                return Err(SchemaError::MissingColumn(spec.name.to_string()));
            }
            None => {}
        }
    }

    Ok(ResolvedColumns { indices })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(h: &[&str]) -> Vec<String> {
        h.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_key_normalises_separators_and_accents() {
        assert_eq!(header_key("Conta_Fundo"), "CONTA FUNDO");
        assert_eq!(header_key("Agência-Favorecido"), "AGENCIA FAVORECIDO");
        assert_eq!(header_key("CPF/CNPJ"), "CPF CNPJ");
    }

    #[test]
    fn resolves_typical_user_export() {
        let h = headers(&[
            "Favorecido",
            "CPF/CNPJ",
            "Banco",
            "Agência",
            "Conta Favorecido",
            "Conta Fundo",
            "Valor (R$)",
            "Endereço",
            "CEP",
        ]);
        let cols = resolve_columns(&h, USER_COLUMNS).unwrap();
        assert_eq!(cols.get(UserColumn::BeneficiaryName), Some(0));
        assert_eq!(cols.get(UserColumn::BeneficiaryDocument), Some(1));
        assert_eq!(cols.get(UserColumn::BeneficiaryBank), Some(2));
        assert_eq!(cols.get(UserColumn::BeneficiaryBranch), Some(3));
        assert_eq!(cols.get(UserColumn::BeneficiaryAccount), Some(4));
        assert_eq!(cols.get(UserColumn::FundAccount), Some(5));
        assert_eq!(cols.get(UserColumn::Amount), Some(6));
        assert_eq!(cols.get(UserColumn::Street), Some(7));
        assert_eq!(cols.get(UserColumn::Zip), Some(8));
        assert_eq!(cols.get(UserColumn::City), None);
    }

    #[test]
    fn header_claimed_once() {
        // Only one "conta" header: the beneficiary spec does not match it,
        // so it is left for the fund account.
        let h = headers(&["NOME", "CONTA", "VALOR"]);
        let cols = resolve_columns(&h, USER_COLUMNS).unwrap();
        assert_eq!(cols.get(UserColumn::FundAccount), Some(1));
        assert_eq!(cols.get(UserColumn::BeneficiaryAccount), None);
    }

    #[test]
    fn matching_is_word_based() {
        // "RECEPCAO" contains "CEP" as a substring but not as a word.
        let h = headers(&["Nome", "Conta", "Valor", "Recepcao"]);
        let cols = resolve_columns(&h, USER_COLUMNS).unwrap();
        assert_eq!(cols.get(UserColumn::Zip), None);
    }

    #[test]
    fn missing_required_column_is_named() {
        let h = headers(&["Nome", "Valor"]);
        let err = resolve_columns(&h, USER_COLUMNS).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("fund account".into()));
        assert_eq!(err.to_string(), "Missing required column: fund account");
    }

    #[test]
    fn reference_optional_columns_may_be_absent() {
        let h = headers(&["CNPJ", "Conta"]);
        let cols = resolve_columns(&h, REFERENCE_COLUMNS).unwrap();
        assert_eq!(cols.get(ReferenceColumn::TaxId), Some(0));
        assert_eq!(cols.get(ReferenceColumn::Account), Some(1));
        assert_eq!(cols.get(ReferenceColumn::Bank), None);
        assert_eq!(cols.get(ReferenceColumn::Name), None);
    }
}
