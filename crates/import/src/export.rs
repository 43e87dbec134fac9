use quitus_core::{PaymentRecord, AMOUNT_COLUMN, OUTPUT_COLUMNS};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::normalize::{sentinel_to_export_value, ParseError};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error(transparent)]
    Amount(#[from] ParseError),
}

/// Spreadsheet number format for the amount column.
pub const AMOUNT_FORMAT: &str = "0.000000";

/// Numeric value of a record's sentinel amount; `None` when blank.
pub fn export_amount(record: &PaymentRecord) -> Result<Option<Decimal>, ParseError> {
    if record.amount.trim().is_empty() {
        return Ok(None);
    }
    sentinel_to_export_value(&record.amount).map(Some)
}

/// `;`-delimited rows in the fixed column order. The amount is written as a
/// plain number with six decimals, every other field verbatim.
pub fn write_csv<W: Write>(records: &[PaymentRecord], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    wtr.write_record(OUTPUT_COLUMNS)?;

    for record in records {
        let amount = export_amount(record)?
            .map(|v| format!("{v:.6}"))
            .unwrap_or_default();
        let mut fields = record.values().map(str::to_string);
        fields[AMOUNT_COLUMN] = amount;
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(records: &[PaymentRecord], path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_csv(records, std::io::BufWriter::new(file))
}

/// Spreadsheet export. Every column is formatted as text (`@`) so codes keep
/// their leading zeros and dates stay `dd/mm/yyyy`; the amount column alone
/// is numeric with [`AMOUNT_FORMAT`].
pub fn write_xlsx(records: &[PaymentRecord], path: &Path) -> Result<(), ExportError> {
    use rust_xlsxwriter::{Format, Workbook};

    let text = Format::new().set_num_format("@");
    let number = Format::new().set_num_format(AMOUNT_FORMAT);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, header) in OUTPUT_COLUMNS.iter().enumerate() {
        let col = col as u16;
        if col as usize != AMOUNT_COLUMN {
            sheet.set_column_format(col, &text)?;
        }
        sheet.write_string_with_format(0, col, *header, &text)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in record.values().iter().enumerate() {
            if col == AMOUNT_COLUMN {
                if let Some(amount) = export_amount(record)?.and_then(|d| d.to_f64()) {
                    sheet.write_number_with_format(row, col as u16, amount, &number)?;
                }
            } else {
                sheet.write_string_with_format(row, col as u16, *value, &text)?;
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}
