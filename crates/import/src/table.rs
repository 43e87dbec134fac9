use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),
    #[error("Table has no header row")]
    NoHeader,
}

/// A header row plus data rows, every cell as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Cell text, or `""` when the row is short or the column unresolved.
    pub fn cell(&self, row: usize, column: Option<usize>) -> &str {
        column
            .and_then(|c| self.rows.get(row)?.get(c))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a delimited text file or the first sheet of a spreadsheet,
/// chosen by extension.
pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" | "txt" | "tsv" => {
            let file = std::fs::File::open(path)?;
            read_delimited(file)
        }
        "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path),
        other => Err(TableError::UnsupportedFormat(other.to_string())),
    }
}

/// Delimited text with the delimiter sniffed from the header line. Bank and
/// registry exports are frequently Latin-1; non-UTF-8 input is decoded as such.
pub fn read_delimited<R: Read>(mut data: R) -> Result<Table, TableError> {
    let mut bytes = Vec::new();
    data.read_to_end(&mut bytes)?;
    let text = decode_text(&bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let header_line = text.lines().find(|l| !l.trim().is_empty()).ok_or(TableError::NoHeader)?;
    let delimiter = sniff_delimiter(header_line);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }

    Ok(Table { headers, rows })
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn sniff_delimiter(header_line: &str) -> u8 {
    [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|d| header_line.bytes().filter(|b| b == d).count())
        .filter(|d| header_line.as_bytes().contains(d))
        .unwrap_or(b',')
}

fn read_spreadsheet(path: &Path) -> Result<Table, TableError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| TableError::Spreadsheet(format!("Failed to open {}: {e}", path.display())))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableError::Spreadsheet("Workbook has no sheets".to_string()))?
        .map_err(|e| TableError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().ok_or(TableError::NoHeader)?;
    let rows = rows
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Table { headers, rows })
}

/// Spreadsheet cell as text. Whole numbers drop the `.0` so account numbers
/// survive; date cells become ISO dates.
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

/// Out-of-range serials come back as the raw number.
fn excel_serial_to_date(serial: f64) -> String {
    // Excel's epoch is 1899-12-30 once the 1900 leap-year bug is accounted for.
    let date = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .zip(chrono::TimeDelta::try_days(serial as i64))
        .and_then(|(base, days)| base.checked_add_signed(days));
    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => serial.to_string(),
    }
}
