//! CSV codec for field-value records
//!
//! The first row names the columns; every following row becomes one record
//! keyed by those names. Encoding always quotes every field.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// One CSV row keyed by header name
pub type CsvRecord = BTreeMap<String, String>;

/// Decode CSV text into records keyed by the trimmed header row.
///
/// Short rows yield `""` for the missing trailing columns and values beyond
/// the header count are dropped. Quoted fields may contain commas, quotes
/// (doubled) and newlines.
pub fn decode(text: &str) -> Result<Vec<CsvRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_owned()))
            .collect();
        records.push(record);
    }

    Ok(records)
}

/// Encode records as CSV text with every field double-quoted.
///
/// Columns follow `headers`; a record without a column encodes `""`.
/// Rows are separated by `\n` with no trailing newline.
pub fn encode(headers: &[String], rows: &[CsvRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(
            headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or("")),
        )?;
    }

    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}
