use std::io::Write;

use clap::ValueEnum;
use ledgerlink_core::TransactionRecord;
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Pretty-printed JSON followed by a newline.
pub fn write_json<W, T>(mut out: W, value: &T) -> Result<(), AppError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    serde_json::to_writer_pretty(&mut out, value).map_err(|e| AppError::Output(e.to_string()))?;
    writeln!(out).map_err(|e| AppError::Output(e.to_string()))
}

pub fn write_transactions<W: Write>(
    out: W,
    records: &[TransactionRecord],
    format: OutputFormat,
) -> Result<(), AppError> {
    match format {
        OutputFormat::Json => write_json(out, records),
        OutputFormat::Csv => write_csv(out, records),
    }
}

/// Three columns for spreadsheet import. Commas are stripped from the
/// description so that naive importers split rows correctly.
fn write_csv<W: Write>(out: W, records: &[TransactionRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["Date", "Amount", "Description"])
        .map_err(|e| AppError::Output(e.to_string()))?;
    for record in records {
        let amount = record.amount.to_string();
        let description = record.name.replace(',', "");
        writer
            .write_record([record.date.as_str(), amount.as_str(), description.as_str()])
            .map_err(|e| AppError::Output(e.to_string()))?;
    }
    writer.flush().map_err(|e| AppError::Output(e.to_string()))
}
