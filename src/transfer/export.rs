//! Fresh output files: plain workbooks, CSV, and atomic saving.
use crate::error::SheetTransferError;
use crate::spreadsheet::cell::date_to_serial;
use crate::spreadsheet::Value;
use crate::transfer::schema::Field;
use crate::transfer::MappedRow;
use crate::transfer::SourceRecord;
use crate::transfer::TransferError;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use rust_xlsxwriter::XlsxError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Sheet name of the plain destination export
pub const PLAIN_SHEET_NAME: &str = "Dados_Atualizados";
/// Sheet name of the extracted records export
pub const RECORDS_SHEET_NAME: &str = "Dados_Extraidos";

const DATE_FORMAT: &str = "yyyy-mm-dd";

/// Column order of destination exports, following the destination sheet
const MAPPED_FIELDS: [Field; 3] = [Field::Date, Field::Revenue, Field::Client];
/// Column order of record exports, following the source sheet
const RECORD_FIELDS: [Field; 3] = [Field::Date, Field::Client, Field::Revenue];

fn serialization_failure(error: impl std::fmt::Display) -> TransferError {
    TransferError::SerializationFailure(error.to_string())
}

/// A new workbook holding only the mapped columns, one row per destination row.
pub fn plain_workbook(rows: &[MappedRow], sheet_name: &str) -> Result<Vec<u8>, SheetTransferError> {
    let values = rows
        .iter()
        .map(|row| [row.date.clone(), row.revenue.clone(), row.client.clone()])
        .collect::<Vec<_>>();
    Ok(build_workbook(sheet_name, &MAPPED_FIELDS, &values).map_err(serialization_failure)?)
}

/// A new workbook listing extracted records in source order.
pub fn records_workbook(records: &[SourceRecord]) -> Result<Vec<u8>, SheetTransferError> {
    let values = records
        .iter()
        .map(|record| {
            let client = match record.client.is_empty() {
                true => Value::Empty,
                false => Value::Text(record.client.to_owned()),
            };
            [Value::Date(record.date), client, record.revenue.clone()]
        })
        .collect::<Vec<_>>();
    Ok(build_workbook(RECORDS_SHEET_NAME, &RECORD_FIELDS, &values).map_err(serialization_failure)?)
}

fn build_workbook(sheet_name: &str, fields: &[Field; 3], rows: &[[Value; 3]]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, field) in fields.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, field.header(), &header_format)?;
    }
    for (index, values) in rows.iter().enumerate() {
        let row = (index + 1) as u32;
        for (col, value) in values.iter().enumerate() {
            write_value(worksheet, row, col as u16, value, &date_format)?;
        }
    }
    worksheet.set_column_width(0, 12)?;
    workbook.save_to_buffer()
}

fn write_value(worksheet: &mut Worksheet, row: u32, col: u16, value: &Value, date_format: &Format) -> Result<(), XlsxError> {
    match value {
        Value::Empty => (),
        Value::Number(number) => {
            worksheet.write_number(row, col, *number)?;
        }
        Value::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        Value::Boolean(flag) => {
            worksheet.write_boolean(row, col, *flag)?;
        }
        Value::Date(date) => {
            worksheet.write_number_with_format(row, col, date_to_serial(*date, false) as f64, date_format)?;
        }
    }
    Ok(())
}

/// Comma-separated mapped columns with a header line.
pub fn csv(rows: &[MappedRow]) -> Result<Vec<u8>, SheetTransferError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(MAPPED_FIELDS.iter().map(|field| field.header()))
        .map_err(serialization_failure)?;
    for row in rows {
        writer
            .write_record([row.date.to_string(), row.revenue.to_string(), row.client.to_string()])
            .map_err(serialization_failure)?;
    }
    Ok(writer.into_inner().map_err(serialization_failure)?)
}

/// Comma-separated extracted records in source column order.
pub fn records_csv(records: &[SourceRecord]) -> Result<Vec<u8>, SheetTransferError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(RECORD_FIELDS.iter().map(|field| field.header()))
        .map_err(serialization_failure)?;
    for record in records {
        writer
            .write_record([record.date.to_string(), record.client.to_owned(), record.revenue.to_string()])
            .map_err(serialization_failure)?;
    }
    Ok(writer.into_inner().map_err(serialization_failure)?)
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
///
/// The target is replaced only once every byte is on disk; on failure the
/// temporary file is removed and the target is left untouched.
pub fn save(path: &Path, bytes: &[u8]) -> Result<(), SheetTransferError> {
    let directory = path
        .parent()
        .filter(|directory| !directory.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let failure = |error: &dyn std::fmt::Display| serialization_failure(format!("cannot write '{}': {}", path.display(), error));

    let mut file = NamedTempFile::new_in(directory).map_err(|error| failure(&error))?;
    file.write_all(bytes).map_err(|error| failure(&error))?;
    file.as_file().sync_all().map_err(|error| failure(&error))?;
    file.persist(path).map_err(|error| failure(&error.error))?;
    log::info!("Saved '{}' ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::Spreadsheet;
    use crate::spreadsheet::XlsxSpreadsheet;
    use chrono::NaiveDate;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn rows() -> Vec<MappedRow> {
        vec![
            MappedRow {
                row: 1,
                date: Value::Date(date(2024, 1, 5)),
                revenue: Value::Number(100.0),
                client: Value::Text("ACME, Ltda".to_owned()),
            },
            MappedRow {
                row: 2,
                date: Value::Empty,
                revenue: Value::Text("n/a".to_owned()),
                client: Value::Empty,
            },
        ]
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let text = String::from_utf8(csv(&rows()).unwrap()).unwrap();
        assert_eq!(text, "Data,Receita_BGX,Cliente\n2024-01-05,100,\"ACME, Ltda\"\n,n/a,\n");
    }

    #[test]
    fn records_csv_follows_source_columns() {
        let records = vec![SourceRecord::new(4, date(2024, 2, 1), "B", Value::Number(2.5))];
        let text = String::from_utf8(records_csv(&records).unwrap()).unwrap();
        assert_eq!(text, "Data,Cliente,Receita_BGX\n2024-02-01,B,2.5\n");
    }

    #[test]
    fn plain_workbook_reads_back() {
        let bytes = plain_workbook(&rows(), PLAIN_SHEET_NAME).unwrap();
        let mut workbook = XlsxSpreadsheet::from_bytes("plain.xlsx", bytes).unwrap();
        assert_eq!(workbook.sheet_names(), vec![PLAIN_SHEET_NAME]);

        let sheet = workbook.read_sheet(PLAIN_SHEET_NAME).unwrap();
        let value = |row, col| sheet.value_at(row, col).map(|cell| cell.to_value()).unwrap_or_default();
        assert_eq!(value(0, 0), Value::Text("Data".to_owned()));
        assert_eq!(value(0, 1), Value::Text("Receita_BGX".to_owned()));
        assert_eq!(value(0, 2), Value::Text("Cliente".to_owned()));
        assert_eq!(value(1, 0), Value::Date(date(2024, 1, 5)));
        assert_eq!(value(1, 1), Value::Number(100.0));
        assert_eq!(value(2, 1), Value::Text("n/a".to_owned()));
        assert_eq!(sheet.row_upper_bound, Some(2));
    }

    #[test]
    fn records_workbook_uses_source_order() {
        let records = vec![SourceRecord::new(4, date(2024, 2, 1), "B", Value::Number(2.5))];
        let bytes = records_workbook(&records).unwrap();
        let mut workbook = XlsxSpreadsheet::from_bytes("records.xlsx", bytes).unwrap();
        let sheet = workbook.read_sheet(RECORDS_SHEET_NAME).unwrap();

        assert_eq!(sheet.value_at(0, 1).map(|cell| cell.value.as_str()), Some("Cliente"));
        assert_eq!(sheet.value_at(1, 0).map(|cell| cell.to_value()), Some(Value::Date(date(2024, 2, 1))));
        assert_eq!(sheet.value_at(1, 1).map(|cell| cell.value.as_str()), Some("B"));
        assert_eq!(sheet.value_at(1, 2).map(|cell| cell.to_value()), Some(Value::Number(2.5)));
    }

    #[test]
    fn save_replaces_target_atomically() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("out.csv");
        std::fs::write(&path, b"old").unwrap();

        save(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(directory.path()).unwrap().count(), 1);

        let missing = directory.path().join("missing").join("out.csv");
        let error = save(&missing, b"x").unwrap_err();
        assert_eq!(error.exit_code(), 5);
        assert!(!missing.exists());
    }
}
