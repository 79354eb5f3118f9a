//! Reads source records from fixed positional columns.
use crate::error::SheetTransferError;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::Value;
use crate::transfer::schema::DateRange;
use crate::transfer::schema::Field;
use crate::transfer::schema::Schema;
use crate::transfer::SourceRecord;
use crate::transfer::TransferError;

/// Records extracted from a source sheet, with row accounting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// Valid records within the date range, in source order
    pub records: Vec<SourceRecord>,
    /// Data rows examined below the header
    pub scanned_rows: usize,
    /// Rows without a usable date
    pub dropped_rows: usize,
    /// Rows with a valid date outside the range
    pub filtered_rows: usize,
}

/// Extracts the records of `schema.source.sheet` whose date lies in `range`.
///
/// Rows with an empty or unparsable date cell are skipped; any other cell
/// content is carried as is. Fails only if the sheet is missing or a declared
/// header does not match.
pub fn extract<S: Spreadsheet + ?Sized>(source: &mut S, schema: &Schema, range: &DateRange) -> Result<Extraction, SheetTransferError> {
    let sheet = source.read_sheet(&schema.source.sheet)?;
    check_headers(&sheet, schema)?;

    let mut extraction = Extraction::default();
    let first_row = schema.source.header_rows;
    let last_row = match sheet.row_upper_bound {
        Some(last_row) if last_row >= first_row => last_row,
        _ => {
            log::warn!("Sheet '{}' of '{}' has no data rows", sheet.name, sheet.file_name);
            return Ok(extraction);
        }
    };

    let date_col = schema.columns.date.source.index();
    let client_col = schema.columns.client.source.index();
    let revenue_col = schema.columns.revenue.source.index();
    for row in first_row..=last_row {
        extraction.scanned_rows += 1;
        let date = match sheet.value_at(row, date_col) {
            Some(cell) => match cell.to_date() {
                Ok(date) => date,
                Err(_) => {
                    let failure = TransferError::DateParseFailure {
                        position: index_to_reference(row, date_col),
                        value: cell.value.to_owned(),
                    };
                    log::debug!("Dropped row {}: {}", row + 1, failure);
                    extraction.dropped_rows += 1;
                    continue;
                }
            },
            None => {
                extraction.dropped_rows += 1;
                continue;
            }
        };
        if !range.contains(date) {
            extraction.filtered_rows += 1;
            continue;
        }
        let client = sheet.value_at(row, client_col).map(|cell| cell.to_value().to_string()).unwrap_or_default();
        let revenue = sheet.value_at(row, revenue_col).map(|cell| cell.to_value()).unwrap_or(Value::Empty);
        extraction.records.push(SourceRecord::new(row, date, &client, revenue));
    }

    log::info!(
        "Extracted {} record(s) from '{}' in range {} ({} row(s) scanned, {} without a valid date, {} out of range)",
        extraction.records.len(),
        sheet.name,
        range,
        extraction.scanned_rows,
        extraction.dropped_rows,
        extraction.filtered_rows
    );
    if extraction.records.is_empty() {
        log::warn!("No records found in '{}' for range {}", sheet.name, range);
    }
    Ok(extraction)
}

/// Compares declared header texts with the last header row, ignoring case and
/// surrounding blanks.
fn check_headers(sheet: &Sheet, schema: &Schema) -> Result<(), TransferError> {
    let Some(header_row) = schema.source.header_rows.checked_sub(1) else {
        return Ok(());
    };
    for field in Field::ALL {
        let mapping = schema.columns.get(field);
        let Some(expected) = mapping.expected_header.as_deref() else {
            continue;
        };
        let col = mapping.source.index();
        let found = sheet.value_at(header_row, col).map(|cell| cell.to_value().to_string()).unwrap_or_default();
        if found.trim().to_lowercase() != expected.trim().to_lowercase() {
            return Err(TransferError::SchemaDrift {
                field,
                position: index_to_reference(header_row, col),
                expected: expected.to_owned(),
                found,
            });
        }
        log::debug!("Header of '{}' at {} matches '{}'", field, index_to_reference(header_row, col), expected);
    }
    Ok(())
}
