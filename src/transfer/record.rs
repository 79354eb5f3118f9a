use crate::spreadsheet::Value;
use chrono::NaiveDate;

/// One (date, client, revenue) tuple read from the source sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    /// Zero-based source row the record was read from
    pub row: usize,
    pub date: NaiveDate,
    /// Client text; empty when the source cell is blank
    pub client: String,
    /// Revenue exactly as stored in the source cell
    pub revenue: Value,
}

impl SourceRecord {
    pub fn new(row: usize, date: NaiveDate, client: &str, revenue: Value) -> Self {
        Self {
            row,
            date,
            client: client.to_owned(),
            revenue,
        }
    }
}
