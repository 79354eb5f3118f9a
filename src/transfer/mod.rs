//! # Transfer Pipeline
//!
//! Extraction of dated records from the source sheet and their append to the
//! destination sheet, driven by a declarative [`Schema`].
pub mod export;
pub mod extractor;
pub mod merger;
pub mod record;
pub mod schema;

use crate::error::SheetTransferError;
use crate::spreadsheet::Spreadsheet;
use chrono::NaiveDate;
use std::ops::Range;
use thiserror::Error;

pub use extractor::Extraction;
pub use merger::DestinationTable;
pub use merger::MappedRow;
pub use record::SourceRecord;
pub use schema::Column;
pub use schema::ColumnMapping;
pub use schema::Columns;
pub use schema::DateRange;
pub use schema::Field;
pub use schema::Schema;
pub use schema::SheetSpec;

#[derive(Error, Debug)]
pub enum TransferError {
    /// A row whose date cell cannot be read as a date; the row is skipped
    #[error("Cannot read '{value}' at {position} as a date")]
    DateParseFailure { position: String, value: String },

    #[error("Column {position} of field '{field}' holds '{found}', expected '{expected}'")]
    SchemaDrift {
        field: Field,
        position: String,
        expected: String,
        found: String,
    },

    #[error("Invalid transfer schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Serialization failed: {0}")]
    SerializationFailure(String),
}

/// Outcome of a full run.
#[derive(Clone, Debug)]
pub struct TransferReport {
    pub extraction: Extraction,
    /// Destination rows written, zero-based and end-exclusive
    pub appended: Range<usize>,
    /// Destination sheet after the append
    pub table: DestinationTable,
}

/// A transfer bound to a validated schema.
#[derive(Clone, Debug)]
pub struct Transfer {
    schema: Schema,
}

impl Transfer {
    pub fn new(schema: Schema) -> Result<Self, SheetTransferError> {
        schema.validate()?;
        log::debug!(
            "Schema: '{}' [{}, {}, {}] -> '{}' [{}, {}, {}]",
            schema.source.sheet,
            schema.columns.date.source,
            schema.columns.client.source,
            schema.columns.revenue.source,
            schema.destination.sheet,
            schema.columns.date.destination,
            schema.columns.client.destination,
            schema.columns.revenue.destination
        );
        Ok(Self { schema })
    }

    pub fn extract<S: Spreadsheet + ?Sized>(&self, source: &mut S, range: &DateRange) -> Result<Extraction, SheetTransferError> {
        extractor::extract(source, &self.schema, range)
    }

    pub fn load_destination<S: Spreadsheet + ?Sized>(&self, destination: &mut S) -> Result<DestinationTable, SheetTransferError> {
        DestinationTable::load(destination, &self.schema)
    }

    /// Extracts from `source` and appends to a table loaded from `destination`.
    ///
    /// Nothing is serialized here; the caller picks the outputs from the report.
    pub fn run<S, D>(&self, source: &mut S, destination: &mut D, range: &DateRange) -> Result<TransferReport, SheetTransferError>
    where
        S: Spreadsheet + ?Sized,
        D: Spreadsheet + ?Sized,
    {
        let extraction = self.extract(source, range)?;
        let mut table = self.load_destination(destination)?;
        let appended = table.append(&extraction.records);
        Ok(TransferReport {
            extraction,
            appended,
            table,
        })
    }
}
