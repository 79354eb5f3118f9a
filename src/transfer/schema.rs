//! Declarative column mapping between the source and destination sheets.
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::reference::MAX_COLUMN;
use crate::transfer::TransferError;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

pub const SOURCE_SHEET: &str = "BGP e BGX Cambio";
pub const DESTINATION_SHEET: &str = "Todas as Op - Câmbio";

/// Layouts accepted for date range bounds
const BOUND_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// The three values carried from a source row to a destination row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Date,
    Client,
    Revenue,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Date, Field::Client, Field::Revenue];

    /// Column title used by the exports.
    pub fn header(&self) -> &'static str {
        match self {
            Field::Date => "Data",
            Field::Client => "Cliente",
            Field::Revenue => "Receita_BGX",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Date => write!(f, "date"),
            Field::Client => write!(f, "client"),
            Field::Revenue => write!(f, "revenue"),
        }
    }
}

/// A zero-based column position, written as letters (`"AV"`) or as a number (`47`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawColumn", into = "String")]
pub struct Column(pub usize);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Index(usize),
    Letters(String),
}

impl Column {
    /// Column at `index`, if a worksheet has one there.
    pub fn new(index: usize) -> Result<Self, String> {
        match index <= MAX_COLUMN {
            true => Ok(Column(index)),
            false => Err(format!("column {} is past the last worksheet column {}", index, index_to_col(MAX_COLUMN))),
        }
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn letters(self) -> String {
        index_to_col(self.0)
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if !value.is_empty() && value.chars().all(|character| character.is_ascii_digit()) {
            return value.parse::<usize>().map_err(|error| error.to_string()).and_then(Column::new);
        }
        col_to_index(value)
            .ok_or_else(|| format!("'{}' is neither a column index nor column letters", value))
            .and_then(Column::new)
    }
}

impl TryFrom<RawColumn> for Column {
    type Error = String;

    fn try_from(raw: RawColumn) -> Result<Self, Self::Error> {
        match raw {
            RawColumn::Index(index) => Column::new(index),
            RawColumn::Letters(letters) => letters.parse(),
        }
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.letters()
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letters())
    }
}

/// Where one field is read from and written to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: Column,
    pub destination: Column,
    /// Header text the source column must carry; checked before extraction when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_header: Option<String>,
}

impl ColumnMapping {
    fn new(source: usize, destination: usize) -> Self {
        Self {
            source: Column(source),
            destination: Column(destination),
            expected_header: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub date: ColumnMapping,
    pub client: ColumnMapping,
    pub revenue: ColumnMapping,
}

impl Columns {
    pub fn get(&self, field: Field) -> &ColumnMapping {
        match field {
            Field::Date => &self.date,
            Field::Client => &self.client,
            Field::Revenue => &self.revenue,
        }
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            date: ColumnMapping::new(1, 0),
            client: ColumnMapping::new(19, 8),
            revenue: ColumnMapping::new(47, 4),
        }
    }
}

/// A sheet addressed by name, with the number of leading header rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetSpec {
    pub sheet: String,
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
}

fn default_header_rows() -> usize {
    1
}

impl SheetSpec {
    pub fn new(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_owned(),
            header_rows: default_header_rows(),
        }
    }
}

/// The full positional mapping of a transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub source: SheetSpec,
    pub destination: SheetSpec,
    pub columns: Columns,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            source: SheetSpec::new(SOURCE_SHEET),
            destination: SheetSpec::new(DESTINATION_SHEET),
            columns: Columns::default(),
        }
    }
}

impl Schema {
    /// Checks that sheet names are set, that every column exists on a worksheet
    /// and that no two fields share a destination column.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.source.sheet.trim().is_empty() {
            return Err(TransferError::InvalidSchema("source sheet name is empty".to_string()));
        }
        if self.destination.sheet.trim().is_empty() {
            return Err(TransferError::InvalidSchema("destination sheet name is empty".to_string()));
        }
        for field in Field::ALL {
            let mapping = self.columns.get(field);
            for (side, column) in [("source", mapping.source), ("destination", mapping.destination)] {
                if column.index() > MAX_COLUMN {
                    return Err(TransferError::InvalidSchema(format!(
                        "{} column {} of field '{}' is past the last worksheet column {}",
                        side,
                        column.index(),
                        field,
                        index_to_col(MAX_COLUMN)
                    )));
                }
            }
        }
        for (index, field) in Field::ALL.iter().enumerate() {
            let column = self.columns.get(*field).destination;
            if let Some(other) = Field::ALL[index + 1..].iter().find(|other| self.columns.get(**other).destination == column) {
                return Err(TransferError::InvalidSchema(format!(
                    "fields '{}' and '{}' both write to destination column {}",
                    field, other, column
                )));
            }
        }
        for field in Field::ALL {
            if self.columns.get(field).expected_header.is_some() && self.source.header_rows == 0 {
                return Err(TransferError::InvalidSchema(format!(
                    "field '{}' declares an expected header but the source has no header rows",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// An inclusive date interval; either bound may be open.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, TransferError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(TransferError::InvalidDateRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map(|start| start <= date).unwrap_or(true) && self.end.map(|end| date <= end).unwrap_or(true)
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = |date: Option<NaiveDate>| date.map(|date| date.to_string()).unwrap_or_else(|| "..".to_string());
        write!(f, "[{}, {}]", bound(self.start), bound(self.end))
    }
}

/// Parses a range bound given as `YYYY-MM-DD` or `DD/MM/YYYY`.
pub fn parse_bound(value: &str) -> Result<NaiveDate, String> {
    BOUND_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value.trim(), format).ok())
        .ok_or_else(|| format!("'{}' is not a date (use YYYY-MM-DD or DD/MM/YYYY)", value))
}
