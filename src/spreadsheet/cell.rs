use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;

/// Text layouts accepted when a date column holds plain text instead of a date serial.
const TEXT_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
const TEXT_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values (also formula string results)
    InlineString,
    /// Shared string table entries, already resolved to their text
    SharedString,
    /// Error values
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    /// Whether numbers of this type carry a calendar date.
    pub fn is_date(&self) -> bool {
        matches!(
            self,
            Self::NumberDate1900 | Self::NumberDateTime1900 | Self::NumberDate1904 | Self::NumberDateTime1904
        )
    }

    /// The plain date type for a workbook's date system.
    pub(crate) fn date(is_1904: bool) -> Self {
        if is_1904 {
            Self::NumberDate1904
        } else {
            Self::NumberDate1900
        }
    }
}

/// A typed cell value, as handed to the transfer stages and exporters.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Number(number) => write!(f, "{}", number),
            Value::Text(text) => write!(f, "{}", text),
            Value::Boolean(flag) => write!(f, "{}", if *flag { "TRUE" } else { "FALSE" }),
            Value::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Represents a single cell in a spreadsheet with position, type, and value.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
    /// Cell data type
    pub kind: CellType,
    /// Cell value as string
    pub value: String,
    /// Index into the workbook's `cellXfs` table
    pub style: Option<usize>,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// A cell without any stored value.
    pub fn is_empty(&self) -> bool {
        self.kind == CellType::Empty || self.value.is_empty()
    }

    /// Converts cell value to double-precision floating point.
    pub fn to_double(&self) -> Result<f64, String> {
        self.value.trim().parse::<f64>().map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    /// Converts the cell to a calendar date.
    ///
    /// Date-formatted numbers are read as serials of the workbook's date system
    /// (the time of day is truncated), ISO date cells and text in one of the
    /// common day-first or ISO layouts are parsed. Everything else fails.
    pub fn to_date(&self) -> Result<NaiveDate, String> {
        match self.kind {
            CellType::NumberDateTime1900 | CellType::NumberDate1900 => serial_to_date(self.to_double()?, false),
            CellType::NumberDateTime1904 | CellType::NumberDate1904 => serial_to_date(self.to_double()?, true),
            CellType::IsoDateTime | CellType::InlineString | CellType::SharedString => parse_text_date(&self.value),
            _ => Err(format!("parse '{}' to date failed", self.value)),
        }
    }

    /// Converts the cell into a typed value without interpreting text.
    pub fn to_value(&self) -> Value {
        if self.is_empty() {
            return Value::Empty;
        }
        match self.kind {
            CellType::Empty => Value::Empty,
            CellType::Boolean => Value::Boolean(self.value == "1"),
            CellType::NumberDateTime1900 | CellType::NumberDate1900 |
            CellType::NumberDateTime1904 | CellType::NumberDate1904 | CellType::IsoDateTime => self
                .to_date()
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Text(self.value.to_owned())),
            CellType::Number | CellType::NumberTime1900 | CellType::NumberTime1904 => self
                .to_double()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::Text(self.value.to_owned())),
            CellType::InlineString | CellType::SharedString | CellType::Error => Value::Text(self.value.to_owned()),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Excel day zero; serial 1 is 1900-01-01 once the Lotus leap-year quirk is applied.
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate Literal")
}

/// Converts an Excel serial to a date.
/// Handles Lotus 1-2-3 leap year bug for 1900 epoch.
pub(crate) fn serial_to_date(serial: f64, is_1904: bool) -> Result<NaiveDate, String> {
    if !serial.is_finite() || serial < 0.0 || serial >= 2_958_466.0 {
        return Err(format!("serial {} is outside the Excel date range", serial));
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    Ok(epoch() + Duration::days(days + offset))
}

/// Converts a date to an Excel serial, the inverse of [`serial_to_date`].
pub(crate) fn date_to_serial(date: NaiveDate, is_1904: bool) -> i64 {
    let days = (date - epoch()).num_days();
    if is_1904 {
        days - 1462
    } else if days <= 60 {
        days - 1
    } else {
        days
    }
}

fn parse_text_date(value: &str) -> Result<NaiveDate, String> {
    let text = value.trim();
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            TEXT_DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|datetime| datetime.date())
        })
        .ok_or_else(|| format!("parse '{}' to date failed", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 0, col: 0, kind, value: value.to_owned(), style: None }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn custom_number_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("dd/mm/yyyy hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("#,##0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]\"days\" 0", false), CellType::Number);
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("4", false), None);
    }

    #[test]
    fn serials_follow_lotus_quirk() {
        assert_eq!(serial_to_date(1.0, false).unwrap(), date(1900, 1, 1));
        assert_eq!(serial_to_date(59.0, false).unwrap(), date(1900, 2, 28));
        assert_eq!(serial_to_date(61.0, false).unwrap(), date(1900, 3, 1));
        assert_eq!(serial_to_date(45296.75, false).unwrap(), date(2024, 1, 5));
        assert_eq!(serial_to_date(0.0, true).unwrap(), date(1904, 1, 1));
        assert!(serial_to_date(-1.0, false).is_err());

        for day in [date(1900, 1, 1), date(1900, 2, 28), date(1900, 3, 1), date(2024, 2, 29)] {
            assert_eq!(serial_to_date(date_to_serial(day, false) as f64, false).unwrap(), day);
        }
        for day in [date(1904, 1, 1), date(2024, 2, 29)] {
            assert_eq!(serial_to_date(date_to_serial(day, true) as f64, true).unwrap(), day);
        }
        assert_eq!(date_to_serial(date(2024, 1, 5), false), 45296);
    }

    #[test]
    fn text_dates() {
        assert_eq!(cell(CellType::SharedString, "2024-01-05").to_date().unwrap(), date(2024, 1, 5));
        assert_eq!(cell(CellType::InlineString, " 05/01/2024 ").to_date().unwrap(), date(2024, 1, 5));
        assert_eq!(cell(CellType::IsoDateTime, "2024-01-05T10:30:00").to_date().unwrap(), date(2024, 1, 5));
        assert_eq!(cell(CellType::InlineString, "2024-01-05 23:59:59").to_date().unwrap(), date(2024, 1, 5));
        assert!(cell(CellType::InlineString, "not a date").to_date().is_err());
        assert!(cell(CellType::InlineString, "2024-13-01").to_date().is_err());
        assert!(cell(CellType::Number, "45296").to_date().is_err());
        assert!(cell(CellType::Boolean, "1").to_date().is_err());
    }

    #[test]
    fn values_pass_through() {
        assert_eq!(cell(CellType::Number, "100").to_value(), Value::Number(100.0));
        assert_eq!(cell(CellType::SharedString, "n/a").to_value(), Value::Text("n/a".to_owned()));
        assert_eq!(cell(CellType::Error, "#N/A").to_value(), Value::Text("#N/A".to_owned()));
        assert_eq!(cell(CellType::Boolean, "0").to_value(), Value::Boolean(false));
        assert_eq!(cell(CellType::NumberDate1900, "45296").to_value(), Value::Date(date(2024, 1, 5)));
        assert_eq!(cell(CellType::Number, "").to_value(), Value::Empty);
        assert_eq!(cell(CellType::NumberDate1900, "45296").to_string(), "2024-01-05");
    }
}
