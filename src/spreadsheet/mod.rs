//! # Spreadsheet Processing Module
//!
//! Reads Office Open XML workbooks (`.xlsx`, `.xlsm`, `.xlam`) into sparse cell
//! grids, and patches a single worksheet of such a workbook in place while the
//! rest of the package (macros, other sheets, drawings) is carried over as is.
pub(crate) mod cell;
pub(crate) mod excel;
pub mod patch;
pub mod reference;
pub(crate) mod sheet;
pub(crate) mod xlsx;

use crate::error::SheetTransferError;
use thiserror::Error;

pub use cell::Cell;
pub use cell::CellType;
pub use cell::Value;
pub use sheet::Sheet;
pub use xlsx::XlsxSpreadsheet;

/// Errors raised while opening or reading a workbook.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Missing part '{0}' in workbook package")]
    FileError(String),

    #[error("Cannot detect file format for '{0}'")]
    InvalidFileFormat(String),

    #[error("Spreadsheet '{0}' is password protected or not an Office Open XML package")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Spreadsheet '{0}' contains no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Sheet '{sheet_name}' not found in '{file_name}'")]
    SheetNotFound {
        file_name: String,
        sheet_name: String,
        available: Vec<String>,
    },
}

/// Read access to a workbook, one named worksheet at a time.
pub trait Spreadsheet {
    /// File name the workbook was opened from
    fn name(&self) -> String;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Whether date serials count from 1904-01-01 instead of 1900-01-01
    fn is_1904(&self) -> bool;

    /// Reads a worksheet into a cell grid, failing with `SheetNotFound` if it does not exist.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SheetTransferError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory workbook for exercising the transfer stages without a zip package.
    pub(crate) struct MemorySpreadsheet {
        pub(crate) name: String,
        pub(crate) sheets: Vec<Sheet>,
        pub(crate) is_1904: bool,
    }

    impl MemorySpreadsheet {
        pub(crate) fn new(name: &str) -> Self {
            Self { name: name.to_owned(), sheets: Vec::new(), is_1904: false }
        }

        /// Adds a sheet built from `(row, col) -> (kind, value)` entries.
        pub(crate) fn with_sheet(mut self, sheet_name: &str, cells: HashMap<(usize, usize), (CellType, &str)>) -> Self {
            let mut sheet = Sheet::new(&self.name, sheet_name);
            let mut cells = cells.into_iter().collect::<Vec<_>>();
            cells.sort_by_key(|((row, col), _)| (*row, *col));
            for ((row, col), (kind, value)) in cells {
                sheet.push(Cell { row, col, kind, value: value.to_owned(), style: None });
            }
            self.sheets.push(sheet);
            self
        }
    }

    impl Spreadsheet for MemorySpreadsheet {
        fn name(&self) -> String {
            self.name.to_owned()
        }

        fn sheet_names(&self) -> Vec<String> {
            self.sheets.iter().map(|sheet| sheet.name.to_owned()).collect()
        }

        fn is_1904(&self) -> bool {
            self.is_1904
        }

        fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SheetTransferError> {
            self.sheets
                .iter()
                .find(|sheet| sheet.name == sheet_name)
                .cloned()
                .ok_or_else(|| SpreadsheetError::SheetNotFound {
                    file_name: self.name.to_owned(),
                    sheet_name: sheet_name.to_owned(),
                    available: self.sheet_names(),
                }.into())
        }
    }

    #[test]
    fn missing_sheet_lists_available_names() {
        let mut workbook = MemorySpreadsheet::new("book.xlsx")
            .with_sheet("First", HashMap::new())
            .with_sheet("Second", HashMap::new());
        let error = workbook.read_sheet("Third").unwrap_err();
        match error {
            SheetTransferError::SpreadsheetError(SpreadsheetError::SheetNotFound { sheet_name, available, .. }) => {
                assert_eq!(sheet_name, "Third");
                assert_eq!(available, vec!["First", "Second"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
