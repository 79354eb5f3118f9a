//! # Sheet Transfer
//!
//! Copies dated exchange operations from the `BGP e BGX Cambio` sheet of a
//! source workbook into the `Todas as Op - Câmbio` sheet of a destination
//! workbook.
//!
//! ## Features
//!
//! - **Positional extraction**: date, client and revenue are read from fixed
//!   columns (`B`, `T`, `AV` by default), with an optional header check
//! - **Date coercion**: Excel serials (1900 and 1904 systems), ISO and
//!   `DD/MM/YYYY` text are all read as calendar dates
//! - **Inclusive range filter**: either bound may be left open
//! - **Append after the last filled row**: existing rows are never reordered
//!   or overwritten
//! - **Macro preservation**: only the destination worksheet part is patched;
//!   `vbaProject.bin`, other sheets, drawings and styles are copied byte for byte
//! - **Plain exports**: a fresh workbook or CSV of the mapped columns
//!
//! ## Example
//!
//! ```no_run
//! use sheet_transfer::spreadsheet::XlsxSpreadsheet;
//! use sheet_transfer::transfer::{DateRange, Schema, Transfer};
//! use sheet_transfer::transfer::export;
//!
//! # fn main() -> Result<(), sheet_transfer::SheetTransferError> {
//! let transfer = Transfer::new(Schema::default())?;
//! let mut source = XlsxSpreadsheet::open("Operações de câmbio BRA.xlsm")?;
//! let mut destination = XlsxSpreadsheet::open("01. Operações.xlsm")?;
//! let range = DateRange::new(chrono::NaiveDate::from_ymd_opt(2024, 1, 1), None)?;
//!
//! let report = transfer.run(&mut source, &mut destination, &range)?;
//! let bytes = report.table.write_in_place(&mut destination)?;
//! export::save("01. Operações (atualizado).xlsm".as_ref(), &bytes)?;
//! # Ok(())
//! # }
//! ```
pub mod cli;
pub mod config;
pub mod error;
pub(crate) mod helpers;
pub mod spreadsheet;
pub mod transfer;

pub use config::Config;
pub use error::SheetTransferError;
pub use spreadsheet::Spreadsheet;
pub use spreadsheet::XlsxSpreadsheet;
pub use transfer::Transfer;
