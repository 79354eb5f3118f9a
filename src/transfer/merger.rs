//! Appends source records to the destination sheet.
use crate::error::SheetTransferError;
use crate::spreadsheet::cell::date_to_serial;
use crate::spreadsheet::patch;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::Cell;
use crate::spreadsheet::CellType;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::Value;
use crate::spreadsheet::XlsxSpreadsheet;
use crate::transfer::schema::Schema;
use crate::transfer::SourceRecord;
use crate::transfer::TransferError;
use std::collections::BTreeSet;
use std::ops::Range;

/// The three mapped columns of one destination row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappedRow {
    /// Zero-based destination row
    pub row: usize,
    pub date: Value,
    pub revenue: Value,
    pub client: Value,
}

/// The destination sheet, with the rows appended during this run.
#[derive(Clone, Debug)]
pub struct DestinationTable {
    sheet: Sheet,
    is_1904: bool,
    first_data_row: usize,
    date_col: usize,
    revenue_col: usize,
    client_col: usize,
    appended_rows: BTreeSet<usize>,
}

impl DestinationTable {
    /// Reads the destination sheet named by `schema`.
    pub fn load<S: Spreadsheet + ?Sized>(workbook: &mut S, schema: &Schema) -> Result<Self, SheetTransferError> {
        let sheet = workbook.read_sheet(&schema.destination.sheet)?;
        let table = Self {
            sheet,
            is_1904: workbook.is_1904(),
            first_data_row: schema.destination.header_rows,
            date_col: schema.columns.date.destination.index(),
            revenue_col: schema.columns.revenue.destination.index(),
            client_col: schema.columns.client.destination.index(),
            appended_rows: BTreeSet::new(),
        };
        log::info!(
            "Destination '{}' of '{}': next free row is {}",
            table.sheet.name,
            table.sheet.file_name,
            table.append_cursor() + 1
        );
        Ok(table)
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet.name
    }

    /// Zero-based row one past the leading run of data rows whose date column
    /// is filled, i.e. where the next record goes.
    ///
    /// The scan stops at the first blank date cell even if later rows hold data.
    pub fn append_cursor(&self) -> usize {
        let mut row = self.first_data_row;
        while self.sheet.value_at(row, self.date_col).is_some() {
            row += 1;
        }
        row
    }

    /// Writes one row per record starting at the append cursor and returns the
    /// rows written. Cells of other columns at those rows are left as they are.
    pub fn append(&mut self, records: &[SourceRecord]) -> Range<usize> {
        let start = self.append_cursor();
        let rows = start..start + records.len();
        if records.is_empty() {
            return rows;
        }

        let template_row = start.checked_sub(1).filter(|row| *row >= self.first_data_row);
        let style = |col: usize| template_row.and_then(|row| self.sheet.get(row, col)).and_then(|cell| cell.style);
        let (date_style, revenue_style, client_style) = (style(self.date_col), style(self.revenue_col), style(self.client_col));

        for (row, record) in rows.clone().zip(records) {
            self.sheet.push(Cell {
                row,
                col: self.date_col,
                kind: CellType::date(self.is_1904),
                value: date_to_serial(record.date, self.is_1904).to_string(),
                style: date_style,
            });
            // Blank fields still claim their cell so nothing of an older row survives there.
            let (kind, value) = self.typed_value(&record.revenue).unwrap_or_default();
            self.sheet.push(Cell { row, col: self.revenue_col, kind, value, style: revenue_style });
            let (kind, value) = match record.client.is_empty() {
                true => (CellType::Empty, String::new()),
                false => (CellType::InlineString, record.client.to_owned()),
            };
            self.sheet.push(Cell { row, col: self.client_col, kind, value, style: client_style });
            self.appended_rows.insert(row);
        }
        log::info!(
            "Appended {} row(s) to '{}' at {}..{}",
            records.len(),
            self.sheet.name,
            index_to_reference(rows.start, self.date_col),
            index_to_reference(rows.end - 1, self.date_col)
        );
        rows
    }

    fn typed_value(&self, value: &Value) -> Option<(CellType, String)> {
        match value {
            Value::Empty => None,
            Value::Number(number) => Some((CellType::Number, number.to_string())),
            Value::Text(text) => Some((CellType::InlineString, text.to_owned())),
            Value::Boolean(flag) => Some((CellType::Boolean, if *flag { "1" } else { "0" }.to_string())),
            Value::Date(date) => Some((CellType::date(self.is_1904), date_to_serial(*date, self.is_1904).to_string())),
        }
    }

    /// Rows appended so far, in row order.
    pub fn appended_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.appended_rows.iter().copied()
    }

    /// Cells written by [`append`](Self::append), in row then column order.
    pub fn appended_cells(&self) -> Vec<Cell> {
        let mut cells = Vec::new();
        for row in self.appended_rows() {
            for col in [self.date_col, self.revenue_col, self.client_col] {
                if let Some(cell) = self.sheet.get(row, col) {
                    cells.push(cell.clone());
                }
            }
        }
        cells.sort_by_key(|cell| (cell.row, cell.col));
        cells
    }

    /// The mapped columns of every data row up to the last row holding any of them.
    pub fn mapped_rows(&self) -> Vec<MappedRow> {
        let value = |row: usize, col: usize| self.sheet.value_at(row, col).map(Cell::to_value).unwrap_or_default();
        let last_row = self
            .sheet
            .cells
            .iter()
            .filter(|cell| !cell.is_empty() && cell.row >= self.first_data_row)
            .filter(|cell| [self.date_col, self.revenue_col, self.client_col].contains(&cell.col))
            .map(|cell| cell.row)
            .max();
        let Some(last_row) = last_row else {
            return Vec::new();
        };
        (self.first_data_row..=last_row)
            .map(|row| MappedRow {
                row,
                date: value(row, self.date_col),
                revenue: value(row, self.revenue_col),
                client: value(row, self.client_col),
            })
            .collect()
    }

    /// Serializes `workbook` with the appended rows written into this table's sheet.
    ///
    /// `workbook` must be the package this table was loaded from.
    pub fn write_in_place(&self, workbook: &mut XlsxSpreadsheet) -> Result<Vec<u8>, SheetTransferError> {
        let bytes = patch::write_in_place(workbook, &self.sheet.name, &self.appended_cells())
            .map_err(|error| TransferError::SerializationFailure(format!("'{}': {}", workbook.name, error)))?;
        log::info!("Serialized '{}' with {} appended row(s), {} bytes", workbook.name, self.appended_rows.len(), bytes.len());
        Ok(bytes)
    }
}
