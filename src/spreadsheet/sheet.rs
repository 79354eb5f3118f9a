use crate::spreadsheet::cell::Cell;
use std::collections::HashMap;

/// Represents a sheet from a spreadsheet file as a sparse grid of cells.
#[derive(Clone, Debug)]
pub struct Sheet {
    /// Source file name
    pub file_name: String,
    /// Sheet name
    pub name: String,
    /// All cells in the sheet, in insertion order
    pub(crate) cells: Vec<Cell>,
    /// Index mapping from (row, col) to cell vector position
    indexes: HashMap<(usize, usize), usize>,
    /// Actual data range (determined from cell data)
    pub row_lower_bound: Option<usize>,
    pub row_upper_bound: Option<usize>,
    pub col_lower_bound: Option<usize>,
    pub col_upper_bound: Option<usize>,
}

impl Sheet {
    /// Creates an empty sheet.
    pub fn new(file_name: &str, name: &str) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            indexes: HashMap::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Gets the cell at the specified position, if one was stored.
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.indexes
            .get(&(row, col))
            .and_then(|index| self.cells.get(*index))
    }

    /// Gets the cell at the specified position unless it holds no value.
    pub fn value_at(&self, row: usize, col: usize) -> Option<&Cell> {
        self.get(row, col).filter(|cell| !cell.is_empty())
    }

    /// Adds a cell to the sheet, replacing any cell already stored at its position.
    pub fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        match self.indexes.get(&(cell.row, cell.col)) {
            Some(index) => self.cells[*index] = cell,
            None => {
                self.indexes.insert((cell.row, cell.col), self.cells.len());
                self.cells.push(cell);
            }
        }
    }

    /// Updates the actual data range boundaries based on cell positions.
    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::spreadsheet::*;

    fn push(sheet: &mut Sheet, row: usize, col: usize, value: &str) {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::InlineString,
            value: value.to_owned(),
            style: None,
        });
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("", "");

        assert!(sheet.is_empty());
        assert_eq!(sheet.row_lower_bound, None);
        assert_eq!(sheet.row_upper_bound, None);
        assert_eq!(sheet.col_lower_bound, None);
        assert_eq!(sheet.col_upper_bound, None);
    }

    #[test]
    fn sheet_update() {
        let mut sheet = Sheet::new("", "");
        push(&mut sheet, 1, 1, "a");
        push(&mut sheet, 1, 3, "b");
        push(&mut sheet, 3, 1, "c");
        push(&mut sheet, 3, 3, "d");

        assert_eq!(sheet.cells.len(), 4);

        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.row_upper_bound, Some(3));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.col_upper_bound, Some(3));

        assert_eq!(sheet.get(3, 1).map(|cell| cell.value.as_str()), Some("c"));
        assert!(sheet.get(2, 2).is_none());
    }

    #[test]
    fn sheet_push_replaces_existing_position() {
        let mut sheet = Sheet::new("", "");
        push(&mut sheet, 5, 0, "old");
        push(&mut sheet, 2, 4, "other");
        push(&mut sheet, 5, 0, "new");

        assert_eq!(sheet.cells.len(), 2);
        assert_eq!(sheet.get(5, 0).map(|cell| cell.value.as_str()), Some("new"));
        assert_eq!(sheet.row_lower_bound, Some(2));
        assert_eq!(sheet.row_upper_bound, Some(5));
    }

    #[test]
    fn sheet_value_at_skips_blank_cells() {
        let mut sheet = Sheet::new("", "");
        push(&mut sheet, 0, 0, "");
        push(&mut sheet, 0, 1, "x");

        assert!(sheet.get(0, 0).is_some());
        assert!(sheet.value_at(0, 0).is_none());
        assert!(sheet.value_at(0, 1).is_some());
    }
}
