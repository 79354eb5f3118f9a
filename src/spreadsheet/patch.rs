//! In-place worksheet patching
//!
//! Appends cells to one worksheet of an existing workbook package. The worksheet
//! XML is streamed through a writer so every element that is not touched
//! (formulas, merged ranges, conditional formats, extension lists) is emitted
//! exactly as read. All other package entries are copied without recompression.
use crate::error::SheetTransferError;
use crate::helpers::xml::part_reader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlWriterHelper;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::XlsxSpreadsheet;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::collections::HashMap;

const TAG_DIMENSION: &[u8] = b"dimension";
const TAG_SHEET_DATA: &[u8] = b"sheetData";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_CELL_FORMATS: &[u8] = b"cellXfs";

const STYLES_PATH: &str = "xl/styles.xml";

/// Built-in number format `m/d/yyyy`, rendered with the reader's locale date layout.
const BUILTIN_DATE_FORMAT_ID: &str = "14";

/// Cells waiting to be written, by row then column
type PendingRows<'a> = BTreeMap<usize, BTreeMap<usize, &'a Cell>>;

/// Serializes `workbook` with `cells` written into the worksheet `sheet_name`.
///
/// Only the worksheet part is regenerated, plus `xl/styles.xml` when a date
/// cell has no date style to use. Without cells every entry is copied as is.
/// The workbook itself is left untouched, so it can be serialized again.
pub fn write_in_place(workbook: &mut XlsxSpreadsheet, sheet_name: &str, cells: &[Cell]) -> Result<Vec<u8>, SheetTransferError> {
    let sheet_path = workbook.sheet_path(sheet_name)?.to_owned();
    let mut replacements = HashMap::<String, Vec<u8>>::new();
    if cells.is_empty() {
        log::debug!("Nothing appended to '{}', copying '{}' unchanged", sheet_name, workbook.name);
        return workbook.zip.repack(&replacements);
    }

    let mut number_formats = workbook.number_formats.clone();
    let cells = assign_date_styles(workbook, &mut number_formats, cells, &mut replacements)?;
    let worksheet = workbook.zip.read_bytes(&sheet_path)?
        .ok_or_else(|| SpreadsheetError::FileError(sheet_path.to_owned()))?;
    let patched = patch_worksheet(&worksheet, &cells, &number_formats)?;
    log::debug!("Patched '{}': {} cell(s), {} -> {} bytes", sheet_path, cells.len(), worksheet.len(), patched.len());
    replacements.insert(sheet_path, patched);
    workbook.zip.repack(&replacements)
}

/// Points date cells whose inherited style is not a date format at a date style.
///
/// When the workbook has none, the styles part gets one more `xf`, queued in
/// `replacements`, and `number_formats` grows to match the rewritten part.
fn assign_date_styles(
    workbook: &mut XlsxSpreadsheet,
    number_formats: &mut Vec<CellType>,
    cells: &[Cell],
    replacements: &mut HashMap<String, Vec<u8>>,
) -> Result<Vec<Cell>, SheetTransferError> {
    let is_date_style = |formats: &[CellType], style: Option<usize>| {
        style.and_then(|style| formats.get(style)).map(CellType::is_date).unwrap_or(false)
    };
    let needs_date_style = cells.iter().any(|cell| cell.kind.is_date() && !is_date_style(number_formats.as_slice(), cell.style));
    if !needs_date_style {
        return Ok(cells.to_vec());
    }

    let date_style = match number_formats.iter().position(CellType::is_date) {
        Some(style) => Some(style),
        None => match workbook.zip.read_bytes(STYLES_PATH)? {
            Some(styles) => {
                let style = number_formats.len();
                replacements.insert(STYLES_PATH.to_owned(), add_date_style(&styles, style)?);
                number_formats.push(CellType::date(workbook.is_1904));
                log::debug!("Added date cell format #{} to '{}'", style, STYLES_PATH);
                Some(style)
            }
            None => {
                log::warn!("'{}' has no stylesheet, appended dates will show as serial numbers", workbook.name);
                None
            }
        },
    };

    Ok(cells
        .iter()
        .map(|cell| {
            let mut cell = cell.clone();
            if cell.kind.is_date() && !is_date_style(number_formats.as_slice(), cell.style) {
                cell.style = date_style.or(cell.style);
            }
            cell
        })
        .collect())
}

/// Rewrites worksheet XML with `cells` merged into `sheetData`.
///
/// New rows are inserted in row order; cells of rows that already exist are
/// merged in column order, keeping the other cells of the row. An existing
/// cell at a written position is replaced, keeping its style unless a date
/// would lose its date format; an empty cell clears the value there. The
/// `dimension` is widened to cover the new cells and `spans` hints are dropped
/// from rows that change.
pub(crate) fn patch_worksheet(xml: &[u8], cells: &[Cell], number_formats: &[CellType]) -> Result<Vec<u8>, SheetTransferError> {
    let mut pending = PendingRows::new();
    for cell in cells {
        pending.entry(cell.row).or_default().insert(cell.col, cell);
    }
    let bounds = Bounds::of(cells);

    let mut reader = part_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + cells.len() * 64));
    let mut buffer = Vec::new();

    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut row_cells = None::<BTreeMap<usize, &Cell>>;
    let mut skip_cell = false;
    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer)? {
            Event::Eof => break,
            Event::End(event) if skip_cell => skip_cell = event.local_name().as_ref() != TAG_CELL,
            _ if skip_cell => (),

            Event::Empty(event) if event.local_name().as_ref() == TAG_DIMENSION => {
                writer.write_event(Event::Empty(widen_dimension(&event, bounds)?))?;
            }

            Event::Empty(event) if event.local_name().as_ref() == TAG_SHEET_DATA => {
                writer.write_event(Event::Start(event.clone()))?;
                write_rows(&mut writer, std::mem::take(&mut pending))?;
                writer.write_event(Event::End(event.to_end()))?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_SHEET_DATA => {
                write_rows(&mut writer, std::mem::take(&mut pending))?;
                writer.write_event(Event::End(event))?;
            }

            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                let row = row_index(&event)?.unwrap_or(next_row);
                (next_row, next_col) = (row + 1, 0);
                write_rows(&mut writer, take_rows_before(&mut pending, row))?;
                row_cells = pending.remove(&row);
                match row_cells {
                    Some(_) => writer.write_event(Event::Start(event.without_attribute("spans")?))?,
                    None => writer.write_event(Event::Start(event))?,
                }
            }
            Event::Empty(event) if event.local_name().as_ref() == TAG_ROW => {
                let row = row_index(&event)?.unwrap_or(next_row);
                next_row = row + 1;
                write_rows(&mut writer, take_rows_before(&mut pending, row))?;
                match pending.remove(&row) {
                    Some(cells) => {
                        let start = event.without_attribute("spans")?;
                        let end = start.to_end().into_owned();
                        writer.write_event(Event::Start(start))?;
                        write_cells(&mut writer, cells)?;
                        writer.write_event(Event::End(end))?;
                    }
                    None => writer.write_event(Event::Empty(event))?,
                }
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => {
                if let Some(cells) = row_cells.take() {
                    write_cells(&mut writer, cells)?;
                }
                writer.write_event(Event::End(event))?;
            }

            Event::Start(event) if row_cells.is_some() && event.local_name().as_ref() == TAG_CELL => {
                let col = cell_col(&event)?.unwrap_or(next_col);
                next_col = col + 1;
                if let Some(cells) = row_cells.as_mut() {
                    write_cells(&mut writer, take_cols_before(cells, col))?;
                    match cells.remove(&col) {
                        Some(cell) => {
                            write_cell(&mut writer, cell, merged_style(cell, &event, number_formats)?)?;
                            skip_cell = true;
                        }
                        None => writer.write_event(Event::Start(event))?,
                    }
                }
            }
            Event::Empty(event) if row_cells.is_some() && event.local_name().as_ref() == TAG_CELL => {
                let col = cell_col(&event)?.unwrap_or(next_col);
                next_col = col + 1;
                if let Some(cells) = row_cells.as_mut() {
                    write_cells(&mut writer, take_cols_before(cells, col))?;
                    match cells.remove(&col) {
                        Some(cell) => write_cell(&mut writer, cell, merged_style(cell, &event, number_formats)?)?,
                        None => writer.write_event(Event::Empty(event))?,
                    }
                }
            }

            event => writer.write_event(event)?,
        }
    }
    Ok(writer.into_inner())
}

/// Cell area covered by a set of cells, as inclusive zero-based bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Bounds {
    first_row: usize,
    last_row: usize,
    first_col: usize,
    last_col: usize,
}

impl Bounds {
    fn of(cells: &[Cell]) -> Option<Self> {
        cells.iter().fold(None, |bounds, cell| {
            Some(match bounds {
                None => Bounds { first_row: cell.row, last_row: cell.row, first_col: cell.col, last_col: cell.col },
                Some(bounds) => bounds.with(cell.row, cell.col),
            })
        })
    }

    fn with(self, row: usize, col: usize) -> Self {
        Bounds {
            first_row: self.first_row.min(row),
            last_row: self.last_row.max(row),
            first_col: self.first_col.min(col),
            last_col: self.last_col.max(col),
        }
    }

    fn union(self, other: Self) -> Self {
        self.with(other.first_row, other.first_col).with(other.last_row, other.last_col)
    }

    /// Parses a `dimension` reference such as `A1:I30` or `A1`.
    fn parse(reference: &str) -> Option<Self> {
        let mut parts = reference.split(':');
        let (first_row, first_col) = reference_to_index(parts.next()?)?;
        let (last_row, last_col) = match parts.next() {
            Some(part) => reference_to_index(part)?,
            None => (first_row, first_col),
        };
        Some(Bounds { first_row, first_col, last_row, last_col })
    }

    fn to_reference(self) -> String {
        let first = index_to_reference(self.first_row, self.first_col);
        if (self.first_row, self.first_col) == (self.last_row, self.last_col) {
            first
        } else {
            format!("{}:{}", first, index_to_reference(self.last_row, self.last_col))
        }
    }
}

/// Extends the `ref` of a `dimension` element to cover `bounds`.
fn widen_dimension(event: &BytesStart, bounds: Option<Bounds>) -> Result<BytesStart<'static>, SheetTransferError> {
    let current = event.get_attribute_value("ref")?.and_then(|reference| Bounds::parse(&reference));
    let widened = match (current, bounds) {
        (Some(current), Some(bounds)) => current.union(bounds),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return Ok(event.clone().into_owned()),
    };
    let mut dimension = BytesStart::new("dimension");
    dimension.push_attribute(("ref", widened.to_reference().as_str()));
    Ok(dimension)
}

/// Zero-based index from the `r` attribute of a `row` element.
fn row_index(event: &BytesStart) -> Result<Option<usize>, SheetTransferError> {
    Ok(event.parse_attribute_value::<usize>("r")?.and_then(|row| row.checked_sub(1)))
}

/// Zero-based column from the `r` attribute of a `c` element.
fn cell_col(event: &BytesStart) -> Result<Option<usize>, SheetTransferError> {
    Ok(event.get_attribute_value("r")?
        .and_then(|reference| reference_to_index(&reference))
        .map(|(_, col)| col))
}

fn take_rows_before<'a>(pending: &mut PendingRows<'a>, row: usize) -> PendingRows<'a> {
    let later = pending.split_off(&row);
    std::mem::replace(pending, later)
}

fn take_cols_before<'a>(cells: &mut BTreeMap<usize, &'a Cell>, col: usize) -> BTreeMap<usize, &'a Cell> {
    let later = cells.split_off(&col);
    std::mem::replace(cells, later)
}

/// Style for a cell replacing an existing one.
fn merged_style(cell: &Cell, existing: &BytesStart, number_formats: &[CellType]) -> Result<Option<usize>, SheetTransferError> {
    let style = existing.get_attribute_value("s")?
        .filter(|style| !style.is_empty())
        .map(|style| style.parse::<usize>())
        .transpose()?;
    Ok(match style {
        Some(style) if !cell.kind.is_date() || number_formats.get(style).map(CellType::is_date).unwrap_or(false) => Some(style),
        _ => cell.style,
    })
}

fn write_rows(writer: &mut Writer<Vec<u8>>, rows: PendingRows) -> Result<(), SheetTransferError> {
    for (row, cells) in rows {
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", (row + 1).to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        write_cells(writer, cells)?;
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn write_cells(writer: &mut Writer<Vec<u8>>, cells: BTreeMap<usize, &Cell>) -> Result<(), SheetTransferError> {
    for cell in cells.into_values() {
        write_cell(writer, cell, cell.style)?;
    }
    Ok(())
}

/// Writes one `c` element. Text goes in as an inline string so the shared
/// string table stays untouched; an empty cell keeps only its style.
fn write_cell(writer: &mut Writer<Vec<u8>>, cell: &Cell, style: Option<usize>) -> Result<(), SheetTransferError> {
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", cell.reference().as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style.to_string().as_str()));
    }
    if cell.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    match cell.kind {
        CellType::InlineString | CellType::SharedString | CellType::IsoDateTime | CellType::Error => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            writer.write_text_element(BytesStart::new("t").with_attributes([("xml:space", "preserve")]), &cell.value)?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        CellType::Boolean => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            writer.write_text_element(BytesStart::new("v"), &cell.value)?;
        }
        _ => {
            writer.write_event(Event::Start(start))?;
            writer.write_text_element(BytesStart::new("v"), &cell.value)?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

/// Appends a date cell format to `cellXfs`; `style` is the index it will get.
pub(crate) fn add_date_style(xml: &[u8], style: usize) -> Result<Vec<u8>, SheetTransferError> {
    let mut reader = part_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 128));
    let mut buffer = Vec::new();
    let count = (style + 1).to_string();
    let mut found = false;
    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer)? {
            Event::Eof => break,
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL_FORMATS => {
                writer.write_event(Event::Start(with_count(&event, &count)?))?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL_FORMATS => {
                write_date_format(&mut writer)?;
                writer.write_event(Event::End(event))?;
                found = true;
            }
            Event::Empty(event) if event.local_name().as_ref() == TAG_CELL_FORMATS => {
                let start = with_count(&event, &count)?;
                let end = start.to_end().into_owned();
                writer.write_event(Event::Start(start))?;
                write_date_format(&mut writer)?;
                writer.write_event(Event::End(end))?;
                found = true;
            }
            event => writer.write_event(event)?,
        }
    }
    if !found {
        Err(SpreadsheetError::FileError(format!("{STYLES_PATH}#cellXfs")))?
    }
    Ok(writer.into_inner())
}

fn with_count<'a>(event: &BytesStart<'a>, count: &str) -> Result<BytesStart<'a>, SheetTransferError> {
    let mut start = event.without_attribute("count")?;
    start.push_attribute(("count", count));
    Ok(start)
}

fn write_date_format(writer: &mut Writer<Vec<u8>>) -> Result<(), SheetTransferError> {
    let format = BytesStart::new("xf").with_attributes([
        ("numFmtId", BUILTIN_DATE_FORMAT_ID),
        ("fontId", "0"),
        ("fillId", "0"),
        ("borderId", "0"),
        ("xfId", "0"),
        ("applyNumberFormat", "1"),
    ]);
    writer.write_event(Event::Empty(format))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSHEET: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<dimension ref="A1:I2"/>"#,
        r#"<sheetData>"#,
        r#"<row r="1" spans="1:9"><c r="A1" t="s"><v>0</v></c><c r="I1" t="s"><v>1</v></c></row>"#,
        r#"<row r="2" spans="1:9"><c r="A2" s="1"><v>45200</v></c><c r="E2" s="4"><f>10*5</f><v>50</v></c></row>"#,
        r#"<row r="4" spans="1:9" ht="15"><c r="A4" s="2"/><c r="B4" s="2"/><c r="I4" s="3"/></row>"#,
        r#"</sheetData>"#,
        r#"<mergeCells count="1"><mergeCell ref="K1:L1"/></mergeCells>"#,
        r#"</worksheet>"#,
    );

    fn formats() -> Vec<CellType> {
        vec![CellType::Number, CellType::NumberDate1900, CellType::Number, CellType::Number, CellType::Number]
    }

    fn cell(row: usize, col: usize, kind: CellType, value: &str, style: Option<usize>) -> Cell {
        Cell { row, col, kind, value: value.to_owned(), style }
    }

    fn appended() -> Vec<Cell> {
        vec![
            cell(2, 0, CellType::NumberDate1900, "45296", Some(1)),
            cell(2, 4, CellType::Number, "100", Some(4)),
            cell(2, 8, CellType::InlineString, "A&B", None),
            cell(3, 0, CellType::NumberDate1900, "45297", Some(1)),
            cell(3, 4, CellType::Number, "250", Some(4)),
            cell(3, 8, CellType::InlineString, "Beta", None),
        ]
    }

    #[test]
    fn inserts_rows_and_merges_template_rows() {
        let patched = patch_worksheet(WORKSHEET.as_bytes(), &appended(), &formats()).unwrap();
        let patched = String::from_utf8(patched).unwrap();

        let expected = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            r#"<dimension ref="A1:I4"/>"#,
            r#"<sheetData>"#,
            r#"<row r="1" spans="1:9"><c r="A1" t="s"><v>0</v></c><c r="I1" t="s"><v>1</v></c></row>"#,
            r#"<row r="2" spans="1:9"><c r="A2" s="1"><v>45200</v></c><c r="E2" s="4"><f>10*5</f><v>50</v></c></row>"#,
            r#"<row r="3"><c r="A3" s="1"><v>45296</v></c><c r="E3" s="4"><v>100</v></c>"#,
            r#"<c r="I3" t="inlineStr"><is><t xml:space="preserve">A&amp;B</t></is></c></row>"#,
            r#"<row r="4" ht="15"><c r="A4" s="1"><v>45297</v></c><c r="B4" s="2"/><c r="E4" s="4"><v>250</v></c>"#,
            r#"<c r="I4" s="3" t="inlineStr"><is><t xml:space="preserve">Beta</t></is></c></row>"#,
            r#"</sheetData>"#,
            r#"<mergeCells count="1"><mergeCell ref="K1:L1"/></mergeCells>"#,
            r#"</worksheet>"#,
        );
        assert_eq!(patched, expected);
    }

    #[test]
    fn fills_empty_sheet_data() {
        let xml = r#"<worksheet><dimension ref="A1"/><sheetData/></worksheet>"#;
        let cells = vec![cell(1, 0, CellType::Number, "7", None)];
        let patched = String::from_utf8(patch_worksheet(xml.as_bytes(), &cells, &[]).unwrap()).unwrap();
        assert_eq!(
            patched,
            r#"<worksheet><dimension ref="A1:A2"/><sheetData><row r="2"><c r="A2"><v>7</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn appends_after_last_row_and_into_empty_rows() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="2" spans="1:1"/></sheetData></worksheet>"#;
        let cells = vec![
            cell(1, 0, CellType::Boolean, "1", None),
            cell(5, 2, CellType::Number, "3.5", None),
        ];
        let patched = String::from_utf8(patch_worksheet(xml.as_bytes(), &cells, &[]).unwrap()).unwrap();
        assert_eq!(
            patched,
            concat!(
                r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row>"#,
                r#"<row r="2"><c r="A2" t="b"><v>1</v></c></row>"#,
                r#"<row r="6"><c r="C6"><v>3.5</v></c></row>"#,
                r#"</sheetData></worksheet>"#,
            )
        );
    }

    #[test]
    fn empty_cells_clear_existing_values() {
        let cells = vec![
            cell(1, 4, CellType::Empty, "", None),
            cell(2, 0, CellType::NumberDate1900, "45296", Some(1)),
            cell(2, 8, CellType::Empty, "", Some(3)),
        ];
        let patched = String::from_utf8(patch_worksheet(WORKSHEET.as_bytes(), &cells, &formats()).unwrap()).unwrap();
        assert!(patched.contains(r#"<row r="2"><c r="A2" s="1"><v>45200</v></c><c r="E2" s="4"/></row>"#));
        assert!(patched.contains(r#"<row r="3"><c r="A3" s="1"><v>45296</v></c><c r="I3" s="3"/></row>"#));
        assert!(!patched.contains("10*5"));
    }

    #[test]
    fn dimension_bounds() {
        assert_eq!(Bounds::parse("B2:I30").map(Bounds::to_reference), Some("B2:I30".to_owned()));
        assert_eq!(Bounds::parse("A1").map(Bounds::to_reference), Some("A1".to_owned()));
        assert_eq!(Bounds::parse("bogus"), None);
        let widened = Bounds::parse("B2:C3").unwrap().union(Bounds::parse("A5:I6").unwrap());
        assert_eq!(widened.to_reference(), "A2:I6");
    }

    #[test]
    fn adds_date_cell_format() {
        let xml = r#"<styleSheet><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="4"><alignment/></xf></cellXfs></styleSheet>"#;
        let patched = String::from_utf8(add_date_style(xml.as_bytes(), 2).unwrap()).unwrap();
        assert_eq!(
            patched,
            concat!(
                r#"<styleSheet><cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="4"><alignment/></xf>"#,
                r#"<xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
                r#"</cellXfs></styleSheet>"#,
            )
        );
        assert!(add_date_style(b"<styleSheet/>", 0).is_err());
    }
}
