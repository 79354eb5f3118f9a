use crate::error::SheetTransferError;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content

/// Represents an Excel XLSX/XLSM workbook opened for reading
pub struct XlsxSpreadsheet {
    /// File name of the spreadsheet
    pub(crate) name: String,
    /// ZIP archive containing the package parts
    pub(crate) zip: ZipArchive<UnifiedReader>,
    /// Parsed number formats for cell type detection, indexed by style id
    pub(crate) number_formats: Vec<CellType>,
    /// List of worksheets with (name, zip_path) pairs
    pub(crate) sheets: Vec<(String, String)>,
    /// Whether the workbook uses the 1904 date system
    pub(crate) is_1904: bool,
    /// Shared string table, loaded on first sheet read
    shared_strings: Option<Vec<String>>,
}

impl XlsxSpreadsheet {
    /// Opens an XLSX spreadsheet file and parses its structure
    ///
    /// # Arguments
    /// * `path` - Path to the `.xlsx`, `.xlsm` or `.xlam` file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<XlsxSpreadsheet, SheetTransferError> {
        let file_name = path.as_ref().to_string_lossy().to_string();
        let reader = UnifiedReader::new(&file_name)?;
        Self::from_reader(&file_name, reader)
    }

    /// Parses a workbook held in memory (an upload, or a buffer produced earlier in a run).
    ///
    /// # Arguments
    /// * `file_name` - Name of the workbook, used for format detection and messages
    /// * `bytes` - Workbook content
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<XlsxSpreadsheet, SheetTransferError> {
        Self::from_reader(file_name, UnifiedReader::from_bytes(bytes))
    }

    fn from_reader(file_name: &str, reader: UnifiedReader) -> Result<XlsxSpreadsheet, SheetTransferError> {
        let mut zip = excel::open_package(file_name, reader)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        log::debug!("Opened '{}': {} worksheet(s), 1904 date system: {}", file_name, sheets.len(), is_1904);
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
            is_1904,
            shared_strings: None,
        })
    }

    /// Returns the package path of a worksheet.
    pub(crate) fn sheet_path(&self, sheet_name: &str) -> Result<&str, SpreadsheetError> {
        self.sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, path)| path.as_str())
            .ok_or_else(|| SpreadsheetError::SheetNotFound {
                file_name: self.name.to_owned(),
                sheet_name: sheet_name.to_owned(),
                available: self.sheet_names(),
            })
    }

    /// Loads shared strings from the XLSX file
    ///
    /// Shared strings are stored in a separate XML file and referenced by index
    /// to reduce file size when the same string appears multiple times.
    fn load_shared_strings(&mut self) -> Result<(), SheetTransferError> {
        if self.shared_strings.is_some() {
            return Ok(());
        }
        let mut shared_strings = Vec::<String>::new();
        if let Some(mut reader) = self.zip.xml_reader("xl/sharedStrings.xml")? {
            match_xml_events!(reader => {
                Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                    shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
                }
            });
        }
        self.shared_strings = Some(shared_strings);
        Ok(())
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// Reads one worksheet into a cell grid
    ///
    /// Cells without a stored value are skipped, shared-string cells with no
    /// index included; the others are resolved to
    /// their text and numbers are typed from their style's number format.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SheetTransferError> {
        let zip_path = self.sheet_path(sheet_name)?.to_owned();
        self.load_shared_strings()?;
        let shared_strings = self.shared_strings.as_deref().unwrap_or_default();
        let number_formats = &self.number_formats;

        let mut sheet = Sheet::new(&self.name, sheet_name);
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut style = None::<usize>;
        let mut value = String::new();
        let mut reader = self.zip.xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(number) = event.parse_attribute_value::<usize>("r")? {
                    row_count = number.saturating_sub(1);
                }
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                style = event.get_attribute_value("s")?
                    .filter(|format_id| !format_id.is_empty())
                    .map(|format_id| format_id.parse::<usize>())
                    .transpose()?;
                if let Some(index) = style {
                    if kind == CellType::Number {
                        kind = number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if kind == CellType::SharedString {
                    value = match value.trim() {
                        "" => String::new(),
                        index => shared_strings.get(index.parse::<usize>()?).cloned().unwrap_or_default(),
                    };
                }
                if kind != CellType::Empty && !value.is_empty() {
                    sheet.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                        style,
                    });
                }
                kind = CellType::default();
            }
        });
        log::debug!("Read {} cell(s) from sheet '{}' of '{}'", sheet.cells.len(), sheet_name, self.name);
        Ok(sheet)
    }
}

/// Loads workbook structure and worksheet information from XLSX file
///
/// Parses the workbook.xml file to extract worksheet names and their corresponding
/// XML file paths, and determines the date system (1900 vs 1904) used in the file.
///
/// # Returns
/// Tuple of (worksheets, is_1904_date_system) where worksheets are (name, zip_path) pairs
fn load_workbook(zip: &mut ZipArchive<UnifiedReader>) -> Result<(Vec<(String, String)>, bool), SheetTransferError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id.to_string()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats and cell styles from XLSX styles.xml file
///
/// Parses custom number formats and cell style indexes to determine
/// how numeric values should be interpreted (dates, times, plain numbers)
///
/// # Returns
/// Vector of CellType values indexed by style ID
fn load_number_formats(zip: &mut ZipArchive<UnifiedReader>, is_1904: bool) -> Result<Vec<CellType>, SheetTransferError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            break;
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            format_indexes.push(event.get_attribute_value("numFmtId")?.map(|id| id.to_string()).unwrap_or_default());
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Extracts string content from XML elements, skipping phonetic text annotations
/// and properly handling both text nodes and CDATA sections.
///
/// # Arguments
/// * `reader` - XML reader positioned at the start of the string content
/// * `end_tag` - XML tag that marks the end of the string content
/// * `is_text_content` - Whether to treat the content as text by default
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SheetTransferError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::Value;
    use chrono::NaiveDate;
    use rust_xlsxwriter::Format;
    use rust_xlsxwriter::Workbook;

    fn sample_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("dd/mm/yyyy");
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Dados").unwrap();
        worksheet.write_string(0, 0, "Data").unwrap();
        worksheet.write_string(0, 1, "Cliente & Cia").unwrap();
        worksheet.write_number_with_format(1, 0, 45296.0, &date_format).unwrap();
        worksheet.write_string(1, 1, "ACME").unwrap();
        worksheet.write_number(1, 2, 1500.5).unwrap();
        worksheet.write_boolean(2, 2, true).unwrap();
        workbook.add_worksheet().set_name("Outra").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn lists_sheets_in_workbook_order() {
        let spreadsheet = XlsxSpreadsheet::from_bytes("book.xlsx", sample_workbook()).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["Dados", "Outra"]);
        assert!(!spreadsheet.is_1904());
        assert_eq!(spreadsheet.sheet_path("Outra").unwrap(), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn reads_typed_cells() {
        let mut spreadsheet = XlsxSpreadsheet::from_bytes("book.xlsx", sample_workbook()).unwrap();
        let sheet = spreadsheet.read_sheet("Dados").unwrap();

        assert_eq!(sheet.row_upper_bound, Some(2));
        assert_eq!(sheet.col_upper_bound, Some(2));
        assert_eq!(sheet.get(0, 1).map(Cell::to_value), Some(Value::Text("Cliente & Cia".to_owned())));
        assert_eq!(sheet.get(1, 0).map(|cell| cell.to_date()), Some(Ok(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())));
        assert!(sheet.get(1, 0).and_then(|cell| cell.style).is_some());
        assert_eq!(sheet.get(1, 2).map(Cell::to_value), Some(Value::Number(1500.5)));
        assert_eq!(sheet.get(2, 2).map(Cell::to_value), Some(Value::Boolean(true)));
        assert!(sheet.get(2, 0).is_none());
    }

    #[test]
    fn skips_shared_string_cells_without_index() {
        let mut spreadsheet = XlsxSpreadsheet::from_bytes("book.xlsx", sample_workbook()).unwrap();
        let worksheet = concat!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
            r#"<row r="1"><c r="A1" t="s"><v>2</v></c><c r="B1" t="s"/><c r="C1" s="0" t="s"><v> </v></c></row>"#,
            r#"</sheetData></worksheet>"#,
        );
        let replacements = HashMap::from([("xl/worksheets/sheet1.xml".to_owned(), worksheet.as_bytes().to_vec())]);
        let bytes = spreadsheet.zip.repack(&replacements).unwrap();

        let mut edited = XlsxSpreadsheet::from_bytes("book.xlsx", bytes).unwrap();
        let sheet = edited.read_sheet("Dados").unwrap();
        assert_eq!(sheet.get(0, 0).map(Cell::to_value), Some(Value::Text("ACME".to_owned())));
        assert!(sheet.get(0, 1).is_none());
        assert!(sheet.get(0, 2).is_none());
    }

    #[test]
    fn missing_sheet_is_reported() {
        let mut spreadsheet = XlsxSpreadsheet::from_bytes("book.xlsx", sample_workbook()).unwrap();
        let error = spreadsheet.read_sheet("BGP e BGX Cambio").unwrap_err();
        assert_eq!(error.to_string(), "Sheet 'BGP e BGX Cambio' not found in 'book.xlsx'");
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn rejects_compound_files() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.resize(512, 0);
        let error = XlsxSpreadsheet::from_bytes("locked.xlsx", bytes).err().unwrap();
        assert!(matches!(
            error,
            SheetTransferError::SpreadsheetError(SpreadsheetError::SpreadsheetPasswordProtectedError(_))
        ));
    }
}
