use crate::error::SheetTransferError;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

/// Signature of OLE2 compound files (legacy `.xls` and encrypted OOXML packages).
const COMPOUND_FILE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A unified reader over a workbook stored either on disk or in memory
#[derive(Debug)]
pub(crate) enum UnifiedReader {
    /// Local file reader
    Local(BufReader<File>),
    /// In-memory buffer (uploaded or generated workbooks)
    Memory(Cursor<Vec<u8>>),
}

impl UnifiedReader {
    /// Opens a local file for reading
    ///
    /// # Arguments
    /// * `file_name` - Path to the file
    pub(crate) fn new(file_name: &str) -> Result<UnifiedReader, SheetTransferError> {
        let file = File::open(file_name)?;
        Ok(UnifiedReader::Local(BufReader::new(file)))
    }

    /// Wraps an in-memory workbook
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> UnifiedReader {
        UnifiedReader::Memory(Cursor::new(bytes))
    }

    /// Checks whether the content is an OLE2 compound file rather than a ZIP package.
    /// The reader is rewound to the start afterwards.
    pub(crate) fn is_compound_file(&mut self) -> Result<bool, SheetTransferError> {
        let mut signature = [0u8; 8];
        let mut filled = 0usize;
        while filled < signature.len() {
            let count = self.read(&mut signature[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        self.seek(SeekFrom::Start(0))?;
        Ok(filled == signature.len() && signature == COMPOUND_FILE_SIGNATURE)
    }
}

impl Read for UnifiedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            UnifiedReader::Local(reader) => reader.read(buf),
            UnifiedReader::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for UnifiedReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            UnifiedReader::Local(reader) => reader.seek(pos),
            UnifiedReader::Memory(reader) => reader.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_local_file() {
        // Test opening a local file (Cargo.toml should exist)
        let result = UnifiedReader::new("Cargo.toml");
        assert!(result.is_ok(), "Failed to open local file: {:?}", result.err());

        // Test opening a non-existent local file
        let result = UnifiedReader::new("non_existent_file.xlsx");
        assert!(result.is_err(), "Should fail to open non-existent file");
    }

    #[test]
    fn test_detect_compound_file() {
        let mut bytes = COMPOUND_FILE_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let mut reader = UnifiedReader::from_bytes(bytes);
        assert!(reader.is_compound_file().unwrap());

        let mut reader = UnifiedReader::from_bytes(b"PK\x03\x04rest".to_vec());
        assert!(!reader.is_compound_file().unwrap());
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"PK");

        let mut reader = UnifiedReader::from_bytes(Vec::new());
        assert!(!reader.is_compound_file().unwrap());
    }
}
