//! ZIP archive helper utilities for Office Open XML packages
//! Provides convenient methods for reading and repacking files within ZIP archives

use crate::error::SheetTransferError;
use crate::helpers::xml::XmlReader;
use std::collections::HashMap;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

/// Helper trait for ZIP archive operations with specialized reader creation
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetTransferError>;

    /// Creates an XML reader for a file within the ZIP archive
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetTransferError>;

    /// Reads a whole file within the ZIP archive into memory
    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, SheetTransferError>;

    /// Writes a copy of the archive where the named entries are replaced.
    ///
    /// Entries without a replacement are copied in their compressed form, so
    /// their bytes (and CRCs) are identical to the source package.
    fn repack(&mut self, replacements: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>, SheetTransferError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetTransferError> {
        let pattern = name.replace('\\', "/");
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetTransferError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, SheetTransferError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn repack(&mut self, replacements: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>, SheetTransferError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for index in 0..self.len() {
            let file = self.by_index_raw(index)?;
            let name = file.name().to_owned();
            let replacement = replacements
                .iter()
                .find(|(path, _)| path.eq_ignore_ascii_case(&name))
                .map(|(_, bytes)| bytes);
            match replacement {
                Some(bytes) => {
                    drop(file);
                    writer.start_file(name, options)?;
                    writer.write_all(bytes)?;
                }
                None => writer.raw_copy_file(file)?,
            }
        }
        Ok(writer.finish()?.into_inner())
    }
}
