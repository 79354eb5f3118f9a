use thiserror::Error;

/// Main error type for sheet transfer runs.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum SheetTransferError {
    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    // Transfer module errors
    #[error("{0}")]
    TransferError(#[from] crate::transfer::TransferError),

    #[error("{0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

impl SheetTransferError {
    /// Process exit code for this error, used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        use crate::spreadsheet::SpreadsheetError as S;
        use crate::transfer::TransferError as T;
        match self {
            Self::ConfigError(_) => 2,
            Self::TransferError(T::InvalidSchema(_)) | Self::TransferError(T::InvalidDateRange { .. }) => 2,
            Self::SpreadsheetError(S::SheetNotFound { .. }) => 3,
            Self::TransferError(T::SchemaDrift { .. }) => 4,
            Self::TransferError(T::SerializationFailure(_)) => 5,
            _ => 1,
        }
    }

    /// A hint for the user on how to fix the input, when one is known.
    pub fn suggestion(&self) -> Option<String> {
        use crate::spreadsheet::SpreadsheetError as S;
        use crate::transfer::TransferError as T;
        match self {
            Self::SpreadsheetError(S::SheetNotFound { available, .. }) => Some(format!(
                "Available sheets: {}. Use --source-sheet/--destination-sheet or the config file to pick another one.",
                available.join(", ")
            )),
            Self::SpreadsheetError(S::InvalidFileFormat(_)) => {
                Some("Only .xlsx, .xlsm and .xlam workbooks are supported. Re-save the file in one of these formats.".to_string())
            }
            Self::SpreadsheetError(S::SpreadsheetPasswordProtectedError(_)) => {
                Some("Remove the password (or re-save a legacy .xls file as .xlsx/.xlsm) and try again.".to_string())
            }
            Self::TransferError(T::SchemaDrift { .. }) => Some(
                "The source layout changed. Update the column positions in the config file or remove `expected_header`.".to_string(),
            ),
            Self::ConfigError(_) => Some("Run `sheet-transfer init-config` to generate a valid configuration file.".to_string()),
            _ => None,
        }
    }
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::SpreadsheetError;
    use crate::transfer::TransferError;

    #[test]
    fn exit_codes_follow_error_kind() {
        let error: SheetTransferError = SpreadsheetError::SheetNotFound {
            file_name: "a.xlsx".to_owned(),
            sheet_name: "missing".to_owned(),
            available: vec!["Sheet1".to_owned()],
        }
        .into();
        assert_eq!(error.exit_code(), 3);
        assert!(error.suggestion().unwrap().contains("Sheet1"));

        let error: SheetTransferError = TransferError::SerializationFailure("disk full".to_owned()).into();
        assert_eq!(error.exit_code(), 5);
        assert!(error.suggestion().is_none());
    }

    #[test]
    fn ok_none_else_falls_back_only_on_none() {
        let first: Result<Option<u8>, ()> = Ok(None);
        assert_eq!(first.ok_none_else(|| Ok(Some(2))), Ok(Some(2)));
        let second: Result<Option<u8>, ()> = Ok(Some(1));
        assert_eq!(second.ok_none_else(|| Ok(Some(2))), Ok(Some(1)));
    }
}
