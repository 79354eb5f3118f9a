//! quick-xml plumbing shared by the workbook reader and the worksheet patcher
//!
//! Parts are either read for their content ([`XmlReader`], empty elements
//! expanded) or rewritten event by event ([`part_reader`] plus a
//! `Writer<Vec<u8>>`), in which case every untouched event goes back out as read.
use crate::error::SheetTransferError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// Content reader over a package part.
///
/// `<c/>` arrives as `Start` + `End`, so readers of cell values only match the
/// two of them.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(source: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = false;
        config.check_comments = false;
        config.trim_text(false);
        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Next event, or `None` once the part is exhausted.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SheetTransferError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer)? {
            Event::Eof => Ok(None),
            event => Ok(Some(event)),
        }
    }
}

/// Reader for a part that is rewritten: events are reported exactly as they
/// are written, empty elements included, so they can be re-emitted unchanged.
pub(crate) fn part_reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().check_end_names = false;
    reader
}

pub(crate) trait XmlAttributeHelper<'a> {
    /// Unescaped value
    fn get_value(&self) -> Result<Cow<'a, str>, SheetTransferError>;

    fn parse_value<T: FromStr>(&self) -> Result<T, SheetTransferError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, SheetTransferError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, SheetTransferError> {
        let value = self.get_value()?;
        value
            .parse()
            .map_err(|_| XmlError::ParseAttributeValueError(value.to_string()).into())
    }
}

pub(crate) trait XmlNodeHelper<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetTransferError>;

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetTransferError>;

    /// Copy of the tag with every other attribute, in the original order.
    fn without_attribute(&self, name: &str) -> Result<BytesStart<'a>, SheetTransferError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetTransferError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetTransferError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }

    fn without_attribute(&self, name: &str) -> Result<BytesStart<'a>, SheetTransferError> {
        let mut start = self.clone();
        start.clear_attributes();
        for attribute in self.attributes() {
            let attribute = attribute?;
            if attribute.key.as_ref() != name.as_bytes() {
                start.push_attribute(attribute);
            }
        }
        Ok(start)
    }
}

/// Accumulates cell and shared-string text, resolving entity references.
pub(crate) trait XmlTextContextHelper {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SheetTransferError>;

    /// `&amp;`, `&#67;` and `&#x00E2;` style references
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetTransferError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SheetTransferError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetTransferError> {
        let raw = bytes.xml_content()?;
        let code = match raw.strip_prefix("#x") {
            Some(hex) => Some(u32::from_str_radix(hex, 16)?),
            None => raw.strip_prefix('#').map(str::parse::<u32>).transpose()?,
        };
        match code {
            Some(code) => self.extend(char::from_u32(code)),
            None => match resolve_xml_entity(&raw) {
                Some(entity) => self.push_str(entity),
                None => Err(XmlError::ParseEntityError(raw.to_string()))?,
            },
        }
        Ok(())
    }
}

pub(crate) trait XmlWriterHelper {
    /// Writes `<tag ...>text</tag>`, escaping `text`.
    fn write_text_element(&mut self, start: BytesStart, text: &str) -> Result<(), SheetTransferError>;
}

impl<W: Write> XmlWriterHelper for Writer<W> {
    fn write_text_element(&mut self, start: BytesStart, text: &str) -> Result<(), SheetTransferError> {
        let end = start.to_end().into_owned();
        self.write_event(Event::Start(start))?;
        self.write_event(Event::Text(BytesText::new(text)))?;
        self.write_event(Event::End(end))?;
        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_text(xml: &str) -> Result<String, SheetTransferError> {
        let mut reader = XmlReader::new(xml.as_bytes());
        let mut text = String::new();
        match_xml_events!(reader => {
            Event::Text(event) => text.push_bytes_text(&event)?,
            Event::GeneralRef(event) => text.push_bytes_ref(&event)?,
        });
        Ok(text)
    }

    #[test]
    fn resolves_entities_and_character_references() {
        let text = collect_text("<t>C&amp;A &#67;&#x00E2;mbio</t>").unwrap();
        assert_eq!(text, "C&A Câmbio");
    }

    #[test]
    fn rejects_unknown_entity() {
        let error = collect_text("<t>&bogus;</t>").unwrap_err();
        assert_eq!(error.to_string(), "Parse entity 'bogus' failed");
    }

    #[test]
    fn reads_attributes() -> Result<(), SheetTransferError> {
        let mut reader = XmlReader::new(r#"<c r="B7" s="12"/>"#.as_bytes());
        let mut style = None;
        let mut reference = None;
        match_xml_events!(reader => {
            Event::Start(event) => {
                style = event.parse_attribute_value::<usize>("s")?;
                reference = event.get_attribute_value("r")?.map(|value| value.to_string());
                assert!(event.parse_attribute_value::<usize>("r").is_err());
            }
        });
        assert_eq!(style, Some(12));
        assert_eq!(reference.as_deref(), Some("B7"));
        Ok(())
    }

    #[test]
    fn rewrites_part_events_unchanged() -> Result<(), SheetTransferError> {
        let xml = r#"<row r="3" spans="1:9" ht="15"><c r="A3"/></row>"#;
        let mut reader = part_reader(xml.as_bytes());
        let mut writer = Writer::new(Vec::new());
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_event_into(&mut buffer)? {
                Event::Eof => break,
                Event::Start(event) => writer.write_event(Event::Start(event.without_attribute("spans")?))?,
                Event::Empty(event) => writer.write_text_element(event.without_attribute("r")?, "<1>")?,
                event => writer.write_event(event)?,
            }
        }
        let rewritten = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(rewritten, r#"<row r="3" ht="15"><c>&lt;1&gt;</c></row>"#);
        Ok(())
    }
}
