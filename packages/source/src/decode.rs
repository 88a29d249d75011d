//! Decoding of fetched files according to their type.
//!
//! | type             | result                        |
//! |------------------|-------------------------------|
//! | `html`, `htm`    | [`ParsedDocument::Html`]      |
//! | `xml`            | [`ParsedDocument::Xml`]       |
//! | `pdf`            | [`ParsedDocument::Pdf`]       |
//! | `csv`            | [`ParsedDocument::Csv`]       |
//! | `xlsx`, `ods`    | [`ParsedDocument::Workbook`]  |
//! | `json`           | [`ParsedDocument::Json`]      |
//! | anything else    | [`ParsedDocument::Text`]      |

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Ods, Xlsx};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::SourceError;

/// A fetched document decoded into a type-appropriate representation.
#[derive(Debug)]
pub enum ParsedDocument {
    /// Parsed HTML tree.
    Html(scraper::Html),
    /// XML element tree.
    Xml(XmlElement),
    /// Extracted text, one entry per page.
    Pdf(Vec<String>),
    /// CSV rows, header row included.
    Csv(Vec<Vec<String>>),
    /// Spreadsheet sheets in workbook order.
    Workbook(Vec<Sheet>),
    /// JSON value.
    Json(serde_json::Value),
    /// Plain text.
    Text(String),
}

impl ParsedDocument {
    /// The HTML tree, if this is an HTML document.
    #[must_use]
    pub const fn as_html(&self) -> Option<&scraper::Html> {
        match self {
            Self::Html(html) => Some(html),
            _ => None,
        }
    }

    /// The root element, if this is an XML document.
    #[must_use]
    pub const fn as_xml(&self) -> Option<&XmlElement> {
        match self {
            Self::Xml(root) => Some(root),
            _ => None,
        }
    }

    /// The page texts, if this is a PDF document.
    #[must_use]
    pub fn as_pdf_pages(&self) -> Option<&[String]> {
        match self {
            Self::Pdf(pages) => Some(pages),
            _ => None,
        }
    }

    /// The rows, if this is a CSV document.
    #[must_use]
    pub fn as_csv(&self) -> Option<&[Vec<String>]> {
        match self {
            Self::Csv(rows) => Some(rows),
            _ => None,
        }
    }

    /// The sheets, if this is a spreadsheet workbook.
    #[must_use]
    pub fn as_workbook(&self) -> Option<&[Sheet]> {
        match self {
            Self::Workbook(sheets) => Some(sheets),
            _ => None,
        }
    }

    /// The JSON value, if this is a JSON document.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, if this is a plain text document.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Decodes `path` according to `file_type`.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be read and
/// [`SourceError::Decode`] if its content does not match the type.
pub fn decode(path: &Path, file_type: &str) -> Result<ParsedDocument, SourceError> {
    let failed = |message: String| SourceError::Decode {
        path: path.display().to_string(),
        message,
    };

    match file_type.to_ascii_lowercase().as_str() {
        "html" | "htm" => {
            let text = read_text(path)?;
            Ok(ParsedDocument::Html(scraper::Html::parse_document(&text)))
        }
        "xml" => {
            let text = read_text(path)?;
            XmlElement::parse(&text).map(ParsedDocument::Xml).map_err(failed)
        }
        "pdf" => {
            let bytes = std::fs::read(path).map_err(SourceError::io(path))?;
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map(ParsedDocument::Pdf)
                .map_err(|e| failed(e.to_string()))
        }
        "csv" => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(path)
                .map_err(|e| failed(e.to_string()))?;
            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|e| failed(e.to_string()))?;
                rows.push(record.iter().map(|cell| cell.trim().to_owned()).collect());
            }
            Ok(ParsedDocument::Csv(rows))
        }
        "xlsx" => read_sheets::<Xlsx<_>>(path)
            .map(ParsedDocument::Workbook)
            .map_err(failed),
        "ods" => read_sheets::<Ods<_>>(path)
            .map(ParsedDocument::Workbook)
            .map_err(failed),
        "json" => {
            let bytes = std::fs::read(path).map_err(SourceError::io(path))?;
            serde_json::from_slice(&bytes)
                .map(ParsedDocument::Json)
                .map_err(|e| failed(e.to_string()))
        }
        _ => read_text(path).map(ParsedDocument::Text),
    }
}

/// One worksheet of a workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// Sheet name.
    pub name: String,
    /// Cell text by row, starting at the first non-empty row and column.
    /// Empty cells are empty strings.
    pub rows: Vec<Vec<String>>,
}

fn read_sheets<R>(path: &Path) -> Result<Vec<Sheet>, String>
where
    R: calamine::Reader<BufReader<File>>,
    R::Error: fmt::Display,
{
    let mut workbook: R = calamine::open_workbook(path).map_err(|e: R::Error| e.to_string())?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| format!("sheet {name}: {e}"))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_owned()).collect())
            .collect();
        sheets.push(Sheet { name, rows });
    }

    Ok(sheets)
}

fn read_text(path: &Path) -> Result<String, SourceError> {
    let bytes = std::fs::read(path).map_err(SourceError::io(path))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A simple owned XML element tree.
///
/// Namespace prefixes are kept in element and attribute names. Text and
/// CDATA content directly inside an element is concatenated into
/// [`XmlElement::text`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified element name.
    pub name: String,
    /// Attributes by qualified name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<Self>,
    /// Concatenated text content.
    pub text: String,
}

impl XmlElement {
    /// Parses an XML document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the document is not
    /// well-formed or has no root element.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Self> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(ref e) => stack.push(Self::from_start(e)?),
                Event::Empty(ref e) => {
                    let element = Self::from_start(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or("unbalanced end tag")?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(ref e) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&e.unescape().map_err(|e| e.to_string())?);
                    }
                }
                Event::CData(ref e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err("unexpected end of document".to_string());
        }

        root.ok_or_else(|| "document has no root element".to_string())
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let mut attributes = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            attributes.insert(key, value.into_owned());
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    /// First child element named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendant elements named `name`, depth first.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&Self> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    /// Attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
