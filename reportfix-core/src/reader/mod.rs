//! Readers for the package parts the converter consumes

pub mod parser_utils;
pub mod shared_strings;
pub mod xml_tree;

pub use shared_strings::SharedStringTable;
pub use xml_tree::{XmlDeclaration, XmlDocument, XmlElement, XmlNode};

/// Shared strings part, relative to the package root
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
/// Style sheet part
pub const STYLES_PART: &str = "xl/styles.xml";
/// Workbook part
pub const WORKBOOK_PART: &str = "xl/workbook.xml";
