//! Shared-string text index

use super::parser_utils::{local_name, read_text_node};
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::path::Path;

/// Plain text of each shared-string item, by index.
///
/// Items without a direct `<t>` run (rich-text only) are `None`. An empty table
/// means the workbook stores its text as inline strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedStringTable {
    entries: Vec<Option<String>>,
}

impl SharedStringTable {
    /// Load `xl/sharedStrings.xml`; a missing part gives an empty table
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut entries = Vec::new();

        let mut in_item = false;
        let mut depth = 0usize;
        let mut current: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"si" => {
                        in_item = true;
                        depth = 0;
                        current = None;
                    }
                    b"t" if in_item && depth == 0 => {
                        let text = read_text_node(&mut reader)?;
                        current.get_or_insert(text);
                    }
                    _ if in_item => depth += 1,
                    _ => {}
                },
                Event::Empty(e) => match local_name(e.name().as_ref()) {
                    b"si" => entries.push(None),
                    b"t" if in_item && depth == 0 => {
                        current.get_or_insert_with(String::new);
                    }
                    _ => {}
                },
                Event::End(e) => match local_name(e.name().as_ref()) {
                    b"si" => {
                        entries.push(current.take());
                        in_item = false;
                    }
                    _ if in_item => depth = depth.saturating_sub(1),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<Option<String>>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Plain text of item `index`, if it exists and has a plain run
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).and_then(|e| e.as_deref())
    }
}
