//! Owned XML element tree for package parts
//!
//! Parts are small enough to edit in memory. Attribute order, namespace
//! prefixes and whitespace text are preserved so untouched content
//! round-trips unchanged.

use anyhow::{Context, Result, anyhow};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    /// Raw comment body
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Qualified name as written (`x:row` or `row`)
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Qualify `local` with this element's namespace prefix
    pub fn child_name(&self, local: &str) -> String {
        match self.name.split_once(':') {
            Some((prefix, _)) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, returning whether the value changed
    pub fn set_attr(&mut self, key: &str, value: &str) -> bool {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) if v == value => false,
            Some((_, v)) => {
                *v = value.to_string();
                true
            }
            None => {
                self.attributes.push((key.to_string(), value.to_string()));
                true
            }
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.local_name() == local)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        local: &'a str,
    ) -> impl Iterator<Item = &'a mut XmlElement> {
        self.elements_mut().filter(move |e| e.local_name() == local)
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    pub fn count_children(&self, local: &str) -> usize {
        self.children_named(local).count()
    }

    /// Remove every child element with this local name; returns how many went
    pub fn remove_children(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(e) if e.local_name() == local));
        before - self.children.len()
    }

    pub fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Insert `element` before the first sibling that `order` places after it.
    ///
    /// Siblings missing from `order` do not affect the position. Returns the
    /// index of the inserted node.
    pub fn insert_ordered(&mut self, element: XmlElement, order: &[&str]) -> usize {
        let rank = order.iter().position(|n| *n == element.local_name());
        let index = rank
            .and_then(|rank| {
                self.children.iter().position(|node| match node {
                    XmlNode::Element(e) => order
                        .iter()
                        .position(|n| *n == e.local_name())
                        .is_some_and(|r| r > rank),
                    _ => false,
                })
            })
            .unwrap_or(self.children.len());
        self.children.insert(index, XmlNode::Element(element));
        index
    }

    /// Return the first child named `local`, creating it in schema order if absent
    pub fn ensure_child(&mut self, local: &str, order: &[&str]) -> &mut XmlElement {
        let existing = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.local_name() == local));
        let index = match existing {
            Some(index) => index,
            None => self.insert_ordered(XmlElement::new(self.child_name(local)), order),
        };
        match &mut self.children[index] {
            XmlNode::Element(e) => e,
            _ => unreachable!("index points at an element node"),
        }
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(writer)?,
                XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                XmlNode::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
                XmlNode::Comment(t) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl XmlDeclaration {
    fn from_event(e: &BytesDecl<'_>) -> Result<Self> {
        let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        Ok(Self {
            version: lossy(&e.version()?),
            encoding: e.encoding().transpose()?.map(|v| lossy(&v)),
            standalone: e.standalone().transpose()?.map(|v| lossy(&v)),
        })
    }
}

/// A parsed XML part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<XmlDeclaration>,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut declaration = None;
        let mut root = None;

        loop {
            let node = match reader.read_event_into(&mut buf) {
                Ok(Event::Decl(e)) => {
                    declaration = Some(XmlDeclaration::from_event(&e)?);
                    None
                }
                Ok(Event::Start(e)) => {
                    stack.push(XmlElement::from_start(&e)?);
                    None
                }
                Ok(Event::Empty(e)) => Some(XmlNode::Element(XmlElement::from_start(&e)?)),
                Ok(Event::End(e)) => {
                    let element = stack.pop().ok_or_else(|| {
                        anyhow!(
                            "Unexpected closing tag '{}'",
                            String::from_utf8_lossy(e.name().as_ref())
                        )
                    })?;
                    Some(XmlNode::Element(element))
                }
                Ok(Event::Text(e)) if !stack.is_empty() => {
                    Some(XmlNode::Text(e.unescape()?.into_owned()))
                }
                Ok(Event::CData(e)) if !stack.is_empty() => {
                    Some(XmlNode::CData(String::from_utf8_lossy(e.as_ref()).into_owned()))
                }
                Ok(Event::Comment(e)) if !stack.is_empty() => {
                    Some(XmlNode::Comment(String::from_utf8_lossy(e.as_ref()).into_owned()))
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(anyhow!(
                        "Error parsing XML at position {}: {}",
                        reader.error_position(),
                        e
                    ));
                }
                Ok(_) => None,
            };

            match (node, stack.last_mut()) {
                (Some(node), Some(parent)) => parent.children.push(node),
                (Some(XmlNode::Element(element)), None) => root = Some(element),
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(anyhow!("Unclosed element '{}'", stack[stack.len() - 1].name));
        }

        Ok(Self {
            declaration,
            root: root.ok_or_else(|| anyhow!("XML document has no root element"))?,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
            writer.write_event(Event::Text(BytesText::new("\r\n")))?;
        }
        self.root.write_to(&mut writer)?;

        let result = writer.into_inner().into_inner();
        Ok(String::from_utf8(result)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
