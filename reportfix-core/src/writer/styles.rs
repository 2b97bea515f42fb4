//! Number-format and cell-format registry over `xl/styles.xml`

use crate::reader::{XmlDocument, XmlElement};
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

/// Locale tag prepended to every registered format code
pub const LOCALE_TAG: &str = "[$-010419]";

/// Ids below this are reserved for built-in formats
pub const FIRST_CUSTOM_NUM_FMT_ID: u32 = 164;

const STYLESHEET_ORDER: &[&str] = &[
    "numFmts",
    "fonts",
    "fills",
    "borders",
    "cellStyleXfs",
    "cellXfs",
    "cellStyles",
    "dxfs",
    "tableStyles",
    "colors",
    "extLst",
];

/// In-memory copy of the style sheet part
#[derive(Debug, Clone)]
pub struct StyleSheet {
    document: XmlDocument,
    modified: bool,
}

impl StyleSheet {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_document(XmlDocument::read(path)?))
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self::from_document(XmlDocument::parse(xml)?))
    }

    fn from_document(document: XmlDocument) -> Self {
        Self {
            document,
            modified: false,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.document.write(path)
    }

    pub fn to_xml(&self) -> Result<String> {
        self.document.to_xml()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Number of `cellXfs` records
    pub fn cell_format_count(&self) -> usize {
        self.document
            .root
            .child("cellXfs")
            .map_or(0, |xfs| xfs.count_children("xf"))
    }

    /// `numFmtId` of cell format `style_id`
    pub fn cell_format_num_fmt(&self, style_id: u32) -> Option<u32> {
        self.document
            .root
            .child("cellXfs")?
            .children_named("xf")
            .nth(style_id as usize)?
            .attr("numFmtId")?
            .parse()
            .ok()
    }

    /// Custom number formats as `(numFmtId, formatCode)`
    pub fn num_fmts(&self) -> Vec<(u32, String)> {
        self.document
            .root
            .child("numFmts")
            .map(|fmts| {
                fmts.children_named("numFmt")
                    .filter_map(|f| {
                        let id = f.attr("numFmtId")?.parse().ok()?;
                        Some((id, f.attr("formatCode").unwrap_or_default().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn num_fmt_id_for(&self, format_code: &str) -> Option<u32> {
        self.num_fmts()
            .into_iter()
            .find(|(_, code)| code == format_code)
            .map(|(id, _)| id)
    }

    /// Register a copy of cell format `style_id` displaying `raw_format`.
    ///
    /// The copy is appended to `cellXfs` and its index returned. Format codes
    /// are shared: an existing `numFmt` with the same code is reused.
    pub fn ensure_formatted(&mut self, style_id: u32, raw_format: &str) -> u32 {
        let format_code = format!("{LOCALE_TAG}{}", raw_format.replace('\'', "\""));
        let new_style_id = self.cell_format_count() as u32;

        let num_fmt_id = match self.num_fmt_id_for(&format_code) {
            Some(id) => id,
            None => {
                let id = self.free_num_fmt_id(new_style_id);
                self.push_num_fmt(id, &format_code);
                id
            }
        };

        let root = &mut self.document.root;
        let xf_name = root.child_name("xf");
        let cell_xfs = root.ensure_child("cellXfs", STYLESHEET_ORDER);

        let mut record = cell_xfs
            .children_named("xf")
            .nth(style_id as usize)
            .cloned()
            .unwrap_or_else(|| default_xf(xf_name));
        record.set_attr("numFmtId", &num_fmt_id.to_string());
        record.set_attr("applyNumberFormat", "1");
        cell_xfs.push(record);

        let count = cell_xfs.count_children("xf");
        cell_xfs.set_attr("count", &count.to_string());

        self.modified = true;
        new_style_id
    }

    fn free_num_fmt_id(&self, preferred: u32) -> u32 {
        let used: HashSet<u32> = self.num_fmts().into_iter().map(|(id, _)| id).collect();
        let mut id = preferred.max(FIRST_CUSTOM_NUM_FMT_ID);
        while used.contains(&id) {
            id += 1;
        }
        id
    }

    fn push_num_fmt(&mut self, id: u32, format_code: &str) {
        let root = &mut self.document.root;
        let num_fmt_name = root.child_name("numFmt");
        let num_fmts = root.ensure_child("numFmts", STYLESHEET_ORDER);
        num_fmts.push(
            XmlElement::new(num_fmt_name)
                .with_attr("numFmtId", &id.to_string())
                .with_attr("formatCode", format_code),
        );
        let count = num_fmts.count_children("numFmt");
        num_fmts.set_attr("count", &count.to_string());
    }
}

fn default_xf(name: String) -> XmlElement {
    XmlElement::new(name)
        .with_attr("numFmtId", "0")
        .with_attr("fontId", "0")
        .with_attr("fillId", "0")
        .with_attr("borderId", "0")
        .with_attr("xfId", "0")
}
