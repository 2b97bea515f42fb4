//! Worksheet patching: formula substitution, NaN cleanup and view settings

use super::styles::StyleSheet;
use crate::config::{ConversionConfig, FixedArea};
use crate::error::ConvertResult;
use crate::formula::{self, CellAddress, column_to_letters};
use crate::reader::{SharedStringTable, XmlDocument, XmlElement};
use anyhow::Result;
use log::{debug, warn};
use std::path::Path;

const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

const SHEET_PR_ORDER: &[&str] = &["tabColor", "outlinePr", "pageSetUpPr"];
const SHEET_VIEWS_ORDER: &[&str] = &["sheetView", "extLst"];
const SHEET_VIEW_ORDER: &[&str] = &["pane", "selection", "pivotSelection", "extLst"];
const CELL_ORDER: &[&str] = &["f", "v", "is", "extLst"];

/// A worksheet part with typed access to the nodes the patcher edits
#[derive(Debug, Clone)]
pub struct SheetDocument {
    document: XmlDocument,
}

impl SheetDocument {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            document: XmlDocument::read(path)?,
        })
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self {
            document: XmlDocument::parse(xml)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.document.write(path)
    }

    pub fn to_xml(&self) -> Result<String> {
        self.document.to_xml()
    }

    pub fn root(&self) -> &XmlElement {
        &self.document.root
    }

    pub fn sheet_data_mut(&mut self) -> Option<&mut XmlElement> {
        self.document.root.child_mut("sheetData")
    }

    pub fn sheet_properties_mut(&mut self) -> &mut XmlElement {
        self.document.root.ensure_child("sheetPr", WORKSHEET_ORDER)
    }

    pub fn page_setup_mut(&mut self) -> &mut XmlElement {
        self.document.root.ensure_child("pageSetup", WORKSHEET_ORDER)
    }

    /// First `sheetView`, created with its `sheetViews` container if needed
    pub fn sheet_view_mut(&mut self) -> &mut XmlElement {
        let views = self
            .document
            .root
            .ensure_child("sheetViews", WORKSHEET_ORDER);
        let view = views.ensure_child("sheetView", SHEET_VIEWS_ORDER);
        if view.attr("workbookViewId").is_none() {
            view.set_attr("workbookViewId", "0");
        }
        view
    }
}

/// What the patcher changed in one sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetReport {
    pub formulas_converted: usize,
    pub formulas_skipped: usize,
    pub nan_values_replaced: usize,
    pub formats_applied: usize,
    pub layout_changed: bool,
}

impl SheetReport {
    pub fn is_modified(&self) -> bool {
        self.formulas_converted > 0 || self.nan_values_replaced > 0 || self.layout_changed
    }
}

/// Patch one worksheet.
///
/// Text cells whose content starts with `=` are translated to formulas, numeric
/// `NaN` values become `0`, and the configured print view and frozen pane are
/// applied. Only an invalid cell address aborts; a malformed reference skips
/// the cell. Without a style sheet, display formats are not applied.
pub fn process(
    sheet: &mut SheetDocument,
    text_index: &SharedStringTable,
    styles: Option<&mut StyleSheet>,
    ordinal: usize,
    config: &ConversionConfig,
) -> ConvertResult<SheetReport> {
    let mut report = SheetReport::default();

    if let Some(sheet_data) = sheet.sheet_data_mut() {
        patch_cells(sheet_data, text_index, styles, &mut report)?;
    }

    if config.print_view {
        report.layout_changed |= apply_print_view(sheet, config);
    }
    if let Some(area) = config.fixed_area_for(ordinal) {
        report.layout_changed |= apply_frozen_pane(sheet, area);
    }

    Ok(report)
}

fn patch_cells(
    sheet_data: &mut XmlElement,
    text_index: &SharedStringTable,
    mut styles: Option<&mut StyleSheet>,
    report: &mut SheetReport,
) -> ConvertResult<()> {
    let inline_mode = text_index.is_empty();
    let mut next_row = 1u32;

    for row in sheet_data.children_named_mut("row") {
        let row_number = row
            .attr("r")
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(next_row);
        next_row = row_number.saturating_add(1);

        let mut next_column = 1u32;
        for cell in row.children_named_mut("c") {
            let address = match cell.attr("r") {
                Some(r) => r.to_string(),
                None => format!("{}{}", column_to_letters(next_column), row_number),
            };
            next_column = CellAddress::parse(&address)
                .map(|a| a.column + 1)
                .unwrap_or(next_column + 1);

            patch_cell(
                cell,
                &address,
                inline_mode,
                text_index,
                styles.as_deref_mut(),
                report,
            )?;
        }
    }

    Ok(())
}

fn patch_cell(
    cell: &mut XmlElement,
    address: &str,
    inline_mode: bool,
    text_index: &SharedStringTable,
    styles: Option<&mut StyleSheet>,
    report: &mut SheetReport,
) -> ConvertResult<()> {
    let kind = cell.attr("t").map(str::to_string);
    let text = match kind.as_deref() {
        None | Some("n") => {
            if let Some(value) = cell.child_mut("v")
                && value.text() == "NaN"
            {
                value.set_text("0");
                report.nan_values_replaced += 1;
            }
            return Ok(());
        }
        Some("s") if !inline_mode => cell
            .child("v")
            .and_then(|v| v.text().trim().parse::<usize>().ok())
            .and_then(|index| text_index.get(index))
            .map(str::to_string),
        Some("inlineStr") if inline_mode => cell
            .child("is")
            .and_then(|is| is.child("t"))
            .map(|t| t.text()),
        _ => None,
    };

    let Some(body) = text.as_deref().and_then(|t| t.strip_prefix('=')) else {
        return Ok(());
    };
    debug!("Found formula ={body} at {address}");

    let translated = match formula::translate(body, address) {
        Ok(translated) => translated,
        Err(err) if err.is_cell_local() => {
            warn!("Skipping cell {address}: {err}");
            report.formulas_skipped += 1;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    cell.remove_children("v");
    cell.remove_children("is");
    let formula_node = XmlElement::new(cell.child_name("f")).with_text(translated);
    cell.insert_ordered(formula_node, CELL_ORDER);
    cell.remove_attr("t");
    report.formulas_converted += 1;

    let format = formula::extract_format(body);
    if format.is_empty() {
        return Ok(());
    }
    let Some(styles) = styles else {
        warn!("No style sheet, display format '{format}' at {address} dropped");
        return Ok(());
    };
    let base = cell
        .attr("s")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);
    let style_id = styles.ensure_formatted(base, &format);
    cell.set_attr("s", &style_id.to_string());
    report.formats_applied += 1;

    Ok(())
}

/// Fit the sheet to the page and set its orientation
pub fn apply_print_view(sheet: &mut SheetDocument, config: &ConversionConfig) -> bool {
    let mut changed = false;

    let properties = sheet.sheet_properties_mut();
    let page_setup_pr = properties.ensure_child("pageSetUpPr", SHEET_PR_ORDER);
    changed |= page_setup_pr.set_attr("fitToPage", "1");

    let orientation = if config.landscape {
        "landscape"
    } else {
        "portrait"
    };
    let page_setup = sheet.page_setup_mut();
    changed |= page_setup.set_attr("orientation", orientation);
    changed |= page_setup.set_attr("fitToWidth", &config.fit_to_width.to_string());
    changed |= page_setup.set_attr("fitToHeight", &config.fit_to_height.to_string());

    changed
}

/// Freeze `area.column` columns and `area.row` rows
pub fn apply_frozen_pane(sheet: &mut SheetDocument, area: FixedArea) -> bool {
    let top_left = format!("{}{}", column_to_letters(area.column + 1), area.row + 1);

    let view = sheet.sheet_view_mut();
    let pane = view.ensure_child("pane", SHEET_VIEW_ORDER);

    let mut changed = false;
    changed |= pane.set_attr("xSplit", &area.column.to_string());
    changed |= pane.set_attr("ySplit", &area.row.to_string());
    changed |= pane.set_attr("topLeftCell", &top_left);
    changed |= pane.set_attr("activePane", "bottomRight");
    changed |= pane.set_attr("state", "frozen");
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font/></fonts><cellXfs count="2"><xf numFmtId="0" fontId="0"/><xf numFmtId="0" fontId="0" applyBorder="1"/></cellXfs></styleSheet>"#;

    fn sheet(body: &str) -> SheetDocument {
        SheetDocument::parse(&format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C3"/><sheetData>{body}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#
        ))
        .unwrap()
    }

    fn cell<'a>(doc: &'a SheetDocument, address: &str) -> &'a XmlElement {
        doc.root()
            .child("sheetData")
            .unwrap()
            .children_named("row")
            .flat_map(|r| r.children_named("c"))
            .find(|c| c.attr("r") == Some(address))
            .unwrap()
    }

    fn strings(entries: &[&str]) -> SharedStringTable {
        SharedStringTable::from_entries(entries.iter().map(|s| Some(s.to_string())).collect())
    }

    #[test]
    fn test_shared_string_formula_is_converted() {
        let mut doc = sheet(
            r#"<row r="3"><c r="A3" t="s"><v>0</v></c><c r="B3" s="1" t="s"><v>1</v></c></row>"#,
        );
        let text = strings(&["Total", "=SUM(R[-2]C:R[-1]C)"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(&mut doc, &text, Some(&mut styles), 1, &ConversionConfig::default()).unwrap();

        assert_eq!(report.formulas_converted, 1);
        assert!(report.is_modified());
        let b3 = cell(&doc, "B3");
        assert_eq!(b3.attr("t"), None);
        assert_eq!(b3.attr("s"), Some("1"));
        assert!(b3.child("v").is_none());
        assert_eq!(b3.child("f").unwrap().text(), "SUM(B1:B2)");

        let a3 = cell(&doc, "A3");
        assert_eq!(a3.attr("t"), Some("s"));
        assert!(!styles.is_modified());
    }

    #[test]
    fn test_format_directive_registers_style() {
        let mut doc = sheet(r#"<row r="2"><c r="C2" s="1" t="s"><v>0</v></c><c r="D2" s="1" t="s"><v>1</v></c></row>"#);
        let text = strings(&["=R[-1]C*2@#,##0.00@", "=R[-1]C*3@#,##0.00@"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(&mut doc, &text, Some(&mut styles), 1, &ConversionConfig::default()).unwrap();

        assert_eq!(report.formats_applied, 2);
        assert_eq!(cell(&doc, "C2").child("f").unwrap().text(), "C1*2");
        assert_eq!(cell(&doc, "C2").attr("s"), Some("2"));
        assert_eq!(cell(&doc, "D2").attr("s"), Some("3"));
        assert_eq!(styles.cell_format_num_fmt(2), styles.cell_format_num_fmt(3));
        assert_eq!(styles.num_fmts().len(), 1);
    }

    #[test]
    fn test_inline_strings_used_without_shared_strings() {
        let mut doc = sheet(
            r#"<row r="5"><c r="E5" t="inlineStr"><is><t>=RC[-1]+1</t></is></c><c r="F5" t="s"><v>0</v></c></row>"#,
        );
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(
            &mut doc,
            &SharedStringTable::default(),
            Some(&mut styles),
            1,
            &ConversionConfig::default(),
        )
        .unwrap();

        assert_eq!(report.formulas_converted, 1);
        let e5 = cell(&doc, "E5");
        assert!(e5.child("is").is_none());
        assert_eq!(e5.child("f").unwrap().text(), "D5+1");
        assert_eq!(cell(&doc, "F5").attr("t"), Some("s"));
    }

    #[test]
    fn test_nan_values_are_zeroed() {
        let mut doc = sheet(
            r#"<row r="1"><c r="A1"><v>NaN</v></c><c r="B1" t="n"><v>NaN</v></c><c r="C1"><v>1.5</v></c></row><row r="2"><c r="A2" t="str"><v>NaN</v></c></row>"#,
        );
        let before = doc.to_xml().unwrap();
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(
            &mut doc,
            &SharedStringTable::default(),
            Some(&mut styles),
            1,
            &ConversionConfig::default(),
        )
        .unwrap();

        assert_eq!(report.nan_values_replaced, 2);
        assert_eq!(cell(&doc, "A1").child("v").unwrap().text(), "0");
        assert_eq!(cell(&doc, "B1").child("v").unwrap().text(), "0");
        assert_eq!(cell(&doc, "C1").child("v").unwrap().text(), "1.5");
        assert_eq!(cell(&doc, "A2").child("v").unwrap().text(), "NaN");
        assert_eq!(
            doc.to_xml().unwrap(),
            before
                .replacen("<v>NaN</v>", "<v>0</v>", 2)
        );
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let mut doc = sheet(r#"<row r="2"><c r="A2" t="s"><v>0</v></c></row>"#);
        let text = strings(&["=R[-1]C@0%@"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();
        let config = ConversionConfig::default();

        process(&mut doc, &text, Some(&mut styles), 1, &config).unwrap();
        let converted = doc.to_xml().unwrap();

        let mut styles = StyleSheet::parse(&styles.to_xml().unwrap()).unwrap();
        let report = process(&mut doc, &text, Some(&mut styles), 1, &config).unwrap();

        assert_eq!(report, SheetReport::default());
        assert!(!report.is_modified());
        assert!(!styles.is_modified());
        assert_eq!(doc.to_xml().unwrap(), converted);
    }

    #[test]
    fn test_malformed_reference_skips_cell() {
        let mut doc = sheet(r#"<row r="2"><c r="A2" t="s"><v>0</v></c><c r="B2" t="s"><v>1</v></c></row>"#);
        let text = strings(&["=R[oops]C", "=R[-1]C"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(&mut doc, &text, Some(&mut styles), 1, &ConversionConfig::default()).unwrap();

        assert_eq!(report.formulas_skipped, 1);
        assert_eq!(report.formulas_converted, 1);
        assert_eq!(cell(&doc, "A2").attr("t"), Some("s"));
        assert_eq!(cell(&doc, "B2").child("f").unwrap().text(), "B1");
    }

    #[test]
    fn test_bad_address_aborts() {
        let mut doc = sheet(r#"<row r="2"><c r="2A" t="s"><v>0</v></c></row>"#);
        let text = strings(&["=RC"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let err = process(&mut doc, &text, Some(&mut styles), 1, &ConversionConfig::default()).unwrap_err();
        assert!(!err.is_cell_local());
    }

    #[test]
    fn test_missing_cell_positions_are_inferred() {
        let mut doc = sheet(r#"<row r="4"><c t="s"><v>1</v></c><c t="s"><v>0</v></c></row>"#);
        let text = strings(&["=RC[-1]", "x"]);
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        process(&mut doc, &text, Some(&mut styles), 1, &ConversionConfig::default()).unwrap();

        let second = doc
            .root()
            .child("sheetData")
            .unwrap()
            .child("row")
            .unwrap()
            .children_named("c")
            .nth(1)
            .unwrap();
        assert_eq!(second.child("f").unwrap().text(), "A4");
    }

    #[test]
    fn test_print_view_patch() {
        let mut doc = sheet("");
        let config = ConversionConfig {
            print_view: true,
            landscape: true,
            fit_to_width: 1,
            fit_to_height: 2,
            ..Default::default()
        };
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(&mut doc, &SharedStringTable::default(), Some(&mut styles), 1, &config).unwrap();
        assert!(report.layout_changed);

        let names: Vec<&str> = doc.root().elements().map(|e| e.local_name()).collect();
        assert_eq!(
            names,
            vec!["sheetPr", "dimension", "sheetData", "pageMargins", "pageSetup"]
        );
        let setup = doc.root().child("pageSetup").unwrap();
        assert_eq!(setup.attr("orientation"), Some("landscape"));
        assert_eq!(setup.attr("fitToWidth"), Some("1"));
        assert_eq!(setup.attr("fitToHeight"), Some("2"));
        assert_eq!(
            doc.root()
                .child("sheetPr")
                .and_then(|p| p.child("pageSetUpPr"))
                .and_then(|p| p.attr("fitToPage")),
            Some("1")
        );

        let again = process(&mut doc, &SharedStringTable::default(), Some(&mut styles), 1, &config).unwrap();
        assert!(!again.layout_changed);
    }

    #[test]
    fn test_frozen_pane_patch() {
        let mut doc = sheet("");
        let config = ConversionConfig {
            fixed_area: vec![FixedArea { column: 0, row: 0 }, FixedArea { column: 2, row: 3 }],
            ..Default::default()
        };
        let mut styles = StyleSheet::parse(STYLES).unwrap();

        let report = process(&mut doc, &SharedStringTable::default(), Some(&mut styles), 2, &config).unwrap();
        assert!(report.layout_changed);

        let view = doc
            .root()
            .child("sheetViews")
            .and_then(|v| v.child("sheetView"))
            .unwrap();
        assert_eq!(view.attr("workbookViewId"), Some("0"));
        let pane = view.child("pane").unwrap();
        assert_eq!(pane.attr("xSplit"), Some("2"));
        assert_eq!(pane.attr("ySplit"), Some("3"));
        assert_eq!(pane.attr("topLeftCell"), Some("C4"));
        assert_eq!(pane.attr("activePane"), Some("bottomRight"));
        assert_eq!(pane.attr("state"), Some("frozen"));

        let names: Vec<&str> = doc.root().elements().map(|e| e.local_name()).collect();
        assert_eq!(names[..3], ["dimension", "sheetViews", "sheetData"]);

        let mut other = sheet("");
        let report = process(&mut other, &SharedStringTable::default(), Some(&mut styles), 3, &config).unwrap();
        assert!(!report.layout_changed);
        assert!(other.root().child("sheetViews").is_none());
    }

    #[test]
    fn test_pane_goes_before_selection() {
        let mut doc = SheetDocument::parse(
            r#"<worksheet><sheetViews><sheetView tabSelected="1" workbookViewId="0"><selection activeCell="A1"/></sheetView></sheetViews><sheetData/></worksheet>"#,
        )
        .unwrap();
        apply_frozen_pane(&mut doc, FixedArea { column: 1, row: 1 });

        let view = doc.root().child("sheetViews").unwrap().child("sheetView").unwrap();
        let names: Vec<&str> = view.elements().map(|e| e.local_name()).collect();
        assert_eq!(names, vec!["pane", "selection"]);
        assert_eq!(view.child("pane").unwrap().attr("topLeftCell"), Some("B2"));
    }

    #[test]
    fn test_formats_skipped_without_style_sheet() {
        let mut doc = sheet(
            r#"<row r="2"><c r="B2" t="s"><v>0</v></c><c r="C2" s="4" t="s"><v>0</v></c></row>"#,
        );
        let text = strings(&["=R[-1]C@0.0@"]);

        let report = process(&mut doc, &text, None, 1, &ConversionConfig::default()).unwrap();

        assert_eq!(report.formulas_converted, 2);
        assert_eq!(report.formats_applied, 0);
        let b2 = cell(&doc, "B2");
        assert_eq!(b2.attr("s"), None);
        assert_eq!(b2.child("f").unwrap().text(), "B1");
        assert_eq!(cell(&doc, "C2").attr("s"), Some("4"));
    }

    #[test]
    fn test_corrupt_row_number_does_not_overflow() {
        let mut doc = sheet(
            r#"<row r="4294967295"><c><v>NaN</v></c></row><row><c><v>NaN</v></c></row>"#,
        );

        let report = process(
            &mut doc,
            &SharedStringTable::default(),
            None,
            1,
            &ConversionConfig::default(),
        )
        .unwrap();

        assert_eq!(report.nan_values_replaced, 2);
    }
}
