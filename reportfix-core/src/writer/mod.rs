//! Writer module for converting exported report packages in place

pub mod package;
pub mod sheet;
pub mod styles;

pub use package::{ExpandedPackage, WorksheetPart};
pub use sheet::{SheetDocument, SheetReport};
pub use styles::StyleSheet;

use crate::config::ConversionConfig;
use crate::reader::{SHARED_STRINGS_PART, STYLES_PART, SharedStringTable, WORKBOOK_PART, XmlDocument};
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::path::Path;

const WORKBOOK_ORDER: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Result of a conversion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Converted(WorkbookReport),
    /// The source package does not exist; nothing was written
    SourceMissing,
}

/// Per-sheet reports of one package, in sheet order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkbookReport {
    pub sheets: Vec<(String, SheetReport)>,
}

impl WorkbookReport {
    pub fn formulas_converted(&self) -> usize {
        self.sheets.iter().map(|(_, r)| r.formulas_converted).sum()
    }

    pub fn formulas_skipped(&self) -> usize {
        self.sheets.iter().map(|(_, r)| r.formulas_skipped).sum()
    }

    pub fn nan_values_replaced(&self) -> usize {
        self.sheets.iter().map(|(_, r)| r.nan_values_replaced).sum()
    }

    pub fn formats_applied(&self) -> usize {
        self.sheets.iter().map(|(_, r)| r.formats_applied).sum()
    }
}

/// Convert every worksheet of `input`.
///
/// The result is written to `output`, or over `input` when no output is given.
pub fn convert_workbook(
    input: &Path,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<Outcome> {
    if !input.exists() {
        error!("Source file {} not found", input.display());
        return Ok(Outcome::SourceMissing);
    }

    match input.extension().and_then(|s| s.to_str()) {
        Some("xlsx") | Some("xlsm") => {}
        _ => anyhow::bail!("Unsupported file format: {}", input.display()),
    }

    let package = ExpandedPackage::extract(input, &config.work_dir, &config.task_id)?;
    debug!(
        "Extracted {} into {}",
        input.display(),
        package.root().display()
    );

    let text_index = SharedStringTable::load(&package.part_path(SHARED_STRINGS_PART))?;
    if text_index.is_empty() {
        debug!("No shared strings, reading inline strings");
    }

    let mut report = WorkbookReport::default();
    for part in package.worksheets() {
        let sheet_report = convert_sheet(&package, &part, &text_index, config)
            .with_context(|| format!("Failed to convert {}", part.name))?;
        info!(
            "{}: {} formulas converted, {} skipped, {} NaN values replaced",
            part.name,
            sheet_report.formulas_converted,
            sheet_report.formulas_skipped,
            sheet_report.nan_values_replaced
        );
        report.sheets.push((part.name, sheet_report));
    }

    if report.formulas_converted() > 0 && config.force_recalculation {
        force_full_calculation(&package)?;
    }

    let dest = output.unwrap_or(input);
    package.repack(dest)?;
    info!(
        "Wrote {} ({} formulas in {} sheets)",
        dest.display(),
        report.formulas_converted(),
        report.sheets.len()
    );

    Ok(Outcome::Converted(report))
}

fn convert_sheet(
    package: &ExpandedPackage,
    part: &WorksheetPart,
    text_index: &SharedStringTable,
    config: &ConversionConfig,
) -> Result<SheetReport> {
    let styles_path = package.part_path(STYLES_PART);
    let mut styles = if package.has_part(STYLES_PART) {
        Some(StyleSheet::load(&styles_path)?)
    } else {
        None
    };

    let sheet_path = package.part_path(&part.name);
    let mut sheet = SheetDocument::load(&sheet_path)?;
    let report = sheet::process(
        &mut sheet,
        text_index,
        styles.as_mut(),
        part.ordinal,
        config,
    )?;

    if let Some(styles) = &styles
        && styles.is_modified()
    {
        styles.save(&styles_path)?;
    }
    if report.is_modified() {
        sheet.save(&sheet_path)?;
    }

    Ok(report)
}

/// Make the application recalculate every formula when the workbook opens
fn force_full_calculation(package: &ExpandedPackage) -> Result<()> {
    if !package.has_part(WORKBOOK_PART) {
        return Ok(());
    }
    let path = package.part_path(WORKBOOK_PART);
    let mut workbook = XmlDocument::read(&path)?;
    let calc = workbook.root.ensure_child("calcPr", WORKBOOK_ORDER);
    if calc.set_attr("fullCalcOnLoad", "1") {
        workbook.write(&path)?;
    }
    Ok(())
}
