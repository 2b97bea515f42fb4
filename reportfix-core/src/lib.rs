//! reportfix: turns R1C1 formula shorthand in exported reports into live formulas
//!
//! Reporting servers export formulas as plain text such as `=SUM(R[-3]C:R[-1]C)`.
//! This library rewrites those cells of an XLSX package into real A1 formulas,
//! registers the display formats they carry, and optionally applies print and
//! frozen-pane settings.

pub mod config;
pub mod error;
pub mod formula;
pub mod reader;
#[cfg(feature = "fetch")]
pub mod report;
pub mod writer;

use anyhow::Result;
use std::path::Path;

pub use config::{ConversionConfig, FixedArea};
pub use error::{ConvertError, ConvertResult};
pub use formula::{extract_format, translate};
pub use writer::{Outcome, SheetReport, WorkbookReport};

/// Main conversion interface
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: ConversionConfig,
}

impl Converter {
    /// Create a converter with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConversionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert `path` in place
    pub fn convert_file<P: AsRef<Path>>(&self, path: P) -> Result<Outcome> {
        writer::convert_workbook(path.as_ref(), None, &self.config)
    }

    /// Convert `input` and write the result to `output`
    pub fn convert_to<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<Outcome> {
        writer::convert_workbook(input.as_ref(), Some(output.as_ref()), &self.config)
    }
}
