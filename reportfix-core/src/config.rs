//! Configuration for a conversion run

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Apply the print-view patch (fit to page, orientation)
    pub print_view: bool,
    /// Landscape orientation instead of portrait
    pub landscape: bool,
    pub fit_to_width: u32,
    pub fit_to_height: u32,
    /// Frozen panes, by sheet ordinal (first entry applies to sheet1.xml)
    pub fixed_area: Vec<FixedArea>,
    /// Ask the application to recalculate on open when formulas were written
    pub force_recalculation: bool,
    /// Prefix for the working directory of a run
    pub task_id: String,
    /// Parent directory for expanded packages
    pub work_dir: PathBuf,
}

impl ConversionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ConversionConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Frozen-pane settings for a 1-based sheet ordinal
    pub fn fixed_area_for(&self, ordinal: usize) -> Option<FixedArea> {
        ordinal
            .checked_sub(1)
            .and_then(|index| self.fixed_area.get(index))
            .copied()
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            print_view: false,
            landscape: false,
            fit_to_width: 1,
            fit_to_height: 0,
            fixed_area: Vec::new(),
            force_recalculation: true,
            task_id: "0".to_string(),
            work_dir: PathBuf::from("temp"),
        }
    }
}

/// Number of frozen columns and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedArea {
    pub column: u32,
    pub row: u32,
}

impl FromStr for FixedArea {
    type Err = String;

    /// Parse `COLUMN,ROW`, e.g. `1,3`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (column, row) = s
            .split_once(',')
            .ok_or_else(|| format!("expected COLUMN,ROW but got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("'{}' is not a non-negative integer", v.trim()))
        };
        Ok(Self {
            column: parse(column)?,
            row: parse(row)?,
        })
    }
}
