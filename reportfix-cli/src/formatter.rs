//! Human-readable run summaries

use colored::*;
use reportfix_core::{Outcome, SheetReport};
use std::path::Path;

pub fn print_outcome(file_path: &Path, outcome: &Outcome) {
    let report = match outcome {
        Outcome::SourceMissing => {
            println!(
                "{} {}",
                "✗".red().bold(),
                format!("{}: file not found", file_path.display()).red()
            );
            return;
        }
        Outcome::Converted(report) => report,
    };

    println!("{}", format!("Converted: {}", file_path.display()).bold());
    for (name, sheet) in &report.sheets {
        print_sheet(name, sheet);
    }

    let summary = format!(
        "✓ {} formulas, {} NaN values, {} formats",
        report.formulas_converted(),
        report.nan_values_replaced(),
        report.formats_applied()
    );
    if report.formulas_skipped() > 0 {
        println!(
            "{} {}",
            summary.green().bold(),
            format!("({} skipped)", report.formulas_skipped()).yellow()
        );
    } else {
        println!("{}", summary.green().bold());
    }
}

fn print_sheet(name: &str, sheet: &SheetReport) {
    if !sheet.is_modified() && sheet.formulas_skipped == 0 {
        println!("  {} {}", name.cyan(), "unchanged".dimmed());
        return;
    }
    let mut line = format!(
        "  {} {} formulas",
        name.cyan(),
        sheet.formulas_converted
    );
    if sheet.formulas_skipped > 0 {
        line.push_str(&format!(", {}", format!("{} skipped", sheet.formulas_skipped).yellow()));
    }
    if sheet.nan_values_replaced > 0 {
        line.push_str(&format!(", {} NaN", sheet.nan_values_replaced));
    }
    if sheet.layout_changed {
        line.push_str(", layout");
    }
    println!("{line}");
}

pub fn print_error(file_path: &Path, err: &anyhow::Error) {
    eprintln!(
        "{} {}",
        "✗".red().bold(),
        format!("{}: {:#}", file_path.display(), err).red()
    );
}

#[cfg(feature = "fetch")]
pub fn print_downloaded(file_path: &Path) {
    println!(
        "{}",
        format!("✓ Report saved to {}", file_path.display()).green().bold()
    );
}
