use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use rayon::prelude::*;
use reportfix_core::{ConversionConfig, Converter, FixedArea, Outcome};
use std::path::{Path, PathBuf};

mod formatter;

#[derive(Parser)]
#[command(name = "reportfix")]
#[command(about = "Turns R1C1 formula text in exported reports into live XLSX formulas", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert one or more workbooks in place
    Convert {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Write the result here instead of overwriting the input (single file only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ConvertOptions,
    },
    /// Download a report from the report server
    #[cfg(feature = "fetch")]
    Fetch {
        /// Report server URL, e.g. http://host/ReportServer
        #[arg(long)]
        server: String,

        /// Report path on the server, e.g. /Sales/Daily
        #[arg(long)]
        report: String,

        /// Report parameter as KEY=VALUE (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Rendering format requested from the server
        #[arg(long, default_value = "EXCEL")]
        format: String,

        #[arg(long, requires = "password")]
        user: Option<String>,

        #[arg(long, requires = "user")]
        password: Option<String>,

        /// Where to save the report
        #[arg(short, long)]
        output: PathBuf,

        /// Convert the downloaded workbook in place
        #[arg(long)]
        convert: bool,

        #[command(flatten)]
        options: ConvertOptions,
    },
}

#[derive(Args)]
struct ConvertOptions {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Fit each sheet to the printed page
    #[arg(long)]
    print_view: bool,

    /// Landscape page orientation
    #[arg(long)]
    landscape: bool,

    /// Pages wide when fitting to page
    #[arg(long, value_name = "PAGES")]
    fit_width: Option<u32>,

    /// Pages tall when fitting to page (0 = automatic)
    #[arg(long, value_name = "PAGES")]
    fit_height: Option<u32>,

    /// Frozen columns and rows per sheet, in sheet order (repeatable)
    #[arg(long, value_name = "COL,ROW")]
    freeze: Vec<FixedArea>,

    /// Prefix of the working directory
    #[arg(long)]
    task_id: Option<String>,

    /// Parent directory for working directories
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

impl ConvertOptions {
    /// Load the config file and apply command-line overrides
    fn resolve(&self) -> Result<ConversionConfig> {
        let mut config = if let Some(config_path) = &self.config {
            ConversionConfig::from_file(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        } else {
            // Try to load default config from current directory if it exists
            let default_config_path = PathBuf::from("reportfix.toml");
            if default_config_path.exists() {
                ConversionConfig::from_file(&default_config_path).with_context(|| {
                    format!(
                        "Failed to load config from {}",
                        default_config_path.display()
                    )
                })?
            } else {
                ConversionConfig::default()
            }
        };

        config.print_view |= self.print_view;
        config.landscape |= self.landscape;
        if let Some(width) = self.fit_width {
            config.fit_to_width = width;
        }
        if let Some(height) = self.fit_height {
            config.fit_to_height = height;
        }
        if !self.freeze.is_empty() {
            config.fixed_area = self.freeze.clone();
        }
        if let Some(task_id) = &self.task_id {
            config.task_id = task_id.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        debug!("Resolved configuration: {config:?}");
        Ok(config)
    }
}

#[cfg(feature = "fetch")]
fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE but got '{s}'"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let failed = match cli.command {
        Command::Convert {
            files,
            output,
            options,
        } => {
            if output.is_some() && files.len() > 1 {
                anyhow::bail!("--output can only be used with a single input file");
            }
            let converter = Converter::with_config(options.resolve()?);
            run_conversions(&converter, &files, output.as_deref())
        }
        #[cfg(feature = "fetch")]
        Command::Fetch {
            server,
            report,
            params,
            format,
            user,
            password,
            output,
            convert,
            options,
        } => {
            let mut request = reportfix_core::report::ReportRequest::new(server, report)
                .with_format(format);
            for (key, value) in params {
                request = request.with_param(key, value);
            }
            if let (Some(user), Some(password)) = (user, password) {
                request = request.with_auth(user, password);
            }

            request
                .download(&output)
                .with_context(|| format!("Failed to fetch report {}", request.report_path))?;
            formatter::print_downloaded(&output);

            if convert {
                let converter = Converter::with_config(options.resolve()?);
                run_conversions(&converter, std::slice::from_ref(&output), None)
            } else {
                0
            }
        }
    };

    std::process::exit(if failed == 0 { 0 } else { 1 });
}

/// Convert every file, returning how many failed
fn run_conversions(converter: &Converter, files: &[PathBuf], output: Option<&Path>) -> usize {
    let results: Vec<(&PathBuf, Result<Outcome>)> = files
        .par_iter()
        .map(|file| {
            info!("Converting {}", file.display());
            let result = match output {
                Some(output) => converter.convert_to(file, output),
                None => converter.convert_file(file),
            };
            (file, result)
        })
        .collect();

    let mut failed = 0;
    for (file, result) in &results {
        match result {
            Ok(outcome) => {
                if matches!(outcome, Outcome::SourceMissing) {
                    failed += 1;
                }
                formatter::print_outcome(file, outcome);
            }
            Err(err) => {
                failed += 1;
                formatter::print_error(file, err);
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "reportfix",
            "-v",
            "convert",
            "report.xlsx",
            "--landscape",
            "--fit-height",
            "2",
            "--freeze",
            "1,2",
            "--freeze",
            "0,3",
            "--task-id",
            "9",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);

        let Command::Convert { files, options, .. } = cli.command else {
            panic!("expected the convert command");
        };
        assert_eq!(files, vec![PathBuf::from("report.xlsx")]);

        let config = options.resolve().unwrap();
        assert!(config.landscape);
        assert!(!config.print_view);
        assert_eq!(config.fit_to_width, 1);
        assert_eq!(config.fit_to_height, 2);
        assert_eq!(config.task_id, "9");
        assert_eq!(config.fixed_area_for(2), Some(FixedArea { column: 0, row: 3 }));
    }

    #[test]
    fn test_bad_freeze_is_rejected() {
        assert!(Cli::try_parse_from(["reportfix", "convert", "a.xlsx", "--freeze", "1"]).is_err());
    }
}
