//! czitool CLI - convert CZI containers into per-channel 3D TIFF volumes

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use czitool::{BatchReport, ConversionDriver, ConvertOptions, CziError, ValueScaling};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "czitool",
    version,
    about = "Convert CZI microscopy containers into 3D TIFF volumes",
    long_about = "Reads each CZI file and writes one 32-bit float TIFF stack per scene and channel,\n\
                  named {channel}_{scene+1:03}.tif, into a directory named after the input file.\n\
                  Failures are reported per file; the remaining files are still converted.",
    after_help = "EXAMPLES:\n  \
                  czitool sample.czi\n  \
                  czitool --scaling unit-range --output-root ./volumes *.czi\n  \
                  czitool --jobs 4 --report report.json plate/*.czi"
)]
struct Cli {
    /// CZI files to convert
    files: Vec<PathBuf>,

    /// Pixel value mapping: raw or unit-range
    #[arg(long, default_value_t = ValueScaling::Raw, value_parser = parse_scaling)]
    scaling: ValueScaling,

    /// Write output directories under this directory instead of next to each input
    #[arg(long, value_name = "DIR")]
    output_root: Option<PathBuf>,

    /// Number of files converted concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Write a JSON report of every file's outcome
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Do not write the metadata dump into the output directory
    #[arg(long)]
    no_metadata_log: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_scaling(value: &str) -> Result<ValueScaling, String> {
    value.parse().map_err(|e: CziError| e.to_string())
}

impl Cli {
    fn options(&self) -> ConvertOptions {
        let mut options = ConvertOptions::new()
            .with_value_scaling(self.scaling)
            .with_metadata_log(!self.no_metadata_log);
        if let Some(root) = &self.output_root {
            options = options.with_output_root(root);
        }
        options
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.files.is_empty() {
        Cli::command().print_long_help()?;
        return Ok(ExitCode::from(1));
    }

    init_logging(cli.verbose)?;

    let driver = ConversionDriver::native(cli.options());
    let report: BatchReport = if cli.jobs > 1 {
        Arc::new(driver)
            .convert_batch_parallel(cli.files.clone(), cli.jobs)
            .await
    } else {
        driver.convert_batch(&cli.files)
    };

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    Ok(ExitCode::SUCCESS)
}
