//! json-to-openmetrics: Transcode JSON exports into OpenMetrics text
//!
//! Usage:
//!   # Transcode two exports, remembering what was emitted in positions.yaml
//!   json-to-openmetrics --out metrics.om vulns_weekly20240102T030405Z-a.json hosts_20240102T030405Z-b.json
//!
//!   # Fold value keys into a label when host/region are the only labels
//!   json-to-openmetrics -o metrics.om --common-label host --common-label region data/*.json
//!
//!   # Accept several time layouts, echo lines to stdout
//!   json-to-openmetrics -o metrics.om --time-format %Y-%m-%d --time-format "%Y-%m-%d %H:%M:%S" --debug in.json
//!
//! Settings are read from json_to_openmetrics.yaml in . or ../conf (or --config),
//! and flags override the file.

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use jsonmetrics::{transcode_files, FilenamePolicy, TranscodeConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "json-to-openmetrics")]
#[command(about = "Transcode JSON exports into OpenMetrics text, skipping records already emitted", long_about = None)]
struct Args {
    /// Input files, processed in order
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// File to write metrics to
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,

    /// YAML config file (default: json_to_openmetrics.yaml in . or ../conf)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Watermark store (default: positions.yaml)
    #[arg(long)]
    positions_file: Option<PathBuf>,

    /// Record field to get the time from (default: time)
    #[arg(long)]
    time_field: Option<String>,

    /// strftime layout for the time field; repeat to try several in order
    #[arg(long = "time-format")]
    time_formats: Vec<String>,

    /// Label set from the value key when a record has no labels (default: table)
    #[arg(long)]
    default_label: Option<String>,

    /// Label name whose presence alone lets value keys fold into a label; repeatable
    #[arg(long = "common-label")]
    common_labels: Vec<String>,

    /// Skip inputs whose names lack a stream prefix or timestamp instead of aborting
    #[arg(long)]
    skip_bad_filenames: bool,

    /// More logging, and echo every metric line to stdout
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(self, config: &mut TranscodeConfig) -> Vec<PathBuf> {
        if let Some(out) = self.out {
            config.out = Some(out);
        }
        if let Some(path) = self.positions_file {
            config.positions_file = path;
        }
        if let Some(field) = self.time_field {
            config.time_field = field;
        }
        if !self.time_formats.is_empty() {
            config.time_formats = self.time_formats;
        }
        if let Some(label) = self.default_label {
            config.default_label = label;
        }
        config.common_label_names.extend(self.common_labels);
        if self.skip_bad_filenames {
            config.filename_policy = FilenamePolicy::Skip;
        }
        config.debug |= self.debug;
        self.inputs
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "trace" } else { "info" };
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_module_path(false)
        .format_target(debug)
        .init();
}

fn main() -> Result<()> {
    let run_start = Utc::now();
    let args = Args::parse();

    let (mut config, config_file) =
        TranscodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let inputs = args.apply(&mut config);
    init_logging(config.debug);

    match &config_file {
        Some(path) => log::debug!("using config file {}", path.display()),
        None => log::debug!("no config file found, using defaults and flags"),
    }

    if inputs.is_empty() {
        log::warn!("no input files given");
    }

    let summary = transcode_files(&config, &inputs, run_start).context("Transcoding failed")?;

    for (path, err) in &summary.skipped {
        log::error!("skipped {}: {err}", path.display());
    }
    log::info!(
        "wrote {} metric lines from {} files ({} records already emitted)",
        summary.lines(),
        summary.files.len(),
        summary.filtered()
    );

    Ok(())
}
