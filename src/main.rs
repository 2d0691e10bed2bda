use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use floodmap_service::config::{PipelineConfig, load_config};
use floodmap_service::ingest::tabular::FileErrorPolicy;
use floodmap_service::logging::{self, LogLevel, Stage, init_logger};
use floodmap_service::model::IngestError;
use floodmap_service::pipeline::{run_all, run_overlay, run_tabular};
use floodmap_service::verify::{print_summary, verify_inputs};

const EXIT_FAILURE: u8 = 1;
const EXIT_NO_INPUT: u8 = 2;

/// Normalize flood incident spreadsheets and a KMZ overlay for map building.
#[derive(Parser)]
#[command(name = "floodmap", version, about)]
struct Cli {
    /// TOML config file (defaults to $FLOODMAP_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimum log level: debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Append log lines to this file as well as stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest spreadsheets and write the GeoJSON feature collection
    Ingest {
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip files that cannot be parsed instead of aborting
        #[arg(long)]
        skip_bad_files: bool,
    },
    /// Extract the ground overlay image and bounds from a KMZ archive
    Overlay {
        #[arg(long)]
        archive: Option<PathBuf>,
        #[arg(long)]
        image_output: Option<PathBuf>,
        #[arg(long)]
        manifest_output: Option<PathBuf>,
        /// Keep the unpacked archive in this directory
        #[arg(long)]
        retain_dir: Option<PathBuf>,
    },
    /// Run both stages
    Run,
    /// Check spreadsheets without writing anything
    Verify {
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::from_env()?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }

    init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    )
    .context("opening log file")?;

    match cli.command {
        Command::Ingest {
            input_dir,
            output,
            skip_bad_files,
        } => {
            let tabular = &mut config.tabular;
            if let Some(dir) = input_dir {
                tabular.input_dir = dir;
            }
            if let Some(out) = output {
                tabular.output = out;
            }
            if skip_bad_files {
                tabular.on_file_error = FileErrorPolicy::Skip;
            }
            Ok(ingest_exit_code(run_tabular(tabular).map(|_| ())))
        }
        Command::Overlay {
            archive,
            image_output,
            manifest_output,
            retain_dir,
        } => {
            let overlay = &mut config.overlay;
            if let Some(path) = archive {
                overlay.archive = path;
            }
            if let Some(path) = image_output {
                overlay.image_output = path;
            }
            if let Some(path) = manifest_output {
                overlay.manifest_output = path;
            }
            if retain_dir.is_some() {
                overlay.retain_dir = retain_dir;
            }
            match run_overlay(overlay) {
                Ok(asset) => {
                    println!("Image: {}", asset.image.display());
                    println!("Bounds: {:?}", asset.bounds.corners());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    logging::log_overlay_failure(&overlay.archive, "Overlay extraction", &e);
                    eprintln!("error: {}", e);
                    Ok(ExitCode::from(EXIT_FAILURE))
                }
            }
        }
        Command::Run => {
            let outcome = run_all(&config);
            if outcome.is_success() {
                return Ok(ExitCode::SUCCESS);
            }
            if let Err(e) = &outcome.overlay {
                eprintln!("error: {}", e);
                return Ok(ExitCode::from(EXIT_FAILURE));
            }
            Ok(ingest_exit_code(outcome.tabular.map(|_| ())))
        }
        Command::Verify { input_dir, json } => {
            let dir = input_dir.unwrap_or_else(|| config.tabular.input_dir.clone());
            let options = config.tabular.ingest_options();
            match verify_inputs(&dir, &options.headers, &options.extension) {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_summary(&report);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(ingest_exit_code(Err(e))),
            }
        }
    }
}

fn ingest_exit_code(result: Result<(), IngestError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ IngestError::NoInput { .. }) => {
            logging::warn(Stage::Tabular, None, &e.to_string());
            eprintln!("{}", e);
            ExitCode::from(EXIT_NO_INPUT)
        }
        Err(e) => {
            logging::log_ingest_failure(None, "Tabular ingest", &e);
            eprintln!("error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
