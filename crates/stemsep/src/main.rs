//! stemsep - command line stem separation
//!
//! ```text
//! stemsep [--config <yaml>] [--model <onnx>] [--cpu] <input_file> <output_dir> <stems_json>
//! ```
//!
//! Progress lines are printed to stdout with a `[stemsep]` prefix. The last
//! stdout line is always the JSON result; logs go to stderr (`RUST_LOG`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;

use stemsep::config::{default_config_path, load_config};
use stemsep::separation::{run_separation, ProgressCallback, SeparationProgress};

const PREFIX: &str = "[stemsep]";
const USAGE: &str = "Usage: stemsep <input_file> <output_dir> <stems_json>";

#[derive(Parser, Debug)]
#[command(name = "stemsep", version, about = "Split an audio file into stems")]
struct Cli {
    /// Audio file to separate (any format Symphonia can decode)
    input_file: PathBuf,

    /// Directory the stem WAV files are written to (created if missing)
    output_dir: PathBuf,

    /// JSON array of stem names, e.g. '["vocals", "instrumental"]'
    stems_json: String,

    /// YAML config file (default: <config dir>/stemsep/config.yaml)
    #[arg(long, value_name = "YAML")]
    config: Option<PathBuf>,

    /// Use this ONNX model file instead of the cached download
    #[arg(long, value_name = "ONNX")]
    model: Option<PathBuf>,

    /// Never use the GPU
    #[arg(long)]
    cpu: bool,
}

fn exit_with_usage(detail: impl std::fmt::Display) -> ! {
    eprintln!("{}", detail);
    println!("{}", USAGE);
    std::process::exit(1);
}

fn main() {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            // Nothing useful to do if stdout is gone
            let _ = e.print();
            return;
        }
        Err(e) => exit_with_usage(e),
    };

    let stems: Vec<String> = match serde_json::from_str(&cli.stems_json) {
        Ok(stems) => stems,
        Err(e) => exit_with_usage(format!(
            "stems_json must be a JSON array of strings: {}",
            e
        )),
    };

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path).separation;
    if let Some(model) = cli.model {
        config.model_path = Some(model);
    }
    if cli.cpu {
        config.use_gpu = false;
    }

    println!("{} Starting audio separation", PREFIX);
    println!("{} Input: {}", PREFIX, cli.input_file.display());
    println!("{} Output: {}", PREFIX, cli.output_dir.display());
    println!("{} Stems: {:?}", PREFIX, stems);

    let progress: ProgressCallback =
        Arc::new(|p: SeparationProgress| println!("{} {}", PREFIX, p.message));

    let report = run_separation(
        config,
        &cli.input_file,
        &cli.output_dir,
        &stems,
        Some(progress),
    );

    log::info!(
        "Separation finished: {}",
        if report.is_success() { "success" } else { "error" }
    );
    println!("{}", report.to_json_line());
}
