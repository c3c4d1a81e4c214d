//! rescan: run a scanned image through the filter chain from the command line.
//!
//! Loads an image, builds a rotation -> keystone chain from flags or a
//! JSON config, selects a stage and writes that stage's output. Every
//! recompute prints a diagnostics report showing which stages ran.
//! Useful for:
//!
//! - Straightening and de-keystoning a scan without a GUI
//! - Checking which stages a navigation sequence recomputes (`--walk`)
//! - Comparing `always` and `dirty` recompute modes
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin rescan -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use rescan_chain::{
    ChainConfig, Corner, FilterChain, FilterParams, KeystoneParams, RecomputeDiagnostics,
    RecomputeMode, RotationParams,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Correct a scanned page through a lazily recomputed filter chain.
///
/// Stage 0 is the unmodified scan, stage 1 the rotation, stage 2 the
/// keystone correction.
#[derive(Parser)]
#[command(name = "rescan", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Write the selected stage's output to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stage to select after loading (default: the last stage).
    #[arg(long, allow_negative_numbers = true)]
    stage: Option<isize>,

    /// Clockwise rotation in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotate: f32,

    /// Keystone corners as fractions of width/height:
    /// "x,y;x,y;x,y;x,y" for top-left, top-right, bottom-right, bottom-left.
    #[arg(long, value_name = "CORNERS")]
    keystone: Option<String>,

    /// Recompute mode for forward and repeated navigation.
    #[arg(long, value_enum, default_value_t = Mode::Always)]
    recompute: Mode,

    /// Comma-separated stage indices to select in order before the
    /// final `--stage`, printing the recompute report for each.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    walk: Vec<isize>,

    /// Output diagnostics as JSON instead of human-readable reports.
    #[arg(long)]
    json: bool,

    /// Full chain config as a JSON string.
    ///
    /// When provided, `--rotate`, `--keystone` and `--recompute` are
    /// ignored. The JSON must be a valid `ChainConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG`
    /// overrides this.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Recompute mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Re-run every stage in the planned range.
    Always,
    /// Skip stages whose cache is still valid.
    Dirty,
}

/// Parse `"x,y;x,y;x,y;x,y"` into keystone corners.
fn parse_corners(spec: &str) -> Result<[Corner; 4], String> {
    let corners = spec
        .split(';')
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("corner must be 'x,y', got: '{pair}'"))?;
            let x: f32 = x
                .trim()
                .parse()
                .map_err(|e| format!("invalid corner x '{x}': {e}"))?;
            let y: f32 = y
                .trim()
                .parse()
                .map_err(|e| format!("invalid corner y '{y}': {e}"))?;
            Ok(Corner::new(x, y))
        })
        .collect::<Result<Vec<_>, String>>()?;
    let count = corners.len();
    corners
        .try_into()
        .map_err(|_| format!("expected 4 corners, got {count}"))
}

/// Build a [`ChainConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual filter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<ChainConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let keystone = match cli.keystone {
        Some(ref spec) => KeystoneParams {
            corners: parse_corners(spec).map_err(|e| format!("--keystone: {e}"))?,
        },
        None => KeystoneParams::default(),
    };

    Ok(ChainConfig {
        stages: vec![
            FilterParams::Rotation(RotationParams {
                degrees: cli.rotate,
            }),
            FilterParams::Keystone(keystone),
        ],
        recompute: match cli.recompute {
            Mode::Always => RecomputeMode::Always,
            Mode::Dirty => RecomputeMode::Dirty,
        },
    })
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Print the diagnostics of the last recompute.
fn print_diagnostics(diagnostics: Option<&RecomputeDiagnostics>, json: bool) -> Result<(), String> {
    let Some(diagnostics) = diagnostics else {
        return Ok(());
    };
    if json {
        let out = serde_json::to_string_pretty(diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{out}");
    } else {
        println!("{}\n", diagnostics.report());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;

    let source = image::open(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?
        .to_rgba8();
    info!(
        path = %cli.image_path.display(),
        width = source.width(),
        height = source.height(),
        "loaded image"
    );

    let mut chain = FilterChain::from_config(&config).map_err(|e| e.to_string())?;
    info!(stages = ?chain.stage_names(), mode = ?chain.mode(), "chain ready");

    chain.set_source(source).map_err(|e| e.to_string())?;

    for &index in &cli.walk {
        chain.select_stage(index).map_err(|e| e.to_string())?;
        print_diagnostics(chain.last_recompute(), cli.json)?;
    }

    let last = isize::try_from(chain.len() - 1).unwrap_or(isize::MAX);
    let stage = cli.stage.unwrap_or(last);
    chain.select_stage(stage).map_err(|e| e.to_string())?;
    print_diagnostics(chain.last_recompute(), cli.json)?;

    let active = chain.active_index();
    let name = usize::try_from(active)
        .ok()
        .and_then(|i| chain.stage_name(i))
        .unwrap_or("none");
    info!(stage = active, name, "selected stage");

    if let Some(ref path) = cli.output {
        let image = chain
            .active_output()
            .ok_or_else(|| format!("stage {active} has no output to write"))?;
        image
            .save(path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        info!(path = %path.display(), "output written");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}
