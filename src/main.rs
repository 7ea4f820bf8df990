//! PolyOffload Command Line Interface
//!
//! Usage:
//!   polyoffload [OPTIONS] <input-file>
//!   polyoffload --help
//!
//! Examples:
//!   polyoffload app.json                              # Emit the full plan
//!   polyoffload --emit=chain app.json                 # Just the call chain
//!   polyoffload --codegen-max-nesting=2,1 app.json    # Per-region loop depths
//!   polyoffload --emit=request --block-size=16,16 app.json

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use polyoffload::ir::DeviceClass;
use polyoffload::runtime::Target;
use polyoffload::OffloadConfig;
use std::fs;
use std::path::PathBuf;

/// PolyOffload - Heterogeneous Offload Planning
#[derive(Parser, Debug)]
#[command(name = "polyoffload")]
#[command(author = "PolyOffload Contributors")]
#[command(version)]
#[command(about = "Region detection and offload planning for heterogeneous targets", long_about = None)]
struct Cli {
    /// Module and analysis facts (JSON)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Maximum code generation loop depth per region (comma-separated, 1-3)
    #[arg(long, value_delimiter = ',', num_args = 1.., value_parser = clap::value_parser!(u8).range(1..=3))]
    codegen_max_nesting: Option<Vec<u8>>,

    /// Device selection
    #[arg(short, long, default_value = "auto")]
    target: TargetArg,

    /// Local work-group sizes (two values, 0 = device default)
    #[arg(long, value_delimiter = ',', num_args = 2)]
    block_size: Option<Vec<u32>>,

    /// Element count above which a call counts as big data
    #[arg(long, value_name = "ELEMENTS")]
    big_data_threshold: Option<i64>,

    /// Skip functions whose name contains this
    #[arg(long, value_name = "PATTERN")]
    skip: Option<String>,

    /// What to emit
    #[arg(long, default_value = "plan")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    /// Decide per call at runtime
    Auto,
    /// Host CPU only
    Leg,
    /// Multi-core CPU
    Mcpu,
    /// GPU
    Gpu,
    /// Many-core coprocessor
    Mic,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Auto => Target::Auto,
            TargetArg::Leg => Target::Fixed(DeviceClass::Legacy),
            TargetArg::Mcpu => Target::Fixed(DeviceClass::MultiCore),
            TargetArg::Gpu => Target::Fixed(DeviceClass::Gpu),
            TargetArg::Mic => Target::Fixed(DeviceClass::ManyCore),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Region summaries
    Summary,
    /// Call chain of the parent function
    Chain,
    /// Code generation request
    Request,
    /// Everything, including write-back points
    Plan,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("PolyOffload v{}", polyoffload::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let input = polyoffload::load_input(&source)?;

    let config = build_config(&cli)?;
    debug!("Offload config: {:?}", config);

    info!("Planning...");
    let plan = match polyoffload::plan_module(&input.module, &input.facts, &config) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Planning failed: {:#}", e);
            return Err(e);
        }
    };

    let output = match cli.emit {
        EmitKind::Summary => serde_json::to_string_pretty(&plan.summaries)?,
        EmitKind::Chain => serde_json::to_string_pretty(&plan.chain)?,
        EmitKind::Request => serde_json::to_string_pretty(&plan.codegen_request(&config))?,
        EmitKind::Plan => serde_json::to_string_pretty(&serde_json::json!({
            "plan": &plan,
            "request": plan.codegen_request(&config),
            "write_back_points": plan.write_back_points(),
            "target": config.target.to_string(),
        }))?,
    };
    write_output(&cli.output, &output)
}

fn build_config(cli: &Cli) -> Result<OffloadConfig> {
    let mut config = OffloadConfig::default().with_target(cli.target.into());

    if let Some(ref depths) = cli.codegen_max_nesting {
        config.codegen_depth_overrides = depths.iter().map(|d| *d as usize).collect();
    }
    if let Some(ref sizes) = cli.block_size {
        let [x, y] = sizes.as_slice() else {
            bail!("--block-size takes exactly two values");
        };
        config.block_size = [*x, *y];
    }
    if let Some(threshold) = cli.big_data_threshold {
        config.big_data_threshold = threshold;
    }
    if let Some(ref pattern) = cli.skip {
        config.skip_functions_containing = pattern.clone();
    }

    Ok(config)
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
