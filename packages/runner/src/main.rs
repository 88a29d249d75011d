#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the AIP conversion runner.

use std::path::PathBuf;

use aip_airac::Airac;
use aip_cli_utils::IndicatifProgress;
use aip_runner::{RunOptions, Runner, paths, regions};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "aip_runner",
    about = "Convert AIP source documents of a region",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered regions, scopes and sections
    Regions,
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    /// Region code (e.g. "DEMO")
    #[arg(long)]
    region: Option<String>,
    /// Scope within the region
    #[arg(long, default_value = "AIP")]
    scope: String,
    /// Only run this section and its prerequisites
    #[arg(long)]
    section: Option<String>,
    /// Any date within the AIRAC cycle to convert (YYYY-MM-DD), default today
    #[arg(long)]
    airac: Option<Airac>,
    /// Storage root for config and download caches
    #[arg(long, env = "AIP_STORAGE")]
    storage: Option<PathBuf>,
    /// Directory of region resources
    #[arg(long, env = "AIP_REGIONS")]
    regions: Option<PathBuf>,
    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,
    /// Do not persist downloaded documents
    #[arg(long)]
    clean: bool,
    /// Write the document even if it fails validation
    #[arg(long)]
    force: bool,
    /// Continue with the next section when one fails
    #[arg(long)]
    keep_going: bool,
    /// Write outputs even if no feature was produced
    #[arg(long)]
    write_empty: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = aip_cli_utils::init_logger();
    let cli = Cli::parse();
    let registry = regions::builtin();

    if let Some(Commands::Regions) = cli.command {
        println!("{:<10} {:<8} SECTIONS", "REGION", "SCOPE");
        println!("{}", "-".repeat(50));
        for (region, scope) in registry.keys() {
            let graph = registry.dependency_graph(region, scope)?;
            println!("{region:<10} {scope:<8} {}", graph.tsort()?.join(", "));
        }
        return Ok(());
    }

    let args = cli.run;
    let Some(region) = args.region else {
        return Err("--region is required (see `aip_runner regions`)".into());
    };
    let airac = match args.airac {
        Some(airac) => airac,
        None => Airac::today()?,
    };

    let mut options = RunOptions::new(&region, &args.scope, airac);
    options.section = args.section;
    options.storage = args.storage.unwrap_or_else(paths::default_storage_dir);
    options.regions = args.regions.unwrap_or_else(paths::default_regions_dir);
    options.output = args.output.unwrap_or_else(paths::default_output_dir);
    options.clean = args.clean;
    options.force = args.force;
    options.keep_going = args.keep_going;
    options.write_empty = args.write_empty;

    log::info!("Converting {region}/{} for AIRAC {} ({airac})", args.scope, airac.id());

    let progress = IndicatifProgress::sections_bar(&multi, "Sections");
    let mut runner = Runner::new(&registry, options).with_progress(progress);

    match runner.run().await {
        Ok(report) => {
            if let Some(output) = &report.output {
                println!("{}", output.display());
            }
            if !report.failed.is_empty() {
                log::warn!("Failed sections: {}", report.failed.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            log::error!("{e} ({} warnings before failure)", runner.warnings());
            Err(e.into())
        }
    }
}
