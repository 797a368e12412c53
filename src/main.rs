//! ifplot - plot interface utilization rate samples.
//!
//! Reads min/avg/max octet samples from a CSV file, optionally restricts
//! them to the links listed in a YAML interface file, keeps the busiest
//! inbound and outbound sample per group and draws one chart per device
//! interface.

mod interfaces;
mod logging;
mod merge;
mod plot;
mod samples;

use anyhow::{Context, Result};
use clap::Parser;
use plot::RateSelection;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Plot link utilization data per device interface
#[derive(Parser, Debug)]
#[command(name = "ifplot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The CSV file containing the data to plot
    datafile: PathBuf,

    /// YAML file of interfaces to plot
    #[arg(short, long)]
    interfaces: Option<PathBuf>,

    /// Plot average rate data
    #[arg(long)]
    avg: bool,

    /// Plot minimum rate data
    #[arg(long)]
    min: bool,

    /// Plot maximum rate data
    #[arg(long)]
    max: bool,

    /// Output directory for generated charts
    #[arg(short, long, default_value = "plots")]
    output_dir: PathBuf,

    /// Render all charts without pausing between them
    #[arg(long)]
    no_wait: bool,
}

impl Args {
    /// Rate types to draw; none requested means all of them.
    fn rate_selection(&self) -> RateSelection {
        RateSelection {
            min: self.min,
            avg: self.avg,
            max: self.max,
        }
        .normalized()
    }

    fn wait_between_charts(&self) -> bool {
        !self.no_wait && std::io::stdin().is_terminal()
    }
}

fn run(args: &Args) -> Result<Vec<PathBuf>> {
    let table = samples::load_or_empty(&args.datafile)?;
    if table.is_empty() {
        tracing::info!("No samples in {}", args.datafile.display());
    } else {
        tracing::debug!("{} samples read, columns {:?}", table.len(), table.columns());
    }

    let filter = interfaces::resolve_filter(args.interfaces.as_deref())?;
    let table = match filter {
        Some(filter) => {
            if filter.is_empty() {
                tracing::warn!("Interface file lists no interfaces; all samples are dropped");
            }
            tracing::debug!("Filtering on {} interfaces", filter.len());
            filter.apply(table)
        }
        None => table,
    };

    let merged = merge::reduce_and_merge(&table)
        .with_context(|| format!("Failed to process {}", args.datafile.display()))?;

    plot::generate_plots(
        &merged,
        args.rate_selection(),
        &args.output_dir,
        args.wait_between_charts(),
    )
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let generated = run(&args)?;
    if !generated.is_empty() {
        tracing::info!(
            "Generated {} charts in {}",
            generated.len(),
            args.output_dir.display()
        );
    }
    Ok(())
}
