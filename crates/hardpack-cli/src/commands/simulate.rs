use crate::cli::SimulateArgs;
use crate::config::PartialSimulationConfig;
use crate::error::{CliError, Result};
use crate::ui::CliProgressHandler;
use hardpack::engine::progress::{Progress, ProgressReporter};
use hardpack::engine::samplers::pair_correlation::PairCorrelationRow;
use hardpack::workflows;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: SimulateArgs, ui_sender: mpsc::Sender<Progress>) -> Result<()> {
    let partial_config = PartialSimulationConfig::load(args.system.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_simulate(&args)?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Simulating {} particles at packing density {}...",
        config.system.num_particles, config.system.packing_density
    );
    info!("Invoking the core simulation workflow...");

    let result = tokio::task::block_in_place(|| workflows::simulate::run(&config, &reporter))?;

    println!(
        "Ran {} iterations; {} of {} trial moves accepted ({:.1}%).",
        result.summary.iterations,
        result.move_stats.accepted,
        result.move_stats.attempted,
        100.0 * result.move_stats.acceptance_ratio()
    );

    let output_path = config
        .measurement
        .as_ref()
        .and_then(|m| m.pair_correlation.output_path.as_ref());
    if result.pair_correlation.is_empty() {
        if config.measurement.as_ref().is_some_and(|m| m.sample_interval > 0) {
            warn!("Run ended before any pair correlation sample was taken.");
            println!("Warning: no pair correlation samples were taken.");
        }
    } else if let Some(path) = output_path {
        println!(
            "✓ g(r) from {} samples written to: {}",
            result.samples,
            path.display()
        );
    } else {
        print_table(&result.pair_correlation)?;
    }

    if result.summary.is_success() {
        Ok(())
    } else {
        Err(CliError::RunFailed(format!(
            "a task signalled an error after {} iterations",
            result.summary.iterations
        )))
    }
}

fn print_table(rows: &[PairCorrelationRow]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        writeln!(out, "{:e}, {:e}", row.r, row.g)?;
    }
    out.flush()?;
    Ok(())
}
