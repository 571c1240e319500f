use crate::cli::CheckArgs;
use crate::config::PartialSimulationConfig;
use crate::error::{CliError, Result};
use crate::ui::CliProgressHandler;
use hardpack::engine::progress::{Progress, ProgressReporter};
use hardpack::workflows;
use tokio::sync::mpsc;
use tracing::info;

fn verdict(passed: bool) -> &'static str {
    if passed { "passed" } else { "FAILED" }
}

pub async fn run(args: CheckArgs, ui_sender: mpsc::Sender<Progress>) -> Result<()> {
    let partial_config = PartialSimulationConfig::load(args.system.config.as_deref())?;
    let config = partial_config.merge_with_check(&args)?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!(sweeps = args.sweeps, "Invoking the grid check workflow...");
    let report =
        tokio::task::block_in_place(|| workflows::check::run(&config, args.sweeps, &reporter))?;

    if let Some(layout) = report.layout {
        println!(
            "Grid: {} cells per axis, cell length {:.4}",
            layout.cells_per_axis, layout.cell_length
        );
    }
    println!(
        "Self-check after fill: {}",
        verdict(report.passed_after_fill)
    );
    println!(
        "Self-check after {} sweeps: {}",
        report.sweeps,
        verdict(report.passed_after_sweeps)
    );
    if let Some(distance) = report.closest_approach {
        println!("Closest approach: {:.6}", distance);
    }
    println!(
        "Acceptance ratio: {:.3}",
        report.move_stats.acceptance_ratio()
    );

    if report.passed() {
        Ok(())
    } else {
        Err(CliError::RunFailed("the spatial grid failed validation".to_string()))
    }
}
