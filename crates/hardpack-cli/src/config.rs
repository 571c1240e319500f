use crate::cli::{CheckArgs, SimulateArgs, SystemArgs};
use crate::error::{CliError, Result};
use hardpack::core::models::world::Dimensionality;
use hardpack::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_CELL_SIZE: f64 = 1.0;
const DEFAULT_STEP_SIZE: f64 = 0.1;
const DEFAULT_RELAX_ITERATIONS: u64 = 1000;
const DEFAULT_SAMPLE_INTERVAL: u64 = 10;
const DEFAULT_SAMPLE_ITERATIONS: u64 = 1000;
const DEFAULT_NUM_BINS: usize = 200;
const DEFAULT_MAX_RADIUS: f64 = 5.0;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSystemConfig {
    two_dimensional: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMonteCarloConfig {
    cell_size: Option<f64>,
    cell_count: Option<usize>,
    step_size: Option<f64>,
    fill_attempt_limit: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPairCorrelationConfig {
    bins: Option<usize>,
    max_radius: Option<f64>,
    output: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMeasurementConfig {
    relax_iterations: Option<u64>,
    sample_interval: Option<u64>,
    sample_iterations: Option<u64>,
    unbounded: Option<bool>,
    pair_correlation: Option<PartialPairCorrelationConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialRunConfig {
    seed: Option<u64>,
    max_iterations: Option<u64>,
}

/// Everything a TOML configuration file may set. Each layer is optional; values
/// given on the command line win over the file, and the file wins over defaults.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialSimulationConfig {
    system: Option<PartialSystemConfig>,
    monte_carlo: Option<PartialMonteCarloConfig>,
    measurement: Option<PartialMeasurementConfig>,
    run: Option<PartialRunConfig>,
}

impl PartialSimulationConfig {
    /// Reads the file at `path`, or starts from an empty layer when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_simulate(
        mut self,
        args: &SimulateArgs,
    ) -> Result<core_config::SimulationConfig> {
        let builder = self.merge_system(&args.system)?;
        let run = self.run.take().unwrap_or_default();
        let measurement = self.measurement.take().unwrap_or_default();
        let pair = measurement.pair_correlation.unwrap_or_default();

        let sample_iterations = if args.sample_forever {
            None
        } else if let Some(iterations) = args.sample_iterations {
            Some(iterations)
        } else {
            match (measurement.unbounded, measurement.sample_iterations) {
                (Some(true), Some(_)) => {
                    return Err(CliError::Config(
                        "`measurement.unbounded` and `measurement.sample-iterations` cannot both be set."
                            .to_string(),
                    ));
                }
                (Some(true), None) => None,
                (_, iterations) => Some(iterations.unwrap_or(DEFAULT_SAMPLE_ITERATIONS)),
            }
        };

        let measurement = core_config::MeasurementConfig {
            relax_iterations: args
                .relax
                .or(measurement.relax_iterations)
                .unwrap_or(DEFAULT_RELAX_ITERATIONS),
            sample_interval: args
                .sample_interval
                .or(measurement.sample_interval)
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
            sample_iterations,
            pair_correlation: core_config::PairCorrelationConfig {
                num_bins: args.bins.or(pair.bins).unwrap_or(DEFAULT_NUM_BINS),
                max_radius: args
                    .max_radius
                    .or(pair.max_radius)
                    .unwrap_or(DEFAULT_MAX_RADIUS),
                output_path: args.output.clone().or(pair.output),
            },
        };

        builder
            .measurement(Some(measurement))
            .seed(args.system.seed.or(run.seed))
            .max_iterations(args.max_iterations.or(run.max_iterations))
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// The check command never measures, so any `[measurement]` section is ignored.
    pub fn merge_with_check(mut self, args: &CheckArgs) -> Result<core_config::SimulationConfig> {
        let builder = self.merge_system(&args.system)?;
        let run = self.run.take().unwrap_or_default();

        builder
            .seed(args.system.seed.or(run.seed))
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_system(&mut self, args: &SystemArgs) -> Result<core_config::SimulationConfigBuilder> {
        self.apply_set_values(&args.set_values)?;

        let system = self.system.take().unwrap_or_default();
        let mc = self.monte_carlo.take().unwrap_or_default();

        let two_dimensional = args.two_dimensional || system.two_dimensional.unwrap_or(false);
        let dimensionality = if two_dimensional {
            Dimensionality::Two
        } else {
            Dimensionality::Three
        };

        Ok(core_config::SimulationConfigBuilder::new()
            .num_particles(args.num_particles)
            .packing_density(args.packing_density)
            .dimensionality(dimensionality)
            .cell_sizing(Self::merge_cell_sizing(args, &mc)?)
            .step_size(args.step_size.or(mc.step_size).unwrap_or(DEFAULT_STEP_SIZE))
            .fill_attempt_limit(args.fill_attempts.or(mc.fill_attempt_limit)))
    }

    fn merge_cell_sizing(
        args: &SystemArgs,
        file: &PartialMonteCarloConfig,
    ) -> Result<core_config::CellSizing> {
        use core_config::CellSizing;

        if let Some(length) = args.cell_size {
            return Ok(CellSizing::Length(length));
        }
        if let Some(count) = args.cell_count {
            return Ok(CellSizing::Count(count));
        }
        match (file.cell_size, file.cell_count) {
            (Some(_), Some(_)) => Err(CliError::Config(
                "`monte-carlo.cell-size` and `monte-carlo.cell-count` are mutually exclusive."
                    .to_string(),
            )),
            (Some(length), None) => Ok(CellSizing::Length(length)),
            (None, Some(count)) => Ok(CellSizing::Count(count)),
            (None, None) => Ok(CellSizing::Length(DEFAULT_CELL_SIZE)),
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "system.two-dimensional" => {
                    self.system
                        .get_or_insert_with(Default::default)
                        .two_dimensional = Some(parse_value(key, value_str)?);
                }
                "monte-carlo.cell-size" => {
                    let mc = self.monte_carlo.get_or_insert_with(Default::default);
                    mc.cell_size = Some(parse_value(key, value_str)?);
                    mc.cell_count = None;
                }
                "monte-carlo.cell-count" => {
                    let mc = self.monte_carlo.get_or_insert_with(Default::default);
                    mc.cell_count = Some(parse_value(key, value_str)?);
                    mc.cell_size = None;
                }
                "monte-carlo.step-size" => {
                    self.monte_carlo
                        .get_or_insert_with(Default::default)
                        .step_size = Some(parse_value(key, value_str)?);
                }
                "monte-carlo.fill-attempt-limit" => {
                    self.monte_carlo
                        .get_or_insert_with(Default::default)
                        .fill_attempt_limit = Some(parse_value(key, value_str)?);
                }
                "measurement.relax-iterations" => {
                    self.measurement
                        .get_or_insert_with(Default::default)
                        .relax_iterations = Some(parse_value(key, value_str)?);
                }
                "measurement.sample-interval" => {
                    self.measurement
                        .get_or_insert_with(Default::default)
                        .sample_interval = Some(parse_value(key, value_str)?);
                }
                "measurement.sample-iterations" => {
                    let measurement = self.measurement.get_or_insert_with(Default::default);
                    measurement.sample_iterations = Some(parse_value(key, value_str)?);
                    measurement.unbounded = None;
                }
                "measurement.unbounded" => {
                    let measurement = self.measurement.get_or_insert_with(Default::default);
                    let unbounded: bool = parse_value(key, value_str)?;
                    if unbounded {
                        measurement.sample_iterations = None;
                    }
                    measurement.unbounded = Some(unbounded);
                }
                "measurement.pair-correlation.bins" => {
                    self.pair_correlation_mut().bins = Some(parse_value(key, value_str)?);
                }
                "measurement.pair-correlation.max-radius" => {
                    self.pair_correlation_mut().max_radius = Some(parse_value(key, value_str)?);
                }
                "measurement.pair-correlation.output" => {
                    self.pair_correlation_mut().output = Some(PathBuf::from(value_str));
                }
                "run.seed" => {
                    self.run.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str)?);
                }
                "run.max-iterations" => {
                    self.run.get_or_insert_with(Default::default).max_iterations =
                        Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn pair_correlation_mut(&mut self) -> &mut PartialPairCorrelationConfig {
        self.measurement
            .get_or_insert_with(Default::default)
            .pair_correlation
            .get_or_insert_with(Default::default)
    }
}

fn parse_value<T: FromStr>(key: &str, value_str: &str) -> Result<T> {
    value_str.trim().parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value_str
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use core_config::CellSizing;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn write_config_file(dir: &TempDir, content: &str) -> PathBuf {
        let file_path = dir.path().join("config.toml");
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn simulate_args(extra: &[&str]) -> SimulateArgs {
        let mut argv = vec!["hardpack", "simulate", "100", "0.3"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Simulate(args) => args,
            _ => panic!("Expected 'simulate' subcommand"),
        }
    }

    fn check_args(extra: &[&str]) -> CheckArgs {
        let mut argv = vec!["hardpack", "check", "50", "0.2"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Check(args) => args,
            _ => panic!("Expected 'check' subcommand"),
        }
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let args = simulate_args(&[]);
        let config = PartialSimulationConfig::load(None)
            .unwrap()
            .merge_with_simulate(&args)
            .unwrap();

        assert_eq!(config.system.num_particles, 100);
        assert_eq!(config.system.packing_density, 0.3);
        assert_eq!(config.system.dimensionality, Dimensionality::Three);
        assert_eq!(
            config.monte_carlo.cell_sizing,
            CellSizing::Length(DEFAULT_CELL_SIZE)
        );
        assert_eq!(config.monte_carlo.step_size, DEFAULT_STEP_SIZE);
        assert_eq!(config.monte_carlo.fill_attempt_limit, None);

        let measurement = config.measurement.unwrap();
        assert_eq!(measurement.relax_iterations, DEFAULT_RELAX_ITERATIONS);
        assert_eq!(measurement.sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(
            measurement.sample_iterations,
            Some(DEFAULT_SAMPLE_ITERATIONS)
        );
        assert_eq!(measurement.pair_correlation.num_bins, DEFAULT_NUM_BINS);
        assert_eq!(measurement.pair_correlation.max_radius, DEFAULT_MAX_RADIUS);
        assert!(measurement.pair_correlation.output_path.is_none());
        assert!(config.seed.is_none());
        assert!(config.max_iterations.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [system]
            two-dimensional = true

            [monte-carlo]
            cell-count = 4
            step-size = 0.25
            fill-attempt-limit = 5000

            [measurement]
            relax-iterations = 20
            sample-interval = 2
            unbounded = true

            [measurement.pair-correlation]
            bins = 64
            max-radius = 3.0
            output = "gr.csv"

            [run]
            seed = 7
            max-iterations = 500
            "#,
        );

        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_simulate(&simulate_args(&[]))
            .unwrap();

        assert_eq!(config.system.dimensionality, Dimensionality::Two);
        assert_eq!(config.monte_carlo.cell_sizing, CellSizing::Count(4));
        assert_eq!(config.monte_carlo.step_size, 0.25);
        assert_eq!(config.monte_carlo.fill_attempt_limit, Some(5000));
        let measurement = config.measurement.unwrap();
        assert_eq!(measurement.relax_iterations, 20);
        assert_eq!(measurement.sample_interval, 2);
        assert_eq!(measurement.sample_iterations, None);
        assert_eq!(measurement.pair_correlation.num_bins, 64);
        assert_eq!(measurement.pair_correlation.max_radius, 3.0);
        assert_eq!(
            measurement.pair_correlation.output_path,
            Some(PathBuf::from("gr.csv"))
        );
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_iterations, Some(500));
    }

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [monte-carlo]
            cell-count = 4
            step-size = 0.25

            [measurement]
            relax-iterations = 20
            sample-iterations = 40

            [run]
            seed = 7
            "#,
        );

        let args = simulate_args(&[
            "--cell-size",
            "1.5",
            "-s",
            "0.05",
            "--relax",
            "3",
            "--sample-forever",
            "--seed",
            "11",
            "-o",
            "out.csv",
        ]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_simulate(&args)
            .unwrap();

        assert_eq!(config.monte_carlo.cell_sizing, CellSizing::Length(1.5));
        assert_eq!(config.monte_carlo.step_size, 0.05);
        let measurement = config.measurement.unwrap();
        assert_eq!(measurement.relax_iterations, 3);
        assert_eq!(measurement.sample_iterations, None);
        assert_eq!(
            measurement.pair_correlation.output_path,
            Some(PathBuf::from("out.csv"))
        );
        assert_eq!(config.seed, Some(11));
    }

    #[test]
    fn set_values_override_file_values() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [monte-carlo]
            cell-count = 4

            [measurement.pair-correlation]
            bins = 64
            "#,
        );

        let args = simulate_args(&[
            "-S",
            "monte-carlo.cell-size=2.0",
            "measurement.pair-correlation.bins=10",
            "run.max-iterations=99",
        ]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_simulate(&args)
            .unwrap();

        assert_eq!(config.monte_carlo.cell_sizing, CellSizing::Length(2.0));
        assert_eq!(config.measurement.unwrap().pair_correlation.num_bins, 10);
        assert_eq!(config.max_iterations, Some(99));
    }

    #[test]
    fn conflicting_file_cell_sizing_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [monte-carlo]
            cell-size = 1.0
            cell-count = 3
            "#,
        );

        let result = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_check(&check_args(&[]));
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn unknown_keys_in_file_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [monte-carlo]
            temperature = 1.0
            "#,
        );

        let result = PartialSimulationConfig::from_file(&path);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = PartialSimulationConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        let cases: [&[&str]; 3] = [
            &["-S", "monte-carlo.step-size"],
            &["-S", "monte-carlo.step-size=fast"],
            &["-S", "forcefield.s-factor=0.5"],
        ];
        for extra in cases {
            let args = simulate_args(extra);
            let result = PartialSimulationConfig::default().merge_with_simulate(&args);
            assert!(
                matches!(result, Err(CliError::Config(_))),
                "expected a config error for {:?}",
                extra
            );
        }
    }

    #[test]
    fn engine_validation_errors_surface_as_config_errors() {
        let args = simulate_args(&["--bins", "0"]);
        let result = PartialSimulationConfig::default().merge_with_simulate(&args);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn check_ignores_measurement_section() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            r#"
            [measurement]
            relax-iterations = 20

            [run]
            seed = 3
            max-iterations = 10
            "#,
        );

        let args = check_args(&["--two-dimensional", "--cell-count", "2"]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_check(&args)
            .unwrap();

        assert_eq!(config.system.num_particles, 50);
        assert_eq!(config.system.dimensionality, Dimensionality::Two);
        assert_eq!(config.monte_carlo.cell_sizing, CellSizing::Count(2));
        assert!(config.measurement.is_none());
        assert_eq!(config.seed, Some(3));
        assert!(config.max_iterations.is_none());
    }
}
