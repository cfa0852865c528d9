//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_replay, BacktestConfig, ReplayResult};
use crate::domain::config_validation::{read_optional_count, read_optional_f64, validate_sim_config};
use crate::domain::costs::CostConfig;
use crate::domain::error::SimError;
use crate::domain::risk::RiskLimits;
use crate::domain::strategy::StrategyEngine;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "stratsim", about = "Bar-sequential trading strategy simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a scheduled intent stream against a bar file
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        intents: PathBuf,
        /// Directory for trades.csv and equity.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the final engine state as JSON
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate a simulation configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay {
            config,
            bars,
            intents,
            output,
            checkpoint,
            verbose,
        } => {
            init_tracing(verbose);
            match run_replay_command(
                &config,
                &bars,
                &intents,
                output.as_deref(),
                checkpoint.as_deref(),
            ) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    (&e).into()
                }
            }
        }
        Command::Validate { config } => {
            init_tracing(false);
            run_validate(&config)
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SimError> {
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SimError> {
    let initial_capital = read_optional_f64(adapter, "simulation", "initial_capital")?.ok_or_else(
        || SimError::ConfigMissing {
            section: "simulation".into(),
            key: "initial_capital".into(),
        },
    )?;

    let limits = RiskLimits {
        max_position_size: read_optional_f64(adapter, "risk", "max_position_size")?,
        max_drawdown: read_optional_f64(adapter, "risk", "max_drawdown")?,
        max_loss: read_optional_f64(adapter, "risk", "max_loss")?,
        max_trades: read_optional_count(adapter, "risk", "max_trades")?,
        max_consecutive_loss_days: read_optional_count(adapter, "risk", "max_consecutive_loss_days")?,
        max_correlation: read_optional_f64(adapter, "risk", "max_correlation")?,
        max_exposure: read_optional_f64(adapter, "risk", "max_exposure")?,
    };

    let costs = CostConfig {
        commission_rate: adapter.get_double("costs", "commission_rate", 0.0),
        slippage_rate: adapter.get_double("costs", "slippage_rate", 0.0),
        initial_margin_rate: adapter.get_double("costs", "initial_margin_rate", 0.0),
        maintenance_margin_rate: adapter.get_double("costs", "maintenance_margin_rate", 0.0),
        rollover_rate: adapter.get_double("costs", "rollover_rate", 0.0),
        swap_long_rate: adapter.get_double("costs", "swap_long_rate", 0.0),
        swap_short_rate: adapter.get_double("costs", "swap_short_rate", 0.0),
    };

    Ok(BacktestConfig {
        name: adapter.get_string("simulation", "name"),
        initial_capital,
        risk_free_rate: adapter.get_double("simulation", "risk_free_rate", 0.0),
        limits,
        costs,
    })
}

fn run_replay_command(
    config_path: &Path,
    bars_path: &Path,
    intents_path: &Path,
    output_path: Option<&Path>,
    checkpoint_path: Option<&Path>,
) -> Result<(), SimError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_sim_config(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;
    if let Some(name) = &bt_config.name {
        eprintln!("Simulation: {name}");
    }

    let bars = CsvAdapter::new(bars_path.to_path_buf()).fetch_bars(None, None)?;
    if bars.is_empty() {
        return Err(SimError::Data {
            reason: format!("no bars in {}", bars_path.display()),
        });
    }
    let intents = csv_adapter::load_intents(intents_path)?;
    eprintln!(
        "Replaying {} intents over {} bars ({} to {})",
        intents.len(),
        bars.len(),
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp
    );

    let mut engine = bt_config.build_engine();
    let result = run_replay(&mut engine, &bars, &intents);
    engine.check_invariants()?;
    print_summary(&result);

    if let Some(output) = output_path {
        CsvReportAdapter.write(&engine, output)?;
        eprintln!("\nReport written to: {}", output.display());
    }

    if let Some(path) = checkpoint_path {
        write_checkpoint(&engine, path)?;
    }

    Ok(())
}

#[cfg(feature = "checkpoint")]
fn write_checkpoint(engine: &StrategyEngine, path: &Path) -> Result<(), SimError> {
    engine.checkpoint().save(path)?;
    eprintln!("Checkpoint written to: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "checkpoint"))]
fn write_checkpoint(_engine: &StrategyEngine, _path: &Path) -> Result<(), SimError> {
    Err(SimError::Checkpoint {
        reason: "checkpoint feature is required for --checkpoint".into(),
    })
}

fn print_summary(result: &ReplayResult) {
    eprintln!("\n=== Replay Results ===");
    eprintln!("Bars:               {}", result.bars_processed);
    eprintln!(
        "Intents:            {} applied, {} rejected, {} skipped",
        result.applied, result.rejected, result.skipped
    );
    eprintln!("Open Positions:     {}", result.open_positions);
    eprintln!("Final Equity:       {:.2}", result.final_equity);
    eprintln!("{}", result.metrics);
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let outcome = load_config(config_path).and_then(|adapter| {
        validate_sim_config(&adapter)?;
        build_backtest_config(&adapter)
    });

    match outcome {
        Ok(config) => {
            eprintln!("  initial_capital: {}", config.initial_capital);
            eprintln!("  risk_free_rate:  {}", config.risk_free_rate);
            eprintln!("  limits:          {:?}", config.limits);
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_config_reads_all_sections() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[simulation]
initial_capital = 50000
risk_free_rate = 0.03
name = breakout

[risk]
max_position_size = 200
max_trades = 12

[costs]
commission_rate = 0.0005
swap_short_rate = -0.0001
"#,
        )
        .unwrap();
        let config = build_backtest_config(&adapter).unwrap();
        assert!((config.initial_capital - 50_000.0).abs() < f64::EPSILON);
        assert!((config.risk_free_rate - 0.03).abs() < f64::EPSILON);
        assert_eq!(config.name.as_deref(), Some("breakout"));
        assert_eq!(config.limits.max_position_size, Some(200.0));
        assert_eq!(config.limits.max_trades, Some(12));
        assert_eq!(config.limits.max_drawdown, None);
        assert!((config.costs.commission_rate - 0.0005).abs() < f64::EPSILON);
        assert!((config.costs.swap_short_rate + 0.0001).abs() < f64::EPSILON);
    }

    #[test]
    fn build_config_requires_initial_capital() {
        let adapter = FileConfigAdapter::from_string("[risk]\nmax_loss = 10\n").unwrap();
        assert!(matches!(
            build_backtest_config(&adapter),
            Err(SimError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn cli_parses_replay_flags() {
        let cli = Cli::parse_from([
            "stratsim",
            "replay",
            "--config",
            "sim.ini",
            "--bars",
            "bars.csv",
            "--intents",
            "intents.csv",
            "--verbose",
        ]);
        match cli.command {
            Command::Replay {
                config,
                output,
                verbose,
                ..
            } => {
                assert_eq!(config, PathBuf::from("sim.ini"));
                assert!(output.is_none());
                assert!(verbose);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
