//! CSV report adapter: `trades.csv` and `equity.csv` in an output directory.

use crate::domain::error::SimError;
use crate::domain::strategy::StrategyEngine;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDateTime;
use std::fs;
use std::path::Path;

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";

const TRADE_HEADER: [&str; 13] = [
    "position_id",
    "name",
    "direction",
    "quantity",
    "entry_price",
    "exit_price",
    "entry_time",
    "exit_time",
    "entry_bar",
    "exit_bar",
    "gross_pnl",
    "costs",
    "pnl",
];

pub struct CsvReportAdapter;

fn report_err(path: &Path, e: impl std::fmt::Display) -> SimError {
    SimError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        e
    )))
}

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

impl CsvReportAdapter {
    fn write_trades(engine: &StrategyEngine, path: &Path) -> Result<(), SimError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| report_err(path, e))?;
        wtr.write_record(TRADE_HEADER)
            .map_err(|e| report_err(path, e))?;

        for trade in engine.trades() {
            wtr.write_record([
                trade.position_id.to_string(),
                trade.name.clone(),
                trade.direction.to_string(),
                trade.quantity.to_string(),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                format_time(trade.entry_time),
                format_time(trade.exit_time),
                trade.entry_bar.to_string(),
                trade.exit_bar.to_string(),
                format!("{:.6}", trade.gross_pnl),
                format!("{:.6}", trade.costs),
                format!("{:.6}", trade.pnl),
            ])
            .map_err(|e| report_err(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(engine: &StrategyEngine, path: &Path) -> Result<(), SimError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| report_err(path, e))?;
        wtr.write_record(["bar_index", "equity"])
            .map_err(|e| report_err(path, e))?;

        for point in engine.equity_curve() {
            wtr.write_record([point.bar_index.to_string(), format!("{:.6}", point.equity)])
                .map_err(|e| report_err(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, engine: &StrategyEngine, output_path: &Path) -> Result<(), SimError> {
        fs::create_dir_all(output_path)?;
        Self::write_trades(engine, &output_path.join(TRADES_FILE))?;
        Self::write_equity(engine, &output_path.join(EQUITY_FILE))?;
        Ok(())
    }
}
