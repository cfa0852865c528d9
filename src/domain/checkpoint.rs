//! Serializable engine snapshot.
//!
//! Holds capital, open positions, trade history, the equity curve, risk
//! limits and the bar pointer. Pending orders and the cost configuration are
//! not persisted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::costs::CostConfig;
use super::error::SimError;
use super::performance::{EquityPoint, PerformanceEngine};
use super::position::{ClosedTrade, Position};
use super::risk::RiskLimits;
use super::strategy::StrategyEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub capital: f64,
    pub peak_capital: f64,
    pub open_positions: Vec<Position>,
    pub trade_history: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub risk_limits: RiskLimits,
    pub current_bar_index: usize,
}

impl Checkpoint {
    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Checkpoint {
            reason: format!("failed to serialize: {e}"),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| SimError::Checkpoint {
            reason: format!("failed to parse: {e}"),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SimError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl StrategyEngine {
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            capital: self.capital(),
            peak_capital: self.peak_capital(),
            open_positions: self.positions().cloned().collect(),
            trade_history: self.trades().to_vec(),
            equity_curve: self.equity_curve().to_vec(),
            risk_limits: self.risk().limits().clone(),
            current_bar_index: self.bar_index(),
        }
    }

    /// Rebuilds an engine from `checkpoint`, re-validating every invariant.
    ///
    /// The risk-free rate defaults to 0; chain
    /// [`with_risk_free_rate`](StrategyEngine::with_risk_free_rate) to set it.
    pub fn restore(checkpoint: Checkpoint, costs: CostConfig) -> Result<Self, SimError> {
        if checkpoint.equity_curve.is_empty() {
            return Err(SimError::Checkpoint {
                reason: "equity curve is empty".into(),
            });
        }
        if checkpoint.peak_capital < checkpoint.capital {
            return Err(SimError::Checkpoint {
                reason: format!(
                    "peak capital {} below capital {}",
                    checkpoint.peak_capital, checkpoint.capital
                ),
            });
        }

        let performance = PerformanceEngine::from_parts(
            checkpoint.capital,
            checkpoint.peak_capital,
            checkpoint.trade_history,
            checkpoint.equity_curve,
            0.0,
        );
        StrategyEngine::from_parts(
            performance,
            checkpoint.open_positions,
            checkpoint.risk_limits,
            costs,
            checkpoint.current_bar_index,
        )
    }
}
