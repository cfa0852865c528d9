//! Position sizing, risk analytics and limit gating.
//!
//! Sizing formulas are clamped to the configured position-size ceiling.
//! Analytics are read-only: they report on a return series and never touch
//! engine state. The only mutable state is the [`RiskLimits`] record.

use std::collections::BTreeMap;

use tracing::debug;

use super::error::SimError;
use super::stats;

/// Configured ceilings. `None` means unbounded, never zero.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskLimits {
    pub max_position_size: Option<f64>,
    /// Fraction of peak capital, e.g. 0.2 = 20%.
    pub max_drawdown: Option<f64>,
    /// Absolute realized loss from initial capital.
    pub max_loss: Option<f64>,
    pub max_trades: Option<usize>,
    pub max_consecutive_loss_days: Option<usize>,
    pub max_correlation: Option<f64>,
    /// Gross open notional over capital.
    pub max_exposure: Option<f64>,
}

impl RiskLimits {
    pub fn position_size_ceiling(&self) -> f64 {
        self.max_position_size.unwrap_or(f64::INFINITY)
    }
}

/// Snapshot of the quantities each limit is compared against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskState {
    pub position_size: f64,
    pub drawdown: f64,
    pub loss: f64,
    pub trade_count: usize,
    pub consecutive_loss_days: usize,
    pub exposure: f64,
    /// Largest absolute off-diagonal correlation, when known.
    pub correlation: Option<f64>,
}

/// Per-dimension outcome of [`RiskEngine::check_limits`]; `true` = within limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitCheck {
    pub position_size: bool,
    pub drawdown: bool,
    pub loss: bool,
    pub trade_count: bool,
    pub consecutive_loss_days: bool,
    pub correlation: bool,
    pub exposure: bool,
}

impl LimitCheck {
    pub fn all_ok(&self) -> bool {
        self.fields().iter().all(|(_, ok)| *ok)
    }

    pub fn fields(&self) -> [(&'static str, bool); 7] {
        [
            ("position_size", self.position_size),
            ("drawdown", self.drawdown),
            ("loss", self.loss),
            ("trade_count", self.trade_count),
            ("consecutive_loss_days", self.consecutive_loss_days),
            ("correlation", self.correlation),
            ("exposure", self.exposure),
        ]
    }

    /// Names of the dimensions that breached their ceiling.
    pub fn breaches(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Pairwise Pearson correlations, rows and columns in `assets` order.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub assets: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.assets.iter().position(|x| x == a)?;
        let j = self.assets.iter().position(|x| x == b)?;
        Some(self.values[i][j])
    }

    /// Largest absolute off-diagonal entry, 0.0 for fewer than two assets.
    pub fn max_abs_off_diagonal(&self) -> f64 {
        let mut max = 0.0_f64;
        for (i, row) in self.values.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if i != j {
                    max = max.max(v.abs());
                }
            }
        }
        max
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    limits: RiskLimits,
}

impl RiskEngine {
    pub fn new(limits: RiskLimits) -> Self {
        RiskEngine { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: RiskLimits) {
        self.limits = limits;
    }

    pub fn set_max_position_size(&mut self, value: Option<f64>) {
        self.limits.max_position_size = value;
    }

    pub fn set_max_drawdown(&mut self, value: Option<f64>) {
        self.limits.max_drawdown = value;
    }

    pub fn set_max_loss(&mut self, value: Option<f64>) {
        self.limits.max_loss = value;
    }

    pub fn set_max_trades(&mut self, value: Option<usize>) {
        self.limits.max_trades = value;
    }

    pub fn set_max_consecutive_loss_days(&mut self, value: Option<usize>) {
        self.limits.max_consecutive_loss_days = value;
    }

    pub fn set_max_correlation(&mut self, value: Option<f64>) {
        self.limits.max_correlation = value;
    }

    pub fn set_max_exposure(&mut self, value: Option<f64>) {
        self.limits.max_exposure = value;
    }

    fn clamp_size(&self, size: f64) -> f64 {
        size.min(self.limits.position_size_ceiling())
    }

    pub fn fixed_fractional(&self, capital: f64, risk_fraction: f64) -> f64 {
        self.clamp_size(capital * risk_fraction)
    }

    /// Units such that hitting `stop_loss` costs `capital * risk_per_trade`.
    ///
    /// The stop distance is taken as an absolute value so shorts (stop above
    /// entry) size the same way as longs.
    pub fn calculate_position_size(
        &self,
        capital: f64,
        risk_per_trade: f64,
        stop_loss: f64,
        entry_price: f64,
    ) -> Result<f64, SimError> {
        let distance = (entry_price - stop_loss).abs();
        if distance == 0.0 {
            return Err(SimError::ZeroStopDistance {
                entry_price,
                stop_loss,
            });
        }
        Ok(self.clamp_size(capital * risk_per_trade / distance))
    }

    /// Kelly fraction `w - (1 - w) / r`, floored at zero.
    pub fn kelly_criterion(&self, win_rate: f64, win_loss_ratio: f64) -> f64 {
        if win_loss_ratio <= 0.0 {
            return 0.0;
        }
        let kelly = (win_rate - (1.0 - win_rate) / win_loss_ratio).max(0.0);
        self.clamp_size(kelly)
    }

    /// `mean(gains) / mean(|losses|) - 1`, negative when the average loss
    /// outweighs the average gain.
    ///
    /// With no losing observations the ratio is undefined and the configured
    /// size ceiling is returned (infinite when unset). With no gains the mean
    /// gain is 0 and the result is -1.
    pub fn optimal_f(&self, returns: &[f64]) -> f64 {
        let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns
            .iter()
            .copied()
            .filter(|r| *r < 0.0)
            .map(f64::abs)
            .collect();

        if losses.is_empty() {
            return self.limits.position_size_ceiling();
        }
        self.clamp_size(stats::mean(&gains) / stats::mean(&losses) - 1.0)
    }

    /// Ryan Jones fixed-ratio sizing: `floor(sqrt(2 * capital * target_risk / delta)) * delta`.
    pub fn fixed_ratio(&self, capital: f64, delta: f64, target_risk: f64) -> f64 {
        if delta <= 0.0 || capital <= 0.0 || target_risk <= 0.0 {
            return 0.0;
        }
        let units = (2.0 * capital * target_risk / delta).sqrt().floor();
        self.clamp_size(units * delta)
    }

    /// The `(1 - confidence)` percentile of `returns`.
    pub fn value_at_risk(&self, returns: &[f64], confidence: f64) -> f64 {
        stats::percentile(returns, 1.0 - confidence)
    }

    /// Mean of the returns at or below the VaR threshold; never above VaR.
    pub fn expected_shortfall(&self, returns: &[f64], confidence: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let var = self.value_at_risk(returns, confidence);
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var).collect();
        if tail.is_empty() {
            return var;
        }
        stats::mean(&tail).min(var)
    }

    pub fn sharpe_ratio(&self, returns: &[f64], risk_free_rate: f64) -> f64 {
        stats::risk_adjusted(returns, risk_free_rate).0
    }

    /// 0.0 when no return falls below the risk-free rate.
    pub fn sortino_ratio(&self, returns: &[f64], risk_free_rate: f64) -> f64 {
        stats::risk_adjusted(returns, risk_free_rate).1
    }

    /// Annualized compounded return over max drawdown; 0.0 without a drawdown.
    pub fn calmar_ratio(&self, returns: &[f64]) -> f64 {
        let max_dd = self.max_drawdown(returns);
        if max_dd <= 0.0 {
            return 0.0;
        }
        let curve = stats::cumulative_curve(returns);
        let total_return = curve.last().copied().unwrap_or(1.0) - 1.0;
        stats::annualize(total_return, returns.len()) / max_dd
    }

    /// Max drawdown of the compounded return curve.
    pub fn max_drawdown(&self, returns: &[f64]) -> f64 {
        stats::max_drawdown(&stats::cumulative_curve(returns))
    }

    /// `((1 - w) / w) ^ (1 / risk_per_trade)`, clamped to [0, 1].
    ///
    /// Ruin is certain (1.0) when the payoff ratio does not exceed 1, when
    /// there are no winners, or when the risk per trade is not positive.
    pub fn risk_of_ruin(&self, win_rate: f64, win_loss_ratio: f64, risk_per_trade: f64) -> f64 {
        if win_loss_ratio <= 1.0 || win_rate <= 0.0 || risk_per_trade <= 0.0 {
            return 1.0;
        }
        if win_rate >= 1.0 {
            return 0.0;
        }
        ((1.0 - win_rate) / win_rate)
            .powf(1.0 / risk_per_trade)
            .clamp(0.0, 1.0)
    }

    pub fn correlation_risk(&self, returns_by_asset: &BTreeMap<String, Vec<f64>>) -> CorrelationMatrix {
        let assets: Vec<String> = returns_by_asset.keys().cloned().collect();
        let series: Vec<&Vec<f64>> = returns_by_asset.values().collect();

        let values = series
            .iter()
            .enumerate()
            .map(|(i, a)| {
                series
                    .iter()
                    .enumerate()
                    .map(|(j, b)| if i == j { 1.0 } else { stats::correlation(a, b) })
                    .collect()
            })
            .collect();

        CorrelationMatrix { assets, values }
    }

    /// Compares every dimension of `state` with its ceiling independently.
    pub fn check_limits(&self, state: &RiskState) -> LimitCheck {
        let within = |value: f64, limit: Option<f64>| limit.is_none_or(|l| value <= l);
        let within_count = |value: usize, limit: Option<usize>| limit.is_none_or(|l| value <= l);

        LimitCheck {
            position_size: within(state.position_size, self.limits.max_position_size),
            drawdown: within(state.drawdown, self.limits.max_drawdown),
            loss: within(state.loss, self.limits.max_loss),
            trade_count: within_count(state.trade_count, self.limits.max_trades),
            consecutive_loss_days: within_count(
                state.consecutive_loss_days,
                self.limits.max_consecutive_loss_days,
            ),
            correlation: state
                .correlation
                .is_none_or(|c| within(c.abs(), self.limits.max_correlation)),
            exposure: within(state.exposure, self.limits.max_exposure),
        }
    }

    /// Gate for a prospective entry. `state` must already include the
    /// requested quantity, notional and trade.
    pub fn check_entry_allowed(&self, state: &RiskState) -> bool {
        let check = self.check_limits(state);
        if !check.all_ok() {
            debug!(breaches = ?check.breaches(), "entry rejected by risk limits");
            return false;
        }
        true
    }
}
