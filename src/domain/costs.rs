//! Trade cost pricing: commission, slippage, margin and carry.
//!
//! All rates are fractions of notional (0.001 = 10 bps). Swap rates may be
//! negative, in which case the "fee" is a credit.

/// Configured cost rates.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CostConfig {
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub initial_margin_rate: f64,
    pub maintenance_margin_rate: f64,
    pub rollover_rate: f64,
    pub swap_long_rate: f64,
    pub swap_short_rate: f64,
}

/// Stateless pricing functions over a [`CostConfig`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradeCostEngine {
    config: CostConfig,
}

impl TradeCostEngine {
    pub fn new(config: CostConfig) -> Self {
        TradeCostEngine { config }
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CostConfig) {
        self.config = config;
    }

    pub fn commission(&self, trade_value: f64) -> f64 {
        trade_value * self.config.commission_rate
    }

    pub fn slippage(&self, trade_value: f64) -> f64 {
        trade_value * self.config.slippage_rate
    }

    pub fn initial_margin(&self, position_value: f64) -> f64 {
        position_value * self.config.initial_margin_rate
    }

    pub fn maintenance_margin(&self, position_value: f64) -> f64 {
        position_value * self.config.maintenance_margin_rate
    }

    pub fn rollover_fee(&self, position_value: f64) -> f64 {
        position_value * self.config.rollover_rate
    }

    pub fn swap_long(&self, position_value: f64) -> f64 {
        position_value * self.config.swap_long_rate
    }

    pub fn swap_short(&self, position_value: f64) -> f64 {
        position_value * self.config.swap_short_rate
    }

    /// Commission plus slippage on both legs of a round trip.
    pub fn round_trip(&self, entry_value: f64, exit_value: f64) -> f64 {
        self.commission(entry_value)
            + self.slippage(entry_value)
            + self.commission(exit_value)
            + self.slippage(exit_value)
    }
}
