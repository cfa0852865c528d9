//! Bar-by-bar replay of a scheduled intent stream.
//!
//! BacktestConfig bundles the one-time setup an engine is built from.

use tracing::{debug, info, warn};

use super::costs::CostConfig;
use super::intent::Intent;
use super::ohlcv::Bar;
use super::performance::Metrics;
use super::risk::RiskLimits;
use super::strategy::StrategyEngine;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub name: Option<String>,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub limits: RiskLimits,
    pub costs: CostConfig,
}

impl BacktestConfig {
    pub fn build_engine(&self) -> StrategyEngine {
        StrategyEngine::new(self.initial_capital)
            .with_limits(self.limits.clone())
            .with_costs(self.costs.clone())
            .with_risk_free_rate(self.risk_free_rate)
    }
}

/// An intent to apply right after bar `bar` has been advanced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledIntent {
    pub bar: usize,
    pub intent: Intent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    pub bars_processed: usize,
    pub applied: usize,
    pub rejected: usize,
    /// Scheduled past the last bar, never applied.
    pub skipped: usize,
    pub final_capital: f64,
    pub final_equity: f64,
    pub open_positions: usize,
    pub metrics: Metrics,
}

/// Advances `engine` through `bars`, applying the intents scheduled for each
/// bar index in schedule order. A rejected intent is counted and the replay
/// continues.
pub fn run_replay(
    engine: &mut StrategyEngine,
    bars: &[Bar],
    intents: &[ScheduledIntent],
) -> ReplayResult {
    let mut schedule: Vec<&ScheduledIntent> = intents.iter().collect();
    schedule.sort_by_key(|s| s.bar);

    let mut pending = schedule.into_iter().peekable();
    let mut applied = 0usize;
    let mut rejected = 0usize;

    for (index, bar) in bars.iter().enumerate() {
        engine.advance_bar(index, bar.clone());

        while let Some(scheduled) = pending.next_if(|s| s.bar <= index) {
            if engine.apply(scheduled.intent.clone()) {
                applied += 1;
            } else {
                rejected += 1;
                debug!(bar = index, action = scheduled.intent.action(), "intent rejected");
            }
        }
    }

    let skipped = pending.count();
    if skipped > 0 {
        warn!(skipped, bars = bars.len(), "intents scheduled past the last bar");
    }

    info!(
        bars = bars.len(),
        applied,
        rejected,
        trades = engine.trades().len(),
        "replay finished"
    );

    ReplayResult {
        bars_processed: bars.len(),
        applied,
        rejected,
        skipped,
        final_capital: engine.capital(),
        final_equity: engine.equity(),
        open_positions: engine.open_position_count(),
        metrics: engine.metrics(),
    }
}
