//! Incremental performance tracking over closed trades.

use std::fmt;

use chrono::NaiveDate;

use super::position::ClosedTrade;
use super::stats;

/// One capital sample, taken at the bar on which a trade closed.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub net_profit: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_trade: f64,
    pub avg_winning_trade: f64,
    pub avg_losing_trade: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub recovery_factor: f64,
    pub max_drawdown: f64,
    /// Longest run of equity samples spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub max_contracts_held: f64,
    pub max_leverage_used: f64,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initial Capital:    {:.2}", self.initial_capital)?;
        writeln!(f, "Final Capital:      {:.2}", self.final_capital)?;
        writeln!(f, "Net Profit:         {:.2}", self.net_profit)?;
        writeln!(f, "Total Return:       {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "Annualized Return:  {:.2}%", self.annualized_return * 100.0)?;
        writeln!(f, "Sharpe Ratio:       {:.4}", self.sharpe_ratio)?;
        writeln!(f, "Sortino Ratio:      {:.4}", self.sortino_ratio)?;
        writeln!(f, "Calmar Ratio:       {:.4}", self.calmar_ratio)?;
        writeln!(f, "Recovery Factor:    {:.4}", self.recovery_factor)?;
        writeln!(f, "Max Drawdown:       {:.2}%", self.max_drawdown * 100.0)?;
        writeln!(f, "Max DD Duration:    {} samples", self.max_drawdown_duration)?;
        writeln!(
            f,
            "Total Trades:       {} ({} won, {} lost)",
            self.total_trades, self.winning_trades, self.losing_trades
        )?;
        writeln!(f, "Win Rate:           {:.2}%", self.win_rate)?;
        writeln!(f, "Profit Factor:      {:.4}", self.profit_factor)?;
        writeln!(f, "Avg Trade:          {:.2}", self.avg_trade)?;
        writeln!(f, "Avg Win:            {:.2}", self.avg_winning_trade)?;
        writeln!(f, "Avg Loss:           {:.2}", self.avg_losing_trade)?;
        writeln!(f, "Largest Win:        {:.2}", self.largest_win)?;
        writeln!(f, "Largest Loss:       {:.2}", self.largest_loss)?;
        writeln!(f, "Max Contracts Held: {:.4}", self.max_contracts_held)?;
        write!(f, "Max Leverage Used:  {:.4}", self.max_leverage_used)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceEngine {
    initial_capital: f64,
    current_capital: f64,
    peak_capital: f64,
    max_drawdown: f64,
    risk_free_rate: f64,
    trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
}

impl PerformanceEngine {
    pub fn new(initial_capital: f64, risk_free_rate: f64) -> Self {
        PerformanceEngine {
            initial_capital,
            current_capital: initial_capital,
            peak_capital: initial_capital,
            max_drawdown: 0.0,
            risk_free_rate,
            trades: Vec::new(),
            equity_curve: vec![EquityPoint {
                bar_index: 0,
                equity: initial_capital,
            }],
        }
    }

    /// Rebuilds an engine from persisted state.
    ///
    /// The first equity sample is taken as the initial capital and the
    /// running max drawdown is replayed from the curve.
    pub(crate) fn from_parts(
        capital: f64,
        peak_capital: f64,
        trades: Vec<ClosedTrade>,
        equity_curve: Vec<EquityPoint>,
        risk_free_rate: f64,
    ) -> Self {
        let initial_capital = equity_curve.first().map(|p| p.equity).unwrap_or(capital);
        let values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        PerformanceEngine {
            initial_capital,
            current_capital: capital,
            peak_capital,
            max_drawdown: stats::max_drawdown(&values),
            risk_free_rate,
            trades,
            equity_curve,
        }
    }

    /// Folds one closed trade into capital, the equity curve and drawdown.
    pub fn update_metrics(&mut self, trade: ClosedTrade) {
        let bar_index = trade.exit_bar;
        self.current_capital += trade.pnl;
        self.trades.push(trade);
        self.equity_curve.push(EquityPoint {
            bar_index,
            equity: self.current_capital,
        });
        self.peak_capital = self.peak_capital.max(self.current_capital);

        let drawdown = self.current_drawdown();
        self.max_drawdown = self.max_drawdown.max(drawdown);
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn current_capital(&self) -> f64 {
        self.current_capital
    }

    pub fn peak_capital(&self) -> f64 {
        self.peak_capital
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    pub fn set_risk_free_rate(&mut self, rate: f64) {
        self.risk_free_rate = rate;
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }

    pub fn current_drawdown(&self) -> f64 {
        if self.peak_capital > 0.0 {
            (self.peak_capital - self.current_capital) / self.peak_capital
        } else {
            0.0
        }
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn net_profit(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn gross_profit(&self) -> f64 {
        self.trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).sum()
    }

    /// Sum of losing trades; zero or negative.
    pub fn gross_loss(&self) -> f64 {
        self.trades.iter().filter(|t| t.is_loss()).map(|t| t.pnl).sum()
    }

    /// `f64::INFINITY` when there are no losses.
    pub fn profit_factor(&self) -> f64 {
        let loss = self.gross_loss().abs();
        if loss == 0.0 {
            return f64::INFINITY;
        }
        self.gross_profit() / loss
    }

    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_win()).count()
    }

    pub fn losing_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_loss()).count()
    }

    /// Percentage, 0-100.
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.winning_trades() as f64 / self.trades.len() as f64 * 100.0
    }

    pub fn avg_trade(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.net_profit() / self.trades.len() as f64
    }

    pub fn avg_winning_trade(&self) -> f64 {
        match self.winning_trades() {
            0 => 0.0,
            n => self.gross_profit() / n as f64,
        }
    }

    pub fn avg_losing_trade(&self) -> f64 {
        match self.losing_trades() {
            0 => 0.0,
            n => self.gross_loss() / n as f64,
        }
    }

    pub fn largest_win(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).fold(0.0, f64::max)
    }

    pub fn largest_loss(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).fold(0.0, f64::min)
    }

    pub fn max_contracts_held(&self) -> f64 {
        self.trades.iter().map(|t| t.quantity).fold(0.0, f64::max)
    }

    /// Entry notional of each closed trade over the realized capital just
    /// before that trade's exit was booked. With overlapping positions this
    /// is the capital at exit time, not at entry.
    pub fn max_leverage_used(&self) -> f64 {
        self.trades
            .iter()
            .zip(&self.equity_curve)
            .filter(|(_, point)| point.equity > 0.0)
            .map(|(trade, point)| trade.entry_notional() / point.equity)
            .fold(0.0, f64::max)
    }

    fn step_returns(&self) -> Vec<f64> {
        stats::step_returns(&self.equity_values())
    }

    pub fn sharpe_ratio(&self) -> f64 {
        stats::risk_adjusted(&self.step_returns(), self.risk_free_rate).0
    }

    pub fn sortino_ratio(&self) -> f64 {
        stats::risk_adjusted(&self.step_returns(), self.risk_free_rate).1
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_capital > 0.0 {
            (self.current_capital - self.initial_capital) / self.initial_capital
        } else {
            0.0
        }
    }

    pub fn annualized_return(&self) -> f64 {
        stats::annualize(self.total_return(), self.equity_curve.len().saturating_sub(1))
    }

    pub fn calmar_ratio(&self) -> f64 {
        if self.max_drawdown <= 0.0 {
            return 0.0;
        }
        self.annualized_return() / self.max_drawdown
    }

    pub fn recovery_factor(&self) -> f64 {
        if self.max_drawdown <= 0.0 || self.initial_capital <= 0.0 {
            return 0.0;
        }
        self.net_profit() / (self.max_drawdown * self.initial_capital)
    }

    pub fn max_drawdown_duration(&self) -> usize {
        let mut peak = f64::NEG_INFINITY;
        let mut current = 0usize;
        let mut longest = 0usize;
        for point in &self.equity_curve {
            if point.equity >= peak {
                peak = point.equity;
                current = 0;
            } else {
                current += 1;
                longest = longest.max(current);
            }
        }
        longest
    }

    /// Trailing run of calendar days whose net closed P&L was negative.
    ///
    /// Trades are grouped by the date of their exit; a trade without an exit
    /// time forms its own day.
    pub fn consecutive_loss_days(&self) -> usize {
        let mut days: Vec<(Option<NaiveDate>, f64)> = Vec::new();
        for trade in &self.trades {
            let date = trade.exit_time.map(|t| t.date());
            match days.last_mut() {
                Some((Some(last), pnl)) if date == Some(*last) => *pnl += trade.pnl,
                _ => days.push((date, trade.pnl)),
            }
        }
        days.iter().rev().take_while(|(_, pnl)| *pnl < 0.0).count()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            initial_capital: self.initial_capital,
            final_capital: self.current_capital,
            total_return: self.total_return(),
            annualized_return: self.annualized_return(),
            net_profit: self.net_profit(),
            gross_profit: self.gross_profit(),
            gross_loss: self.gross_loss(),
            profit_factor: self.profit_factor(),
            total_trades: self.trades.len(),
            winning_trades: self.winning_trades(),
            losing_trades: self.losing_trades(),
            win_rate: self.win_rate(),
            avg_trade: self.avg_trade(),
            avg_winning_trade: self.avg_winning_trade(),
            avg_losing_trade: self.avg_losing_trade(),
            largest_win: self.largest_win(),
            largest_loss: self.largest_loss(),
            sharpe_ratio: self.sharpe_ratio(),
            sortino_ratio: self.sortino_ratio(),
            calmar_ratio: self.calmar_ratio(),
            recovery_factor: self.recovery_factor(),
            max_drawdown: self.max_drawdown,
            max_drawdown_duration: self.max_drawdown_duration(),
            max_contracts_held: self.max_contracts_held(),
            max_leverage_used: self.max_leverage_used(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{Direction, PositionId};
    use chrono::NaiveDateTime;

    fn make_trade(id: u64, quantity: f64, entry: f64, pnl: f64) -> ClosedTrade {
        ClosedTrade {
            position_id: PositionId(id),
            name: String::new(),
            direction: Direction::Long,
            quantity,
            entry_price: entry,
            exit_price: entry + pnl / quantity,
            entry_time: None,
            exit_time: None,
            entry_bar: 0,
            exit_bar: id as usize,
            gross_pnl: pnl,
            costs: 0.0,
            pnl,
        }
    }

    #[test]
    fn leverage_uses_capital_before_each_exit() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.0);
        // 500 notional against 1000, then 3000 notional against 1500
        engine.update_metrics(make_trade(1, 5.0, 100.0, 500.0));
        engine.update_metrics(make_trade(2, 30.0, 100.0, -100.0));
        assert!((engine.max_leverage_used() - 2.0).abs() < 1e-12);
    }

    fn at(date: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&format!("{date} 16:00:00"), "%Y-%m-%d %H:%M:%S").ok()
    }

    #[test]
    fn empty_engine_defaults() {
        let engine = PerformanceEngine::new(100_000.0, 0.0);
        assert_eq!(engine.equity_values(), vec![100_000.0]);
        assert_eq!(engine.win_rate(), 0.0);
        assert_eq!(engine.avg_trade(), 0.0);
        assert_eq!(engine.largest_win(), 0.0);
        assert_eq!(engine.largest_loss(), 0.0);
        assert_eq!(engine.max_contracts_held(), 0.0);
        assert_eq!(engine.max_leverage_used(), 0.0);
        assert_eq!(engine.sharpe_ratio(), 0.0);
        assert_eq!(engine.calmar_ratio(), 0.0);
        assert_eq!(engine.recovery_factor(), 0.0);
        assert!(engine.profit_factor().is_infinite());
    }

    #[test]
    fn update_follows_capital() {
        let mut engine = PerformanceEngine::new(100_000.0, 0.0);
        engine.update_metrics(make_trade(1, 10.0, 100.0, 100.0));
        assert!((engine.current_capital() - 100_100.0).abs() < f64::EPSILON);
        assert_eq!(engine.equity_values(), vec![100_000.0, 100_100.0]);
        assert!((engine.peak_capital() - 100_100.0).abs() < f64::EPSILON);
        assert_eq!(engine.max_drawdown(), 0.0);
    }

    #[test]
    fn two_losses_from_peak() {
        let mut engine = PerformanceEngine::new(100_000.0, 0.0);
        engine.update_metrics(make_trade(1, 1.0, 100.0, -50.0));
        engine.update_metrics(make_trade(2, 1.0, 100.0, -50.0));
        assert!((engine.peak_capital() - 100_000.0).abs() < f64::EPSILON);
        assert!((engine.current_drawdown() - 0.001).abs() < 1e-12);
        assert!((engine.max_drawdown() - 0.001).abs() < 1e-12);
        assert_eq!(engine.max_drawdown_duration(), 2);
    }

    #[test]
    fn profit_loss_aggregates() {
        let mut engine = PerformanceEngine::new(10_000.0, 0.0);
        engine.update_metrics(make_trade(1, 10.0, 100.0, 300.0));
        engine.update_metrics(make_trade(2, 20.0, 50.0, -100.0));
        engine.update_metrics(make_trade(3, 5.0, 100.0, 100.0));

        assert!((engine.net_profit() - 300.0).abs() < 1e-9);
        assert!((engine.gross_profit() - 400.0).abs() < 1e-9);
        assert!((engine.gross_loss() + 100.0).abs() < 1e-9);
        assert!((engine.profit_factor() - 4.0).abs() < 1e-9);
        assert!((engine.win_rate() - 200.0 / 3.0).abs() < 1e-9);
        assert!((engine.avg_trade() - 100.0).abs() < 1e-9);
        assert!((engine.avg_winning_trade() - 200.0).abs() < 1e-9);
        assert!((engine.avg_losing_trade() + 100.0).abs() < 1e-9);
        assert!((engine.largest_win() - 300.0).abs() < 1e-9);
        assert!((engine.largest_loss() + 100.0).abs() < 1e-9);
        assert!((engine.max_contracts_held() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn incremental_drawdown_matches_replay() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.0);
        for (i, pnl) in [50.0, -120.0, 30.0, -80.0, 200.0, -10.0].into_iter().enumerate() {
            engine.update_metrics(make_trade(i as u64 + 1, 1.0, 100.0, pnl));
        }
        let replayed = stats::max_drawdown(&engine.equity_values());
        assert!((engine.max_drawdown() - replayed).abs() < 1e-12);
    }

    #[test]
    fn recovery_and_calmar_with_drawdown() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.0);
        engine.update_metrics(make_trade(1, 1.0, 100.0, -100.0));
        engine.update_metrics(make_trade(2, 1.0, 100.0, 300.0));
        // dd = 0.1, net = 200 → 200 / (0.1 * 1000)
        assert!((engine.recovery_factor() - 2.0).abs() < 1e-9);
        assert!(engine.calmar_ratio() > 0.0);
    }

    #[test]
    fn consecutive_loss_days_groups_by_exit_date() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.0);
        let mut win = make_trade(1, 1.0, 100.0, 50.0);
        win.exit_time = at("2024-01-02");
        let mut loss_a = make_trade(2, 1.0, 100.0, -10.0);
        loss_a.exit_time = at("2024-01-03");
        let mut loss_b = make_trade(3, 1.0, 100.0, -5.0);
        loss_b.exit_time = at("2024-01-03");
        let mut loss_c = make_trade(4, 1.0, 100.0, -1.0);
        loss_c.exit_time = at("2024-01-04");

        engine.update_metrics(win);
        engine.update_metrics(loss_a);
        engine.update_metrics(loss_b);
        assert_eq!(engine.consecutive_loss_days(), 1);
        engine.update_metrics(loss_c);
        assert_eq!(engine.consecutive_loss_days(), 2);
    }

    #[test]
    fn untimed_trades_are_separate_days() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.0);
        engine.update_metrics(make_trade(1, 1.0, 100.0, -1.0));
        engine.update_metrics(make_trade(2, 1.0, 100.0, -1.0));
        assert_eq!(engine.consecutive_loss_days(), 2);
        engine.update_metrics(make_trade(3, 1.0, 100.0, 5.0));
        assert_eq!(engine.consecutive_loss_days(), 0);
    }

    #[test]
    fn from_parts_replays_drawdown() {
        let mut engine = PerformanceEngine::new(1_000.0, 0.02);
        engine.update_metrics(make_trade(1, 1.0, 100.0, -100.0));
        engine.update_metrics(make_trade(2, 1.0, 100.0, 50.0));

        let rebuilt = PerformanceEngine::from_parts(
            engine.current_capital(),
            engine.peak_capital(),
            engine.trades().to_vec(),
            engine.equity_curve().to_vec(),
            engine.risk_free_rate(),
        );
        assert_eq!(rebuilt, engine);
    }

    #[test]
    fn metrics_display_lists_key_figures() {
        let mut engine = PerformanceEngine::new(100_000.0, 0.0);
        engine.update_metrics(make_trade(1, 10.0, 100.0, 100.0));
        let text = engine.metrics().to_string();
        assert!(text.contains("Final Capital:      100100.00"));
        assert!(text.contains("Total Trades:       1 (1 won, 0 lost)"));
    }
}
