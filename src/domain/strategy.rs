//! Strategy engine: position and order lifecycle for one strategy instance.
//!
//! The engine owns its risk, performance and cost engines. It is the only
//! writer of capital and the equity curve; every exit is folded into the
//! performance engine before the call returns.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::costs::{CostConfig, TradeCostEngine};
use super::error::SimError;
use super::intent::Intent;
use super::ohlcv::Bar;
use super::order::{Order, OrderId, OrderKind, OrderStatus};
use super::performance::{EquityPoint, Metrics, PerformanceEngine};
use super::position::{ClosedTrade, Direction, Position, PositionId};
use super::risk::{RiskEngine, RiskLimits, RiskState};

/// Remaining size at or below this closes the position.
const SIZE_EPSILON: f64 = 1e-9;

/// Relative tolerance for the capital conservation check.
const CAPITAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct StrategyEngine {
    risk: RiskEngine,
    performance: PerformanceEngine,
    costs: TradeCostEngine,
    positions: BTreeMap<PositionId, Position>,
    pending_orders: BTreeMap<OrderId, Order>,
    order_log: Vec<Order>,
    next_position_id: u64,
    next_order_id: u64,
    entries: usize,
    bar_index: usize,
    current_bar: Option<Bar>,
    observed_correlation: Option<f64>,
}

impl StrategyEngine {
    pub fn new(initial_capital: f64) -> Self {
        StrategyEngine {
            risk: RiskEngine::default(),
            performance: PerformanceEngine::new(initial_capital, 0.0),
            costs: TradeCostEngine::default(),
            positions: BTreeMap::new(),
            pending_orders: BTreeMap::new(),
            order_log: Vec::new(),
            next_position_id: 1,
            next_order_id: 1,
            entries: 0,
            bar_index: 0,
            current_bar: None,
            observed_correlation: None,
        }
    }

    pub fn with_limits(mut self, limits: RiskLimits) -> Self {
        self.risk.set_limits(limits);
        self
    }

    pub fn with_costs(mut self, costs: CostConfig) -> Self {
        self.costs.set_config(costs);
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.performance.set_risk_free_rate(rate);
        self
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    /// Limit setters go through here.
    pub fn risk_mut(&mut self) -> &mut RiskEngine {
        &mut self.risk
    }

    pub fn performance(&self) -> &PerformanceEngine {
        &self.performance
    }

    pub fn costs(&self) -> &TradeCostEngine {
        &self.costs
    }

    pub fn costs_mut(&mut self) -> &mut TradeCostEngine {
        &mut self.costs
    }

    /// Largest absolute cross-asset correlation fed to the correlation limit.
    pub fn set_observed_correlation(&mut self, correlation: Option<f64>) {
        self.observed_correlation = correlation;
    }

    /// Moves to bar `index`, fills resting limit orders the bar reaches,
    /// then runs stop-loss and take-profit checks.
    pub fn advance_bar(&mut self, index: usize, bar: Bar) {
        self.bar_index = index;
        self.current_bar = Some(bar);
        self.fill_limit_orders();
        self.check_protective_exits();
    }

    pub fn bar_index(&self) -> usize {
        self.bar_index
    }

    pub fn current_bar(&self) -> Option<&Bar> {
        self.current_bar.as_ref()
    }

    /// Close of the current bar, if any bar has been seen.
    pub fn mark_price(&self) -> Option<f64> {
        self.current_bar.as_ref().map(|b| b.close)
    }

    pub fn enter_long(&mut self, price: f64, quantity: f64, name: Option<&str>) -> bool {
        self.enter_with_levels(Direction::Long, price, quantity, name, None, None)
    }

    pub fn enter_short(&mut self, price: f64, quantity: f64, name: Option<&str>) -> bool {
        self.enter_with_levels(Direction::Short, price, quantity, name, None, None)
    }

    /// Market entry with optional protective levels. Returns false, with no
    /// state change, on invalid input or a risk rejection.
    pub fn enter_with_levels(
        &mut self,
        direction: Direction,
        price: f64,
        quantity: f64,
        name: Option<&str>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        if !valid_order(price, quantity) || !valid_levels(stop_loss, take_profit) {
            warn!(%direction, price, quantity, "invalid entry request");
            return false;
        }
        if !self.entry_allowed(quantity, price) {
            return false;
        }

        let order = Order {
            id: self.allocate_order_id(),
            direction,
            price,
            quantity,
            kind: OrderKind::Market,
            name: name.unwrap_or_default().to_string(),
            created_at: self.current_time(),
            created_bar: self.bar_index,
            status: OrderStatus::Filled,
        };
        let id = self.open_position(&order, price, stop_loss, take_profit);
        debug!(order = %order.id, position = %id, %direction, price, quantity, "market order filled");
        self.order_log.push(order);
        true
    }

    /// Rests a limit order until a later bar reaches `price`: at or below it
    /// for a buy, at or above it for a sell. A bar opening through the limit
    /// fills at the open.
    ///
    /// The risk gate runs now and again at fill time.
    pub fn place_limit_order(
        &mut self,
        direction: Direction,
        price: f64,
        quantity: f64,
        name: Option<&str>,
    ) -> Option<OrderId> {
        if !valid_order(price, quantity) {
            warn!(%direction, price, quantity, "invalid limit order");
            return None;
        }
        if !self.entry_allowed(quantity, price) {
            return None;
        }

        let id = self.allocate_order_id();
        let order = Order {
            id,
            direction,
            price,
            quantity,
            kind: OrderKind::Limit,
            name: name.unwrap_or_default().to_string(),
            created_at: self.current_time(),
            created_bar: self.bar_index,
            status: OrderStatus::Pending,
        };
        debug!(order = %id, %direction, price, quantity, "limit order placed");
        self.pending_orders.insert(id, order);
        Some(id)
    }

    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        match self.pending_orders.remove(&id) {
            Some(mut order) => {
                order.cancel();
                debug!(order = %id, "order cancelled");
                self.order_log.push(order);
                true
            }
            None => {
                warn!(order = %id, "no pending order to cancel");
                false
            }
        }
    }

    /// Cancels every pending order. Open positions are untouched.
    pub fn cancel_all_orders(&mut self) -> usize {
        let ids: Vec<OrderId> = self.pending_orders.keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel_order(*id)).count()
    }

    /// Exits the oldest open position matching `name`, or the oldest of all
    /// when `name` is `None`.
    ///
    /// `price` defaults to the current bar close and `quantity` to the full
    /// remaining size. A quantity above the open size is rejected.
    pub fn exit_position(
        &mut self,
        price: Option<f64>,
        quantity: Option<f64>,
        name: Option<&str>,
    ) -> bool {
        let Some(id) = self.find_position(name) else {
            warn!(name = name.unwrap_or("*"), "no open position to exit");
            return false;
        };
        self.exit_position_by_id(id, price, quantity)
    }

    pub fn exit_position_by_id(
        &mut self,
        id: PositionId,
        price: Option<f64>,
        quantity: Option<f64>,
    ) -> bool {
        let Some(position) = self.positions.get(&id) else {
            warn!(position = %id, "unknown position");
            return false;
        };
        let Some(price) = price.or_else(|| self.mark_price()) else {
            warn!(position = %id, "exit without price before any bar");
            return false;
        };
        if !price.is_finite() || price <= 0.0 {
            warn!(position = %id, price, "invalid exit price");
            return false;
        }

        let mut quantity = quantity.unwrap_or(position.size);
        if !quantity.is_finite() || quantity <= 0.0 || quantity > position.size + SIZE_EPSILON {
            warn!(position = %id, quantity, size = position.size, "invalid exit quantity");
            return false;
        }
        let full_close = position.size - quantity <= SIZE_EPSILON;
        if full_close {
            quantity = position.size;
        }

        let gross_pnl = position.pnl_for(quantity, price);
        let costs = self
            .costs
            .round_trip(quantity * position.entry_price, quantity * price);
        let trade = ClosedTrade {
            position_id: id,
            name: position.name.clone(),
            direction: position.direction,
            quantity,
            entry_price: position.entry_price,
            exit_price: price,
            entry_time: position.entry_time,
            exit_time: self.current_time(),
            entry_bar: position.entry_bar,
            exit_bar: self.bar_index,
            gross_pnl,
            costs,
            pnl: gross_pnl - costs,
        };

        if full_close {
            self.positions.remove(&id);
        } else if let Some(position) = self.positions.get_mut(&id) {
            position.size -= quantity;
        }

        debug!(
            position = %id,
            price,
            quantity,
            pnl = trade.pnl,
            full_close,
            "position exited"
        );
        self.performance.update_metrics(trade);
        self.assert_invariants();
        true
    }

    /// Exits every open position, iterating a snapshot of ids.
    ///
    /// Returns true when every exit succeeded.
    pub fn close_all(&mut self, price: Option<f64>) -> bool {
        let ids: Vec<PositionId> = self.positions.keys().copied().collect();
        let mut all_closed = true;
        for id in ids {
            all_closed &= self.exit_position_by_id(id, price, None);
        }
        all_closed
    }

    /// Replaces the protective levels of an open position; `None` clears.
    pub fn modify_position(
        &mut self,
        id: PositionId,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        if !valid_levels(stop_loss, take_profit) {
            warn!(position = %id, ?stop_loss, ?take_profit, "invalid protective levels");
            return false;
        }
        match self.positions.get_mut(&id) {
            Some(position) => {
                position.stop_loss = stop_loss;
                position.take_profit = take_profit;
                debug!(position = %id, ?stop_loss, ?take_profit, "position modified");
                true
            }
            None => {
                warn!(position = %id, "unknown position");
                false
            }
        }
    }

    pub fn modify_position_by_name(
        &mut self,
        name: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        match self.find_position(Some(name)) {
            Some(id) => self.modify_position(id, stop_loss, take_profit),
            None => {
                warn!(name, "no open position to modify");
                false
            }
        }
    }

    pub fn apply(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::EnterLong {
                price,
                quantity,
                name,
                stop_loss,
                take_profit,
            } => self.enter_with_levels(
                Direction::Long,
                price,
                quantity,
                name.as_deref(),
                stop_loss,
                take_profit,
            ),
            Intent::EnterShort {
                price,
                quantity,
                name,
                stop_loss,
                take_profit,
            } => self.enter_with_levels(
                Direction::Short,
                price,
                quantity,
                name.as_deref(),
                stop_loss,
                take_profit,
            ),
            Intent::PlaceLimit {
                direction,
                price,
                quantity,
                name,
            } => self
                .place_limit_order(direction, price, quantity, name.as_deref())
                .is_some(),
            Intent::Exit {
                price,
                quantity,
                name,
            } => self.exit_position(price, quantity, name.as_deref()),
            Intent::ExitById {
                id,
                price,
                quantity,
            } => self.exit_position_by_id(id, price, quantity),
            Intent::CloseAll { price } => self.close_all(price),
            Intent::Modify {
                id,
                stop_loss,
                take_profit,
            } => self.modify_position(id, stop_loss, take_profit),
            Intent::ModifyByName {
                name,
                stop_loss,
                take_profit,
            } => self.modify_position_by_name(&name, stop_loss, take_profit),
            Intent::Cancel { id } => self.cancel_order(id),
            Intent::CancelAll => {
                self.cancel_all_orders();
                true
            }
        }
    }

    /// Risk snapshot as it would be after entering `requested_qty` at `price`.
    pub fn risk_state(&self, requested_qty: f64, price: f64) -> RiskState {
        let capital = self.capital();
        let notional = self.open_notional() + requested_qty * price;
        let exposure = if capital > 0.0 {
            notional / capital
        } else if notional > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        RiskState {
            position_size: self.total_open_size() + requested_qty,
            drawdown: self.performance.current_drawdown(),
            loss: (self.initial_capital() - capital).max(0.0),
            trade_count: self.entries + usize::from(requested_qty > 0.0),
            consecutive_loss_days: self.performance.consecutive_loss_days(),
            exposure,
            correlation: self.observed_correlation,
        }
    }

    fn entry_allowed(&self, quantity: f64, price: f64) -> bool {
        let within_size =
            self.total_open_size() + quantity <= self.risk.limits().position_size_ceiling();
        if !within_size {
            debug!(
                quantity,
                open = self.total_open_size(),
                "entry rejected: aggregate size above limit"
            );
            return false;
        }
        self.risk
            .check_entry_allowed(&self.risk_state(quantity, price))
    }

    /// Capital the run started with.
    pub fn initial_capital(&self) -> f64 {
        self.performance.initial_capital()
    }

    /// Realized capital.
    pub fn capital(&self) -> f64 {
        self.performance.current_capital()
    }

    /// Highest realized capital seen so far; never decreases.
    pub fn peak_capital(&self) -> f64 {
        self.performance.peak_capital()
    }

    /// Open positions marked at the current bar close; 0 before any bar.
    pub fn unrealized_pnl(&self) -> f64 {
        match self.mark_price() {
            Some(mark) => self.positions.values().map(|p| p.unrealized_pnl(mark)).sum(),
            None => 0.0,
        }
    }

    /// Realized capital plus the mark-to-market of open positions.
    pub fn equity(&self) -> f64 {
        self.capital() + self.unrealized_pnl()
    }

    /// Fractional decline of realized capital from its peak.
    pub fn drawdown(&self) -> f64 {
        self.performance.current_drawdown()
    }

    /// Largest drawdown seen over the run, updated on every exit.
    pub fn max_drawdown(&self) -> f64 {
        self.performance.max_drawdown()
    }

    pub fn net_profit(&self) -> f64 {
        self.performance.net_profit()
    }

    pub fn gross_profit(&self) -> f64 {
        self.performance.gross_profit()
    }

    pub fn gross_loss(&self) -> f64 {
        self.performance.gross_loss()
    }

    pub fn metrics(&self) -> Metrics {
        self.performance.metrics()
    }

    /// Closed trades in exit order.
    pub fn trades(&self) -> &[ClosedTrade] {
        self.performance.trades()
    }

    /// Starting capital followed by one sample per closed trade.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        self.performance.equity_curve()
    }

    /// Open positions, oldest first.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    /// Oldest open position named `name`.
    pub fn position_by_name(&self, name: &str) -> Option<&Position> {
        self.positions.values().find(|p| p.name == name)
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &Order> {
        self.pending_orders.values()
    }

    /// Looks up a pending order first, then the order log.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.pending_orders
            .get(&id)
            .or_else(|| self.order_log.iter().find(|o| o.id == id))
    }

    /// Filled and cancelled orders in completion order.
    pub fn order_log(&self) -> &[Order] {
        &self.order_log
    }

    /// Sum of open sizes across both directions.
    pub fn total_open_size(&self) -> f64 {
        self.positions.values().map(|p| p.size).sum()
    }

    /// Size-weighted average entry price; 0.0 with no open positions.
    pub fn average_entry_price(&self) -> f64 {
        let size = self.total_open_size();
        if size <= 0.0 {
            return 0.0;
        }
        self.positions
            .values()
            .map(|p| p.size * p.entry_price)
            .sum::<f64>()
            / size
    }

    /// Oldest open position. Only meaningful as a single-position shortcut.
    pub fn first_position(&self) -> Option<&Position> {
        self.positions.values().next()
    }

    /// Size of the oldest open position; 0.0 when flat.
    pub fn position_size(&self) -> f64 {
        self.first_position().map_or(0.0, |p| p.size)
    }

    /// Entry price of the oldest open position; 0.0 when flat.
    pub fn position_entry_price(&self) -> f64 {
        self.first_position().map_or(0.0, |p| p.entry_price)
    }

    pub fn position_direction(&self) -> Option<Direction> {
        self.first_position().map(|p| p.direction)
    }

    pub fn position_entry_bar(&self) -> Option<usize> {
        self.first_position().map(|p| p.entry_bar)
    }

    pub fn position_stop_loss(&self) -> Option<f64> {
        self.first_position().and_then(|p| p.stop_loss)
    }

    pub fn position_take_profit(&self) -> Option<f64> {
        self.first_position().and_then(|p| p.take_profit)
    }

    /// Verifies capital conservation, position sizes, id allocation and the
    /// peak/equity bookkeeping.
    pub fn check_invariants(&self) -> Result<(), SimError> {
        let initial = self.initial_capital();
        let capital = self.capital();
        let tolerance = CAPITAL_TOLERANCE * initial.abs().max(1.0);

        let expected = initial + self.net_profit();
        if (expected - capital).abs() > tolerance {
            return Err(SimError::InvariantViolation {
                reason: format!("capital {capital} does not match initial plus realized pnl {expected}"),
            });
        }

        for (id, position) in &self.positions {
            if *id != position.id {
                return Err(SimError::InvariantViolation {
                    reason: format!("position {} stored under key {id}", position.id),
                });
            }
            if !(position.size > 0.0) || !position.size.is_finite() {
                return Err(SimError::InvariantViolation {
                    reason: format!("position {id} has size {}", position.size),
                });
            }
            if id.0 >= self.next_position_id {
                return Err(SimError::InvariantViolation {
                    reason: format!("position {id} was not issued by this engine"),
                });
            }
        }

        if self.peak_capital() + tolerance < capital {
            return Err(SimError::InvariantViolation {
                reason: format!("peak {} below capital {capital}", self.peak_capital()),
            });
        }

        match self.equity_curve().last() {
            Some(point) if (point.equity - capital).abs() <= tolerance => Ok(()),
            Some(point) => Err(SimError::InvariantViolation {
                reason: format!("last equity sample {} differs from capital {capital}", point.equity),
            }),
            None => Err(SimError::InvariantViolation {
                reason: "equity curve is empty".into(),
            }),
        }
    }

    fn assert_invariants(&self) {
        if let Err(e) = self.check_invariants() {
            panic!("{e}");
        }
    }

    fn allocate_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn allocate_position_id(&mut self) -> PositionId {
        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        id
    }

    fn current_time(&self) -> Option<chrono::NaiveDateTime> {
        self.current_bar.as_ref().map(|b| b.timestamp)
    }

    fn open_notional(&self) -> f64 {
        let mark = self.mark_price();
        self.positions
            .values()
            .map(|p| p.market_value(mark.unwrap_or(p.entry_price)))
            .sum()
    }

    fn find_position(&self, name: Option<&str>) -> Option<PositionId> {
        match name {
            Some(name) => self.position_by_name(name).map(|p| p.id),
            None => self.positions.keys().next().copied(),
        }
    }

    fn open_position(
        &mut self,
        order: &Order,
        entry_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> PositionId {
        let id = self.allocate_position_id();
        let position = Position {
            id,
            name: order.name.clone(),
            direction: order.direction,
            size: order.quantity,
            entry_price,
            entry_time: self.current_time(),
            entry_bar: self.bar_index,
            stop_loss,
            take_profit,
            comment: format!("{:?} order {}", order.kind, order.id),
        };
        self.positions.insert(id, position);
        self.entries += 1;
        self.assert_invariants();
        id
    }

    fn fill_limit_orders(&mut self) {
        let Some(bar) = self.current_bar.clone() else {
            return;
        };
        let ids: Vec<OrderId> = self.pending_orders.keys().copied().collect();
        for id in ids {
            let Some(order) = self.pending_orders.get(&id) else {
                continue;
            };
            let Some(price) = order.limit_fill_price(&bar) else {
                continue;
            };
            let quantity = order.quantity;
            let allowed = self.entry_allowed(quantity, price);

            let Some(mut order) = self.pending_orders.remove(&id) else {
                continue;
            };
            if allowed {
                order.fill();
                let position = self.open_position(&order, price, None, None);
                debug!(order = %id, position = %position, price, quantity, "limit order filled");
            } else {
                order.cancel();
                debug!(order = %id, price, quantity, "limit order cancelled at fill by risk limits");
            }
            self.order_log.push(order);
        }
    }

    fn check_protective_exits(&mut self) {
        let Some((low, high)) = self.current_bar.as_ref().map(|b| (b.low, b.high)) else {
            return;
        };
        let ids: Vec<PositionId> = self.positions.keys().copied().collect();
        for id in ids {
            let Some(position) = self.positions.get(&id) else {
                continue;
            };
            let exit_price = if position.should_stop_loss(low, high) {
                position.stop_loss
            } else if position.should_take_profit(low, high) {
                position.take_profit
            } else {
                None
            };
            if let Some(price) = exit_price {
                debug!(position = %id, price, "protective level hit");
                self.exit_position_by_id(id, Some(price), None);
            }
        }
    }

    /// Rebuilds an engine from persisted parts. Pending orders are not part
    /// of the persisted state and start empty.
    pub(crate) fn from_parts(
        performance: PerformanceEngine,
        positions: Vec<Position>,
        limits: RiskLimits,
        costs: CostConfig,
        bar_index: usize,
    ) -> Result<Self, SimError> {
        let mut opened: Vec<PositionId> = performance
            .trades()
            .iter()
            .map(|t| t.position_id)
            .chain(positions.iter().map(|p| p.id))
            .collect();
        opened.sort();
        opened.dedup();
        let next_position_id = opened.last().map_or(1, |id| id.0 + 1);

        let mut table = BTreeMap::new();
        for position in positions {
            let id = position.id;
            if table.insert(id, position).is_some() {
                return Err(SimError::InvariantViolation {
                    reason: format!("duplicate position id {id}"),
                });
            }
        }

        let engine = StrategyEngine {
            risk: RiskEngine::new(limits),
            performance,
            costs: TradeCostEngine::new(costs),
            positions: table,
            pending_orders: BTreeMap::new(),
            order_log: Vec::new(),
            next_position_id,
            next_order_id: 1,
            entries: opened.len(),
            bar_index,
            current_bar: None,
            observed_correlation: None,
        };
        engine.check_invariants()?;
        Ok(engine)
    }
}

fn valid_order(price: f64, quantity: f64) -> bool {
    price.is_finite() && price > 0.0 && quantity.is_finite() && quantity > 0.0
}

fn valid_levels(stop_loss: Option<f64>, take_profit: Option<f64>) -> bool {
    [stop_loss, take_profit]
        .into_iter()
        .flatten()
        .all(|level| level.is_finite() && level > 0.0)
}
