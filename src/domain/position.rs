//! Position tracking and closed-trade records.

use std::fmt;

use chrono::NaiveDateTime;

/// Monotonic position identifier, never reused within one engine.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub name: String,
    pub direction: Direction,
    /// Always > 0 while the position exists.
    pub size: f64,
    pub entry_price: f64,
    pub entry_time: Option<NaiveDateTime>,
    pub entry_bar: usize,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: String,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    /// Price P&L for `quantity` units closed at `price`.
    pub fn pnl_for(&self, quantity: f64, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) * quantity
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.pnl_for(self.size, price)
    }

    pub fn should_stop_loss(&self, low: f64, high: f64) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(stop), Direction::Long) => low <= stop,
            (Some(stop), Direction::Short) => high >= stop,
            (None, _) => false,
        }
    }

    pub fn should_take_profit(&self, low: f64, high: f64) -> bool {
        match (self.take_profit, self.direction) {
            (Some(target), Direction::Long) => high >= target,
            (Some(target), Direction::Short) => low <= target,
            (None, _) => false,
        }
    }
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub position_id: PositionId,
    pub name: String,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: Option<NaiveDateTime>,
    pub exit_time: Option<NaiveDateTime>,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub gross_pnl: f64,
    pub costs: f64,
    /// Net of costs; the figure capital moves by.
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    pub fn entry_notional(&self) -> f64 {
        self.quantity * self.entry_price
    }
}
