//! Simulated orders and their lifecycle.

use std::fmt;

use chrono::NaiveDateTime;

use super::ohlcv::Bar;
use super::position::Direction;

/// Monotonic order identifier, never reused within one engine.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Fills synchronously at the requested price.
    Market,
    /// Rests until a bar trades through the requested price.
    Limit,
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub direction: Direction,
    pub price: f64,
    pub quantity: f64,
    pub kind: OrderKind,
    pub name: String,
    pub created_at: Option<NaiveDateTime>,
    pub created_bar: usize,
    pub status: OrderStatus,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    /// Price a resting limit order fills at on `bar`, or `None` if it does
    /// not fill.
    ///
    /// A buy limit fills once the bar trades at or below its price and a sell
    /// limit once the bar trades at or above it. A bar that opens through the
    /// limit fills at the open.
    pub fn limit_fill_price(&self, bar: &Bar) -> Option<f64> {
        match self.direction {
            Direction::Long if bar.low <= self.price => Some(bar.open.min(self.price)),
            Direction::Short if bar.high >= self.price => Some(bar.open.max(self.price)),
            _ => None,
        }
    }

    pub(crate) fn fill(&mut self) {
        self.status = OrderStatus::Filled;
    }

    pub(crate) fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }
}
