//! Caller-issued instructions to the strategy engine.
//!
//! Signal layers translate their output into these variants; the engine
//! dispatches them through [`StrategyEngine::apply`](super::strategy::StrategyEngine::apply).

use super::order::OrderId;
use super::position::{Direction, PositionId};

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    EnterLong {
        price: f64,
        quantity: f64,
        name: Option<String>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    EnterShort {
        price: f64,
        quantity: f64,
        name: Option<String>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    PlaceLimit {
        direction: Direction,
        price: f64,
        quantity: f64,
        name: Option<String>,
    },
    /// Exit the oldest open position matching `name` (any when `None`).
    Exit {
        price: Option<f64>,
        quantity: Option<f64>,
        name: Option<String>,
    },
    ExitById {
        id: PositionId,
        price: Option<f64>,
        quantity: Option<f64>,
    },
    CloseAll {
        price: Option<f64>,
    },
    Modify {
        id: PositionId,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    ModifyByName {
        name: String,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    Cancel {
        id: OrderId,
    },
    CancelAll,
}

impl Intent {
    pub fn enter_long(price: f64, quantity: f64) -> Self {
        Intent::EnterLong {
            price,
            quantity,
            name: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn enter_short(price: f64, quantity: f64) -> Self {
        Intent::EnterShort {
            price,
            quantity,
            name: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn exit_all_of(name: Option<&str>) -> Self {
        Intent::Exit {
            price: None,
            quantity: None,
            name: name.map(str::to_string),
        }
    }

    /// Short label used in logs and schedules.
    pub fn action(&self) -> &'static str {
        match self {
            Intent::EnterLong { .. } => "enter_long",
            Intent::EnterShort { .. } => "enter_short",
            Intent::PlaceLimit { .. } => "limit",
            Intent::Exit { .. } => "exit",
            Intent::ExitById { .. } => "exit_id",
            Intent::CloseAll { .. } => "close_all",
            Intent::Modify { .. } => "modify_id",
            Intent::ModifyByName { .. } => "modify",
            Intent::Cancel { .. } => "cancel",
            Intent::CancelAll => "cancel_all",
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            Intent::EnterLong { .. } | Intent::EnterShort { .. } | Intent::PlaceLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_leave_optional_fields_empty() {
        match Intent::enter_long(100.0, 10.0) {
            Intent::EnterLong {
                name,
                stop_loss,
                take_profit,
                ..
            } => {
                assert!(name.is_none());
                assert!(stop_loss.is_none());
                assert!(take_profit.is_none());
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[test]
    fn actions_and_entry_flag() {
        assert_eq!(Intent::enter_short(1.0, 1.0).action(), "enter_short");
        assert_eq!(Intent::CancelAll.action(), "cancel_all");
        assert!(Intent::enter_long(1.0, 1.0).is_entry());
        assert!(!Intent::exit_all_of(Some("a")).is_entry());
        assert!(!Intent::CloseAll { price: None }.is_entry());
    }
}
