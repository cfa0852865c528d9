//! Market data access port trait.

use crate::domain::error::SimError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars in timestamp order, optionally restricted to an inclusive date
    /// range.
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimError>;
}
