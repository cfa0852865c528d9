#![allow(dead_code)]

use chrono::NaiveDate;
use std::io::Write;
use stratsim::domain::backtest::BacktestConfig;
use stratsim::domain::costs::CostConfig;
use stratsim::domain::error::SimError;
pub use stratsim::domain::ohlcv::Bar;
use stratsim::domain::risk::RiskLimits;
use stratsim::domain::strategy::StrategyEngine;
use stratsim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub bars: Vec<Bar>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: Vec::new(),
            error: None,
        }
    }

    pub fn with_bars(mut self, bars: Vec<Bar>) -> Self {
        self.bars = bars;
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimError> {
        if let Some(reason) = &self.error {
            return Err(SimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| start_date.is_none_or(|s| b.timestamp.date() >= s))
            .filter(|b| end_date.is_none_or(|e| b.timestamp.date() <= e))
            .cloned()
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(day: &str, close: f64) -> Bar {
    make_ohlc_bar(day, close, close + 1.0, close - 2.0, close)
}

pub fn make_ohlc_bar(day: &str, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

/// One bar per calendar day starting at `start_date`, closes from `closes`.
pub fn generate_bars(start_date: &str, closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let day = start + chrono::Duration::days(i as i64);
            make_bar(&day.format("%Y-%m-%d").to_string(), close)
        })
        .collect()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        name: Some("test".into()),
        initial_capital: 100_000.0,
        risk_free_rate: 0.0,
        limits: RiskLimits::default(),
        costs: CostConfig::default(),
    }
}

pub fn engine_with_max_size(initial_capital: f64, max_position_size: f64) -> StrategyEngine {
    StrategyEngine::new(initial_capital).with_limits(RiskLimits {
        max_position_size: Some(max_position_size),
        ..Default::default()
    })
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
