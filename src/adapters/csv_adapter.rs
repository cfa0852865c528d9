//! CSV file data adapter: price bars and intent schedules.

use crate::domain::backtest::ScheduledIntent;
use crate::domain::error::SimError;
use crate::domain::intent::Intent;
use crate::domain::ohlcv::Bar;
use crate::domain::order::OrderId;
use crate::domain::position::{Direction, PositionId};
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// Bars from a single `date,open,high,low,close,volume` file.
pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn data_err(reason: impl Into<String>) -> SimError {
    SimError::Data {
        reason: reason.into(),
    }
}

fn read_file(path: &Path) -> Result<String, SimError> {
    fs::read_to_string(path).map_err(|e| data_err(format!("failed to read {}: {}", path.display(), e)))
}

/// Accepts `%Y-%m-%d %H:%M:%S` or a bare `%Y-%m-%d` (midnight).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, SimError> {
    let value = value.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| data_err(format!("invalid date '{value}'")))
}

fn number(record: &StringRecord, index: usize, column: &str, line: u64) -> Result<f64, SimError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_err(format!("line {line}: missing {column} column")))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| data_err(format!("line {line}: invalid {column} value '{raw}': {e}")))?;
    if !value.is_finite() {
        return Err(data_err(format!("line {line}: {column} is not finite")));
    }
    Ok(value)
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimError> {
        let content = read_file(&self.path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;
            let line = record.position().map_or(0, |p| p.line());

            let date_str = record
                .get(0)
                .ok_or_else(|| data_err(format!("line {line}: missing date column")))?;
            let timestamp = parse_timestamp(date_str)?;

            let date = timestamp.date();
            if start_date.is_some_and(|s| date < s) || end_date.is_some_and(|e| date > e) {
                continue;
            }

            let bar = Bar {
                timestamp,
                open: number(&record, 1, "open", line)?,
                high: number(&record, 2, "high", line)?,
                low: number(&record, 3, "low", line)?,
                close: number(&record, 4, "close", line)?,
                volume: number(&record, 5, "volume", line)?,
            };
            if bar.low > bar.high {
                return Err(data_err(format!(
                    "line {line}: low {} above high {}",
                    bar.low, bar.high
                )));
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

/// Named-column access into one schedule row.
struct Row<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
    line: u64,
}

impl Row<'_> {
    fn text(&self, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h.trim() == column)?;
        self.record
            .get(index)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn optional_number(&self, column: &str) -> Result<Option<f64>, SimError> {
        self.text(column)
            .map(|raw| {
                raw.parse::<f64>().map_err(|e| {
                    data_err(format!("line {}: invalid {column} '{raw}': {e}", self.line))
                })
            })
            .transpose()
    }

    fn number(&self, column: &str) -> Result<f64, SimError> {
        self.optional_number(column)?
            .ok_or_else(|| data_err(format!("line {}: {column} is required", self.line)))
    }

    fn name(&self) -> Option<String> {
        self.text("name").map(str::to_string)
    }

    /// Accepts `P3`, `O3` or a bare `3`.
    fn id(&self, prefix: char) -> Result<u64, SimError> {
        let raw = self
            .text("id")
            .ok_or_else(|| data_err(format!("line {}: id is required", self.line)))?;
        raw.trim_start_matches(prefix)
            .parse()
            .map_err(|_| data_err(format!("line {}: invalid id '{raw}'", self.line)))
    }
}

fn parse_intent(row: &Row<'_>, action: &str) -> Result<Intent, SimError> {
    let intent = match action {
        "enter_long" | "buy" => Intent::EnterLong {
            price: row.number("price")?,
            quantity: row.number("quantity")?,
            name: row.name(),
            stop_loss: row.optional_number("stop_loss")?,
            take_profit: row.optional_number("take_profit")?,
        },
        "enter_short" | "sell" => Intent::EnterShort {
            price: row.number("price")?,
            quantity: row.number("quantity")?,
            name: row.name(),
            stop_loss: row.optional_number("stop_loss")?,
            take_profit: row.optional_number("take_profit")?,
        },
        "limit_long" | "limit_short" => Intent::PlaceLimit {
            direction: if action == "limit_long" {
                Direction::Long
            } else {
                Direction::Short
            },
            price: row.number("price")?,
            quantity: row.number("quantity")?,
            name: row.name(),
        },
        "exit" => Intent::Exit {
            price: row.optional_number("price")?,
            quantity: row.optional_number("quantity")?,
            name: row.name(),
        },
        "exit_id" => Intent::ExitById {
            id: PositionId(row.id('P')?),
            price: row.optional_number("price")?,
            quantity: row.optional_number("quantity")?,
        },
        "close_all" => Intent::CloseAll {
            price: row.optional_number("price")?,
        },
        "modify" => Intent::ModifyByName {
            name: row
                .name()
                .ok_or_else(|| data_err(format!("line {}: modify needs a name", row.line)))?,
            stop_loss: row.optional_number("stop_loss")?,
            take_profit: row.optional_number("take_profit")?,
        },
        "modify_id" => Intent::Modify {
            id: PositionId(row.id('P')?),
            stop_loss: row.optional_number("stop_loss")?,
            take_profit: row.optional_number("take_profit")?,
        },
        "cancel" => Intent::Cancel {
            id: OrderId(row.id('O')?),
        },
        "cancel_all" => Intent::CancelAll,
        other => {
            return Err(data_err(format!(
                "line {}: unknown action '{other}'",
                row.line
            )));
        }
    };
    Ok(intent)
}

/// Reads an intent schedule with columns `bar,action,price,quantity,name`
/// and the optional `stop_loss`, `take_profit` and `id` columns.
pub fn load_intents(path: &Path) -> Result<Vec<ScheduledIntent>, SimError> {
    let content = read_file(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| data_err(format!("CSV header error: {}", e)))?
        .clone();

    for required in ["bar", "action"] {
        if !headers.iter().any(|h| h.trim() == required) {
            return Err(data_err(format!("missing {required} column")));
        }
    }

    let mut intents = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;
        let row = Row {
            headers: &headers,
            record: &record,
            line: record.position().map_or(0, |p| p.line()),
        };

        let bar = row
            .text("bar")
            .ok_or_else(|| data_err(format!("line {}: bar is required", row.line)))?
            .parse::<usize>()
            .map_err(|e| data_err(format!("line {}: invalid bar: {e}", row.line)))?;
        let action = row
            .text("action")
            .ok_or_else(|| data_err(format!("line {}: action is required", row.line)))?
            .to_lowercase();

        intents.push(ScheduledIntent {
            bar,
            intent: parse_intent(&row, &action)?,
        });
    }

    Ok(intents)
}
