//! Report generation port trait.

use crate::domain::error::SimError;
use crate::domain::strategy::StrategyEngine;
use std::path::Path;

/// Port for writing the outcome of a run.
pub trait ReportPort {
    fn write(&self, engine: &StrategyEngine, output_path: &Path) -> Result<(), SimError>;
}
