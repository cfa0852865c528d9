//! Domain error types.

/// Top-level error type for stratsim.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("stop distance is zero: entry price {entry_price} equals stop loss {stop_loss}")]
    ZeroStopDistance { entry_price: f64, stop_loss: f64 },

    #[error("invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("checkpoint error: {reason}")]
    Checkpoint { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. }
            | SimError::ConfigMissing { .. }
            | SimError::ConfigInvalid { .. } => 2,
            SimError::Data { .. } => 3,
            SimError::Checkpoint { .. } => 4,
            SimError::ZeroStopDistance { .. } => 65,
            SimError::InvariantViolation { .. } => 70,
        };
        std::process::ExitCode::from(code)
    }
}
