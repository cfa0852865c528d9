//! Configuration validation.
//!
//! Validates every simulation, risk and cost key before a run starts.

use crate::domain::error::SimError;
use crate::ports::config_port::ConfigPort;

/// Risk keys holding a fractional or monetary ceiling.
pub const RISK_VALUE_KEYS: [&str; 5] = [
    "max_position_size",
    "max_drawdown",
    "max_loss",
    "max_correlation",
    "max_exposure",
];

/// Risk keys holding a count ceiling.
pub const RISK_COUNT_KEYS: [&str; 2] = ["max_trades", "max_consecutive_loss_days"];

/// Cost keys that must not be negative.
pub const NON_NEGATIVE_COST_KEYS: [&str; 5] = [
    "commission_rate",
    "slippage_rate",
    "initial_margin_rate",
    "maintenance_margin_rate",
    "rollover_rate",
];

/// Cost keys that accept either sign.
pub const SIGNED_COST_KEYS: [&str; 2] = ["swap_long_rate", "swap_short_rate"];

pub fn validate_sim_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_risk_limits(config)?;
    validate_costs(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SimError {
    SimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parses `[section] key` as a float. `Ok(None)` when the key is absent.
pub fn read_optional_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, SimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(section, key, format!("{key} must be a number, got '{raw}'")))?;
            if !value.is_finite() {
                return Err(invalid(section, key, format!("{key} must be finite")));
            }
            Ok(Some(value))
        }
    }
}

/// Parses `[section] key` as a count. `Ok(None)` when the key is absent.
pub fn read_optional_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<usize>, SimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            invalid(
                section,
                key,
                format!("{key} must be a whole number, got '{raw}'"),
            )
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), SimError> {
    match read_optional_f64(config, "simulation", "initial_capital")? {
        None => Err(SimError::ConfigMissing {
            section: "simulation".to_string(),
            key: "initial_capital".to_string(),
        }),
        Some(value) if value <= 0.0 => Err(invalid(
            "simulation",
            "initial_capital",
            "initial_capital must be positive",
        )),
        Some(_) => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), SimError> {
    let value = read_optional_f64(config, "simulation", "risk_free_rate")?.unwrap_or(0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "simulation",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_risk_limits(config: &dyn ConfigPort) -> Result<(), SimError> {
    for key in RISK_VALUE_KEYS {
        if let Some(value) = read_optional_f64(config, "risk", key)? {
            if value <= 0.0 {
                return Err(invalid(
                    "risk",
                    key,
                    format!("{key} must be positive; omit it for no limit"),
                ));
            }
        }
    }
    for key in RISK_COUNT_KEYS {
        if read_optional_count(config, "risk", key)? == Some(0) {
            return Err(invalid(
                "risk",
                key,
                format!("{key} must be positive; omit it for no limit"),
            ));
        }
    }
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), SimError> {
    for key in NON_NEGATIVE_COST_KEYS {
        if let Some(value) = read_optional_f64(config, "costs", key)? {
            if value < 0.0 {
                return Err(invalid(
                    "costs",
                    key,
                    format!("{key} must be non-negative"),
                ));
            }
        }
    }
    for key in SIGNED_COST_KEYS {
        read_optional_f64(config, "costs", key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn assert_invalid(content: &str, expected_key: &str) {
        match validate_sim_config(&make_config(content)) {
            Err(SimError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected invalid {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[simulation]
initial_capital = 100000
risk_free_rate = 0.05
name = trend

[risk]
max_position_size = 500
max_drawdown = 0.2
max_trades = 100

[costs]
commission_rate = 0.001
swap_long_rate = -0.0002
"#,
        );
        assert!(validate_sim_config(&config).is_ok());
    }

    #[test]
    fn minimal_config_passes() {
        let config = make_config("[simulation]\ninitial_capital = 1000\n");
        assert!(validate_sim_config(&config).is_ok());
    }

    #[test]
    fn missing_initial_capital_fails() {
        let config = make_config("[simulation]\nrisk_free_rate = 0.01\n");
        assert!(matches!(
            validate_sim_config(&config),
            Err(SimError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn initial_capital_zero_fails() {
        assert_invalid("[simulation]\ninitial_capital = 0\n", "initial_capital");
    }

    #[test]
    fn initial_capital_not_a_number_fails() {
        assert_invalid("[simulation]\ninitial_capital = lots\n", "initial_capital");
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\nrisk_free_rate = 1.5\n",
            "risk_free_rate",
        );
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\nrisk_free_rate = -0.1\n",
            "risk_free_rate",
        );
    }

    #[test]
    fn zero_risk_limit_fails() {
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\n[risk]\nmax_position_size = 0\n",
            "max_position_size",
        );
    }

    #[test]
    fn zero_count_limit_fails() {
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\n[risk]\nmax_trades = 0\n",
            "max_trades",
        );
    }

    #[test]
    fn fractional_count_limit_fails() {
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\n[risk]\nmax_consecutive_loss_days = 2.5\n",
            "max_consecutive_loss_days",
        );
    }

    #[test]
    fn negative_cost_fails() {
        assert_invalid(
            "[simulation]\ninitial_capital = 1000\n[costs]\nslippage_rate = -0.001\n",
            "slippage_rate",
        );
    }

    #[test]
    fn negative_swap_is_allowed() {
        let config =
            make_config("[simulation]\ninitial_capital = 1000\n[costs]\nswap_short_rate = -0.01\n");
        assert!(validate_sim_config(&config).is_ok());
    }

    #[test]
    fn read_optional_f64_absent_is_none() {
        let config = make_config("[risk]\nmax_loss = 250\n");
        assert_eq!(read_optional_f64(&config, "risk", "max_drawdown").unwrap(), None);
        assert_eq!(read_optional_f64(&config, "risk", "max_loss").unwrap(), Some(250.0));
    }
}
