//! Configuration validation.
//!
//! Checks every section before any market data is touched.

use crate::domain::error::PortoptError;
use crate::domain::frontier::MAX_SAMPLES;
use crate::domain::price_history::GapPolicy;
use crate::domain::request::parse_date;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::{parse_bool, ConfigPort};
use chrono::NaiveDate;
use std::str::FromStr;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_assets(config)?;
    validate_dates(config)?;
    validate_risk_max(config)?;
    validate_data(config)?;
    validate_optimizer(config)?;
    validate_frontier(config)?;
    validate_report(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PortoptError {
    PortoptError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, PortoptError> {
    config
        .get_non_empty(section, key)
        .ok_or_else(|| PortoptError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

/// Parse an optional value; absent keys yield `None`, malformed ones an error.
pub fn optional<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, PortoptError> {
    match config.get_non_empty(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("cannot parse {:?}", raw))),
    }
}

pub fn required_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, PortoptError> {
    let raw = required(config, "portfolio", key)?;
    parse_date(&raw).ok_or_else(|| {
        invalid(
            "portfolio",
            key,
            format!("invalid {} {:?}, expected DD/MM/YYYY or YYYY-MM-DD", key, raw),
        )
    })
}

pub fn gap_policy(config: &dyn ConfigPort) -> Result<GapPolicy, PortoptError> {
    match config.get_non_empty("data", "gap_policy") {
        None => Ok(GapPolicy::ForwardFill),
        Some(raw) => GapPolicy::parse(&raw).ok_or_else(|| {
            invalid("data", "gap_policy", "gap_policy must be forward_fill or fail")
        }),
    }
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let raw = required(config, "portfolio", "assets")?;
    parse_assets(&raw).map_err(|e| invalid("portfolio", "assets", e.to_string()))?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let start_date = required_date(config, "start_date")?;
    let end_date = required_date(config, "end_date")?;
    if start_date >= end_date {
        return Err(invalid(
            "portfolio",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_risk_max(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let raw = required(config, "portfolio", "risk_max")?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(()),
        _ => Err(invalid(
            "portfolio",
            "risk_max",
            "risk_max must be a positive number",
        )),
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    required(config, "data", "path")?;
    gap_policy(config)?;
    Ok(())
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    for key in ["max_iterations", "max_inner_iterations"] {
        if optional::<usize>(config, "optimizer", key)? == Some(0) {
            return Err(invalid("optimizer", key, format!("{} must be at least 1", key)));
        }
    }
    if let Some(tol) = optional::<f64>(config, "optimizer", "tolerance")? {
        if !tol.is_finite() || tol <= 0.0 {
            return Err(invalid("optimizer", "tolerance", "tolerance must be positive"));
        }
    }
    Ok(())
}

fn validate_frontier(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    if let Some(samples) = optional::<usize>(config, "frontier", "samples")? {
        if samples == 0 || samples > MAX_SAMPLES {
            return Err(invalid(
                "frontier",
                "samples",
                format!("samples must be between 1 and {}", MAX_SAMPLES),
            ));
        }
    }
    optional::<u64>(config, "frontier", "seed")?;
    Ok(())
}

fn validate_report(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    if let Some(window) = optional::<usize>(config, "report", "rolling_window")? {
        if window < 2 {
            return Err(invalid(
                "report",
                "rolling_window",
                "rolling_window must be at least 2",
            ));
        }
    }
    if let Some(raw) = config.get_non_empty("report", "include_weights") {
        if parse_bool(&raw).is_none() {
            return Err(invalid(
                "report",
                "include_weights",
                format!("cannot parse {:?}, expected true/false, yes/no or 1/0", raw),
            ));
        }
    }
    Ok(())
}
