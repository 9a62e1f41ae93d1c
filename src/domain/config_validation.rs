//! Configuration validation.
//!
//! Validates every strategy, regime and risk field before evaluation runs,
//! plus the small value parsers shared with [`crate::domain::strategy`].

use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::rule::{IndicatorField, Operand};
use crate::domain::rule_parser;
use crate::domain::signal::{Side, TieBreak};
use crate::ports::config_port::ConfigPort;
use std::collections::{HashMap, HashSet};

pub const RULE_PREFIX: &str = "rule:";
pub const RISK_PREFIX: &str = "risk:";

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_strategy_section(config)?;
    let tags = validate_rule_sections(config)?;
    validate_regime(config)?;
    validate_risk_section(config, "risk")?;
    validate_tag_sections(config, &tags)?;
    Ok(())
}

/// Comma-separated list with blanks dropped.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn rule_section(name: &str) -> String {
    format!("{}{}", RULE_PREFIX, name.to_lowercase())
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn require(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, EngineError> {
    non_empty(config, section, key).ok_or_else(|| EngineError::missing(section, key))
}

pub(crate) fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, EngineError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(EngineError::invalid(
                section,
                key,
                format!("'{}' is not a number", s),
            )),
        },
    }
}

pub(crate) fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<usize>, EngineError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => s.parse::<usize>().map(Some).map_err(|_| {
            EngineError::invalid(
                section,
                key,
                format!("'{}' is not a non-negative integer", s),
            )
        }),
    }
}

/// Single indicator reference such as `ADX(14)`.
pub(crate) fn read_indicator(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: IndicatorType,
) -> Result<IndicatorType, EngineError> {
    let Some(text) = non_empty(config, section, key) else {
        return Ok(default);
    };
    match rule_parser::parse_operand(&text) {
        Ok(Operand::Indicator(r)) if r.field == IndicatorField::Value => Ok(r.indicator_type),
        Ok(_) => Err(EngineError::invalid(
            section,
            key,
            format!("'{}' is not a single-valued indicator", text),
        )),
        Err(e) => Err(EngineError::RuleParse {
            section: section.to_string(),
            source: e,
        }),
    }
}

/// `bars:ratio` pairs, e.g. `0:0.05, 60:0.03`, returned ascending by bars.
pub(crate) fn parse_roi(section: &str, value: &str) -> Result<Vec<(usize, f64)>, EngineError> {
    let mut table: Vec<(usize, f64)> = Vec::new();
    for entry in split_list(value) {
        let bad = || {
            EngineError::invalid(
                section,
                "roi",
                format!("malformed entry '{}', expected bars:ratio", entry),
            )
        };
        let (bars, ratio) = entry.split_once(':').ok_or_else(bad)?;
        let bars = bars.trim().parse::<usize>().map_err(|_| bad())?;
        let ratio = ratio.trim().parse::<f64>().map_err(|_| bad())?;
        if !ratio.is_finite() {
            return Err(bad());
        }
        if table.iter().any(|(b, _)| *b == bars) {
            return Err(EngineError::invalid(
                section,
                "roi",
                format!("duplicate entry for {} bars", bars),
            ));
        }
        table.push((bars, ratio));
    }
    table.sort_by_key(|(bars, _)| *bars);
    Ok(table)
}

/// `SYMBOL:threshold` pairs, e.g. `BTC/USDT:30`.
pub(crate) fn parse_overrides(
    section: &str,
    value: &str,
) -> Result<HashMap<String, f64>, EngineError> {
    let mut overrides = HashMap::new();
    for entry in split_list(value) {
        let bad = || {
            EngineError::invalid(
                section,
                "overrides",
                format!("malformed entry '{}', expected SYMBOL:threshold", entry),
            )
        };
        let (symbol, threshold) = entry.rsplit_once(':').ok_or_else(bad)?;
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(bad());
        }
        let threshold = threshold.trim().parse::<f64>().map_err(|_| bad())?;
        overrides.insert(symbol.to_string(), threshold);
    }
    Ok(overrides)
}

fn validate_strategy_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    require(config, "strategy", "name")?;
    let entries = split_list(&require(config, "strategy", "entry_rules")?);
    if entries.is_empty() {
        return Err(EngineError::missing("strategy", "entry_rules"));
    }
    if let Some(tie_break) = non_empty(config, "strategy", "tie_break") {
        tie_break
            .parse::<TieBreak>()
            .map_err(|reason| EngineError::invalid("strategy", "tie_break", reason))?;
    }
    Ok(())
}

/// Checks every referenced rule-set and returns the (lowercased) tags they emit.
fn validate_rule_sections(config: &dyn ConfigPort) -> Result<HashSet<String>, EngineError> {
    let mut tags = HashSet::new();
    for key in ["entry_rules", "exit_rules"] {
        let names = non_empty(config, "strategy", key)
            .map(|v| split_list(&v))
            .unwrap_or_default();
        for name in names {
            let section = rule_section(&name);
            if !config.sections().contains(&section) {
                return Err(EngineError::invalid(
                    "strategy",
                    key,
                    format!("unknown rule-set '{}'", name),
                ));
            }
            let direction = require(config, &section, "direction")?;
            direction
                .parse::<Side>()
                .map_err(|reason| EngineError::invalid(&section, "direction", reason))?;
            require(config, &section, "when")?;
            let tag = non_empty(config, &section, "tag").unwrap_or(name);
            tags.insert(tag.to_lowercase());
        }
    }
    Ok(tags)
}

fn validate_regime(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let indicator = read_indicator(config, "regime", "indicator", IndicatorType::Adx(14))?;
    let check = |key: &str, value: f64| {
        if indicator.is_oscillator() && !(0.0..=100.0).contains(&value) {
            return Err(EngineError::invalid(
                "regime",
                key,
                format!("{} threshold must be within [0, 100]", indicator),
            ));
        }
        Ok(())
    };
    if let Some(threshold) = read_f64(config, "regime", "threshold")? {
        check("threshold", threshold)?;
    }
    if let Some(value) = non_empty(config, "regime", "overrides") {
        for threshold in parse_overrides("regime", &value)?.values() {
            check("overrides", *threshold)?;
        }
    }
    Ok(())
}

fn validate_positive(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), EngineError> {
    if let Some(value) = read_f64(config, section, key)? {
        if value <= 0.0 {
            return Err(EngineError::invalid(
                section,
                key,
                format!("{} must be positive", key),
            ));
        }
    }
    Ok(())
}

fn validate_fraction(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), EngineError> {
    if let Some(value) = read_f64(config, section, key)? {
        if value <= 0.0 || value >= 1.0 {
            return Err(EngineError::invalid(
                section,
                key,
                format!("{} must be between 0 and 1", key),
            ));
        }
    }
    Ok(())
}

fn validate_early_exit(config: &dyn ConfigPort, section: &str) -> Result<(), EngineError> {
    if let Some(text) = non_empty(config, section, "early_exit") {
        rule_parser::parse(&text).map_err(|e| EngineError::RuleParse {
            section: section.to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn validate_risk_section(config: &dyn ConfigPort, section: &str) -> Result<(), EngineError> {
    let atr = read_indicator(config, section, "atr", IndicatorType::Atr(14))?;
    if !matches!(atr, IndicatorType::Atr(_)) {
        return Err(EngineError::invalid(
            section,
            "atr",
            format!("expected an ATR indicator, found {}", atr),
        ));
    }
    validate_positive(config, section, "stop_multiplier")?;
    validate_positive(config, section, "trailing_multiplier")?;
    if let Some(offset) = read_f64(config, section, "trailing_offset")? {
        if offset < 0.0 {
            return Err(EngineError::invalid(
                section,
                "trailing_offset",
                "trailing_offset must be non-negative",
            ));
        }
    }
    validate_fraction(config, section, "fallback_stop_pct")?;
    validate_fraction(config, section, "hard_stop_pct")?;
    validate_fraction(config, section, "trailing_pct")?;
    if read_usize(config, section, "loss_timeout_bars")? == Some(0) {
        return Err(EngineError::invalid(
            section,
            "loss_timeout_bars",
            "loss_timeout_bars must be at least 1",
        ));
    }
    if let Some(roi) = non_empty(config, section, "roi") {
        parse_roi(section, &roi)?;
    }
    validate_early_exit(config, section)?;
    Ok(())
}

fn validate_tag_sections(config: &dyn ConfigPort, tags: &HashSet<String>) -> Result<(), EngineError> {
    for section in config.sections() {
        let Some(tag) = section.strip_prefix(RISK_PREFIX) else {
            continue;
        };
        if !tags.contains(tag) {
            return Err(EngineError::UnknownTag {
                section: section.clone(),
                tag: tag.to_string(),
            });
        }
        validate_positive(config, &section, "stop_multiplier")?;
        validate_positive(config, &section, "trailing_multiplier")?;
        validate_fraction(config, &section, "trailing_pct")?;
        validate_early_exit(config, &section)?;
    }
    Ok(())
}
