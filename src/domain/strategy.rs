//! Strategy configuration and composition.
//!
//! A [`Strategy`] is an immutable bundle of prioritised entry/exit rule-sets,
//! the regime classifier settings and the risk parameters, resolved once at
//! load time from a [`ConfigPort`].

use crate::domain::config_validation::{
    RISK_PREFIX, parse_overrides, parse_roi, read_f64, read_indicator, read_usize, require,
    rule_section, split_list, validate_strategy_config,
};
use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::regime::RegimeConfig;
use crate::domain::risk::{DEFAULT_EARLY_EXIT_REASON, RiskConfig, TagRisk};
use crate::domain::rule::{Rule, extract_indicators};
use crate::domain::rule_parser;
use crate::domain::signal::{RuleSet, Side, TieBreak};
use crate::ports::config_port::ConfigPort;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    /// Priority order: the first matching set wins.
    pub entries: Vec<RuleSet>,
    pub exits: Vec<RuleSet>,
    pub tie_break: TieBreak,
    pub regime: RegimeConfig,
    pub risk: RiskConfig,
}

impl Strategy {
    fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.entries
            .iter()
            .chain(&self.exits)
            .map(|set| &set.rule)
            .chain(self.risk.early_exit_rules())
    }

    /// Every indicator series evaluation will read, without duplicates.
    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        let mut out = vec![self.regime.indicator, self.risk.atr];
        for rule in self.rules() {
            for t in extract_indicators(rule) {
                if !out.contains(&t) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// Longest warm-up among the required indicators.
    pub fn warmup(&self) -> usize {
        self.required_indicators()
            .iter()
            .map(IndicatorType::warmup)
            .max()
            .unwrap_or(0)
    }
}

fn parse_rule(section: &str, text: &str) -> Result<Rule, EngineError> {
    rule_parser::parse(text).map_err(|e| EngineError::RuleParse {
        section: section.to_string(),
        source: e,
    })
}

fn build_rule_sets(config: &dyn ConfigPort, key: &str) -> Result<Vec<RuleSet>, EngineError> {
    let names = config
        .get_string("strategy", key)
        .map(|v| split_list(&v))
        .unwrap_or_default();

    names
        .into_iter()
        .map(|name| -> Result<RuleSet, EngineError> {
            let section = rule_section(&name);
            let direction = require(config, &section, "direction")?
                .parse::<Side>()
                .map_err(|reason| EngineError::invalid(&section, "direction", reason))?;
            let rule = parse_rule(&section, &require(config, &section, "when")?)?;
            let tag = config
                .get_string(&section, "tag")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| name.clone())
                .to_lowercase();
            Ok(RuleSet {
                name,
                direction,
                tag,
                rule,
            })
        })
        .collect()
}

fn build_regime(config: &dyn ConfigPort) -> Result<RegimeConfig, EngineError> {
    let defaults = RegimeConfig::default();
    Ok(RegimeConfig {
        indicator: read_indicator(config, "regime", "indicator", defaults.indicator)?,
        threshold: read_f64(config, "regime", "threshold")?.unwrap_or(defaults.threshold),
        overrides: match config.get_string("regime", "overrides") {
            Some(value) => parse_overrides("regime", &value)?,
            None => HashMap::new(),
        },
    })
}

fn build_tag_risk(
    config: &dyn ConfigPort,
    section: &str,
    base: &TagRisk,
) -> Result<TagRisk, EngineError> {
    let early_exit = match config.get_string(section, "early_exit") {
        Some(text) if !text.trim().is_empty() => Some(parse_rule(section, &text)?),
        _ => base.early_exit.clone(),
    };
    Ok(TagRisk {
        stop_multiplier: read_f64(config, section, "stop_multiplier")?
            .unwrap_or(base.stop_multiplier),
        trailing_multiplier: read_f64(config, section, "trailing_multiplier")?
            .unwrap_or(base.trailing_multiplier),
        trailing_pct: read_f64(config, section, "trailing_pct")?.or(base.trailing_pct),
        early_exit,
        early_exit_reason: config
            .get_string(section, "early_exit_reason")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| base.early_exit_reason.clone()),
    })
}

fn build_risk(config: &dyn ConfigPort) -> Result<RiskConfig, EngineError> {
    let defaults = RiskConfig::default();
    let default = build_tag_risk(config, "risk", &defaults.default)?;

    let mut tags = HashMap::new();
    for section in config.sections() {
        if let Some(tag) = section.strip_prefix(RISK_PREFIX) {
            tags.insert(tag.to_string(), build_tag_risk(config, &section, &default)?);
        }
    }

    Ok(RiskConfig {
        atr: read_indicator(config, "risk", "atr", defaults.atr)?,
        trailing_offset: read_f64(config, "risk", "trailing_offset")?
            .unwrap_or(defaults.trailing_offset),
        fallback_stop_pct: read_f64(config, "risk", "fallback_stop_pct")?
            .unwrap_or(defaults.fallback_stop_pct),
        hard_stop_pct: read_f64(config, "risk", "hard_stop_pct")?,
        loss_timeout_bars: read_usize(config, "risk", "loss_timeout_bars")?,
        roi: match config.get_string("risk", "roi") {
            Some(value) => parse_roi("risk", &value)?,
            None => Vec::new(),
        },
        default,
        tags,
    })
}

/// Validate and resolve a complete strategy from configuration.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, EngineError> {
    validate_strategy_config(config)?;

    let tie_break = match config.get_string("strategy", "tie_break") {
        Some(value) if !value.trim().is_empty() => value
            .parse::<TieBreak>()
            .map_err(|reason| EngineError::invalid("strategy", "tie_break", reason))?,
        _ => TieBreak::default(),
    };

    Ok(Strategy {
        name: require(config, "strategy", "name")?,
        description: config
            .get_string("strategy", "description")
            .unwrap_or_default(),
        entries: build_rule_sets(config, "entry_rules")?,
        exits: build_rule_sets(config, "exit_rules")?,
        tie_break,
        regime: build_regime(config)?,
        risk: build_risk(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::regime::Regime;

    const CONFIG: &str = r#"
[strategy]
name = Regime Switch
description = Bollinger breakout in ranges, EMA trend following in trends
entry_rules = breakout, trend
exit_rules = trend_exit
tie_break = entry_wins

[rule:breakout]
direction = long
tag = Breakout
when = AND(REGIME(RANGE), CROSS_ABOVE(close, BOLLINGER_UPPER(20, 2)))

[rule:trend]
direction = long
when = AND(REGIME(TREND), CROSS_ABOVE(EMA(10), EMA(30)))

[rule:trend_exit]
direction = long
tag = trend
when = CROSS_BELOW(EMA(10), EMA(30))

[regime]
indicator = ADX(14)
threshold = 25
overrides = BTC/USDT:30

[risk]
atr = ATR(14)
stop_multiplier = 2
trailing_multiplier = 3
roi = 60:0.03, 0:0.05
loss_timeout_bars = 48

[risk:trend]
trailing_multiplier = 4
trailing_pct = 0.01
early_exit = BELOW(RSI(14), 50)
early_exit_reason = rsi_profit_take
"#;

    fn strategy() -> Strategy {
        build_strategy(&FileConfigAdapter::from_string(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn builds_rule_sets_in_priority_order() {
        let s = strategy();
        assert_eq!(s.name, "Regime Switch");
        let names: Vec<&str> = s.entries.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["breakout", "trend"]);
        assert_eq!(s.entries[0].tag, "breakout");
        assert_eq!(s.entries[1].tag, "trend");
        assert_eq!(s.entries[1].direction, Side::Long);
        assert_eq!(s.exits.len(), 1);
        assert_eq!(s.tie_break, TieBreak::EntryWins);
    }

    #[test]
    fn builds_regime_config() {
        let s = strategy();
        assert_eq!(s.regime.indicator, IndicatorType::Adx(14));
        assert_eq!(s.regime.threshold_for("BTC/USDT"), 30.0);
        assert_eq!(s.regime.threshold_for("ETH/USDT"), 25.0);
        assert!(matches!(
            &s.entries[0].rule,
            Rule::And(children) if children[0] == Rule::Regime(Regime::Range)
        ));
    }

    #[test]
    fn tag_risk_inherits_from_base() {
        let s = strategy();
        let trend = s.risk.for_tag("trend");
        assert_eq!(trend.stop_multiplier, 2.0);
        assert_eq!(trend.trailing_multiplier, 4.0);
        assert_eq!(trend.trailing_pct, Some(0.01));
        assert_eq!(trend.early_exit_reason, "rsi_profit_take");
        assert!(trend.early_exit.is_some());

        let breakout = s.risk.for_tag("breakout");
        assert_eq!(breakout.trailing_multiplier, 3.0);
        assert_eq!(breakout.trailing_pct, None);
        assert!(breakout.early_exit.is_none());
        assert_eq!(breakout.early_exit_reason, DEFAULT_EARLY_EXIT_REASON);
    }

    #[test]
    fn risk_table_values() {
        let s = strategy();
        assert_eq!(s.risk.roi, vec![(0, 0.05), (60, 0.03)]);
        assert_eq!(s.risk.loss_timeout_bars, Some(48));
        assert_eq!(s.risk.fallback_stop_pct, 0.99);
        assert_eq!(s.risk.hard_stop_pct, None);
    }

    #[test]
    fn required_indicators_cover_rules_and_risk() {
        let s = strategy();
        let required = s.required_indicators();
        for t in [
            IndicatorType::Adx(14),
            IndicatorType::Atr(14),
            IndicatorType::Ema(10),
            IndicatorType::Ema(30),
            IndicatorType::Rsi(14),
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 200,
            },
        ] {
            assert!(required.contains(&t), "missing {}", t);
        }
        assert_eq!(required.len(), 6);
        // EMA(30) outlasts ADX(14)
        assert_eq!(s.warmup(), 29);
    }

    #[test]
    fn defaults_when_sections_absent() {
        let config = FileConfigAdapter::from_string(
            "[strategy]\nname = x\nentry_rules = a\n[rule:a]\ndirection = short\nwhen = ABOVE(close, 1)\n",
        )
        .unwrap();
        let s = build_strategy(&config).unwrap();
        assert_eq!(s.tie_break, TieBreak::ExitWins);
        assert_eq!(s.regime, RegimeConfig::default());
        assert_eq!(s.risk, RiskConfig::default());
        assert_eq!(s.entries[0].tag, "a");
        assert_eq!(s.entries[0].direction, Side::Short);
        assert!(s.exits.is_empty());
    }

    #[test]
    fn rule_parse_error_names_section() {
        let config = FileConfigAdapter::from_string(
            "[strategy]\nname = x\nentry_rules = a\n[rule:a]\ndirection = long\nwhen = ABOVE(close 1)\n",
        )
        .unwrap();
        let err = build_strategy(&config).unwrap_err();
        match err {
            EngineError::RuleParse { section, source } => {
                assert_eq!(section, "rule:a");
                assert!(source.message.contains("expected ','"));
            }
            other => panic!("expected RuleParse, got {:?}", other),
        }
    }
}
