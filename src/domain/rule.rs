//! Rule AST data structures.
//!
//! This module defines the abstract syntax tree for trading rules:
//! - `Operand`: What can be compared (price fields, constants, indicators,
//!   lagged and scaled operands)
//! - `IndicatorRef`: Reference to an indicator with a specific field
//! - `IndicatorField`: Which field of a multi-value indicator to use
//! - `Rule`: The rule AST with comparison, composite, temporal and context
//!   (regime, instrument) variants

use crate::domain::indicator::IndicatorType;
use crate::domain::regime::Regime;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Volume,
    Constant(f64),
    Indicator(IndicatorRef),
    /// Value of the inner operand one bar earlier.
    Prev(Box<Operand>),
    Scaled {
        operand: Box<Operand>,
        factor: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRef {
    pub indicator_type: IndicatorType,
    pub field: IndicatorField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Value,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    CrossAbove {
        left: Operand,
        right: Operand,
    },
    CrossBelow {
        left: Operand,
        right: Operand,
    },
    Above {
        left: Operand,
        right: Operand,
    },
    Below {
        left: Operand,
        right: Operand,
    },
    Between {
        operand: Operand,
        lower: f64,
        upper: f64,
    },
    Equals {
        left: Operand,
        right: Operand,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Consecutive {
        rule: Box<Rule>,
        count: usize,
    },
    AnyOf {
        rule: Box<Rule>,
        count: usize,
    },
    Regime(Regime),
    Pair(String),
}

impl Operand {
    fn collect_indicators(&self, out: &mut Vec<IndicatorType>) {
        match self {
            Operand::Indicator(r) => {
                if !out.contains(&r.indicator_type) {
                    out.push(r.indicator_type);
                }
            }
            Operand::Prev(inner) => inner.collect_indicators(out),
            Operand::Scaled { operand, .. } => operand.collect_indicators(out),
            _ => {}
        }
    }

    pub fn indicators(&self) -> Vec<IndicatorType> {
        let mut out = Vec::new();
        self.collect_indicators(&mut out);
        out
    }

    /// How many bars back this operand reads.
    pub fn lookback(&self) -> usize {
        match self {
            Operand::Prev(inner) => 1 + inner.lookback(),
            Operand::Scaled { operand, .. } => operand.lookback(),
            _ => 0,
        }
    }
}

impl Rule {
    fn collect_indicators(&self, out: &mut Vec<IndicatorType>) {
        match self {
            Rule::CrossAbove { left, right }
            | Rule::CrossBelow { left, right }
            | Rule::Above { left, right }
            | Rule::Below { left, right }
            | Rule::Equals { left, right } => {
                left.collect_indicators(out);
                right.collect_indicators(out);
            }
            Rule::Between { operand, .. } => operand.collect_indicators(out),
            Rule::And(rules) | Rule::Or(rules) => {
                for r in rules {
                    r.collect_indicators(out);
                }
            }
            Rule::Not(inner) => inner.collect_indicators(out),
            Rule::Consecutive { rule, .. } | Rule::AnyOf { rule, .. } => {
                rule.collect_indicators(out)
            }
            Rule::Regime(_) | Rule::Pair(_) => {}
        }
    }

    /// True if any node depends on the regime label.
    pub fn uses_regime(&self) -> bool {
        match self {
            Rule::Regime(_) => true,
            Rule::And(rules) | Rule::Or(rules) => rules.iter().any(Rule::uses_regime),
            Rule::Not(inner) => inner.uses_regime(),
            Rule::Consecutive { rule, .. } | Rule::AnyOf { rule, .. } => rule.uses_regime(),
            _ => false,
        }
    }
}

/// Every indicator a rule reads, in first-seen order without duplicates.
pub fn extract_indicators(rule: &Rule) -> Vec<IndicatorType> {
    let mut out = Vec::new();
    rule.collect_indicators(&mut out);
    out
}
