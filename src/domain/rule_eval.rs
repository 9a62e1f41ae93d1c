//! Rule evaluation engine.
//!
//! Evaluates rules against bars, cached indicator values and per-bar regime
//! labels.
//!
//! # Evaluation Semantics
//!
//! Every node evaluates to `Option<bool>`; `None` means the node touched an
//! undefined value (warm-up, missing history, unknown series). The public
//! [`evaluate`] treats `None` as `false`.
//!
//! - Comparison rules: Evaluate at the given bar index
//! - `CROSS_ABOVE`/`CROSS_BELOW`: Compare bar `i-1` with bar `i`; undefined at index 0
//! - `AND`: Short-circuits on the first `false` or undefined child
//! - `OR`: `true` if any child is `true`, otherwise undefined if any child is
//! - `NOT`: Undefined stays undefined
//! - `CONSECUTIVE(rule, N)`: Child must be true for N consecutive bars ending at current
//! - `ANY_OF(rule, N)`: Child must be true at least once in the last N bars
//! - `REGIME(label)`: Undefined while the regime indicator is warming up
//! - `PAIR(symbol)`: Exact match on the instrument symbol

use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::ohlcv::Bar;
use crate::domain::regime::Regime;
use crate::domain::rule::{Operand, Rule};

const EPSILON: f64 = 1e-9;

/// Everything a rule may read for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub bars: &'a [Bar],
    pub indicators: &'a IndicatorCache,
    pub regimes: &'a [Option<Regime>],
    pub instrument: &'a str,
}

pub fn evaluate(rule: &Rule, ctx: &EvalContext<'_>, bar_index: usize) -> bool {
    evaluate_defined(rule, ctx, bar_index) == Some(true)
}

/// Three-valued evaluation; `None` when the result depends on an undefined value.
pub fn evaluate_defined(rule: &Rule, ctx: &EvalContext<'_>, bar_index: usize) -> Option<bool> {
    match rule {
        Rule::CrossAbove { left, right } => {
            let (left_prev, right_prev, left_curr, right_curr) =
                crossing_values(left, right, ctx, bar_index)?;
            Some(left_prev <= right_prev && left_curr > right_curr)
        }
        Rule::CrossBelow { left, right } => {
            let (left_prev, right_prev, left_curr, right_curr) =
                crossing_values(left, right, ctx, bar_index)?;
            Some(left_prev >= right_prev && left_curr < right_curr)
        }
        Rule::Above { left, right } => {
            let left_val = resolve_operand(left, ctx, bar_index)?;
            let right_val = resolve_operand(right, ctx, bar_index)?;
            Some(left_val > right_val)
        }
        Rule::Below { left, right } => {
            let left_val = resolve_operand(left, ctx, bar_index)?;
            let right_val = resolve_operand(right, ctx, bar_index)?;
            Some(left_val < right_val)
        }
        Rule::Between {
            operand,
            lower,
            upper,
        } => {
            let val = resolve_operand(operand, ctx, bar_index)?;
            Some(val >= *lower && val <= *upper)
        }
        Rule::Equals { left, right } => {
            let left_val = resolve_operand(left, ctx, bar_index)?;
            let right_val = resolve_operand(right, ctx, bar_index)?;
            Some((left_val - right_val).abs() < EPSILON)
        }
        Rule::And(rules) => {
            for r in rules {
                if !evaluate_defined(r, ctx, bar_index)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        Rule::Or(rules) => {
            let mut undefined = false;
            for r in rules {
                match evaluate_defined(r, ctx, bar_index) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => undefined = true,
                }
            }
            if undefined { None } else { Some(false) }
        }
        Rule::Not(rule) => evaluate_defined(rule, ctx, bar_index).map(|v| !v),
        Rule::Consecutive { rule, count } => {
            if *count == 0 || bar_index + 1 < *count {
                return None;
            }
            let mut undefined = false;
            for i in (bar_index + 1 - *count)..=bar_index {
                match evaluate_defined(rule, ctx, i) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => undefined = true,
                }
            }
            if undefined { None } else { Some(true) }
        }
        Rule::AnyOf { rule, count } => {
            if *count == 0 {
                return None;
            }
            let start = bar_index.saturating_sub(*count - 1);
            let mut undefined = false;
            for i in start..=bar_index {
                match evaluate_defined(rule, ctx, i) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => undefined = true,
                }
            }
            if undefined { None } else { Some(false) }
        }
        Rule::Regime(expected) => {
            let label = ctx.regimes.get(bar_index).copied().flatten()?;
            Some(label == *expected)
        }
        Rule::Pair(symbol) => Some(ctx.instrument == symbol),
    }
}

fn crossing_values(
    left: &Operand,
    right: &Operand,
    ctx: &EvalContext<'_>,
    bar_index: usize,
) -> Option<(f64, f64, f64, f64)> {
    let prev = bar_index.checked_sub(1)?;
    Some((
        resolve_operand(left, ctx, prev)?,
        resolve_operand(right, ctx, prev)?,
        resolve_operand(left, ctx, bar_index)?,
        resolve_operand(right, ctx, bar_index)?,
    ))
}

/// Value of an operand at `bar_index`, or `None` when undefined there.
pub fn resolve_operand(operand: &Operand, ctx: &EvalContext<'_>, bar_index: usize) -> Option<f64> {
    let value = match operand {
        Operand::Open => ctx.bars.get(bar_index)?.open,
        Operand::High => ctx.bars.get(bar_index)?.high,
        Operand::Low => ctx.bars.get(bar_index)?.low,
        Operand::Close => ctx.bars.get(bar_index)?.close,
        Operand::Volume => ctx.bars.get(bar_index)?.volume,
        Operand::Constant(v) => *v,
        Operand::Indicator(ind_ref) => {
            ctx.indicators
                .value(&ind_ref.indicator_type, ind_ref.field, bar_index)?
        }
        Operand::Prev(inner) => resolve_operand(inner, ctx, bar_index.checked_sub(1)?)?,
        Operand::Scaled { operand, factor } => resolve_operand(operand, ctx, bar_index)? * factor,
    };
    value.is_finite().then_some(value)
}
