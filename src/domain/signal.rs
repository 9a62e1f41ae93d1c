//! Entry/exit signal generation from prioritised rule-sets.

use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::ohlcv::Bar;
use crate::domain::regime::Regime;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::{EvalContext, evaluate};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

impl Direction {
    pub fn side(self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Flat => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
            Direction::Flat => write!(f, "flat"),
        }
    }
}

/// A named predicate that emits a tagged signal when it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub name: String,
    /// For entry sets the side to open; for exit sets the side to close.
    pub direction: Side,
    pub tag: String,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub bar_index: usize,
    pub direction: Direction,
    pub tag: Option<String>,
}

impl Signal {
    pub fn flat(bar_index: usize) -> Self {
        Self {
            bar_index,
            direction: Direction::Flat,
            tag: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub bar_index: usize,
    pub side: Side,
    pub tag: String,
}

/// Which signal survives when an entry and an exit fire on the same bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    #[default]
    ExitWins,
    EntryWins,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit_wins" => Ok(TieBreak::ExitWins),
            "entry_wins" => Ok(TieBreak::EntryWins),
            other => Err(format!(
                "unknown tie_break '{}' (expected exit_wins or entry_wins)",
                other
            )),
        }
    }
}

/// At most one exit per side; a long and a short exit may fire together.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSignals {
    pub entry: Signal,
    pub exits: Vec<ExitSignal>,
}

impl BarSignals {
    pub fn exit_for(&self, side: Side) -> Option<&ExitSignal> {
        self.exits.iter().find(|e| e.side == side)
    }
}

/// Evaluates entry and exit rule-sets for one instrument's history.
pub struct SignalEvaluator<'a> {
    entries: &'a [RuleSet],
    exits: &'a [RuleSet],
    tie_break: TieBreak,
    bars: &'a [Bar],
    indicators: &'a IndicatorCache,
    regimes: &'a [Option<Regime>],
}

impl<'a> SignalEvaluator<'a> {
    pub fn new(
        entries: &'a [RuleSet],
        exits: &'a [RuleSet],
        tie_break: TieBreak,
        bars: &'a [Bar],
        indicators: &'a IndicatorCache,
        regimes: &'a [Option<Regime>],
    ) -> Self {
        Self {
            entries,
            exits,
            tie_break,
            bars,
            indicators,
            regimes,
        }
    }

    pub fn context<'b>(&'b self, instrument: &'b str) -> EvalContext<'b> {
        EvalContext {
            bars: self.bars,
            indicators: self.indicators,
            regimes: self.regimes,
            instrument,
        }
    }

    /// First matching rule-set for `side` in priority order, if any.
    fn first_match(
        sets: &'a [RuleSet],
        side: Option<Side>,
        ctx: &EvalContext<'_>,
        bar_index: usize,
    ) -> Option<&'a RuleSet> {
        sets.iter()
            .filter(|set| side.is_none_or(|s| set.direction == s))
            .find(|set| evaluate(&set.rule, ctx, bar_index))
    }

    pub fn evaluate(&self, bar_index: usize, instrument: &str) -> BarSignals {
        let ctx = self.context(instrument);
        let mut entry = Self::first_match(self.entries, None, &ctx, bar_index);
        let mut exits: Vec<&RuleSet> = [Side::Long, Side::Short]
            .into_iter()
            .filter_map(|side| Self::first_match(self.exits, Some(side), &ctx, bar_index))
            .collect();

        // Only an exit on the entry's own side conflicts with it.
        if let Some(set) = entry {
            if exits.iter().any(|x| x.direction == set.direction) {
                match self.tie_break {
                    TieBreak::ExitWins => entry = None,
                    TieBreak::EntryWins => exits.retain(|x| x.direction != set.direction),
                }
            }
        }

        let entry = match entry {
            Some(set) => {
                debug!(
                    instrument,
                    bar_index,
                    rule_set = %set.name,
                    tag = %set.tag,
                    direction = %set.direction,
                    "entry signal"
                );
                Signal {
                    bar_index,
                    direction: set.direction.into(),
                    tag: Some(set.tag.clone()),
                }
            }
            None => Signal::flat(bar_index),
        };

        let exits = exits
            .into_iter()
            .map(|set| {
                debug!(
                    instrument,
                    bar_index,
                    rule_set = %set.name,
                    tag = %set.tag,
                    side = %set.direction,
                    "exit signal"
                );
                ExitSignal {
                    bar_index,
                    side: set.direction,
                    tag: set.tag.clone(),
                }
            })
            .collect();

        BarSignals { entry, exits }
    }
}
