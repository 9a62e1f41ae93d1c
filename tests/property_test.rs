//! Property tests for causality, determinism and risk invariants.

mod common;

use common::*;
use proptest::prelude::*;
use regimetrader::domain::engine::evaluate_instrument;
use regimetrader::domain::indicator::IndicatorType;
use regimetrader::domain::indicator_cache::IndicatorCache;
use regimetrader::domain::signal::Direction;

const MIXED: &str = r#"
[strategy]
name = Mixed
entry_rules = trend_long, range_short, dip
exit_rules = trend_exit, range_exit

[rule:trend_long]
direction = long
tag = trend
when = AND(REGIME(TREND), CROSS_ABOVE(EMA(5), SMA(12)))

[rule:range_short]
direction = short
tag = range
when = AND(REGIME(RANGE), ABOVE(close, BOLLINGER_UPPER(10, 2)))

[rule:dip]
direction = long
tag = dip
when = AND(BELOW(RSI(6), 35), ANY_OF(ABOVE(volume, MUL(VOLUME_MEAN(8), 1.2)), 3))

[rule:trend_exit]
direction = long
tag = trend
when = CROSS_BELOW(EMA(5), SMA(12))

[rule:range_exit]
direction = short
tag = range
when = BELOW(close, BOLLINGER_MIDDLE(10, 2))

[regime]
indicator = ADX(6)
threshold = 22

[risk]
atr = ATR(5)
stop_multiplier = 1.5
trailing_multiplier = 2
trailing_offset = 0.005
loss_timeout_bars = 15
roi = 0:0.08, 10:0.02

[risk:dip]
early_exit = ABOVE(RSI(6), 60)
early_exit_reason = rsi_recovered
"#;

fn mixed_strategy() -> regimetrader::domain::strategy::Strategy {
    strategy_from_ini(MIXED)
}

/// Random walk with random ranges and volumes.
fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-3.0f64..3.0, 0.1f64..2.5, 0.1f64..2.5, 500.0f64..5000.0), 20..120)
        .prop_map(|steps| {
            let mut close = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (step, up, down, volume))| {
                    close = (close + step).max(5.0);
                    Bar {
                        timestamp: ts(i),
                        open: close,
                        high: close + up,
                        low: close - down,
                        close,
                        volume,
                    }
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn no_look_ahead(bars in arb_bars(), cut in 1usize..120) {
        let cut = cut.min(bars.len());
        let strategy = mixed_strategy();
        let full = evaluate_instrument(&strategy, "ETH/USDT", &bars);
        let prefix = evaluate_instrument(&strategy, "ETH/USDT", &bars[..cut]);
        prop_assert_eq!(&full.decisions[..cut], &prefix.decisions[..]);
    }

    #[test]
    fn evaluation_is_deterministic(bars in arb_bars()) {
        let strategy = mixed_strategy();
        let a = evaluate_instrument(&strategy, "ETH/USDT", &bars);
        let b = evaluate_instrument(&strategy, "ETH/USDT", &bars);
        prop_assert_eq!(a.decisions, b.decisions);
        prop_assert_eq!(a.trades, b.trades);
    }

    #[test]
    fn stops_only_tighten(bars in arb_bars()) {
        let report = evaluate_instrument(&mixed_strategy(), "ETH/USDT", &bars);
        let mut held: Option<(Direction, f64)> = None;
        for d in &report.decisions {
            match (d.stop_price, held) {
                (Some(stop), Some((direction, prev))) => {
                    match direction {
                        Direction::Long => prop_assert!(stop >= prev),
                        Direction::Short => prop_assert!(stop <= prev),
                        Direction::Flat => {}
                    }
                    held = Some((direction, stop));
                }
                (Some(stop), None) => held = Some((d.entry.direction, stop)),
                (None, _) => held = None,
            }
        }
    }

    #[test]
    fn positions_never_overlap(bars in arb_bars()) {
        let report = evaluate_instrument(&mixed_strategy(), "ETH/USDT", &bars);
        for pair in report.trades.windows(2) {
            prop_assert!(pair[1].entry_index > pair[0].exit_index);
        }
        for trade in &report.trades {
            prop_assert!(trade.exit_index > trade.entry_index);
        }
        if let (Some(last), Some(open)) = (report.trades.last(), &report.open_position) {
            prop_assert!(open.entry_index > last.exit_index);
        }
    }

    #[test]
    fn rsi_is_bounded(bars in arb_bars(), period in 2usize..20) {
        let t = IndicatorType::Rsi(period);
        let cache = IndicatorCache::build(&bars, &[t]);
        for i in 0..bars.len() {
            if let Some(v) = cache.simple(&t, i) {
                prop_assert!((0.0..=100.0).contains(&v), "RSI {} out of range at {}", v, i);
            }
        }
    }
}
