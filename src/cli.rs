//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{rule_section, split_list};
use crate::domain::engine::{BarDecision, UniverseReport, run_universe};
use crate::domain::error::EngineError;
use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::position::ClosedTrade;
use crate::domain::rule::Operand;
use crate::domain::rule_eval::{EvalContext, resolve_operand};
use crate::domain::rule_parser;
use crate::domain::signal::RuleSet;
use crate::domain::strategy::{Strategy, build_strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "regimetrader", about = "Multi-regime strategy evaluation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a strategy over CSV bar data
    Evaluate {
        #[arg(short, long)]
        strategy: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Comma-separated instruments; defaults to every CSV in the data directory
        #[arg(short, long)]
        instruments: Option<String>,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Print indicator series for one instrument as CSV
    Indicators {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        instrument: String,
        /// Operand expressions, e.g. `SMA(20)` or `BOLLINGER_UPPER(20, 2)`
        #[arg(required = true)]
        expressions: Vec<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Evaluate {
            strategy,
            data,
            instruments,
            output,
        } => run_evaluate(&strategy, &data, instruments.as_deref(), &output),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Indicators {
            data,
            instrument,
            expressions,
        } => run_indicators(&data, &instrument, &expressions),
    }
}

fn fail(err: &EngineError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EngineError> {
    FileConfigAdapter::from_file(path).map_err(|e| EngineError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn load_strategy(path: &Path) -> Result<Strategy, EngineError> {
    build_strategy(&load_config(path)?)
}

/// Explicit instrument list, or everything the data port knows about.
pub fn resolve_instruments(
    instruments: Option<&str>,
    data: &dyn DataPort,
) -> Result<Vec<String>, EngineError> {
    match instruments {
        Some(list) => Ok(split_list(list)),
        None => data.list_instruments(),
    }
}

/// Runs the strategy over every instrument and writes the report. Returns
/// the universe result so callers can inspect it.
pub fn run_evaluate_pipeline(
    strategy: &Strategy,
    data: &dyn DataPort,
    report: &dyn ReportPort,
    instruments: &[String],
) -> Result<UniverseReport, EngineError> {
    let result = run_universe(strategy, data, instruments);
    if result.reports.is_empty() {
        return Err(match result.failures.into_iter().next() {
            Some((_, err)) => err,
            None => EngineError::NoData {
                instrument: instruments.join(","),
            },
        });
    }

    let decisions: Vec<BarDecision> = result.decisions().cloned().collect();
    let trades: Vec<ClosedTrade> = result.trades().cloned().collect();
    report.write_decisions(&decisions)?;
    report.write_trades(&trades)?;
    Ok(result)
}

fn print_summary(strategy: &Strategy, result: &UniverseReport) {
    eprintln!("\n=== {} ===", strategy.name);
    for r in &result.reports {
        let wins = r.trades.iter().filter(|t| t.profit_ratio > 0.0).count();
        let total: f64 = r.trades.iter().map(|t| t.profit_ratio).sum();
        eprintln!(
            "  {}:  {} bars, {} trades, {} winners, {:+.2}% summed{}",
            r.instrument,
            r.decisions.len(),
            r.trades.len(),
            wins,
            total * 100.0,
            if r.open_position.is_some() {
                ", position open"
            } else {
                ""
            },
        );
    }
    for (instrument, err) in &result.failures {
        eprintln!("  {}:  skipped ({})", instrument, err);
    }
}

fn run_evaluate(
    strategy_path: &Path,
    data_path: &Path,
    instruments: Option<&str>,
    output: &Path,
) -> ExitCode {
    let strategy = match load_strategy(strategy_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let data = CsvAdapter::new(data_path.to_path_buf());
    let instruments = match resolve_instruments(instruments, &data) {
        Ok(list) => list,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Evaluating {} over {} instrument(s), warm-up {} bars",
        strategy.name,
        instruments.len(),
        strategy.warmup()
    );

    let report = CsvReportAdapter::new(output.to_path_buf());
    match run_evaluate_pipeline(&strategy, &data, &report, &instruments) {
        Ok(result) => {
            print_summary(&strategy, &result);
            eprintln!("\nResults written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn print_rule_sets(label: &str, sets: &[RuleSet], adapter: &FileConfigAdapter) {
    eprintln!("\n{} rule-sets (priority order):", label);
    for (i, set) in sets.iter().enumerate() {
        let raw = adapter
            .get_string(&rule_section(&set.name), "when")
            .unwrap_or_default();
        eprintln!(
            "  {}. {} [{} / tag {}]",
            i + 1,
            set.name,
            set.direction,
            set.tag
        );
        eprintln!("     {}", raw.trim());
    }
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = match load_config(strategy_path) {
        Ok(a) => a,
        Err(e) => return fail(&e),
    };

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => {
            if let EngineError::RuleParse { section, source } = &e {
                let raw = adapter
                    .get_string(section, "when")
                    .or_else(|| adapter.get_string(section, "early_exit"))
                    .unwrap_or_default();
                eprintln!("  {}", source.display_with_context(&raw));
            }
            return fail(&e);
        }
    };

    print_rule_sets("Entry", &strategy.entries, &adapter);
    print_rule_sets("Exit", &strategy.exits, &adapter);
    eprintln!(
        "\nRegime: {} (threshold {})",
        strategy.regime.indicator, strategy.regime.threshold
    );
    eprintln!("Risk ATR: {}", strategy.risk.atr);
    eprintln!("Warm-up: {} bars", strategy.warmup());
    eprintln!("\nStrategy configuration is valid.");
    ExitCode::SUCCESS
}

fn parse_expressions(expressions: &[String]) -> Result<Vec<Operand>, EngineError> {
    expressions
        .iter()
        .map(|expr| {
            rule_parser::parse_operand(expr).map_err(|e| {
                eprintln!("  {}", e.display_with_context(expr));
                EngineError::RuleParse {
                    section: "indicators".into(),
                    source: e,
                }
            })
        })
        .collect()
}

/// Writes one CSV row per bar; undefined values are empty cells.
pub fn write_indicator_table<W: Write>(
    out: W,
    data: &dyn DataPort,
    instrument: &str,
    expressions: &[String],
) -> Result<(), EngineError> {
    let operands = parse_expressions(expressions)?;
    let bars = data.fetch_bars(instrument)?;

    let mut types = Vec::new();
    for op in &operands {
        for t in op.indicators() {
            if !types.contains(&t) {
                types.push(t);
            }
        }
    }
    let cache = IndicatorCache::build(&bars, &types);
    let ctx = EvalContext {
        bars: &bars,
        indicators: &cache,
        regimes: &[],
        instrument,
    };

    let mut wtr = csv::Writer::from_writer(out);
    let mut header = vec!["timestamp".to_string()];
    header.extend(expressions.iter().map(|e| e.trim().to_string()));
    wtr.write_record(&header).map_err(io::Error::from)?;

    for (i, bar) in bars.iter().enumerate() {
        let mut row = vec![bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
        row.extend(
            operands
                .iter()
                .map(|op| resolve_operand(op, &ctx, i).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row).map_err(io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_indicators(data_path: &Path, instrument: &str, expressions: &[String]) -> ExitCode {
    let data = CsvAdapter::new(data_path.to_path_buf());
    match write_indicator_table(io::stdout().lock(), &data, instrument, expressions) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}
