//! CLI definition and dispatch.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{BacktestOptions, BacktestResult, WARMUP_BARS};
use crate::domain::condition::Operand;
use crate::domain::condition_parser;
use crate::domain::config_validation::{
    read_bool, read_conditions, read_date, read_f64, read_required, read_template,
    read_time_filter, read_usize, validate_backtest_config, validate_strategy_config,
};
use crate::domain::engine::StrategyEngine;
use crate::domain::error::TradelabError;
use crate::domain::indicator::IndicatorField;
use crate::domain::indicator_helpers::compute_indicator;
use crate::domain::pattern::candlestick::{
    CandlestickDetector, PatternDetection, PatternSignal, get_pattern_signal,
};
use crate::domain::pattern::chart::{ChartPattern, ChartPatternDetector};
use crate::domain::signals::{SignalSettings, combined_signals};
use crate::domain::strategy::{MarketConditions, RiskManagement, Strategy, StrategyConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tradelab", about = "Technical indicators, patterns and strategy backtesting")]
pub struct Cli {
    /// Debug-level logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest from an INI configuration
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write a JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compute one indicator over a CSV file, e.g. --spec "MACD(12,26,9)"
    Indicator {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        spec: String,
    },
    /// Detect candlestick and chart patterns in a CSV file
    Patterns {
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Crossover signals over a CSV file
    Signals {
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List the symbols available in a data directory
    Symbols {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Indicator { data, spec } => run_indicator(&data, &spec),
        Command::Patterns { data } => run_patterns(&data),
        Command::Signals { data } => run_signals(&data),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Symbols { data_dir } => run_symbols(data_dir),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradelabError> {
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_options(config: &dyn ConfigPort) -> Result<BacktestOptions, TradelabError> {
    let defaults = BacktestOptions::default();
    Ok(BacktestOptions {
        start_date: read_date(config, "backtest", "start_date")?,
        end_date: read_date(config, "backtest", "end_date")?,
        initial_capital: read_f64(config, "backtest", "initial_capital", defaults.initial_capital)?,
        commission: read_f64(config, "backtest", "commission", defaults.commission)?,
    })
}

/// `[strategy]`, `[market]`, `[time_filter]` and `[parameters]` as a strategy
/// config. A named template supplies the base conditions.
pub fn build_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, TradelabError> {
    let template = read_template(config)?;
    let mut base = template.map(|t| t.config()).unwrap_or_default();

    let name = config
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| template.map(|t| t.name().to_string()))
        .unwrap_or_else(|| "Unnamed".to_string());
    let description = config
        .get_string("strategy", "description")
        .unwrap_or(base.description);

    base.entry_conditions.extend(read_conditions(config, "entry")?);
    base.exit_conditions.extend(read_conditions(config, "exit")?);

    let rm = &base.risk_management;
    let risk_management = RiskManagement {
        stop_loss: read_f64(config, "strategy", "stop_loss", rm.stop_loss)?,
        take_profit: read_f64(config, "strategy", "take_profit", rm.take_profit)?,
        position_size: read_f64(config, "strategy", "position_size", rm.position_size)?,
        max_drawdown: read_f64(config, "strategy", "max_drawdown", rm.max_drawdown)?,
        max_positions: read_usize(config, "strategy", "max_positions", rm.max_positions)?,
    };

    let mc = base.market_conditions;
    let market_conditions = MarketConditions {
        trending: read_bool(config, "market", "trending", mc.trending)?,
        ranging: read_bool(config, "market", "ranging", mc.ranging)?,
        volatile: read_bool(config, "market", "volatile", mc.volatile)?,
        low_volatile: read_bool(config, "market", "low_volatile", mc.low_volatile)?,
    };

    let mut parameters = base.parameters;
    for key in config.keys("parameters") {
        parameters.insert(key.clone(), read_f64(config, "parameters", &key, 0.0)?);
    }

    Ok(StrategyConfig {
        name,
        description,
        entry_conditions: base.entry_conditions,
        exit_conditions: base.exit_conditions,
        risk_management,
        market_conditions,
        parameters,
        time_filter: read_time_filter(config)?.or(base.time_filter),
    })
}

fn run_backtest(config_path: &Path, output_path: Option<&Path>) -> Result<(), TradelabError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;

    let options = build_backtest_options(&config)?;
    let strategy_config = build_strategy_config(&config)?;
    eprintln!("Loading strategy: {}", strategy_config.name);

    let data_dir = read_required(&config, "backtest", "data_dir")?;
    let symbol = read_required(&config, "backtest", "symbol")?;
    let data = CsvAdapter::new(PathBuf::from(data_dir));
    let bars = data.fetch_bars(&symbol, options.start_date, options.end_date)?;
    if bars.len() <= WARMUP_BARS {
        return Err(TradelabError::InsufficientData {
            symbol,
            bars: bars.len(),
            minimum: WARMUP_BARS + 1,
        });
    }

    let mut engine = StrategyEngine::new();
    let strategy_id = engine.create_strategy(strategy_config)?;
    eprintln!("Running backtest: {} bars of {}", bars.len(), symbol);
    let backtest_id = engine.backtest(&strategy_id, &bars, &options)?.id.clone();

    let result = engine.get_backtest(&backtest_id)?;
    let strategy = engine.get_strategy(&strategy_id)?;
    print_summary(result);

    if let Some(path) = output_path {
        JsonReportAdapter::new().write(result, strategy, path)?;
        eprintln!("\nReport written to: {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== Results ===");
    eprintln!("Final Capital:    {:.2}", result.final_capital);
    eprintln!("Total Return:     {:.2}%", m.total_return);
    eprintln!("Annualized:       {:.2}%", m.annualized_return);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.2}%", m.max_drawdown);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    if result.bars_skipped > 0 {
        eprintln!("Skipped Bars:     {}", result.bars_skipped);
    }
}

fn run_indicator(data: &Path, spec: &str) -> Result<(), TradelabError> {
    let operand = condition_parser::parse_operand(spec).inspect_err(|e| {
        eprintln!("{}", e.display_with_context(spec));
    })?;
    let Operand::Indicator(reference) = operand else {
        return Err(TradelabError::condition(format!("'{}' is not an indicator", spec)));
    };
    reference
        .indicator_type
        .validate()
        .map_err(TradelabError::condition)?;

    let bars = csv_adapter::read_bars(data)?;
    let series = compute_indicator(&bars, &reference.indicator_type);

    let fields: Vec<IndicatorField> = if reference.field == IndicatorField::Value {
        reference.indicator_type.shape().fields().to_vec()
    } else {
        vec![reference.field]
    };

    let report_error = |e: csv::Error| TradelabError::Report {
        reason: format!("failed to write CSV: {}", e),
    };
    let mut writer = csv::Writer::from_writer(io::stdout());
    let mut header = vec!["time"];
    header.extend(fields.iter().map(IndicatorField::name));
    writer.write_record(&header).map_err(report_error)?;
    for point in &series.values {
        let mut row = vec![point.time.format("%Y-%m-%d %H:%M:%S").to_string()];
        row.extend(
            fields
                .iter()
                .map(|f| point.value.field(*f).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row).map_err(report_error)?;
    }
    writer.flush()?;
    eprintln!("{}: {} values over {} bars", reference.indicator_type, series.len(), bars.len());
    Ok(())
}

#[derive(Serialize)]
struct PatternReport {
    candlestick: Vec<PatternDetection>,
    signal: PatternSignal,
    chart: Vec<ChartPattern>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TradelabError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| TradelabError::Report {
        reason: format!("failed to serialize output: {}", e),
    })?;
    println!("{json}");
    Ok(())
}

fn run_patterns(data: &Path) -> Result<(), TradelabError> {
    let bars = csv_adapter::read_bars(data)?;
    let candlestick = CandlestickDetector::default().detect(&bars);
    let report = PatternReport {
        signal: get_pattern_signal(&candlestick),
        chart: ChartPatternDetector::default().detect(&bars),
        candlestick,
    };
    print_json(&report)
}

fn run_signals(data: &Path) -> Result<(), TradelabError> {
    let bars = csv_adapter::read_bars(data)?;
    print_json(&combined_signals(&bars, &SignalSettings::default()))
}

fn describe(strategy: &Strategy) {
    eprintln!("Strategy '{}' is valid", strategy.name);
    for c in &strategy.entry_conditions {
        eprintln!("  entry: {}", c);
    }
    for c in &strategy.exit_conditions {
        eprintln!("  exit:  {}", c);
    }
    let rm = &strategy.risk_management;
    eprintln!(
        "  stop {:.2}%, take {:.2}%, size {:.2}%, max positions {}",
        rm.stop_loss * 100.0,
        rm.take_profit * 100.0,
        rm.position_size * 100.0,
        rm.max_positions
    );
}

fn run_validate(path: &Path) -> Result<(), TradelabError> {
    let config = load_config(path)?;
    validate_strategy_config(&config)?;
    let mut engine = StrategyEngine::new();
    let id = engine.create_strategy(build_strategy_config(&config)?)?;
    describe(engine.get_strategy(&id)?);
    Ok(())
}

fn run_symbols(data_dir: PathBuf) -> Result<(), TradelabError> {
    for symbol in CsvAdapter::new(data_dir).list_symbols()? {
        println!("{symbol}");
    }
    Ok(())
}
