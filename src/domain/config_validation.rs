//! Configuration validation and typed readers.
//!
//! Values are read as raw strings so a malformed number is reported instead of
//! silently replaced by its default.

use chrono::{NaiveDate, NaiveTime, Weekday};
use tracing::warn;

use crate::domain::condition::{Condition, validate_condition};
use crate::domain::condition_parser;
use crate::domain::error::TradelabError;
use crate::domain::strategy::{RiskManagement, StrategyTemplate, TimeFilter};
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TradelabError {
    TradelabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn raw(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TradelabError> {
    match raw(config, section, key) {
        None => Ok(default),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("'{}' is not a number", s))),
    }
}

pub fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TradelabError> {
    match raw(config, section, key) {
        None => Ok(default),
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| invalid(section, key, format!("'{}' is not a non-negative integer", s))),
    }
}

pub fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, TradelabError> {
    let Some(s) = raw(config, section, key) else {
        return Ok(default);
    };
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, format!("'{}' is not a boolean", s))),
    }
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, TradelabError> {
    raw(config, section, key)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
                invalid(
                    section,
                    key,
                    format!("invalid {} format, expected YYYY-MM-DD", key),
                )
            })
        })
        .transpose()
}

pub fn read_required(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, TradelabError> {
    raw(config, section, key).ok_or_else(|| TradelabError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn read_time(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveTime>, TradelabError> {
    raw(config, "time_filter", key)
        .map(|s| {
            NaiveTime::parse_from_str(&s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map_err(|_| invalid("time_filter", key, format!("'{}' is not HH:MM", s)))
        })
        .transpose()
}

/// `[time_filter]` section, or `None` when the section is absent.
pub fn read_time_filter(config: &dyn ConfigPort) -> Result<Option<TimeFilter>, TradelabError> {
    if !config.has_section("time_filter") {
        return Ok(None);
    }
    let weekdays = match raw(config, "time_filter", "weekdays") {
        None => Vec::new(),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<Weekday>().map_err(|_| {
                    invalid("time_filter", "weekdays", format!("unknown weekday '{}'", d))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(Some(TimeFilter {
        start_time: read_time(config, "start_time")?,
        end_time: read_time(config, "end_time")?,
        weekdays,
    }))
}

/// `{prefix}_N` conditions from `[strategy]` in numeric order, with their
/// optional `{prefix}_N_weight` and `{prefix}_N_lookback` modifiers.
pub fn read_conditions(
    config: &dyn ConfigPort,
    prefix: &str,
) -> Result<Vec<Condition>, TradelabError> {
    let mut numbered: Vec<(u32, String)> = config
        .keys("strategy")
        .into_iter()
        .filter_map(|key| {
            let n = key.strip_prefix(prefix)?.strip_prefix('_')?.parse::<u32>().ok()?;
            Some((n, key))
        })
        .collect();
    numbered.sort();

    let mut conditions = Vec::with_capacity(numbered.len());
    for (_, key) in numbered {
        let Some(text) = raw(config, "strategy", &key) else {
            continue;
        };
        let mut condition = condition_parser::parse(&text).inspect_err(|e| {
            warn!(key = %key, "{}", e.display_with_context(&text));
        })?;
        let weight_key = format!("{}_weight", key);
        condition = condition.with_weight(read_f64(config, "strategy", &weight_key, 1.0)?);
        let lookback_key = format!("{}_lookback", key);
        condition = condition.with_lookback(read_usize(config, "strategy", &lookback_key, 1)?);
        validate_condition(&condition)
            .map_err(|e| invalid("strategy", &key, e.to_string()))?;
        conditions.push(condition);
    }
    Ok(conditions)
}

pub fn read_template(config: &dyn ConfigPort) -> Result<Option<StrategyTemplate>, TradelabError> {
    raw(config, "strategy", "template")
        .map(|name| {
            StrategyTemplate::from_name(&name).ok_or_else(|| {
                invalid("strategy", "template", format!("unknown template '{}'", name))
            })
        })
        .transpose()
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    read_required(config, "backtest", "data_dir")?;
    read_required(config, "backtest", "symbol")?;
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    validate_position_size(config)?;
    validate_stop_loss(config)?;
    validate_take_profit(config)?;
    validate_max_drawdown(config)?;
    validate_max_positions(config)?;
    validate_market(config)?;
    read_time_filter(config)?;
    validate_conditions(config)?;
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(config, "backtest", "initial_capital", 10_000.0)?;
    if value <= 0.0 {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(config, "backtest", "commission", 0.001)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid("backtest", "commission", "commission must be in [0, 1)"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start, end)
        && start >= end
    {
        return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(
        config,
        "strategy",
        "position_size",
        RiskManagement::default().position_size,
    )?;
    if value <= 0.0 || value > 1.0 {
        return Err(invalid("strategy", "position_size", "position_size must be in (0, 1]"));
    }
    Ok(())
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(config, "strategy", "stop_loss", RiskManagement::default().stop_loss)?;
    if value < 0.0 {
        return Err(invalid("strategy", "stop_loss", "stop_loss must be non-negative"));
    }
    Ok(())
}

fn validate_take_profit(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(
        config,
        "strategy",
        "take_profit",
        RiskManagement::default().take_profit,
    )?;
    if value < 0.0 {
        return Err(invalid("strategy", "take_profit", "take_profit must be non-negative"));
    }
    Ok(())
}

fn validate_max_drawdown(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_f64(
        config,
        "strategy",
        "max_drawdown",
        RiskManagement::default().max_drawdown,
    )?;
    if value <= 0.0 || value > 1.0 {
        return Err(invalid("strategy", "max_drawdown", "max_drawdown must be in (0, 1]"));
    }
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let value = read_usize(
        config,
        "strategy",
        "max_positions",
        RiskManagement::default().max_positions,
    )?;
    if value < 1 {
        return Err(invalid("strategy", "max_positions", "max_positions must be at least 1"));
    }
    Ok(())
}

fn validate_market(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    for key in ["trending", "ranging", "volatile", "low_volatile"] {
        read_bool(config, "market", key, true)?;
    }
    Ok(())
}

fn validate_conditions(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let template = read_template(config)?;
    let entry = read_conditions(config, "entry")?;
    read_conditions(config, "exit")?;
    if entry.is_empty() && template.is_none() {
        return Err(TradelabError::ConfigMissing {
            section: "strategy".to_string(),
            key: "entry_1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::condition::Operator;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BACKTEST: &str = "[backtest]\ndata_dir = data\nsymbol = AAPL\n";

    fn invalid_key(err: &TradelabError) -> Option<&str> {
        match err {
            TradelabError::ConfigInvalid { key, .. } => Some(key),
            _ => None,
        }
    }

    #[test]
    fn minimal_backtest_config_passes() {
        assert!(validate_backtest_config(&make_config(BACKTEST)).is_ok());
    }

    #[test]
    fn full_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
data_dir = data
symbol = AAPL
start_date = 2020-01-01
end_date = 2024-12-31
initial_capital = 50000
commission = 0.0005
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn missing_symbol_fails() {
        let err =
            validate_backtest_config(&make_config("[backtest]\ndata_dir = data\n")).unwrap_err();
        assert!(matches!(err, TradelabError::ConfigMissing { ref key, .. } if key == "symbol"));
    }

    #[test]
    fn capital_must_be_positive() {
        let config = make_config(&format!("{}initial_capital = 0\n", BACKTEST));
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), Some("initial_capital"));
    }

    #[test]
    fn malformed_capital_is_reported() {
        let config = make_config(&format!("{}initial_capital = lots\n", BACKTEST));
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), Some("initial_capital"));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn commission_range() {
        for bad in ["-0.1", "1", "1.5"] {
            let config = make_config(&format!("{}commission = {}\n", BACKTEST, bad));
            let err = validate_backtest_config(&config).unwrap_err();
            assert_eq!(invalid_key(&err), Some("commission"), "commission = {}", bad);
        }
        let config = make_config(&format!("{}commission = 0\n", BACKTEST));
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn date_checks() {
        let config = make_config(&format!("{}start_date = 2020/01/01\n", BACKTEST));
        assert_eq!(
            invalid_key(&validate_backtest_config(&config).unwrap_err()),
            Some("start_date")
        );

        let config = make_config(&format!(
            "{}start_date = 2024-12-31\nend_date = 2020-01-01\n",
            BACKTEST
        ));
        assert_eq!(
            invalid_key(&validate_backtest_config(&config).unwrap_err()),
            Some("start_date")
        );
    }

    #[test]
    fn valid_strategy_config_passes() {
        let config = make_config(
            r#"
[strategy]
name = Cross
position_size = 0.25
stop_loss = 0.0
take_profit = 0.0
max_positions = 1
entry_1 = CROSSOVER(SMA(20), SMA(50))
entry_1_weight = 2
exit_1 = CROSSUNDER(SMA(20), SMA(50))

[market]
volatile = false

[time_filter]
start_time = 09:30
end_time = 16:00
weekdays = Mon,Tue,Wed,Thu,Fri
"#,
        );
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn strategy_ranges() {
        let cases = [
            ("position_size = 0", "position_size"),
            ("position_size = 1.5", "position_size"),
            ("stop_loss = -5", "stop_loss"),
            ("take_profit = -10", "take_profit"),
            ("max_drawdown = 0", "max_drawdown"),
            ("max_drawdown = 2", "max_drawdown"),
            ("max_positions = 0", "max_positions"),
        ];
        for (line, key) in cases {
            let config = make_config(&format!(
                "[strategy]\nentry_1 = ABOVE(close, 10)\n{}\n",
                line
            ));
            let err = validate_strategy_config(&config).unwrap_err();
            assert_eq!(invalid_key(&err), Some(key), "{}", line);
        }
    }

    #[test]
    fn entry_condition_required_without_template() {
        let err = validate_strategy_config(&make_config("[strategy]\nexit_1 = BELOW(close, 5)\n"))
            .unwrap_err();
        assert!(matches!(err, TradelabError::ConfigMissing { ref key, .. } if key == "entry_1"));

        let config = make_config("[strategy]\ntemplate = golden_cross\n");
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn unknown_template_fails() {
        let config = make_config("[strategy]\ntemplate = moon_shot\n");
        assert_eq!(invalid_key(&validate_strategy_config(&config).unwrap_err()), Some("template"));
    }

    #[test]
    fn unparseable_condition_fails() {
        let config = make_config("[strategy]\nentry_1 = ABOVE(SMA(20)\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, TradelabError::ConditionParse(_)));
    }

    #[test]
    fn bad_weekday_fails() {
        let config = make_config(
            "[strategy]\nentry_1 = ABOVE(close, 1)\n[time_filter]\nweekdays = Mon,Funday\n",
        );
        assert_eq!(invalid_key(&validate_strategy_config(&config).unwrap_err()), Some("weekdays"));
    }

    #[test]
    fn conditions_in_numeric_order_with_modifiers() {
        let config = make_config(
            r#"
[strategy]
entry_10 = BELOW(close, 10)
entry_2 = ABOVE(close, 2)
entry_2_lookback = 3
entry_1 = CROSSOVER(SMA(5), SMA(10))
entry_1_weight = 1.5
"#,
        );
        let conditions = read_conditions(&config, "entry").unwrap();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0].operator, Operator::CrossOver);
        assert_eq!(conditions[0].weight, 1.5);
        assert_eq!(conditions[1].lookback, 3);
        assert_eq!(conditions[2].operator, Operator::Lt);
        assert!(read_conditions(&config, "exit").unwrap().is_empty());
    }

    #[test]
    fn zero_weight_is_invalid() {
        let config = make_config("[strategy]\nentry_1 = ABOVE(close, 1)\nentry_1_weight = 0\n");
        assert_eq!(invalid_key(&read_conditions(&config, "entry").unwrap_err()), Some("entry_1"));
    }

    #[test]
    fn time_filter_absent_is_none() {
        assert_eq!(read_time_filter(&make_config("[strategy]\nname = x\n")).unwrap(), None);
        let filter = read_time_filter(&make_config("[time_filter]\nweekdays = mon, fri\n"))
            .unwrap()
            .unwrap();
        assert_eq!(filter.weekdays, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(filter.start_time, None);
    }
}
