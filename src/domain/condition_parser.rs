//! Condition DSL parser.
//!
//! Recursive descent parser for single conditions such as
//! `CROSSOVER(SMA(50), SMA(200))` or `BETWEEN(RSI(14), 30, 70)`. Errors carry
//! the character offset of the offending token.
//!
//! ```text
//! condition := CMP '(' operand ',' operand ')'
//!            | 'BETWEEN' '(' operand ',' number ',' number ')'
//! CMP       := CROSSOVER | CROSSUNDER | ABOVE | BELOW | GTE | LTE | EQUALS | NOT_EQUALS
//! operand   := number | open | high | low | close | volume
//!            | 'PATTERN' '(' name ')' | 'PATTERN_SCORE'
//!            | NAME [ '(' number { ',' number } ')' ] [ '.' field ]
//! ```

use crate::domain::condition::{Condition, IndicatorRef, Operand, Operator};
use crate::domain::error::ParseError;
use crate::domain::indicator::{IndicatorField, IndicatorType};
use crate::domain::pattern::CandlestickPattern;

const COMPARISONS: [(&str, Operator); 8] = [
    ("CROSSOVER", Operator::CrossOver),
    ("CROSSUNDER", Operator::CrossUnder),
    ("ABOVE", Operator::Gt),
    ("BELOW", Operator::Lt),
    ("GTE", Operator::Gte),
    ("LTE", Operator::Lte),
    ("EQUALS", Operator::Eq),
    ("NOT_EQUALS", Operator::Ne),
];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(
                format!("expected '{}', found '{}'", expected, ch),
                self.pos,
            )),
            None => Err(self.error(
                format!("expected '{}', found end of input", expected),
                self.pos,
            )),
        }
    }

    fn consume_char(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_word_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(Self::is_word_char)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn word(&self) -> &'a str {
        let remaining = self.remaining();
        let end = remaining
            .find(|c: char| !Self::is_word_char(c))
            .unwrap_or(remaining.len());
        &remaining[..end]
    }

    /// The next word, or the next character when no word starts here.
    fn describe_next(&self) -> String {
        match self.word() {
            "" => self
                .peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string()),
            word => word.to_string(),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error(
                format!("expected number, found '{}'", self.describe_next()),
                start,
            ));
        }

        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", text), start))
    }

    fn parse_pattern(&mut self) -> Result<Operand, ParseError> {
        self.expect_char('(')?;
        self.skip_whitespace();
        let start = self.pos;
        let name = self.word();
        let pattern = CandlestickPattern::from_name(name).ok_or_else(|| {
            self.error(
                format!("unknown candlestick pattern '{}'", self.describe_next()),
                start,
            )
        })?;
        self.pos += name.len();
        self.expect_char(')')?;
        Ok(Operand::Pattern(pattern))
    }

    fn parse_indicator(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let name = self.word();
        if name.is_empty() {
            return Err(self.error(
                format!("expected operand, found '{}'", self.describe_next()),
                start,
            ));
        }
        self.pos += name.len();

        let mut args = Vec::new();
        if self.consume_char('(') && !self.consume_char(')') {
            loop {
                args.push(self.parse_number()?);
                if !self.consume_char(',') {
                    break;
                }
            }
            self.expect_char(')')?;
        }

        let indicator_type =
            IndicatorType::from_parts(name, &args).map_err(|message| self.error(message, start))?;

        let field = if self.consume_char('.') {
            self.skip_whitespace();
            let field_pos = self.pos;
            let field_name = self.word();
            let field = IndicatorField::from_name(field_name).ok_or_else(|| {
                self.error(
                    format!("unknown field '{}'", self.describe_next()),
                    field_pos,
                )
            })?;
            if !indicator_type.shape().supports(field) {
                return Err(self.error(
                    format!("{} has no field '{}'", indicator_type, field_name),
                    field_pos,
                ));
            }
            self.pos += field_name.len();
            field
        } else {
            IndicatorField::Value
        };

        Ok(Operand::Indicator(IndicatorRef::new(indicator_type, field)))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            return Ok(Operand::Constant(self.parse_number()?));
        }

        let price = match self.word() {
            "open" => Some(Operand::Open),
            "high" => Some(Operand::High),
            "low" => Some(Operand::Low),
            "close" => Some(Operand::Close),
            "volume" => Some(Operand::Volume),
            _ => None,
        };
        if let Some(operand) = price {
            self.pos += self.word().len();
            return Ok(operand);
        }

        if self.consume_keyword("PATTERN_SCORE") {
            return Ok(Operand::PatternScore);
        }
        if self.consume_keyword("PATTERN") {
            return self.parse_pattern();
        }
        self.parse_indicator()
    }

    fn parse_comparison(
        &mut self,
        keyword: &str,
        operator: Operator,
    ) -> Result<Condition, ParseError> {
        self.pos += keyword.len();
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;
        Ok(Condition::compare(left, operator, right))
    }

    fn parse_between(&mut self) -> Result<Condition, ParseError> {
        self.pos += "BETWEEN".len();
        self.expect_char('(')?;
        let operand = self.parse_operand()?;
        self.expect_char(',')?;
        let lower_pos = self.pos;
        let lower = self.parse_number()?;
        self.expect_char(',')?;
        let upper = self.parse_number()?;
        self.expect_char(')')?;

        if lower > upper {
            return Err(self.error(
                format!("lower bound {} exceeds upper bound {}", lower, upper),
                lower_pos,
            ));
        }
        Ok(Condition::between(operand, lower, upper))
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        self.skip_whitespace();

        for (keyword, operator) in COMPARISONS {
            if self.peek_keyword(keyword) {
                return self.parse_comparison(keyword, operator);
            }
        }
        if self.peek_keyword("BETWEEN") {
            return self.parse_between();
        }

        Err(self.error(
            format!("expected condition, found '{}'", self.describe_next()),
            self.pos,
        ))
    }

    fn parse(&mut self) -> Result<Condition, ParseError> {
        let condition = self.parse_condition()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(
                format!("unexpected input after condition: '{}'", self.remaining()),
                self.pos,
            ));
        }
        Ok(condition)
    }
}

/// Parse one condition with default weight and lookback.
pub fn parse(input: &str) -> Result<Condition, ParseError> {
    Parser::new(input).parse()
}

/// Parse a standalone operand, e.g. `RSI(14)` or `MACD(12,26,9).signal`.
pub fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    let mut parser = Parser::new(input);
    let operand = parser.parse_operand()?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        return Err(parser.error(
            format!("unexpected input after operand: '{}'", parser.remaining()),
            parser.pos,
        ));
    }
    Ok(operand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::Threshold;

    fn left(condition: &Condition) -> &Operand {
        &condition.indicator
    }

    fn right(condition: &Condition) -> &Operand {
        match &condition.threshold {
            Threshold::Value(o) => o,
            Threshold::Range { .. } => panic!("expected a single threshold"),
        }
    }

    #[test]
    fn parse_above() {
        let c = parse("ABOVE(close, 100)").unwrap();
        assert_eq!(c.operator, Operator::Gt);
        assert_eq!(left(&c), &Operand::Close);
        assert_eq!(right(&c), &Operand::Constant(100.0));
        assert!((c.weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(c.lookback, 1);
    }

    #[test]
    fn parse_below_with_indicators() {
        let c = parse("BELOW(SMA(20), SMA(50))").unwrap();
        assert_eq!(c.operator, Operator::Lt);
        assert_eq!(
            left(&c),
            &Operand::Indicator(IndicatorRef::value(IndicatorType::Sma(20)))
        );
        assert_eq!(
            right(&c),
            &Operand::Indicator(IndicatorRef::value(IndicatorType::Sma(50)))
        );
    }

    #[test]
    fn parse_every_operator_keyword() {
        for (input, op) in [
            ("CROSSOVER(SMA(50), SMA(200))", Operator::CrossOver),
            ("CROSSUNDER(SMA(50), SMA(200))", Operator::CrossUnder),
            ("GTE(close, 1)", Operator::Gte),
            ("LTE(close, 1)", Operator::Lte),
            ("EQUALS(close, 1)", Operator::Eq),
            ("NOT_EQUALS(close, 1)", Operator::Ne),
        ] {
            assert_eq!(parse(input).unwrap().operator, op, "{}", input);
        }
    }

    #[test]
    fn parse_between() {
        let c = parse("BETWEEN(RSI(14), 30, 70)").unwrap();
        assert_eq!(c.operator, Operator::Between);
        assert_eq!(
            c.threshold,
            Threshold::Range {
                lower: 30.0,
                upper: 70.0
            }
        );
    }

    #[test]
    fn parse_whitespace_handling() {
        let c = parse("  ABOVE  (  close  ,  100  )  ").unwrap();
        assert_eq!(c.operator, Operator::Gt);
    }

    #[test]
    fn parse_price_fields() {
        for (input, expected) in [
            ("ABOVE(open, 100)", Operand::Open),
            ("ABOVE(high, 100)", Operand::High),
            ("ABOVE(low, 100)", Operand::Low),
            ("ABOVE(close, 100)", Operand::Close),
            ("ABOVE(volume, 100)", Operand::Volume),
        ] {
            assert_eq!(left(&parse(input).unwrap()), &expected);
        }
    }

    #[test]
    fn parse_indicator_catalogue() {
        for input in [
            "SMA(20)", "EMA(20)", "WMA(20)", "HMA(16)", "DEMA(10)", "TEMA(10)", "VWMA(20)",
            "MACD(12,26,9)", "ADX(14)", "DMI(14).plus_di", "AROON(25).up", "PSAR(0.02, 0.2)",
            "SUPERTREND(10, 3).direction", "LINREG(14).slope", "POLYREG(20, 3).r_squared",
            "ICHIMOKU.span_a", "PIVOT.r2", "RSI(14)", "STOCH(14,3,3).d", "STOCHRSI", "WILLR(14)",
            "ROC(12)", "ULTOSC", "TRIX(15)", "CMO(14)", "DEMARKER(14)", "FISHER(10).trigger",
            "STC", "KST.signal", "BB(20, 2.5).percent_b", "KELTNER.upper", "DONCHIAN(20).lower",
            "ENVELOPE(20, 2.5).upper", "ATR(14)", "NATR(14)", "VOLSTOP", "HV(20)",
            "CHAIKINVOL", "CHOP(14)", "VHF(28)", "STDDEV(20)", "OBV", "VPT", "MFI(14)", "AD",
            "CHAIKINOSC(3,10)", "VWAP", "KLINGER.signal", "FORCE(13)", "EOM(14)",
        ] {
            parse_operand(input).unwrap_or_else(|e| panic!("{}: {}", input, e));
        }
    }

    #[test]
    fn parse_indicator_defaults_and_fields() {
        let op = parse_operand("MACD.histogram").unwrap();
        assert_eq!(
            op,
            Operand::Indicator(IndicatorRef::new(
                IndicatorType::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9
                },
                IndicatorField::Histogram
            ))
        );

        let op = parse_operand("OBV()").unwrap();
        assert_eq!(op, Operand::Indicator(IndicatorRef::value(IndicatorType::Obv)));
    }

    #[test]
    fn parse_bollinger_with_float_multiplier() {
        let c = parse("ABOVE(BOLLINGER(20, 2.5).upper, 100)").unwrap();
        match left(&c) {
            Operand::Indicator(r) => {
                assert_eq!(
                    r.indicator_type,
                    IndicatorType::Bollinger {
                        period: 20,
                        stddev_mult_x100: 250
                    }
                );
                assert_eq!(r.field, IndicatorField::Upper);
            }
            other => panic!("expected indicator, got {:?}", other),
        }
    }

    #[test]
    fn parse_patterns() {
        let c = parse("EQUALS(PATTERN(bullish_engulfing), 1)").unwrap();
        assert_eq!(
            left(&c),
            &Operand::Pattern(CandlestickPattern::BullishEngulfing)
        );

        let c = parse("ABOVE(PATTERN_SCORE, 2)").unwrap();
        assert_eq!(left(&c), &Operand::PatternScore);
    }

    #[test]
    fn parse_negative_numbers() {
        let c = parse("ABOVE(close, -100.5)").unwrap();
        match right(&c) {
            Operand::Constant(v) => assert!((v - (-100.5)).abs() < f64::EPSILON),
            other => panic!("expected constant, got {:?}", other),
        }
    }

    #[test]
    fn display_then_parse_is_identity() {
        for input in [
            "CROSSOVER(SMA(50), SMA(200))",
            "BELOW(close, BOLLINGER(20,2).lower)",
            "ABOVE(MACD(12,26,9), MACD(12,26,9).signal)",
            "BETWEEN(RSI(14), 30, 70)",
            "NOT_EQUALS(PATTERN(doji), 0)",
        ] {
            let c = parse(input).unwrap();
            assert_eq!(parse(&c.to_string()).unwrap(), c, "{}", input);
        }
    }

    #[test]
    fn error_unexpected_token() {
        let err = parse("ABOVE(close, )").unwrap_err();
        assert!(err.message.contains("expected"));
        assert_eq!(err.position, 13);
    }

    #[test]
    fn error_missing_paren() {
        let err = parse("ABOVE(close, 100").unwrap_err();
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn error_invalid_condition() {
        let err = parse("INVALID(close, 100)").unwrap_err();
        assert!(err.message.contains("expected condition"));
    }

    #[test]
    fn error_trailing_input() {
        let err = parse("ABOVE(close, 100) garbage").unwrap_err();
        assert!(err.message.contains("unexpected input"));
    }

    #[test]
    fn error_missing_comma() {
        let err = parse("ABOVE(close 100)").unwrap_err();
        assert!(err.message.contains("expected ','"));
    }

    #[test]
    fn error_unknown_indicator() {
        let err = parse("ABOVE(FOO(3), 1)").unwrap_err();
        assert!(err.message.contains("unknown indicator"));
        assert_eq!(err.position, 6);
    }

    #[test]
    fn error_unknown_or_unsupported_field() {
        let err = parse("ABOVE(SMA(20).bogus, 1)").unwrap_err();
        assert!(err.message.contains("unknown field"));
        assert_eq!(err.position, 14);

        let err = parse("ABOVE(SMA(20).signal, 1)").unwrap_err();
        assert!(err.message.contains("no field 'signal'"));
    }

    #[test]
    fn error_invalid_parameters() {
        let err = parse("ABOVE(MACD(26,12,9), 0)").unwrap_err();
        assert!(err.message.contains("MACD"));
        assert!(parse("ABOVE(SMA(0), 0)").is_err());
        assert!(parse("ABOVE(SMA(2.5), 0)").is_err());
    }

    #[test]
    fn error_unknown_pattern() {
        let err = parse("EQUALS(PATTERN(unicorn), 1)").unwrap_err();
        assert!(err.message.contains("unknown candlestick pattern"));
    }

    #[test]
    fn error_reversed_between() {
        let err = parse("BETWEEN(close, 70, 30)").unwrap_err();
        assert!(err.message.contains("exceeds"));
    }

    #[test]
    fn error_display_with_context() {
        let input = "CROSSOVER(SMA(20), , SMA(50))";
        let err = parse(input).unwrap_err();
        let ctx = err.display_with_context(input);
        assert!(ctx.contains('^'));
        assert!(ctx.contains("position"));
    }

    #[test]
    fn case_sensitive_keywords() {
        let err = parse("above(close, 100)").unwrap_err();
        assert!(err.message.contains("expected condition"));
    }

    #[test]
    fn error_empty_input() {
        let err = parse("").unwrap_err();
        assert!(err.message.contains("expected condition"));
        assert_eq!(err.position, 0);
        assert!(parse("   ").is_err());
    }
}
