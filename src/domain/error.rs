//! Domain error types.

/// A parse error with position information for condition parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for tradelab.
#[derive(Debug, thiserror::Error)]
pub enum TradelabError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    ConditionParse(#[from] ParseError),

    #[error("invalid condition: {reason}")]
    ConditionInvalid { reason: String },

    #[error("unknown strategy: {id}")]
    UnknownStrategy { id: String },

    #[error("unknown backtest: {id}")]
    UnknownBacktest { id: String },

    #[error("unknown portfolio: {id}")]
    UnknownPortfolio { id: String },

    #[error("unknown position: {id}")]
    UnknownPosition { id: String },

    #[error("position rejected: {reason}")]
    PositionRejected { reason: String },

    #[error("evaluation failed: {reason}")]
    Evaluation { reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradelabError {
    pub fn condition(reason: impl Into<String>) -> Self {
        TradelabError::ConditionInvalid {
            reason: reason.into(),
        }
    }

    pub fn evaluation(reason: impl Into<String>) -> Self {
        TradelabError::Evaluation {
            reason: reason.into(),
        }
    }
}

impl From<&TradelabError> for std::process::ExitCode {
    fn from(err: &TradelabError) -> Self {
        let code: u8 = match err {
            TradelabError::Io(_) | TradelabError::Report { .. } => 1,
            TradelabError::ConfigParse { .. }
            | TradelabError::ConfigMissing { .. }
            | TradelabError::ConfigInvalid { .. } => 2,
            TradelabError::Data { .. } => 3,
            TradelabError::ConditionParse(_)
            | TradelabError::ConditionInvalid { .. }
            | TradelabError::UnknownStrategy { .. }
            | TradelabError::UnknownBacktest { .. }
            | TradelabError::Evaluation { .. } => 4,
            TradelabError::InsufficientData { .. } => 5,
            TradelabError::UnknownPortfolio { .. }
            | TradelabError::UnknownPosition { .. }
            | TradelabError::PositionRejected { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_position() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("SMA(20");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "SMA(20");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("expected ')'"));
    }

    #[test]
    fn parse_error_converts_into_condition_parse() {
        let err: TradelabError = ParseError {
            message: "bad".into(),
            position: 0,
        }
        .into();
        assert!(matches!(err, TradelabError::ConditionParse(_)));
    }

    #[test]
    fn display_messages() {
        let err = TradelabError::InsufficientData {
            symbol: "AAPL".into(),
            bars: 10,
            minimum: 51,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for AAPL: have 10 bars, need 51"
        );
        assert_eq!(
            TradelabError::condition("weight must be positive").to_string(),
            "invalid condition: weight must be positive"
        );
    }
}
