//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
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

/// Top-level error type for regimetrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
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

    #[error("rule parse error in [{section}]: {source}")]
    RuleParse {
        section: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("risk section [{section}] references unknown tag '{tag}'")]
    UnknownTag { section: String, tag: String },

    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("bad data for {instrument}: {reason}")]
    DataFormat { instrument: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. }
            | EngineError::UnknownTag { .. } => 2,
            EngineError::RuleParse { .. } | EngineError::RuleInvalid { .. } => 4,
            EngineError::NoData { .. } | EngineError::DataFormat { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_caret_points_at_position() {
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
    fn unknown_tag_message_names_section() {
        let err = EngineError::UnknownTag {
            section: "risk:scalp".into(),
            tag: "scalp".into(),
        };
        assert_eq!(
            err.to_string(),
            "risk section [risk:scalp] references unknown tag 'scalp'"
        );
    }
}
