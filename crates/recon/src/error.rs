use std::fmt;

/// One problem found while validating a rule set.
///
/// `scope` names the offending part of the config (`entity 'sites'`,
/// `source 'pbi'`, ...) so every issue can be traced back without a line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIssue {
    pub scope: String,
    pub message: String,
}

impl RuleIssue {
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Rule set failed validation. Every issue found is listed.
    InvalidRules(Vec<RuleIssue>),
    /// A rule references a source id that was not supplied to the run.
    UnknownSource { scope: String, source: String },
    /// Missing key column in input data.
    MissingColumn { source: String, column: String },
    /// Source data could not be decoded.
    Load { source: String, message: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl ReconError {
    /// True for errors an operator fixes in the rule file, as opposed to the data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse(_) | Self::InvalidRules(_) | Self::UnknownSource { .. }
        )
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::InvalidRules(issues) => {
                write!(f, "config validation error: {} issue(s)", issues.len())?;
                for issue in issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
            Self::UnknownSource { scope, source } => {
                write!(f, "{scope}: source '{source}' was not supplied")
            }
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::Load { source, message } => {
                write!(f, "source '{source}': {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
