use thiserror::Error;

/// Errors raised while compiling or evaluating a rule set.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule file references something that cannot be evaluated.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unparseable date_received '{value}'")]
    DateParse { value: String },

    #[error("failed to write action output: {0}")]
    Output(#[from] std::io::Error),
}

impl RuleError {
    pub fn config(message: impl Into<String>) -> Self {
        RuleError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
