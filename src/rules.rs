//! Validated rule model.
//!
//! Rule files are loaded as [`RuleConfig`] values and compiled into a [`RuleSet`] once per
//! pass. Compilation resolves every field/predicate pair into a [`Condition`] variant, so
//! evaluation never branches on strings.

use crate::config::{self, ActionConfig, ConditionConfig, RuleConfig};
use crate::email::Field;
use crate::error::{Result, RuleError};
use crate::template::MessageTemplate;
use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const PRINT_EMAIL_INFO: &str = "print_email_info";

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    All,
    Any,
}

/// Fields holding free text, the ones string predicates apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Sender,
    Subject,
    Snippet,
}

impl TextField {
    pub fn field(self) -> Field {
        match self {
            TextField::Sender => Field::Sender,
            TextField::Subject => Field::Subject,
            TextField::Snippet => Field::Snippet,
        }
    }

    fn from_field(field: Field) -> Option<Self> {
        match field {
            Field::Sender => Some(TextField::Sender),
            Field::Subject => Some(TextField::Subject),
            Field::Snippet => Some(TextField::Snippet),
            Field::DateReceived => None,
        }
    }
}

/// A single compiled test. Text operands are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Contains { field: TextField, needle: String },
    DoesNotContain { field: TextField, needle: String },
    Equals { field: TextField, value: String },
    DoesNotEqual { field: TextField, value: String },
    /// `date_received` `less than` N: received before now minus N days.
    OlderThan { days: i64, age: Duration },
    /// `date_received` `greater than` N: received after now minus N days.
    NewerThan { days: i64, age: Duration },
    /// Predicate unknown, or not applicable to the field's type. Never matches.
    Never { field: Field, predicate: String },
}

impl Condition {
    pub fn compile(config: &ConditionConfig, strict: bool) -> Result<Self> {
        let field: Field = config.field.parse().map_err(RuleError::Configuration)?;
        let predicate = config.predicate.as_str();

        if let Some(text) = TextField::from_field(field) {
            let operand = config.value.to_lowercase();
            let condition = match predicate {
                "contains" => Condition::Contains {
                    field: text,
                    needle: operand,
                },
                "does not contain" => Condition::DoesNotContain {
                    field: text,
                    needle: operand,
                },
                "equals" => Condition::Equals {
                    field: text,
                    value: operand,
                },
                "does not equal" => Condition::DoesNotEqual {
                    field: text,
                    value: operand,
                },
                _ => return Self::unrecognized(field, predicate, strict),
            };
            return Ok(condition);
        }

        match predicate {
            "less than" | "greater than" => {
                let days: i64 = config.value.trim().parse().map_err(|_| {
                    RuleError::config(format!(
                        "{field} '{predicate}' needs a whole number of days, got '{}'",
                        config.value
                    ))
                })?;
                let age = Duration::try_days(days).ok_or_else(|| {
                    RuleError::config(format!("day count {days} is out of range"))
                })?;
                if predicate == "less than" {
                    Ok(Condition::OlderThan { days, age })
                } else {
                    Ok(Condition::NewerThan { days, age })
                }
            }
            _ => Self::unrecognized(field, predicate, strict),
        }
    }

    fn unrecognized(field: Field, predicate: &str, strict: bool) -> Result<Self> {
        if strict {
            return Err(RuleError::config(format!(
                "predicate '{predicate}' is not supported for field {field}"
            )));
        }
        log::warn!(
            "Predicate '{predicate}' is not supported for field {field}; \
             condition will never match"
        );
        Ok(Condition::Never {
            field,
            predicate: predicate.to_string(),
        })
    }
}

/// Something to do with a record once a rule matched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PrintEmailInfo(MessageTemplate),
    /// An action kind this build does not know; dispatch skips it.
    Other(String),
}

impl Action {
    pub fn compile(config: &ActionConfig) -> Result<Self> {
        if config.action != PRINT_EMAIL_INFO {
            return Ok(Action::Other(config.action.clone()));
        }
        let message = config.message.as_deref().ok_or_else(|| {
            RuleError::config(format!("action '{PRINT_EMAIL_INFO}' requires a message"))
        })?;
        Ok(Action::PrintEmailInfo(MessageTemplate::compile(message)?))
    }

    pub fn kind(&self) -> &str {
        match self {
            Action::PrintEmailInfo(_) => PRINT_EMAIL_INFO,
            Action::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub aggregation: Aggregation,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

impl Rule {
    fn compile(index: usize, config: &RuleConfig, strict: bool) -> Result<Self> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("rule {}", index + 1));

        let conditions = config
            .conditions
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Condition::compile(c, strict).map_err(|e| in_rule(&name, "condition", i, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let actions = config
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| Action::compile(a).map_err(|e| in_rule(&name, "action", i, e)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Rule {
            name,
            aggregation: config.predicate,
            conditions,
            actions,
        })
    }
}

fn in_rule(rule: &str, what: &str, index: usize, err: RuleError) -> RuleError {
    match err {
        RuleError::Configuration(msg) => {
            RuleError::Configuration(format!("{rule}, {what} {}: {msg}", index + 1))
        }
        other => other,
    }
}

/// The ordered, read-only rules for one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile rules, treating unsupported predicates as never matching.
    pub fn compile(configs: &[RuleConfig]) -> Result<Self> {
        Self::compile_with(configs, false)
    }

    /// Compile rules, rejecting unsupported predicates.
    pub fn compile_strict(configs: &[RuleConfig]) -> Result<Self> {
        Self::compile_with(configs, true)
    }

    fn compile_with(configs: &[RuleConfig], strict: bool) -> Result<Self> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Rule::compile(i, c, strict))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn load(path: &str, strict: bool) -> anyhow::Result<Self> {
        let configs = config::load_rules(path)?;
        Ok(Self::compile_with(&configs, strict)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
