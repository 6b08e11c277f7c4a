use crate::evaluator::ErrorMode;
use crate::rules::Aggregation;
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Application settings for the `mailrule` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: String,
    pub rules_path: String,
    #[serde(default)]
    pub error_mode: ErrorMode,
    /// Reject unknown or mismatched predicates instead of treating them as non-matches.
    #[serde(default)]
    pub strict_rules: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "emails.db".to_string(),
            rules_path: "rules.json".to_string(),
            error_mode: ErrorMode::Lenient,
            strict_rules: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// One rule object as written in the rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Optional label used in logs; rules are otherwise identified by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub predicate: Aggregation,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub field: String,
    pub predicate: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// YAML turns `value: 3` into a number; day counts are written that way often enough.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(n) => n.to_string(),
    })
}

/// Load the ordered rule list. `.yaml`/`.yml` files are read as YAML, anything else as JSON.
pub fn load_rules(path: &str) -> anyhow::Result<Vec<RuleConfig>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read rules file {path}"))?;

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let rules = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML rules in {path}"))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON rules in {path}"))?
    };
    Ok(rules)
}
