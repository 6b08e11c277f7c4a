use crate::dates::parse_email_datetime;
use crate::email::EmailRecord;
use crate::error::{Result, RuleError};
use crate::rules::{Aggregation, Condition, Rule};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// What a pass does when a record's date cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// The failing condition counts as not matched and evaluation goes on.
    #[default]
    Lenient,
    /// The first failure aborts the pass.
    FailFast,
}

/// Evaluates conditions and rules against records at a fixed instant.
pub struct Evaluator {
    now: DateTime<Utc>,
    mode: ErrorMode,
    degraded: Cell<u64>,
}

impl Evaluator {
    pub fn new(mode: ErrorMode) -> Self {
        Self::at(Utc::now(), mode)
    }

    /// Evaluate date conditions relative to `now` instead of the wall clock.
    pub fn at(now: DateTime<Utc>, mode: ErrorMode) -> Self {
        Self {
            now,
            mode,
            degraded: Cell::new(0),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Conditions that failed in lenient mode and were counted as not matched.
    pub fn degraded_conditions(&self) -> u64 {
        self.degraded.get()
    }

    /// Evaluate one condition. Text comparisons are case-insensitive.
    pub fn evaluate(&self, record: &EmailRecord, condition: &Condition) -> Result<bool> {
        let matched = match condition {
            Condition::Contains { field, needle } => {
                record.field(field.field()).to_lowercase().contains(needle.as_str())
            }
            Condition::DoesNotContain { field, needle } => {
                !record.field(field.field()).to_lowercase().contains(needle.as_str())
            }
            Condition::Equals { field, value } => {
                record.field(field.field()).to_lowercase() == *value
            }
            Condition::DoesNotEqual { field, value } => {
                record.field(field.field()).to_lowercase() != *value
            }
            Condition::OlderThan { age, .. } => {
                parse_email_datetime(&record.date_received)? < self.threshold(*age)
            }
            Condition::NewerThan { age, .. } => {
                parse_email_datetime(&record.date_received)? > self.threshold(*age)
            }
            Condition::Never { .. } => false,
        };
        Ok(matched)
    }

    /// Decide whether `rule` matches `record`.
    ///
    /// `All` stops at the first false condition and holds for an empty list; `Any` stops
    /// at the first true condition and fails for an empty list.
    pub fn matches(&self, record: &EmailRecord, rule: &Rule) -> Result<bool> {
        match rule.aggregation {
            Aggregation::All => {
                for condition in &rule.conditions {
                    if !self.outcome(record, rule, condition)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Aggregation::Any => {
                for condition in &rule.conditions {
                    if self.outcome(record, rule, condition)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn outcome(&self, record: &EmailRecord, rule: &Rule, condition: &Condition) -> Result<bool> {
        match self.evaluate(record, condition) {
            Err(err @ RuleError::DateParse { .. }) if self.mode == ErrorMode::Lenient => {
                log::warn!(
                    "Rule '{}': {err} on email {}; treating condition as not matched",
                    rule.name,
                    record.id
                );
                self.degraded.set(self.degraded.get() + 1);
                Ok(false)
            }
            other => other,
        }
    }

    fn threshold(&self, age: Duration) -> DateTime<Utc> {
        self.now.checked_sub_signed(age).unwrap_or(if age > Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConditionConfig;
    use crate::rules::TextField;
    use chrono::TimeZone;

    const RFC2822_NO_OFFSET: &str = "%a, %d %b %Y %H:%M:%S";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap()
    }

    fn record() -> EmailRecord {
        EmailRecord::new(
            "123",
            "test@example.com",
            "Test Email",
            "This is a test email.",
            "Thu, 27 Jun 2024 10:09:27 +0210",
        )
    }

    fn dated(date_received: &str) -> EmailRecord {
        EmailRecord {
            date_received: date_received.to_string(),
            ..record()
        }
    }

    fn cond(field: &str, predicate: &str, value: &str) -> Condition {
        Condition::compile(
            &ConditionConfig {
                field: field.to_string(),
                predicate: predicate.to_string(),
                value: value.to_string(),
            },
            false,
        )
        .unwrap()
    }

    fn rule(aggregation: Aggregation, conditions: Vec<Condition>) -> Rule {
        Rule {
            name: "test".to_string(),
            aggregation,
            conditions,
            actions: vec![],
        }
    }

    #[test]
    fn test_string_predicates_are_case_insensitive() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        let r = EmailRecord {
            subject: "Hello".to_string(),
            ..record()
        };

        assert!(eval.evaluate(&r, &cond("subject", "contains", "hello")).unwrap());
        assert!(eval.evaluate(&r, &cond("subject", "equals", "HELLO")).unwrap());
        assert!(!eval.evaluate(&r, &cond("subject", "does not equal", "hElLo")).unwrap());
        assert!(!eval.evaluate(&r, &cond("subject", "does not contain", "ELL")).unwrap());
        assert!(eval.evaluate(&r, &cond("subject", "does not contain", "NotInSubject")).unwrap());
        assert!(eval.evaluate(&r, &cond("sender", "contains", "EXAMPLE.com")).unwrap());
        assert!(eval.evaluate(&r, &cond("snippet", "contains", "test email")).unwrap());
    }

    #[test]
    fn test_equals_is_whole_value() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        assert!(!eval.evaluate(&record(), &cond("subject", "equals", "Test")).unwrap());
        assert!(eval.evaluate(&record(), &cond("subject", "equals", "test email")).unwrap());
    }

    #[test]
    fn test_old_message_is_less_than_one_day() {
        let eval = Evaluator::new(ErrorMode::Lenient);
        assert!(eval.evaluate(&record(), &cond("date_received", "less than", "1")).unwrap());
        assert!(!eval.evaluate(&record(), &cond("date_received", "greater than", "1")).unwrap());
    }

    #[test]
    fn test_date_boundary() {
        let n = 10;
        let sent = (now() - Duration::days(n)).format(RFC2822_NO_OFFSET).to_string();
        let r = dated(&sent);
        let eval = Evaluator::at(now(), ErrorMode::Lenient);

        let less = |days: i64| {
            eval.evaluate(&r, &cond("date_received", "less than", &days.to_string()))
                .unwrap()
        };
        let greater = |days: i64| {
            eval.evaluate(&r, &cond("date_received", "greater than", &days.to_string()))
                .unwrap()
        };

        assert!(less(n - 1));
        assert!(!less(n + 1));
        assert!(!greater(n - 1));
        assert!(greater(n + 1));
        // Exactly N days old is neither older nor newer than N days.
        assert!(!less(n));
        assert!(!greater(n));
    }

    #[test]
    fn test_offset_is_applied_before_comparing() {
        // 2024-07-09 14:00 +0500 is 09:00 UTC, 27 hours before now().
        let r = dated("Tue, 09 Jul 2024 14:00:00 +0500");
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        assert!(eval.evaluate(&r, &cond("date_received", "less than", "1")).unwrap());
        assert!(eval.evaluate(&r, &cond("date_received", "greater than", "2")).unwrap());
    }

    #[test]
    fn test_never_condition() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        let c = cond("subject", "matches regex", ".*");
        assert!(!eval.evaluate(&record(), &c).unwrap());
    }

    #[test]
    fn test_vacuous_truth() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        for r in [record(), dated("garbage")] {
            assert!(eval.matches(&r, &rule(Aggregation::All, vec![])).unwrap());
            assert!(!eval.matches(&r, &rule(Aggregation::Any, vec![])).unwrap());
        }
    }

    #[test]
    fn test_all_and_any() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        let yes = cond("subject", "contains", "test");
        let no = cond("subject", "contains", "invoice");

        let check = |aggregation, conditions| {
            eval.matches(&record(), &rule(aggregation, conditions)).unwrap()
        };

        assert!(check(Aggregation::All, vec![yes.clone(), yes.clone()]));
        assert!(!check(Aggregation::All, vec![yes.clone(), no.clone()]));
        assert!(check(Aggregation::Any, vec![no.clone(), yes.clone()]));
        assert!(!check(Aggregation::Any, vec![no.clone(), no]));
    }

    #[test]
    fn test_short_circuit_skips_unparseable_date() {
        let eval = Evaluator::at(now(), ErrorMode::FailFast);
        let r = dated("not a date");
        let date = cond("date_received", "less than", "1");

        let all = rule(
            Aggregation::All,
            vec![cond("subject", "contains", "invoice"), date.clone()],
        );
        assert!(!eval.matches(&r, &all).unwrap());

        let any = rule(
            Aggregation::Any,
            vec![cond("subject", "contains", "test"), date],
        );
        assert!(eval.matches(&r, &any).unwrap());
    }

    #[test]
    fn test_date_parse_error_modes() {
        let r = dated("not a date");
        let date_rule = rule(
            Aggregation::Any,
            vec![
                cond("date_received", "less than", "1"),
                cond("subject", "contains", "test"),
            ],
        );

        let lenient = Evaluator::at(now(), ErrorMode::Lenient);
        assert!(lenient.matches(&r, &date_rule).unwrap());
        assert_eq!(lenient.degraded_conditions(), 1);

        let strict = Evaluator::at(now(), ErrorMode::FailFast);
        assert!(matches!(
            strict.matches(&r, &date_rule),
            Err(RuleError::DateParse { .. })
        ));
        assert_eq!(strict.degraded_conditions(), 0);
    }

    #[test]
    fn test_raw_evaluate_reports_date_errors() {
        let eval = Evaluator::at(now(), ErrorMode::Lenient);
        let result = eval.evaluate(&dated("soon"), &cond("date_received", "greater than", "3"));
        assert!(matches!(result, Err(RuleError::DateParse { value }) if value == "soon"));
    }

    #[test]
    fn test_text_field_mapping() {
        assert_eq!(TextField::Snippet.field(), crate::email::Field::Snippet);
    }
}
