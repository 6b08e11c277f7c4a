use crate::dispatch::Dispatcher;
use crate::email::EmailRecord;
use crate::error::{Result, RuleError};
use crate::evaluator::{ErrorMode, Evaluator};
use crate::rules::RuleSet;
use chrono::{DateTime, Utc};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loaded,
    Running { record_index: usize, rule_index: usize },
}

/// A rule that fired for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub record_id: String,
    pub rule_name: String,
}

/// Summary of one pass over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub records: usize,
    pub rules_evaluated: usize,
    pub matches: Vec<RuleMatch>,
    pub actions_executed: usize,
    pub degraded_conditions: u64,
}

/// Runs every record of a batch against every rule of a loaded rule set.
pub struct RuleEngine {
    mode: ErrorMode,
    now: Option<DateTime<Utc>>,
    rules: Option<RuleSet>,
    state: EngineState,
}

impl RuleEngine {
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            now: None,
            rules: None,
            state: EngineState::Idle,
        }
    }

    /// Pin "now" for date conditions instead of reading the clock when a pass starts.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn load(&mut self, rules: RuleSet) {
        log::debug!("Loaded {} rules", rules.len());
        self.rules = Some(rules);
        self.state = EngineState::Loaded;
    }

    /// Evaluate `records` in order against the loaded rules in order, dispatching the
    /// actions of each match to `out`.
    ///
    /// The rule set is consumed by the pass; the engine is idle again afterwards,
    /// whether the pass completed or failed.
    pub fn run<W: Write>(&mut self, records: &[EmailRecord], out: W) -> Result<PassReport> {
        let rules = self
            .rules
            .take()
            .ok_or_else(|| RuleError::config("no rule set loaded"))?;

        let result = self.pass(&rules, records, out);
        self.state = EngineState::Idle;
        result
    }

    fn pass<W: Write>(
        &mut self,
        rules: &RuleSet,
        records: &[EmailRecord],
        out: W,
    ) -> Result<PassReport> {
        let evaluator = match self.now {
            Some(now) => Evaluator::at(now, self.mode),
            None => Evaluator::new(self.mode),
        };
        let mut dispatcher = Dispatcher::new(out);
        let mut report = PassReport {
            records: records.len(),
            ..Default::default()
        };

        for (record_index, record) in records.iter().enumerate() {
            for (rule_index, rule) in rules.rules().iter().enumerate() {
                self.state = EngineState::Running {
                    record_index,
                    rule_index,
                };
                report.rules_evaluated += 1;

                let matched = evaluator.matches(record, rule)?;
                log::debug!(
                    "Rule '{}' evaluation result for email {}: {matched}",
                    rule.name,
                    record.id
                );
                if !matched {
                    continue;
                }

                log::info!("Rule '{}' matched email {}", rule.name, record.id);
                report.actions_executed += dispatcher.dispatch(record, rule)?;
                report.matches.push(RuleMatch {
                    record_id: record.id.clone(),
                    rule_name: rule.name.clone(),
                });
            }
        }

        report.degraded_conditions = evaluator.degraded_conditions();
        log::info!(
            "Processed {} emails against {} rules: {} matches, {} actions",
            report.records,
            rules.len(),
            report.matches.len(),
            report.actions_executed
        );
        Ok(report)
    }
}

/// Load `rules` into a fresh engine and run one pass over `records`.
pub fn process_emails<W: Write>(
    records: &[EmailRecord],
    rules: RuleSet,
    mode: ErrorMode,
    out: W,
) -> Result<PassReport> {
    let mut engine = RuleEngine::new(mode);
    engine.load(rules);
    engine.run(records, out)
}
