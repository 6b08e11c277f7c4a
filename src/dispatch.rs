use crate::email::EmailRecord;
use crate::error::Result;
use crate::rules::{Action, Rule};
use std::io::Write;

/// Runs a matched rule's actions, writing their output to `out`.
pub struct Dispatcher<W: Write> {
    out: W,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Execute every action of `rule` for `record`, in declaration order.
    ///
    /// Returns how many actions actually ran; unknown kinds are skipped.
    pub fn dispatch(&mut self, record: &EmailRecord, rule: &Rule) -> Result<usize> {
        let mut executed = 0;
        for action in &rule.actions {
            match action {
                Action::PrintEmailInfo(template) => {
                    writeln!(self.out, "{}", template.render(record))?;
                    executed += 1;
                }
                Action::Other(kind) => {
                    log::debug!(
                        "Rule '{}': skipping unsupported action '{kind}' for email {}",
                        rule.name,
                        record.id
                    );
                }
            }
        }
        self.out.flush()?;
        Ok(executed)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
