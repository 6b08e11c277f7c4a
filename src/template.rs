use crate::email::EmailRecord;
use crate::error::{Result, RuleError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // `{{`, `}}`, or a single-brace placeholder.
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    EmailId,
    DateReceived,
}

/// A `print_email_info` message with its placeholders resolved up front.
///
/// `{email_id}` and `{date_received}` are substituted; `{{` and `}}` stand for literal
/// braces. Anything else inside braces is rejected when the template is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    pub fn compile(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last_end = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let whole = caps.get(0).expect("group 0 always present");
            push_literal(source, &source[last_end..whole.start()], &mut literal)?;
            last_end = whole.end();

            match whole.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                _ => {
                    let segment = match caps.get(1).map(|m| m.as_str()) {
                        Some("email_id") => Segment::EmailId,
                        Some("date_received") => Segment::DateReceived,
                        Some("") | None => {
                            return Err(RuleError::config(format!(
                                "empty placeholder in message template '{source}'"
                            )))
                        }
                        Some(other) => {
                            return Err(RuleError::config(format!(
                                "unknown placeholder '{{{other}}}' in message template '{source}'"
                            )))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
            }
        }

        push_literal(source, &source[last_end..], &mut literal)?;
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, record: &EmailRecord) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::EmailId => out.push_str(&record.id),
                Segment::DateReceived => out.push_str(&record.date_received),
            }
        }
        out
    }
}

fn push_literal(source: &str, text: &str, literal: &mut String) -> Result<()> {
    if text.contains(['{', '}']) {
        return Err(RuleError::config(format!(
            "unbalanced brace in message template '{source}'"
        )));
    }
    literal.push_str(text);
    Ok(())
}
