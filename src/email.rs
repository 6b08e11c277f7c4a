use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

const SNIPPET_MAX_CHARS: usize = 200;

/// One retrieved message, as handed over by the retrieval or storage side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(rename = "msg_id")]
    pub id: String,
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    pub date_received: String,
}

/// The record fields a condition may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Sender,
    Subject,
    Snippet,
    DateReceived,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Sender => "sender",
            Field::Subject => "subject",
            Field::Snippet => "snippet",
            Field::DateReceived => "date_received",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" => Ok(Field::Sender),
            "subject" => Ok(Field::Subject),
            "snippet" => Ok(Field::Snippet),
            "date_received" => Ok(Field::DateReceived),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

impl EmailRecord {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        snippet: impl Into<String>,
        date_received: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            snippet: snippet.into(),
            date_received: date_received.into(),
        }
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Sender => &self.sender,
            Field::Subject => &self.subject,
            Field::Snippet => &self.snippet,
            Field::DateReceived => &self.date_received,
        }
    }

    /// Build a record from a raw RFC 822 message.
    ///
    /// Folded header lines are joined, header names are matched case-insensitively and
    /// repeated headers keep their first value. `fallback_id` is used when the message
    /// has no `Message-ID`.
    pub fn from_rfc822(fallback_id: &str, raw: &str) -> Self {
        let mut headers: HashMap<String, String> = HashMap::new();
        let mut body = String::new();
        let mut in_headers = true;
        let mut last_header_key: Option<String> = None;

        for line in raw.lines() {
            if in_headers {
                if line.trim().is_empty() {
                    in_headers = false;
                    continue;
                }

                if line.starts_with(' ') || line.starts_with('\t') {
                    if let Some(ref key) = last_header_key {
                        if let Some(existing_value) = headers.get_mut(key) {
                            existing_value.push(' ');
                            existing_value.push_str(line.trim());
                        }
                    }
                    continue;
                }

                if let Some((key, value)) = line.split_once(':') {
                    let key = key.trim().to_lowercase();
                    if headers.contains_key(&key) {
                        last_header_key = None;
                        continue;
                    }
                    last_header_key = Some(key.clone());
                    headers.insert(key, value.trim().to_string());
                }
            } else {
                body.push_str(line);
                body.push('\n');
            }
        }

        let id = headers
            .get("message-id")
            .map(|v| v.trim_matches(['<', '>']).to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        let snippet: String = body
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(SNIPPET_MAX_CHARS)
            .collect();

        Self {
            id,
            sender: headers.remove("from").unwrap_or_default(),
            subject: headers.remove("subject").unwrap_or_default(),
            snippet,
            date_received: headers.remove("date").unwrap_or_default(),
        }
    }
}

/// Read a JSON array of records, the shape the retrieval side produces.
pub fn load_records(path: &str) -> anyhow::Result<Vec<EmailRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read email records from {path}"))?;
    let records: Vec<EmailRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid email records in {path}"))?;

    let mut seen = HashSet::new();
    for record in &records {
        if record.id.is_empty() {
            anyhow::bail!(
                "Email record with empty msg_id in {path} (subject: '{}')",
                record.subject
            );
        }
        if !seen.insert(record.id.as_str()) {
            anyhow::bail!("Duplicate msg_id '{}' in {path}", record.id);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_record_uses_msg_id_key() {
        let json = r#"{
            "msg_id": "123",
            "sender": "test@example.com",
            "subject": "Test Email",
            "snippet": "This is a test email.",
            "date_received": "Thu, 27 Jun 2024 10:09:27 +0530"
        }"#;
        let record: EmailRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "123");
        assert_eq!(record.field(Field::Subject), "Test Email");
        assert_eq!(
            record.field(Field::DateReceived),
            "Thu, 27 Jun 2024 10:09:27 +0530"
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["msg_id"], "123");
    }

    #[test]
    fn test_field_names() {
        assert_eq!("date_received".parse::<Field>().unwrap(), Field::DateReceived);
        assert_eq!(Field::Snippet.to_string(), "snippet");
        assert!("body".parse::<Field>().is_err());
    }

    #[test]
    fn test_from_rfc822() {
        let raw = "Message-ID: <abc@mail.example.com>\r\n\
                   From: Alice <alice@example.com>\r\n\
                   Subject: Quarterly\r\n  report\r\n\
                   Date: Thu, 27 Jun 2024 10:09:27 +0530\r\n\
                   \r\n\
                   Hello   team,\r\n\r\nnumbers attached.\r\n";
        let record = EmailRecord::from_rfc822("fallback", raw);

        assert_eq!(record.id, "abc@mail.example.com");
        assert_eq!(record.sender, "Alice <alice@example.com>");
        assert_eq!(record.subject, "Quarterly report");
        assert_eq!(record.date_received, "Thu, 27 Jun 2024 10:09:27 +0530");
        assert_eq!(record.snippet, "Hello team, numbers attached.");
    }

    #[test]
    fn test_from_rfc822_without_message_id() {
        let raw = "Subject: hi\n\nbody\n";
        let record = EmailRecord::from_rfc822("msg-7", raw);
        assert_eq!(record.id, "msg-7");
        assert_eq!(record.sender, "");
    }

    #[test]
    fn test_load_records_rejects_empty_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"msg_id": "", "sender": "a", "subject": "b", "snippet": "",
                 "date_received": "c"}}]"#
        )
        .unwrap();

        let err = load_records(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("empty msg_id"));
    }

    #[test]
    fn test_load_records_rejects_duplicate_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"msg_id": "7", "sender": "a", "subject": "b", "date_received": "c"}},
                {{"msg_id": "8", "sender": "a", "subject": "b", "date_received": "c"}},
                {{"msg_id": "7", "sender": "x", "subject": "y", "date_received": "z"}}
            ]"#
        )
        .unwrap();

        let err = load_records(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Duplicate msg_id '7'"));
    }

    #[test]
    fn test_load_records_snippet_optional() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"msg_id": "1", "sender": "a", "subject": "b", "date_received": "c"}}]"#
        )
        .unwrap();

        let records = load_records(file.path().to_str().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].snippet, "");
    }
}
