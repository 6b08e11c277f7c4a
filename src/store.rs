use crate::email::EmailRecord;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

/// SQLite-backed storage for retrieved emails, keyed by `msg_id`.
pub struct EmailStore {
    conn: Connection,
}

impl EmailStore {
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open email database: {db_path}"))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS emails (
                msg_id TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT,
                date_received TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Insert a record, replacing the stored fields if `msg_id` already exists.
    pub fn upsert(&self, email: &EmailRecord) -> Result<()> {
        Self::upsert_on(&self.conn, email)
    }

    /// Upsert a batch in one transaction; returns how many distinct `msg_id`s were written.
    /// A repeated id within the batch keeps its last record.
    pub fn upsert_all(&mut self, emails: &[EmailRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = HashSet::new();
        for email in emails {
            Self::upsert_on(&tx, email)?;
            written.insert(email.id.as_str());
        }
        tx.commit()?;
        Ok(written.len())
    }

    fn upsert_on(conn: &Connection, email: &EmailRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO emails (msg_id, sender, subject, snippet, date_received)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(msg_id) DO UPDATE SET
                sender = excluded.sender,
                subject = excluded.subject,
                snippet = excluded.snippet,
                date_received = excluded.date_received",
            params![
                email.id,
                email.sender,
                email.subject,
                email.snippet,
                email.date_received
            ],
        )
        .with_context(|| format!("Failed to store email {}", email.id))?;
        Ok(())
    }

    /// All stored records, in the order they were first inserted.
    pub fn fetch_all(&self) -> Result<Vec<EmailRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT msg_id, sender, subject, snippet, date_received
             FROM emails ORDER BY rowid",
        )?;
        let emails = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    pub fn get(&self, msg_id: &str) -> Result<Option<EmailRecord>> {
        let email = self
            .conn
            .query_row(
                "SELECT msg_id, sender, subject, snippet, date_received
                 FROM emails WHERE msg_id = ?1",
                params![msg_id],
                Self::from_row,
            )
            .optional()?;
        Ok(email)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<EmailRecord> {
        Ok(EmailRecord {
            id: row.get(0)?,
            sender: row.get(1)?,
            subject: row.get(2)?,
            snippet: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            date_received: row.get(4)?,
        })
    }
}
