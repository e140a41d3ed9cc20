//! SQLite-backed persistence: the mail outbox table and the boolean
//! feature-flag store.
//!
//! The claim query is the concurrency-safety mechanism for the whole
//! outbox: `UPDATE ... WHERE id = ? AND status = 'new'` either moves a
//! record to `processing` or affects zero rows because another poller
//! got there first.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use appraise_core::flags::FeatureFlags;
use appraise_core::outbox::{MailStatus, NewOutboxEmail, OutboxEmail, OutboxStore};
use appraise_core::{AppraiseError, Result};

/// SQLite store for everything the background subsystem persists.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

impl SchedulerDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).map_err(|e| AppraiseError::Store(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppraiseError::Store(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppraiseError::Store("connection lock poisoned".into()))
    }

    /// Create tables on first open.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Outgoing mail, drained by the delivery loop
            CREATE TABLE IF NOT EXISTS email_outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mail_to TEXT NOT NULL DEFAULT '',
                mail_cc TEXT NOT NULL DEFAULT '',
                mail_bcc TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'new',   -- new, processing, sent, failed
                retry_count INTEGER NOT NULL DEFAULT 0,
                expected_send_date TEXT,
                actual_send_date TEXT,
                created_at TEXT NOT NULL
            );

            -- Boolean switches for the background services
            CREATE TABLE IF NOT EXISTS feature_flags (
                name TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0
            );
         ",
            )
            .map_err(|e| AppraiseError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Set a feature flag (operator surface; the tasks only read).
    pub fn set_flag(&self, name: &str, enabled: bool) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO feature_flags (name, enabled) VALUES (?1, ?2)",
                rusqlite::params![name, enabled as i32],
            )
            .map_err(|e| AppraiseError::Store(format!("Set flag: {e}")))?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_email(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEmail> {
    let status: String = row.get(6)?;
    let expected: Option<String> = row.get(8)?;
    let actual: Option<String> = row.get(9)?;
    let created: String = row.get(10)?;
    Ok(OutboxEmail {
        id: row.get(0)?,
        to: row.get(1)?,
        cc: row.get(2)?,
        bcc: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        status: MailStatus::parse(&status),
        retry_count: row.get(7)?,
        expected_send_date: expected.as_deref().map(parse_timestamp),
        actual_send_date: actual.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&created),
    })
}

#[async_trait]
impl OutboxStore for SchedulerDb {
    async fn insert(&self, email: &NewOutboxEmail) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO email_outbox
             (mail_to, mail_cc, mail_bcc, subject, body, status, expected_send_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                email.to,
                email.cc,
                email.bcc,
                email.subject,
                email.body,
                MailStatus::New.as_str(),
                email.expected_send_date.map(|d| d.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppraiseError::Store(format!("Insert outbox: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    async fn fetch_new(&self, limit: usize) -> Result<Vec<OutboxEmail>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, mail_to, mail_cc, mail_bcc, subject, body, status, retry_count,
                        expected_send_date, actual_send_date, created_at
                 FROM email_outbox WHERE status = ?1
                 ORDER BY created_at, id LIMIT ?2",
            )
            .map_err(|e| AppraiseError::Store(format!("Fetch outbox: {e}")))?;
        let rows = stmt
            .query_map(
                rusqlite::params![MailStatus::New.as_str(), limit as i64],
                row_to_email,
            )
            .map_err(|e| AppraiseError::Store(format!("Fetch outbox: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AppraiseError::Store(format!("Fetch outbox: {e}")))
    }

    async fn claim(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()?
            .execute(
                "UPDATE email_outbox SET status = ?1 WHERE id = ?2 AND status = ?3",
                rusqlite::params![MailStatus::Processing.as_str(), id, MailStatus::New.as_str()],
            )
            .map_err(|e| AppraiseError::Store(format!("Claim outbox: {e}")))?;
        Ok(affected == 1)
    }

    async fn mark_sent(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE email_outbox SET status = ?1, actual_send_date = ?2 WHERE id = ?3",
                rusqlite::params![MailStatus::Sent.as_str(), at.to_rfc3339(), id],
            )
            .map_err(|e| AppraiseError::Store(format!("Mark sent: {e}")))?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE email_outbox SET status = ?1 WHERE id = ?2",
                rusqlite::params![MailStatus::Failed.as_str(), id],
            )
            .map_err(|e| AppraiseError::Store(format!("Mark failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl FeatureFlags for SchedulerDb {
    /// Fail-closed: a missing row, a poisoned lock, or a query error all
    /// read as "disabled".
    async fn is_enabled(&self, name: &str) -> bool {
        let Ok(conn) = self.conn() else {
            tracing::debug!("Flag '{name}' unreadable; treating as disabled");
            return false;
        };
        match conn.query_row(
            "SELECT enabled FROM feature_flags WHERE name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        ) {
            Ok(value) => value != 0,
            Err(rusqlite::Error::QueryReturnedNoRows) => false,
            Err(e) => {
                tracing::debug!("Flag '{name}' read failed ({e}); treating as disabled");
                false
            }
        }
    }
}
