//! Mail outbox data model.
//!
//! Domain code queues outgoing mail as durable rows; a separate drain
//! loop claims and delivers them later (outbox pattern). The status
//! lifecycle is `new → processing → sent|failed` and never moves
//! backward. The `new → processing` transition is an atomic conditional
//! update — the sole mechanism preventing duplicate pickup under
//! concurrent pollers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Delivery status of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailStatus {
    New,
    Processing,
    Sent,
    Failed,
}

impl MailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailStatus::New => "new",
            MailStatus::Processing => "processing",
            MailStatus::Sent => "sent",
            MailStatus::Failed => "failed",
        }
    }

    /// Unknown strings map to `New` so a hand-edited row is retried
    /// rather than stranded.
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => MailStatus::Processing,
            "sent" => MailStatus::Sent,
            "failed" => MailStatus::Failed,
            _ => MailStatus::New,
        }
    }
}

/// A persisted outgoing email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEmail {
    pub id: i64,
    /// Recipient lists are stored raw; semicolon- or comma-separated.
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body: String,
    pub status: MailStatus,
    pub retry_count: u32,
    pub expected_send_date: Option<DateTime<Utc>>,
    pub actual_send_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payload for inserting a fresh outbox row (status starts at `new`).
#[derive(Debug, Clone, Default)]
pub struct NewOutboxEmail {
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body: String,
    pub expected_send_date: Option<DateTime<Utc>>,
}

/// Durable store behind the mail drain loop.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new record, returning its id.
    async fn insert(&self, email: &NewOutboxEmail) -> Result<i64>;

    /// Fetch up to `limit` records with status `new`, oldest first.
    async fn fetch_new(&self, limit: usize) -> Result<Vec<OutboxEmail>>;

    /// Atomically transition one record `new → processing`.
    ///
    /// Returns false when zero rows were affected — another poller
    /// already claimed the record or it changed state. Callers must
    /// skip the record silently in that case.
    async fn claim(&self, id: i64) -> Result<bool>;

    /// Transition to `sent`, stamping the actual send time.
    async fn mark_sent(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Transition to `failed`.
    async fn mark_failed(&self, id: i64) -> Result<()>;
}

/// Split a raw recipient list on `;` and `,`, trimming whitespace and
/// discarding empties.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_separators() {
        let parsed = parse_recipients("a@x.com; b@x.com,c@x.com");
        assert_eq!(parsed, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn test_parse_discards_empties() {
        assert!(parse_recipients("").is_empty());
        assert!(parse_recipients(" ;  , ;").is_empty());
        assert_eq!(parse_recipients(";a@x.com;"), vec!["a@x.com"]);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            MailStatus::New,
            MailStatus::Processing,
            MailStatus::Sent,
            MailStatus::Failed,
        ] {
            assert_eq!(MailStatus::parse(status.as_str()), status);
        }
        assert_eq!(MailStatus::parse("garbage"), MailStatus::New);
    }
}
