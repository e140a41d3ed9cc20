//! Mail delivery drainer — polls the outbox and delivers over SMTP.
//!
//! Runs on its own fixed-interval timer, independent of the periodic
//! runner and the worker pool. Every record is claimed individually
//! with an atomic `new → processing` transition before delivery; losing
//! that race is expected under concurrency and skipped silently. One
//! failed record never aborts the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::watch;

use appraise_core::config::MailConfig;
use appraise_core::outbox::{OutboxEmail, OutboxStore, parse_recipients};
use appraise_core::{AppraiseError, Result};

/// A fully resolved outgoing message, ready for a transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Network mail transport. Small seam so tests can substitute a mock.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<()>;
}

/// SMTP transport over lettre (STARTTLS relay + credentials).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AppraiseError::Mail(format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &EmailMessage) -> Result<()> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AppraiseError::Mail(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| AppraiseError::Mail(format!("Invalid recipient '{address}': {e}")))
}

fn build_message(email: &EmailMessage) -> Result<Message> {
    let from: Mailbox = match &email.from_name {
        Some(name) => format!("{name} <{}>", email.from_address),
        None => email.from_address.clone(),
    }
    .parse()
    .map_err(|e| AppraiseError::Mail(format!("Invalid sender: {e}")))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    for to in &email.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &email.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }
    builder
        .body(email.body.clone())
        .map_err(|e| AppraiseError::Mail(format!("Build email: {e}")))
}

/// The outbox drain loop.
pub struct MailDrainer {
    store: Arc<dyn OutboxStore>,
    transport: Arc<dyn MailTransport>,
    sender_address: String,
    sender_name: Option<String>,
    poll_interval: Duration,
    batch_size: usize,
}

impl MailDrainer {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        transport: Arc<dyn MailTransport>,
        config: &MailConfig,
    ) -> Self {
        Self {
            store,
            transport,
            sender_address: config.sender_address.clone(),
            sender_name: config.sender_name.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size,
        }
    }

    /// Poll until the shutdown signal flips. The signal is checked once
    /// per tick and once per record, so a shutdown request never waits
    /// for a full batch.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "📬 Mail drainer started (poll every {:?}, batch {})",
            self.poll_interval,
            self.batch_size
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender can never signal again; treat it
                    // as a stop request.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.drain_tick(&shutdown).await;
                }
            }
        }
        tracing::info!("📬 Mail drainer stopped");
    }

    /// One poll: fetch pending records, claim and deliver each.
    /// Returns how many records this tick claimed.
    pub async fn drain_tick(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let batch = match self.store.fetch_new(self.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("❌ Outbox fetch failed: {e}");
                return 0;
            }
        };

        let mut claimed = 0;
        for record in batch {
            if *shutdown.borrow() {
                tracing::debug!("Shutdown requested; leaving rest of batch for reconciliation");
                break;
            }
            match self.store.claim(record.id).await {
                Ok(true) => {}
                // Another poller won the claim or the row changed state.
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!("❌ Outbox claim failed for record {}: {e}", record.id);
                    continue;
                }
            }
            claimed += 1;
            self.deliver(&record).await;
        }
        claimed
    }

    async fn deliver(&self, record: &OutboxEmail) {
        let to = parse_recipients(&record.to);
        let cc = parse_recipients(&record.cc);
        let bcc = parse_recipients(&record.bcc);

        if to.is_empty() && cc.is_empty() && bcc.is_empty() {
            tracing::debug!(
                "Outbox record {} has no resolvable recipients; vacuously sent",
                record.id
            );
            self.finish_sent(record.id).await;
            return;
        }

        let email = EmailMessage {
            from_address: self.sender_address.clone(),
            from_name: self.sender_name.clone(),
            to,
            cc,
            bcc,
            subject: record.subject.clone(),
            body: record.body.clone(),
        };

        match self.transport.send(&email).await {
            Ok(()) => {
                tracing::info!("📤 Outbox record {} delivered to '{}'", record.id, record.to);
                self.finish_sent(record.id).await;
            }
            Err(e) => {
                tracing::error!(
                    "❌ Delivery failed for outbox record {} to '{}': {e}",
                    record.id,
                    record.to
                );
                if let Err(e) = self.store.mark_failed(record.id).await {
                    tracing::error!("❌ Could not mark outbox record {} failed: {e}", record.id);
                }
            }
        }
    }

    async fn finish_sent(&self, id: i64) {
        if let Err(e) = self.store.mark_sent(id, Utc::now()).await {
            tracing::error!("❌ Could not mark outbox record {id} sent: {e}");
        }
    }
}
