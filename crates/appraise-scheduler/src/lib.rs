//! # Appraise Scheduler
//!
//! Background-execution subsystem for the Appraise performance review
//! platform: a periodic task runner, a bounded concurrent worker pool,
//! and a mail-outbox drain loop, wired together by one orchestrator.
//!
//! ## Design Principles
//! - Single active scheduler instance — no distributed coordination
//! - In-memory job queue — durable work goes through the mail outbox
//! - Tokio timers only — zero overhead when idle
//! - SQLite persistence for the outbox and feature flags
//! - Fail-closed feature flags — a disabled background process is a
//!   normal operational state, not an error
//!
//! ## Architecture
//! ```text
//! Scheduler (orchestrator)
//!   ├── WorkerPool (N workers, bounded intake queue)
//!   │     └── Job: named, fire-and-forget, failures isolated per job
//!   ├── PeriodicRunner (cron, skip-if-running per task)
//!   │     ├── review period closure   → ReviewPeriodService
//!   │     ├── competency gap closure  → fan-out Jobs into the pool
//!   │     └── auto reassign           → fan-out Jobs into the pool
//!   └── MailDrainer (own timer)
//!         └── outbox: claim new → processing → deliver → sent|failed
//! ```

pub mod cron;
pub mod mailer;
pub mod periodic;
pub mod persistence;
pub mod pool;
pub mod scheduler;
pub mod tasks;

pub use mailer::{EmailMessage, MailDrainer, MailTransport, SmtpMailer};
pub use periodic::PeriodicRunner;
pub use persistence::SchedulerDb;
pub use pool::{Job, WorkerPool};
pub use scheduler::{Scheduler, SchedulerDeps};
