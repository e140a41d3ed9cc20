//! # Appraise Core
//!
//! Shared building blocks for the Appraise background-execution
//! subsystem: configuration, the crate-wide error type, feature-flag
//! access, the mail outbox data model, and the traits for the domain
//! collaborators the scheduler invokes.
//!
//! The domain services themselves (review period closure logic,
//! competency gap detection, request reassignment rules) live in the
//! wider Appraise system — this crate only defines the seams.

pub mod config;
pub mod error;
pub mod flags;
pub mod outbox;
pub mod services;

pub use config::{AppraiseConfig, MailConfig, SchedulerConfig};
pub use error::{AppraiseError, Result};
pub use flags::FeatureFlags;
pub use outbox::{MailStatus, NewOutboxEmail, OutboxEmail, OutboxStore, parse_recipients};
