//! Appraise configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppraiseError, Result};

/// Root configuration for the background-execution daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppraiseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

fn default_db_path() -> String {
    "~/.appraise/appraise.db".into()
}

impl Default for AppraiseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scheduler: SchedulerConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl AppraiseConfig {
    /// Load config from the default path (~/.appraise/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppraiseError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppraiseError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppraiseError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".appraise")
            .join("config.toml")
    }
}

/// Worker pool + periodic task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of concurrent workers in the pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the bounded job intake queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Cron expression shared by the registered periodic tasks.
    #[serde(default = "default_cron")]
    pub cron: String,
    /// How often the periodic runner checks for due tasks.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_workers() -> usize {
    5
}
fn default_queue_capacity() -> usize {
    100
}
fn default_cron() -> String {
    "*/10 * * * *".into()
}
fn default_check_interval() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            cron: default_cron(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Outbound mail configuration (SMTP + drain loop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address for all outbox mail. Blank disables delivery.
    #[serde(default)]
    pub sender_address: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Seconds between outbox polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max records fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_smtp_port() -> u16 {
    587
}
fn default_poll_interval() -> u64 {
    30
}
fn default_batch_size() -> usize {
    50
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            sender_address: String::new(),
            sender_name: None,
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl MailConfig {
    /// Whether enough is configured to attempt delivery at all.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.sender_address.is_empty() && !self.smtp_host.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppraiseConfig::default();
        assert_eq!(cfg.scheduler.workers, 5);
        assert_eq!(cfg.scheduler.queue_capacity, 100);
        assert_eq!(cfg.scheduler.cron, "*/10 * * * *");
        assert_eq!(cfg.mail.poll_interval_secs, 30);
        assert_eq!(cfg.mail.batch_size, 50);
        assert!(!cfg.mail.is_configured()); // no sender/host yet
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: AppraiseConfig = toml::from_str(
            r#"
            [scheduler]
            workers = 2

            [mail]
            smtp_host = "smtp.example.com"
            sender_address = "noreply@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.workers, 2);
        assert_eq!(cfg.scheduler.queue_capacity, 100);
        assert_eq!(cfg.mail.smtp_port, 587);
        assert!(cfg.mail.is_configured());
    }
}
