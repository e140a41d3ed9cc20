//! # Appraise — Background Services Daemon
//!
//! Runs the background subsystem of the performance review platform:
//! periodic tasks (review period closure, competency gap closure,
//! SLA auto-reassignment), the bounded job worker pool, and the mail
//! outbox drainer.
//!
//! Usage:
//!   appraised                                # Start with defaults
//!   appraised --config /etc/appraise.toml   # Explicit config file
//!   appraised --init-config                 # Write default config and exit
//!   appraised --enable-flag ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE
//!   appraised --verbose

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use appraise_core::config::AppraiseConfig;
use appraise_core::services::{
    CompetencyService, RequestService, ReviewPeriodService, ReviewService, WorkProductService,
};
use appraise_scheduler::{MailTransport, Scheduler, SchedulerDb, SchedulerDeps, SmtpMailer};

#[derive(Parser)]
#[command(
    name = "appraised",
    version,
    about = "📋 Appraise — Background Services Daemon"
)]
struct Cli {
    /// Config file path (default: ~/.appraise/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides the config file)
    #[arg(long)]
    db: Option<String>,

    /// Write the default config to ~/.appraise/config.toml and exit
    #[arg(long)]
    init_config: bool,

    /// Enable a feature flag before starting (repeatable)
    #[arg(long, value_name = "NAME")]
    enable_flag: Vec<String>,

    /// Disable a feature flag before starting (repeatable)
    #[arg(long, value_name = "NAME")]
    disable_flag: Vec<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

/// Placeholder domain services. The real implementations live in the
/// review platform itself; the daemon only needs something to wire at
/// the seam, and these log every call they receive.
mod stubs {
    use super::*;
    use async_trait::async_trait;

    pub struct LoggingServices;

    #[async_trait]
    impl ReviewPeriodService for LoggingServices {
        async fn close_expired_periods(&self) -> appraise_core::Result<u32> {
            tracing::info!("📅 close_expired_periods invoked (stub)");
            Ok(0)
        }
        async fn close_request(&self, request_id: i64) -> appraise_core::Result<()> {
            tracing::info!("📅 close_request({request_id}) invoked (stub)");
            Ok(())
        }
    }

    #[async_trait]
    impl CompetencyService for LoggingServices {
        async fn staff_with_closed_gaps(&self) -> appraise_core::Result<Vec<i64>> {
            tracing::info!("🎯 staff_with_closed_gaps invoked (stub)");
            Ok(Vec::new())
        }
        async fn setup_gap_closure(&self, staff_id: i64) -> appraise_core::Result<()> {
            tracing::info!("🎯 setup_gap_closure({staff_id}) invoked (stub)");
            Ok(())
        }
    }

    #[async_trait]
    impl RequestService for LoggingServices {
        async fn breached_requests(&self) -> appraise_core::Result<Vec<i64>> {
            tracing::info!("⏱️ breached_requests invoked (stub)");
            Ok(Vec::new())
        }
        async fn reassign_to_manager(&self, request_id: i64) -> appraise_core::Result<()> {
            tracing::info!("⏱️ reassign_to_manager({request_id}) invoked (stub)");
            Ok(())
        }
    }

    #[async_trait]
    impl ReviewService for LoggingServices {
        async fn initiate_review360(&self, staff_id: i64) -> appraise_core::Result<()> {
            tracing::info!("🔄 initiate_review360({staff_id}) invoked (stub)");
            Ok(())
        }
    }

    #[async_trait]
    impl WorkProductService for LoggingServices {
        async fn setup_work_product(&self, staff_id: i64) -> appraise_core::Result<()> {
            tracing::info!("📦 setup_work_product({staff_id}) invoked (stub)");
            Ok(())
        }
        async fn evaluate_work_product(&self, work_product_id: i64) -> appraise_core::Result<()> {
            tracing::info!("📦 evaluate_work_product({work_product_id}) invoked (stub)");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "appraise=debug,appraise_core=debug,appraise_scheduler=debug"
    } else {
        "appraise=info,appraise_core=info,appraise_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // --init-config: write defaults and exit
    if cli.init_config {
        let path = AppraiseConfig::default_path();
        if path.exists() {
            println!("⚠️  Config already exists at {}", path.display());
        } else {
            AppraiseConfig::default().save()?;
            println!("✅ Default config written to {}", path.display());
        }
        return Ok(());
    }

    // Load config: an explicit path must exist; the default path falls
    // back to built-in defaults when absent.
    let mut config = match &cli.config {
        Some(path) => AppraiseConfig::load_from(Path::new(&expand_path(path)))?,
        None => AppraiseConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }

    // Open database
    let db_path = expand_path(&config.db_path);
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(SchedulerDb::open(Path::new(&db_path))?);
    tracing::info!("🗄️ Database: {db_path}");

    // Flag overrides from the command line
    for name in &cli.enable_flag {
        db.set_flag(name, true)?;
        tracing::info!("✅ Flag enabled: {name}");
    }
    for name in &cli.disable_flag {
        db.set_flag(name, false)?;
        tracing::info!("⏸️ Flag disabled: {name}");
    }

    // SMTP transport only when mail is actually configured
    let transport: Option<Arc<dyn MailTransport>> = if config.mail.is_configured() {
        Some(Arc::new(SmtpMailer::from_config(&config.mail)?))
    } else {
        tracing::info!("📭 Mail not configured; outbox delivery disabled");
        None
    };
    let outbox: Option<Arc<dyn appraise_core::OutboxStore>> =
        transport.as_ref().map(|_| Arc::clone(&db) as _);

    let services = Arc::new(stubs::LoggingServices);
    let scheduler = Scheduler::new(
        &config,
        SchedulerDeps {
            flags: Arc::clone(&db) as _,
            review_periods: Arc::clone(&services) as _,
            competencies: Arc::clone(&services) as _,
            requests: Arc::clone(&services) as _,
            reviews: Arc::clone(&services) as _,
            work_products: services as _,
            outbox,
            transport,
        },
    );

    println!("📋 Appraise Background Daemon v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:  {db_path}");
    println!(
        "   ⏰ Schedule:  {} (check every {}s)",
        config.scheduler.cron, config.scheduler.check_interval_secs
    );
    println!(
        "   👷 Workers:   {} (queue {})",
        config.scheduler.workers, config.scheduler.queue_capacity
    );
    println!();

    scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("⏹️ Ctrl-C received; shutting down");
    scheduler.stop().await;

    Ok(())
}
